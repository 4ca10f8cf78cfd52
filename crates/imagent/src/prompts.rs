//! Instruction texts sent alongside images and prompts

use crate::{PromptCategory, TaskKind};

pub const UPSCALE: &str = "Upscale this image, making it higher resolution. Sharpen details, reduce noise, and improve overall clarity without altering the subject or composition.";

pub const REPAIR: &str = "Repair this photograph. Restore faded colors, fix scratches, and mend any visible damage.";

pub const WATERMARK_WITH_MASK: &str = "The user has provided an image and a mask. Remove the content from the original image where the mask is white. Fill in the removed areas seamlessly.";

pub const WATERMARK_WITHOUT_MASK: &str = "Remove the watermark from this image. The area where the watermark was should be seamlessly filled in to match the surrounding image.";

pub const DESCRIBE: &str = "Describe this image in detail, including the style, subject, composition, colors, and any notable features.";

/// Marker the sketch model uses when it cannot identify an object
pub const SKETCH_ERROR_MARKER: &str = "ERROR:";

pub const SKETCH: &str = "You are an AI that interprets user sketches. Analyze this sketch, which may be in color. First, identify the primary object. Then, generate a high-quality, 3D animated style, rendered image of that object on a clean, neutral background, taking into account the colors used in the sketch as a style reference. The final image should look like a frame from an animation. If you cannot clearly identify a single object in the sketch, respond with only the text 'ERROR: Could not identify the object in the sketch.' and nothing else.";

pub const ENHANCE_EDIT: &str = "You are an AI assistant for refining image editing prompts. Rewrite the user's instructions to be clearer for the AI, focusing on style and specific changes. **Crucially, you must preserve the subject and composition of the original image.** Your goal is to enhance the user's *edit request*, not to invent a new scene. For example, if the user says 'make the sky a sunset', you could suggest 'transform the sky into a vibrant sunset with warm orange and purple hues'. Do not add new elements. Return only the enhanced prompt itself.";

pub const ENHANCE_GENERATE: &str = "You are a creative assistant who specializes in writing prompts for AI image generators. Based on the user's input, rewrite and expand the prompt to be more descriptive and detailed. Add concepts related to style (e.g., photorealistic, impressionistic, cinematic), composition, lighting, and mood to create a more visually compelling and artistic result. Return only the enhanced prompt itself, without any introductory text or explanation.";

/// Instruction for an image transform, or `None` when the task is not a transform
pub fn transform_instruction(task: TaskKind, prompt: Option<&str>, has_mask: bool) -> Option<String> {
    match task {
        TaskKind::Edit => prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
        TaskKind::Upscale => Some(UPSCALE.to_string()),
        TaskKind::Repair => Some(REPAIR.to_string()),
        TaskKind::Watermark if has_mask => Some(WATERMARK_WITH_MASK.to_string()),
        TaskKind::Watermark => Some(WATERMARK_WITHOUT_MASK.to_string()),
        TaskKind::Generate | TaskKind::SketchToImage | TaskKind::Describe => None,
    }
}

pub fn enhance_instruction(category: PromptCategory) -> &'static str {
    match category {
        PromptCategory::Edit => ENHANCE_EDIT,
        PromptCategory::Generate => ENHANCE_GENERATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_requires_prompt() {
        assert_eq!(transform_instruction(TaskKind::Edit, None, false), None);
        assert_eq!(transform_instruction(TaskKind::Edit, Some("   "), false), None);
        assert_eq!(
            transform_instruction(TaskKind::Edit, Some("make it blue"), false).as_deref(),
            Some("make it blue")
        );
    }

    #[test]
    fn test_watermark_instruction_depends_on_mask() {
        assert_eq!(
            transform_instruction(TaskKind::Watermark, None, true).as_deref(),
            Some(WATERMARK_WITH_MASK)
        );
        assert_eq!(
            transform_instruction(TaskKind::Watermark, None, false).as_deref(),
            Some(WATERMARK_WITHOUT_MASK)
        );
    }

    #[test]
    fn test_non_transform_tasks() {
        assert!(transform_instruction(TaskKind::Generate, Some("x"), false).is_none());
        assert!(transform_instruction(TaskKind::Describe, None, false).is_none());
    }
}
