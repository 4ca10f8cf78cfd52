// Dispatch planning
// Decides which external call an item needs, independent of how it is awaited

use super::types::{EditMode, TaskKind, WorkItem};
use crate::raster::AdjustmentTriple;
use imagent::EncodedImage;
use thiserror::Error;

/// A required input that is not there. Checked before anything is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputMissing {
    #[error("Please upload an image to process.")]
    Image,

    #[error("Please enter a prompt.")]
    Prompt,

    #[error("No sketch was provided.")]
    Sketch,

    #[error("Please paint over the area to remove.")]
    Mask,

    #[error("Choose Upscale or Repair to enhance the image.")]
    EnhanceChoice,
}

/// Auxiliary inputs collected by the studio besides the items themselves
#[derive(Debug, Clone, Copy)]
pub struct AuxInputs<'a> {
    pub prompt: &'a str,
    pub mask: Option<&'a EncodedImage>,
    pub sketch: Option<&'a EncodedImage>,
    pub adjustments: AdjustmentTriple,
}

/// Description of the single call an item needs
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalCall {
    TextToImage {
        prompt: String,
    },
    SketchToImage {
        sketch: EncodedImage,
    },
    DescribeImage {
        image: EncodedImage,
    },
    /// Filter pipeline only, no network
    LocalAdjust {
        image: EncodedImage,
        adjustments: AdjustmentTriple,
    },
    ImageToImage {
        task: TaskKind,
        image: EncodedImage,
        prompt: Option<String>,
        mask: Option<EncodedImage>,
    },
}

impl ExternalCall {
    pub fn is_network_backed(&self) -> bool {
        !matches!(self, ExternalCall::LocalAdjust { .. })
    }

    /// Human-readable progress label for item `index` (1-based) of `total`
    pub fn progress_label(&self, index: usize, total: usize) -> String {
        match self {
            ExternalCall::TextToImage { .. } => "Generating image...".to_string(),
            ExternalCall::SketchToImage { .. } => "Bringing sketch to life...".to_string(),
            ExternalCall::DescribeImage { .. } => {
                format!("Describing image {} of {}...", index, total)
            }
            ExternalCall::LocalAdjust { .. } => "Applying adjustments...".to_string(),
            ExternalCall::ImageToImage {
                task: TaskKind::Watermark,
                ..
            } => format!("Removing watermark {} of {}...", index, total),
            ExternalCall::ImageToImage { .. } => {
                format!("Processing image {} of {}...", index, total)
            }
        }
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn source(item: &WorkItem) -> Result<EncodedImage, InputMissing> {
    item.source.clone().ok_or(InputMissing::Image)
}

/// Pick the external call for one item under the effective task and edit mode
pub fn plan(
    item: &WorkItem,
    task: TaskKind,
    edit_mode: EditMode,
    aux: &AuxInputs<'_>,
) -> Result<ExternalCall, InputMissing> {
    match task {
        TaskKind::Generate => Ok(ExternalCall::TextToImage {
            prompt: non_blank(aux.prompt).ok_or(InputMissing::Prompt)?,
        }),
        TaskKind::SketchToImage => {
            let sketch = item
                .source
                .clone()
                .or_else(|| aux.sketch.cloned())
                .ok_or(InputMissing::Sketch)?;
            Ok(ExternalCall::SketchToImage { sketch })
        }
        TaskKind::Describe => Ok(ExternalCall::DescribeImage {
            image: source(item)?,
        }),
        TaskKind::Edit => match edit_mode {
            EditMode::Prompt => Ok(ExternalCall::ImageToImage {
                task: TaskKind::Edit,
                image: source(item)?,
                prompt: Some(non_blank(aux.prompt).ok_or(InputMissing::Prompt)?),
                mask: None,
            }),
            EditMode::Adjust => Ok(ExternalCall::LocalAdjust {
                image: source(item)?,
                adjustments: aux.adjustments,
            }),
            EditMode::Watermark => Ok(ExternalCall::ImageToImage {
                task: TaskKind::Watermark,
                image: source(item)?,
                prompt: None,
                mask: Some(aux.mask.cloned().ok_or(InputMissing::Mask)?),
            }),
            EditMode::Enhance => Err(InputMissing::EnhanceChoice),
        },
        TaskKind::Upscale | TaskKind::Repair => Ok(ExternalCall::ImageToImage {
            task,
            image: source(item)?,
            prompt: None,
            mask: None,
        }),
        TaskKind::Watermark => Ok(ExternalCall::ImageToImage {
            task,
            image: source(item)?,
            prompt: None,
            mask: aux.mask.cloned(),
        }),
    }
}
