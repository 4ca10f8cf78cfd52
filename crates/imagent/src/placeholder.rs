// Offline placeholder backend
// Produces gradient images and canned text so the studio can run without network access

use crate::{
    EncodedImage, ImagePayload, InferenceCapability, InferenceError, PromptCategory, Result,
    TaskKind,
};
use async_trait::async_trait;
use rand::Rng;

/// Placeholder inference backend
pub struct PlaceholderBackend {
    size: u32,
    seed: Option<u64>,
}

impl PlaceholderBackend {
    /// Create a placeholder backend producing square images of `size` pixels
    pub fn new(size: u32) -> Self {
        Self { size, seed: None }
    }

    /// Fix the tint so output is reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn gradient(&self, tint: u8) -> Result<ImagePayload> {
        let seed = self.seed.unwrap_or_else(rand::random);
        tracing::info!("Placeholder render (seed {})", seed);

        let mut rng = rand::thread_rng();
        let size = self.size.max(1);
        let img = image::RgbaImage::from_fn(size, size, |x, y| {
            let r = ((x as f32 / size as f32) * 255.0) as u8;
            let g = ((y as f32 / size as f32) * 255.0) as u8;
            let noise: u8 = if self.seed.is_some() { 0 } else { rng.gen_range(0..16) };
            let b = tint.wrapping_add((seed % 64) as u8).saturating_add(noise);
            image::Rgba([r, g, b, 255])
        });
        let encoded = EncodedImage::encode(&img, image::ImageFormat::Jpeg)?;
        Ok(ImagePayload::from_image(&encoded))
    }
}

impl Default for PlaceholderBackend {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl InferenceCapability for PlaceholderBackend {
    async fn text_to_image(&self, prompt: &str) -> Result<ImagePayload> {
        tracing::warn!("Using placeholder backend - generating gradient for {:?}", prompt);
        self.gradient(100)
    }

    async fn image_to_image(
        &self,
        task: TaskKind,
        image: &EncodedImage,
        prompt: Option<&str>,
        mask: Option<&EncodedImage>,
    ) -> Result<ImagePayload> {
        let has_mask = task == TaskKind::Watermark && mask.is_some();
        if crate::prompts::transform_instruction(task, prompt, has_mask).is_none() {
            return Err(InferenceError::UnsupportedTask(task));
        }
        // Echo the source back so downstream code sees a real image
        let source = image.decode()?;
        let encoded = EncodedImage::encode(&source, image::ImageFormat::Jpeg)?;
        Ok(ImagePayload::from_image(&encoded))
    }

    async fn sketch_to_image(&self, _sketch: &EncodedImage) -> Result<ImagePayload> {
        self.gradient(180)
    }

    async fn describe_image(&self, image: &EncodedImage) -> Result<String> {
        let decoded = image.decode()?;
        Ok(format!(
            "A {}x{} {} image (placeholder description).",
            decoded.width(),
            decoded.height(),
            image.mime_type()
        ))
    }

    async fn enhance_prompt(&self, text: &str, category: PromptCategory) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let suffix = match category {
            PromptCategory::Generate => "cinematic lighting, highly detailed",
            PromptCategory::Edit => "preserving the original subject and composition",
        };
        Ok(format!("{}, {}", text.trim(), suffix))
    }
}
