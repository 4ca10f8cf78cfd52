// imagent - AI image inference capability
// Provides the interface the studio orchestrator uses to reach a generative image/vision service

mod gemini;
mod placeholder;
pub mod prompts;

pub mod error;

pub use error::{InferenceError, Result};
pub use gemini::{GeminiClient, GeminiConfig};
pub use placeholder::PlaceholderBackend;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// The kinds of work the studio can ask for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[default]
    Generate,
    SketchToImage,
    Describe,
    Edit,
    Upscale,
    Repair,
    Watermark,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Generate => "Generate",
            TaskKind::SketchToImage => "Sketch to Image",
            TaskKind::Describe => "Describe",
            TaskKind::Edit => "Edit",
            TaskKind::Upscale => "Upscale",
            TaskKind::Repair => "Repair",
            TaskKind::Watermark => "Watermark",
        }
    }

    pub fn all() -> &'static [TaskKind] {
        &[
            TaskKind::Generate,
            TaskKind::SketchToImage,
            TaskKind::Describe,
            TaskKind::Edit,
            TaskKind::Upscale,
            TaskKind::Repair,
            TaskKind::Watermark,
        ]
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which instruction set to use when rewriting a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptCategory {
    Generate,
    Edit,
}

/// An encoded image blob (PNG, JPEG, ...) with its mime type.
///
/// Bytes are shared, so clones are cheap and `same_blob` can tell whether two
/// values are literally the same upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Encode an RGBA buffer in the given format
    pub fn encode(image: &image::RgbaImage, format: image::ImageFormat) -> Result<Self> {
        let mut out = Cursor::new(Vec::new());
        match format {
            // JPEG has no alpha channel
            image::ImageFormat::Jpeg => {
                image::DynamicImage::ImageRgba8(image.clone())
                    .to_rgb8()
                    .write_to(&mut out, format)?;
            }
            _ => image.write_to(&mut out, format)?,
        }
        Ok(Self::new(out.into_inner(), format.to_mime_type()))
    }

    /// Encode as PNG
    pub fn encode_png(image: &image::RgbaImage) -> Result<Self> {
        Self::encode(image, image::ImageFormat::Png)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when both values share the same underlying buffer
    pub fn same_blob(&self, other: &EncodedImage) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Image format named by the mime type, falling back to content sniffing
    pub fn format(&self) -> Option<image::ImageFormat> {
        image::ImageFormat::from_mime_type(&self.mime_type)
            .or_else(|| image::guess_format(&self.bytes).ok())
    }

    /// Decode to an RGBA buffer
    pub fn decode(&self) -> Result<image::RgbaImage> {
        let img = match self.format() {
            Some(format) => image::load_from_memory_with_format(&self.bytes, format)?,
            None => image::load_from_memory(&self.bytes)?,
        };
        Ok(img.to_rgba8())
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Image result as it travels over the wire: base64 text plus mime type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Re-encode a local blob into the transport format
    pub fn from_image(image: &EncodedImage) -> Self {
        Self::new(image.mime_type(), image.to_base64())
    }

    /// Decode the payload into a displayable blob
    pub fn decode(&self) -> Result<EncodedImage> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(self.data.trim())?;
        if bytes.is_empty() {
            return Err(InferenceError::EmptyResult);
        }
        let mime_type = if self.mime_type.is_empty() {
            "image/jpeg".to_string()
        } else {
            self.mime_type.clone()
        };
        Ok(EncodedImage::new(bytes, mime_type))
    }
}

/// Trait for remote (or local) inference backends
#[async_trait]
pub trait InferenceCapability: Send + Sync {
    /// Generate a new image from a text prompt
    async fn text_to_image(&self, prompt: &str) -> Result<ImagePayload>;

    /// Transform an image; `mask` is only consulted for watermark removal
    async fn image_to_image(
        &self,
        task: TaskKind,
        image: &EncodedImage,
        prompt: Option<&str>,
        mask: Option<&EncodedImage>,
    ) -> Result<ImagePayload>;

    /// Render the object drawn in a sketch
    async fn sketch_to_image(&self, sketch: &EncodedImage) -> Result<ImagePayload>;

    /// Describe an image in prose
    async fn describe_image(&self, image: &EncodedImage) -> Result<String>;

    /// Rewrite a prompt to be more descriptive. Blank input comes back unchanged.
    async fn enhance_prompt(&self, text: &str, category: PromptCategory) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> image::RgbaImage {
        image::RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn test_png_encode_decode_preserves_pixels() {
        let img = checker(4, 3);
        let encoded = EncodedImage::encode_png(&img).unwrap();
        assert_eq!(encoded.mime_type(), "image/png");
        assert_eq!(encoded.decode().unwrap(), img);
    }

    #[test]
    fn test_payload_roundtrip_through_transport() {
        let encoded = EncodedImage::encode_png(&checker(2, 2)).unwrap();
        let payload = ImagePayload::from_image(&encoded);
        let back = payload.decode().unwrap();
        assert_eq!(back.bytes(), encoded.bytes());
        assert!(!back.same_blob(&encoded));
    }

    #[test]
    fn test_payload_rejects_garbage() {
        let payload = ImagePayload::new("image/png", "%%% not base64");
        assert!(matches!(payload.decode(), Err(InferenceError::Decode(_))));
        let empty = ImagePayload::new("image/png", "");
        assert_eq!(empty.decode(), Err(InferenceError::EmptyResult));
    }

    #[test]
    fn test_task_names() {
        assert_eq!(TaskKind::SketchToImage.to_string(), "Sketch to Image");
        assert_eq!(TaskKind::all().len(), 7);
    }
}
