// Client-side filter pipeline
// Brightness / contrast / saturation applied locally, re-encoded in the source format

use super::Result;
use imagent::EncodedImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Upper bound of every adjustment slider, in percent
pub const MAX_PERCENT: u16 = 200;

/// Brightness, contrast and saturation as percentages (100 = unchanged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjustmentTriple {
    pub brightness: u16,
    pub contrast: u16,
    pub saturation: u16,
}

impl Default for AdjustmentTriple {
    fn default() -> Self {
        Self {
            brightness: 100,
            contrast: 100,
            saturation: 100,
        }
    }
}

impl AdjustmentTriple {
    /// Build a triple, clamping each value to the slider range
    pub fn new(brightness: u16, contrast: u16, saturation: u16) -> Self {
        Self {
            brightness: brightness.min(MAX_PERCENT),
            contrast: contrast.min(MAX_PERCENT),
            saturation: saturation.min(MAX_PERCENT),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Filter one straight-alpha RGB pixel. Each stage clamps to [0, 1].
    fn apply_rgb(&self, rgb: [f32; 3]) -> [f32; 3] {
        let b = self.brightness as f32 / 100.0;
        let c = self.contrast as f32 / 100.0;
        let s = self.saturation as f32 / 100.0;

        let [r, g, bl] = rgb.map(|v| (v * b).clamp(0.0, 1.0));
        let [r, g, bl] = [r, g, bl].map(|v| ((v - 0.5) * c + 0.5).clamp(0.0, 1.0));

        // Rec. 709 luminance saturation matrix
        [
            (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * bl,
            (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * bl,
            (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * bl,
        ]
        .map(|v| v.clamp(0.0, 1.0))
    }
}

/// Apply adjustments to an encoded image.
///
/// The identity triple returns the input itself, no decode or recompression.
/// Otherwise the output keeps the source's format and natural dimensions.
pub fn apply_adjustments(source: &EncodedImage, adjustments: &AdjustmentTriple) -> Result<EncodedImage> {
    if adjustments.is_identity() {
        return Ok(source.clone());
    }

    let mut pixels = source.decode()?;
    let stride = pixels.width() as usize * 4;
    if stride > 0 {
        pixels.par_chunks_mut(stride).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                let rgb = [px[0], px[1], px[2]].map(|v| v as f32 / 255.0);
                let out = adjustments.apply_rgb(rgb);
                for (dst, v) in px.iter_mut().zip(out) {
                    *dst = (v * 255.0).round() as u8;
                }
            }
        });
    }

    let format = source.format().unwrap_or(image::ImageFormat::Png);
    tracing::debug!(
        "Adjusted {}x{} image ({:?}) with {:?}",
        pixels.width(),
        pixels.height(),
        format,
        adjustments
    );
    Ok(EncodedImage::encode(&pixels, format)?)
}
