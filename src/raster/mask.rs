// Mask synthesis
// Painted strokes -> blurred alpha -> hard binary stencil

use super::canvas::StrokeFinalizer;
use super::Result;
use image::{GrayImage, Rgba, RgbaImage};
use imagent::EncodedImage;
use rayon::prelude::*;

/// Alpha above this survives as mask (50% opacity)
pub const ALPHA_THRESHOLD: u8 = 128;

const MASK_ON: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MASK_OFF: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Blur radius in pixels for a mask of the given size
pub fn blur_radius(width: u32, height: u32) -> u32 {
    let scaled = (width.min(height) as f32 / 250.0).round() as u32;
    scaled.max(4)
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|v| *v *= inv);
    kernel
}

/// Separable Gaussian blur of the alpha channel, parallel by row.
/// Pixels outside the bitmap count as fully transparent.
pub fn blur_alpha(src: &RgbaImage, sigma: f32) -> GrayImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return GrayImage::new(src.width(), src.height());
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let alpha: Vec<f32> = src.pixels().map(|p| p[3] as f32).collect();

    // Horizontal pass
    let mut buf_h = vec![0.0f32; w * h];
    buf_h.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &alpha[y * w..(y + 1) * w];
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = x as isize + ki as isize - radius as isize;
                if sx >= 0 && (sx as usize) < w {
                    acc += row_in[sx as usize] * kv;
                }
            }
            *out = acc;
        }
    });

    // Vertical pass
    let mut buf_v = vec![0.0f32; w * h];
    buf_v.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = y as isize + ki as isize - radius as isize;
                if sy >= 0 && (sy as usize) < h {
                    acc += buf_h[sy as usize * w + x] * kv;
                }
            }
            *out = acc;
        }
    });

    let raw: Vec<u8> = buf_v.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        image::Luma([raw[y as usize * w + x as usize]])
    })
}

/// Alpha above the threshold becomes opaque white, everything else opaque black
pub fn threshold(alpha: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(alpha.width(), alpha.height(), |x, y| {
        if alpha.get_pixel(x, y)[0] > ALPHA_THRESHOLD {
            MASK_ON
        } else {
            MASK_OFF
        }
    })
}

/// Full pipeline: blur scaled to the bitmap size, then threshold.
///
/// Returns `None` when no pixel survives, so an untouched or fully erased
/// stroke buffer never turns into an all-black mask.
pub fn synthesize(strokes: &RgbaImage) -> Option<RgbaImage> {
    if strokes.pixels().all(|p| p[3] == 0) {
        return None;
    }
    let radius = blur_radius(strokes.width(), strokes.height());
    let blurred = blur_alpha(strokes, radius as f32);
    let mask = threshold(&blurred);
    if mask.pixels().any(|p| *p == MASK_ON) {
        Some(mask)
    } else {
        tracing::debug!("Strokes too thin to survive thresholding, no mask produced");
        None
    }
}

/// Stroke finalizer that turns painted strokes into a PNG mask
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskSynthesizer;

impl StrokeFinalizer for MaskSynthesizer {
    fn finalize(&self, bitmap: &RgbaImage) -> Result<Option<EncodedImage>> {
        match synthesize(bitmap) {
            Some(mask) => Ok(Some(EncodedImage::encode_png(&mask)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painted_square(size: u32, from: u32, to: u32, alpha: u8) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (from..to).contains(&x) && (from..to).contains(&y) {
                Rgba([239, 68, 68, alpha])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_blur_radius_scales_with_size() {
        assert_eq!(blur_radius(100, 100), 4);
        assert_eq!(blur_radius(1000, 4000), 4);
        assert_eq!(blur_radius(2000, 3000), 8);
        assert_eq!(blur_radius(3000, 1375), 6);
    }

    #[test]
    fn test_kernel_normalized() {
        let kernel = build_gaussian_kernel(4.0);
        assert_eq!(kernel.len(), 25);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_buffer_yields_no_mask() {
        assert!(synthesize(&RgbaImage::new(64, 64)).is_none());
    }

    #[test]
    fn test_output_is_binary_and_opaque() {
        let strokes = painted_square(64, 16, 48, 255);
        let mask = synthesize(&strokes).unwrap();
        assert_eq!(mask.dimensions(), (64, 64));
        assert!(mask.pixels().all(|p| *p == MASK_ON || *p == MASK_OFF));
        assert_eq!(*mask.get_pixel(32, 32), MASK_ON);
        assert_eq!(*mask.get_pixel(2, 2), MASK_OFF);
    }

    #[test]
    fn test_translucent_strokes_survive() {
        // The painter's own color is 60% opaque
        let strokes = painted_square(64, 8, 56, 153);
        let mask = synthesize(&strokes).unwrap();
        assert_eq!(*mask.get_pixel(32, 32), MASK_ON);
    }

    #[test]
    fn test_tiny_speck_is_dropped() {
        let strokes = painted_square(64, 30, 31, 255);
        assert!(synthesize(&strokes).is_none());
    }

    #[test]
    fn test_finalizer_encodes_png() {
        let strokes = painted_square(32, 4, 28, 255);
        let out = MaskSynthesizer.finalize(&strokes).unwrap().unwrap();
        assert_eq!(out.mime_type(), "image/png");
        let decoded = out.decode().unwrap();
        assert!(decoded.pixels().all(|p| p[3] == 255));
    }
}
