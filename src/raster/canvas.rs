// Freehand raster canvas
// Shared stroke engine behind the sketch pad and the mask painter

use super::coords::{DisplayRect, Point, PointerInput};
use super::mask::MaskSynthesizer;
use super::Result;
use image::{Rgba, RgbaImage};
use imagent::EncodedImage;
use std::ops::RangeInclusive;

pub const SKETCH_SIZE: u32 = 512;
pub const SKETCH_BRUSH_SIZE: f32 = 10.0;
pub const SKETCH_BRUSH_RANGE: RangeInclusive<f32> = 2.0..=50.0;
pub const SKETCH_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub const MASK_BRUSH_SIZE: f32 = 30.0;
pub const MASK_BRUSH_RANGE: RangeInclusive<f32> = 5.0..=100.0;
/// Translucent red used to paint mask strokes
pub const MASK_COLOR: Rgba<u8> = Rgba([239, 68, 68, 153]);

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokeMode {
    #[default]
    Draw,
    Erase,
}

/// Initial content of the bitmap, also what erasing restores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backdrop {
    Transparent,
    Solid(Rgba<u8>),
}

impl Backdrop {
    fn pixel(&self) -> Rgba<u8> {
        match self {
            Backdrop::Transparent => TRANSPARENT,
            Backdrop::Solid(color) => *color,
        }
    }
}

/// What the canvas hands to its owner when a stroke ends or it is cleared
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOutput {
    Image(EncodedImage),
    /// Nothing usable is drawn
    Empty,
}

impl CanvasOutput {
    pub fn into_image(self) -> Option<EncodedImage> {
        match self {
            CanvasOutput::Image(image) => Some(image),
            CanvasOutput::Empty => None,
        }
    }
}

/// Turns the live bitmap into the encoded output emitted at stroke end
pub trait StrokeFinalizer {
    fn finalize(&self, bitmap: &RgbaImage) -> Result<Option<EncodedImage>>;
}

/// Emits the bitmap as-is, PNG encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct PngFinalizer;

impl StrokeFinalizer for PngFinalizer {
    fn finalize(&self, bitmap: &RgbaImage) -> Result<Option<EncodedImage>> {
        Ok(Some(EncodedImage::encode_png(bitmap)?))
    }
}

pub type SketchPad = FreehandCanvas<PngFinalizer>;
pub type MaskPainter = FreehandCanvas<MaskSynthesizer>;

/// A bitmap with draw/erase strokes driven by pointer events.
///
/// The bitmap has its own resolution; every event is rescaled from the
/// on-screen rect it was delivered in.
pub struct FreehandCanvas<F> {
    bitmap: RgbaImage,
    backdrop: Backdrop,
    color: Rgba<u8>,
    brush_size: f32,
    brush_range: RangeInclusive<f32>,
    mode: StrokeMode,
    disabled: bool,
    drawing: bool,
    has_drawing: bool,
    last: Option<Point>,
    // Pixels already touched by the current stroke
    covered: Vec<bool>,
    finalizer: F,
}

impl FreehandCanvas<PngFinalizer> {
    /// 512x512 white sketch pad with a black brush; erasing paints white
    pub fn sketch_pad() -> Self {
        Self::new(
            SKETCH_SIZE,
            SKETCH_SIZE,
            Backdrop::Solid(WHITE),
            SKETCH_COLOR,
            SKETCH_BRUSH_SIZE,
            SKETCH_BRUSH_RANGE,
            PngFinalizer,
        )
    }
}

impl FreehandCanvas<MaskSynthesizer> {
    /// Transparent painter at the image's natural size; strokes are synthesized into a binary mask
    pub fn mask_painter(width: u32, height: u32) -> Self {
        Self::new(
            width,
            height,
            Backdrop::Transparent,
            MASK_COLOR,
            MASK_BRUSH_SIZE,
            MASK_BRUSH_RANGE,
            MaskSynthesizer,
        )
    }
}

impl<F: StrokeFinalizer> FreehandCanvas<F> {
    pub fn new(
        width: u32,
        height: u32,
        backdrop: Backdrop,
        color: Rgba<u8>,
        brush_size: f32,
        brush_range: RangeInclusive<f32>,
        finalizer: F,
    ) -> Self {
        let brush_size = brush_size.clamp(*brush_range.start(), *brush_range.end());
        Self {
            bitmap: RgbaImage::from_pixel(width, height, backdrop.pixel()),
            backdrop,
            color,
            brush_size,
            brush_range,
            mode: StrokeMode::Draw,
            disabled: false,
            drawing: false,
            has_drawing: false,
            last: None,
            covered: vec![false; (width as usize) * (height as usize)],
            finalizer,
        }
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    pub fn has_drawing(&self) -> bool {
        self.has_drawing
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn mode(&self) -> StrokeMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StrokeMode) {
        self.mode = mode;
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    /// Set the brush diameter, clamped to the canvas's allowed range
    pub fn set_brush_size(&mut self, size: f32) {
        self.brush_size = size.clamp(*self.brush_range.start(), *self.brush_range.end());
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn set_color(&mut self, color: Rgba<u8>) {
        self.color = color;
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Reallocate the bitmap at a new resolution, discarding its content
    pub fn resize(&mut self, width: u32, height: u32) {
        self.bitmap = RgbaImage::from_pixel(width, height, self.backdrop.pixel());
        self.covered = vec![false; (width as usize) * (height as usize)];
        self.drawing = false;
        self.has_drawing = false;
        self.last = None;
    }

    pub fn pointer_down(&mut self, input: &PointerInput, rect: DisplayRect) {
        if self.disabled {
            return;
        }
        let Some(point) = self.locate(input, rect) else {
            return;
        };
        self.covered.iter_mut().for_each(|c| *c = false);
        self.drawing = true;
        self.has_drawing = true;
        self.last = Some(point);
    }

    pub fn pointer_move(&mut self, input: &PointerInput, rect: DisplayRect) {
        if !self.drawing || self.disabled {
            return;
        }
        let Some(point) = self.locate(input, rect) else {
            return;
        };
        let from = self.last.unwrap_or(point);
        self.stroke_segment(from, point);
        self.last = Some(point);
    }

    /// End the stroke (pointer up or leave). Emits the finalized output when
    /// a stroke was active and something has been drawn.
    pub fn pointer_up(&mut self) -> Result<Option<CanvasOutput>> {
        if !self.drawing {
            return Ok(None);
        }
        self.drawing = false;
        self.last = None;
        if !self.has_drawing {
            return Ok(None);
        }
        let output = match self.finalizer.finalize(&self.bitmap)? {
            Some(image) => CanvasOutput::Image(image),
            None => CanvasOutput::Empty,
        };
        tracing::debug!("Stroke finalized: {:?}", matches!(output, CanvasOutput::Image(_)));
        Ok(Some(output))
    }

    /// Reset to the initial backdrop
    pub fn clear(&mut self) -> CanvasOutput {
        let base = self.backdrop.pixel();
        self.bitmap.pixels_mut().for_each(|p| *p = base);
        self.drawing = false;
        self.has_drawing = false;
        self.last = None;
        CanvasOutput::Empty
    }

    fn locate(&self, input: &PointerInput, rect: DisplayRect) -> Option<Point> {
        let client = input.client_point()?;
        rect.to_internal(client, self.bitmap.dimensions())
    }

    /// Rasterize a round-capped segment. Each pixel is composited at most
    /// once per stroke so overlapping segments do not darken.
    fn stroke_segment(&mut self, from: Point, to: Point) {
        let (width, height) = self.bitmap.dimensions();
        if width == 0 || height == 0 {
            return;
        }
        let radius = self.brush_size / 2.0;
        let min_x = (from.x.min(to.x) - radius).floor().max(0.0) as u32;
        let min_y = (from.y.min(to.y) - radius).floor().max(0.0) as u32;
        let max_x = ((from.x.max(to.x) + radius).ceil().max(0.0) as u32).min(width - 1);
        let max_y = ((from.y.max(to.y) + radius).ceil().max(0.0) as u32).min(height - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let erase_to = self.backdrop.pixel();
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if distance_to_segment(center, from, to) > radius {
                    continue;
                }
                let idx = (y * width + x) as usize;
                if self.covered[idx] {
                    continue;
                }
                self.covered[idx] = true;
                let pixel = self.bitmap.get_pixel_mut(x, y);
                *pixel = match self.mode {
                    StrokeMode::Draw => source_over(self.color, *pixel),
                    StrokeMode::Erase => erase_to,
                };
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

/// Straight-alpha source-over compositing
fn source_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}
