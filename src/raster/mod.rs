// Client-side raster pipeline
// Freehand canvas, mask synthesis, crop, compare and filter tools

pub mod canvas;
pub mod compare;
pub mod coords;
pub mod crop;
pub mod filter;
pub mod mask;

pub use canvas::{Backdrop, CanvasOutput, FreehandCanvas, MaskPainter, SketchPad, StrokeFinalizer, StrokeMode};
pub use compare::{Comparator, GestureCapture, NoopListeners, ViewportListeners};
pub use coords::{DisplayRect, Point, PointerInput};
pub use crop::{CropRegion, CropTool, DragKind, SourceRect, crop_source};
pub use filter::{AdjustmentTriple, apply_adjustments};
pub use mask::MaskSynthesizer;

use thiserror::Error;

/// Errors from raster operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("Image codec error: {0}")]
    Codec(String),

    #[error("Crop region lies outside the image")]
    EmptyCrop,

    #[error("Crop {width}x{height} at ({x}, {y}) exceeds the {image_width}x{image_height} image")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Image dimensions do not match: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(u32, u32, u32, u32),
}

impl From<imagent::InferenceError> for RasterError {
    fn from(err: imagent::InferenceError) -> Self {
        RasterError::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RasterError>;
