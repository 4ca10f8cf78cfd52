// Interactive crop tool
// Draggable/resizable region over a centered, scaled rendering of the source image

use super::compare::{GestureCapture, NoopListeners, ViewportListeners};
use super::coords::{DisplayRect, Point, PointerInput};
use super::{RasterError, Result};
use image::RgbaImage;
use imagent::EncodedImage;

/// Smallest width/height a crop region can be dragged to
pub const MIN_CROP_SIZE: f32 = 50.0;
/// Handle hit-test tolerance around each corner
pub const HANDLE_TOLERANCE: f32 = 12.0;
/// Drawn handle edge length
pub const HANDLE_SIZE: f32 = 10.0;
/// Fraction of the viewport the rendered image occupies
pub const DISPLAY_FILL: f32 = 0.9;
/// Fraction of the viewport the initial region occupies
pub const INITIAL_FILL: f32 = 0.7;

/// Rectangle in display-canvas pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Corner positions as (kind, point), in hit-test priority order
    pub fn handles(&self) -> [(DragKind, Point); 4] {
        [
            (DragKind::TopLeft, Point::new(self.x, self.y)),
            (DragKind::TopRight, Point::new(self.right(), self.y)),
            (DragKind::BottomLeft, Point::new(self.x, self.bottom())),
            (DragKind::BottomRight, Point::new(self.right(), self.bottom())),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragKind {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Move,
    None,
}

impl DragKind {
    /// Cursor name to show while hovering this part of the region
    pub fn cursor(&self) -> &'static str {
        match self {
            DragKind::TopLeft | DragKind::BottomRight => "nwse-resize",
            DragKind::TopRight | DragKind::BottomLeft => "nesw-resize",
            DragKind::Move => "move",
            DragKind::None => "default",
        }
    }
}

/// Pixel rectangle in source-image space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Scale and offset of an image fitted, centered, into a viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Layout {
    pub fn fit(viewport: (f32, f32), image: (u32, u32), fill: f32) -> Self {
        let (iw, ih) = (image.0.max(1) as f32, image.1.max(1) as f32);
        let scale = (viewport.0 / iw).min(viewport.1 / ih) * fill;
        Self {
            scale,
            offset_x: (viewport.0 - iw * scale) / 2.0,
            offset_y: (viewport.1 - ih * scale) / 2.0,
        }
    }

    /// On-screen rectangle of the whole image
    pub fn image_rect(&self, image: (u32, u32)) -> CropRegion {
        CropRegion::new(
            self.offset_x,
            self.offset_y,
            image.0 as f32 * self.scale,
            image.1 as f32 * self.scale,
        )
    }
}

/// Apply a drag delta to the pre-drag snapshot.
///
/// Width and height never end below `MIN_CROP_SIZE`; when clamped, the edge
/// opposite the dragged corner stays where it was.
pub fn apply_drag(kind: DragKind, start: CropRegion, dx: f32, dy: f32) -> CropRegion {
    let mut r = start;
    match kind {
        DragKind::Move => {
            r.x += dx;
            r.y += dy;
            return r;
        }
        DragKind::TopLeft => {
            r.x += dx;
            r.y += dy;
            r.width -= dx;
            r.height -= dy;
        }
        DragKind::TopRight => {
            r.y += dy;
            r.width += dx;
            r.height -= dy;
        }
        DragKind::BottomLeft => {
            r.x += dx;
            r.width -= dx;
            r.height += dy;
        }
        DragKind::BottomRight => {
            r.width += dx;
            r.height += dy;
        }
        DragKind::None => return r,
    }

    // NaN deltas also land here
    if r.width.is_nan() || r.width < MIN_CROP_SIZE {
        r.width = MIN_CROP_SIZE;
        r.x = match kind {
            DragKind::TopLeft | DragKind::BottomLeft => start.right() - MIN_CROP_SIZE,
            _ => start.x,
        };
    }
    if r.height.is_nan() || r.height < MIN_CROP_SIZE {
        r.height = MIN_CROP_SIZE;
        r.y = match kind {
            DragKind::TopLeft | DragKind::TopRight => start.bottom() - MIN_CROP_SIZE,
            _ => start.y,
        };
    }
    r
}

struct DragState {
    kind: DragKind,
    start: Point,
    snapshot: CropRegion,
}

/// Crop tool filling a viewport-sized canvas
pub struct CropTool<L: ViewportListeners = NoopListeners> {
    image_size: (u32, u32),
    viewport: (f32, f32),
    layout: Layout,
    region: CropRegion,
    drag: Option<DragState>,
    capture: GestureCapture<L>,
}

impl CropTool<NoopListeners> {
    pub fn new(image_size: (u32, u32), viewport: (f32, f32)) -> Self {
        Self::with_listeners(image_size, viewport, NoopListeners)
    }
}

impl<L: ViewportListeners> CropTool<L> {
    pub fn with_listeners(image_size: (u32, u32), viewport: (f32, f32), listeners: L) -> Self {
        let initial = Layout::fit(viewport, image_size, INITIAL_FILL).image_rect(image_size);
        let region = CropRegion::new(
            initial.x,
            initial.y,
            initial.width.max(MIN_CROP_SIZE),
            initial.height.max(MIN_CROP_SIZE),
        );
        Self {
            image_size,
            viewport,
            layout: Layout::fit(viewport, image_size, DISPLAY_FILL),
            region,
            drag: None,
            capture: GestureCapture::new(listeners),
        }
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    pub fn viewport(&self) -> (f32, f32) {
        self.viewport
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Recompute the image layout for a new viewport size. The region keeps
    /// its display coordinates.
    pub fn resize(&mut self, viewport: (f32, f32)) {
        self.viewport = viewport;
        self.layout = Layout::fit(viewport, self.image_size, DISPLAY_FILL);
    }

    /// What a pointer at canvas-local `p` would grab
    pub fn hit_test(&self, p: Point) -> DragKind {
        let t = HANDLE_TOLERANCE;
        for (kind, corner) in self.region.handles() {
            if p.x > corner.x - t && p.x < corner.x + t && p.y > corner.y - t && p.y < corner.y + t {
                return kind;
            }
        }
        let r = &self.region;
        if p.x > r.x && p.x < r.right() && p.y > r.y && p.y < r.bottom() {
            return DragKind::Move;
        }
        DragKind::None
    }

    /// Hover cursor, frozen while a drag is in progress
    pub fn cursor(&self, p: Point) -> Option<&'static str> {
        if self.drag.is_some() {
            return None;
        }
        Some(self.hit_test(p).cursor())
    }

    /// Start a drag if the pointer is on a handle or inside the region
    pub fn pointer_down(&mut self, input: &PointerInput, canvas: DisplayRect) -> DragKind {
        let Some(client) = input.client_point() else {
            return DragKind::None;
        };
        let kind = self.hit_test(canvas.to_local(client));
        if kind != DragKind::None {
            self.drag = Some(DragState {
                kind,
                start: client,
                snapshot: self.region,
            });
            self.capture.begin();
        }
        kind
    }

    pub fn pointer_move(&mut self, input: &PointerInput) {
        let Some(drag) = &self.drag else {
            return;
        };
        let Some(client) = input.client_point() else {
            return;
        };
        self.region = apply_drag(
            drag.kind,
            drag.snapshot,
            client.x - drag.start.x,
            client.y - drag.start.y,
        );
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
        self.capture.end();
    }

    /// Back-project the region into source pixels, clipped to the image
    pub fn source_rect(&self) -> Option<SourceRect> {
        let scale = self.layout.scale;
        if scale.is_nan() || scale <= 0.0 {
            return None;
        }
        let (iw, ih) = (self.image_size.0 as f32, self.image_size.1 as f32);
        let x0 = ((self.region.x - self.layout.offset_x) / scale).clamp(0.0, iw).round();
        let y0 = ((self.region.y - self.layout.offset_y) / scale).clamp(0.0, ih).round();
        let x1 = ((self.region.right() - self.layout.offset_x) / scale).clamp(0.0, iw).round();
        let y1 = ((self.region.bottom() - self.layout.offset_y) / scale).clamp(0.0, ih).round();
        if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
            return None;
        }
        Some(SourceRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    /// Produce the cropped image as PNG
    pub fn confirm(&self, source: &RgbaImage) -> Result<EncodedImage> {
        if source.dimensions() != self.image_size {
            let (w, h) = source.dimensions();
            return Err(RasterError::DimensionMismatch(
                self.image_size.0,
                self.image_size.1,
                w,
                h,
            ));
        }
        let rect = self.source_rect().ok_or(RasterError::EmptyCrop)?;
        tracing::debug!("Cropping to {:?}", rect);
        let cropped = image::imageops::crop_imm(source, rect.x, rect.y, rect.width, rect.height).to_image();
        Ok(EncodedImage::encode_png(&cropped)?)
    }
}

/// Crop a rectangle given directly in source pixels.
///
/// The rectangle is taken as-is: no minimum size and no clipping. Anything
/// not fully inside the image is rejected.
pub fn crop_source(source: &RgbaImage, rect: SourceRect) -> Result<EncodedImage> {
    let (iw, ih) = source.dimensions();
    if rect.width == 0 || rect.height == 0 {
        return Err(RasterError::EmptyCrop);
    }
    let fits = rect.x.checked_add(rect.width).is_some_and(|right| right <= iw)
        && rect.y.checked_add(rect.height).is_some_and(|bottom| bottom <= ih);
    if !fits {
        return Err(RasterError::CropOutOfBounds {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            image_width: iw,
            image_height: ih,
        });
    }
    let cropped = image::imageops::crop_imm(source, rect.x, rect.y, rect.width, rect.height).to_image();
    Ok(EncodedImage::encode_png(&cropped)?)
}
