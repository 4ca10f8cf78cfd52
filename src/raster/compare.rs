// Before/after comparator
// Reveal slider over two co-registered images, with viewport-wide drag capture

use super::coords::{DisplayRect, PointerInput};
use super::{RasterError, Result};
use image::RgbaImage;

/// Host hook that installs/removes viewport-wide move and release listeners
pub trait ViewportListeners {
    fn install(&mut self);
    fn remove(&mut self);
}

/// Listeners for hosts that route every pointer event to the widget anyway
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListeners;

impl ViewportListeners for NoopListeners {
    fn install(&mut self) {}
    fn remove(&mut self) {}
}

/// Scoped gesture tracking: listeners live exactly while a gesture is active
/// and are removed on release or when the owner is dropped.
pub struct GestureCapture<L: ViewportListeners> {
    listeners: L,
    active: bool,
}

impl<L: ViewportListeners> GestureCapture<L> {
    pub fn new(listeners: L) -> Self {
        Self {
            listeners,
            active: false,
        }
    }

    pub fn begin(&mut self) {
        if !self.active {
            self.listeners.install();
            self.active = true;
        }
    }

    pub fn end(&mut self) {
        if self.active {
            self.listeners.remove();
            self.active = false;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<L: ViewportListeners> Drop for GestureCapture<L> {
    fn drop(&mut self) {
        self.end();
    }
}

/// Default reveal position, in percent of container width
pub const DEFAULT_POSITION: f32 = 50.0;

/// Slider state for a before/after view. The processed image is shown left
/// of the boundary, the original to the right.
pub struct Comparator<L: ViewportListeners = NoopListeners> {
    position: f32,
    container: DisplayRect,
    capture: GestureCapture<L>,
}

impl Comparator<NoopListeners> {
    pub fn new(container: DisplayRect) -> Self {
        Self::with_listeners(container, NoopListeners)
    }
}

impl<L: ViewportListeners> Comparator<L> {
    pub fn with_listeners(container: DisplayRect, listeners: L) -> Self {
        Self {
            position: DEFAULT_POSITION,
            container,
            capture: GestureCapture::new(listeners),
        }
    }

    /// Slider position in [0, 100]
    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn is_dragging(&self) -> bool {
        self.capture.is_active()
    }

    pub fn set_container(&mut self, container: DisplayRect) {
        self.container = container;
    }

    pub fn pointer_down(&mut self) {
        self.capture.begin();
    }

    /// Track the pointer anywhere in the viewport while dragging
    pub fn pointer_move(&mut self, input: &PointerInput) {
        if !self.capture.is_active() || self.container.width <= 0.0 {
            return;
        }
        let Some(client) = input.client_point() else {
            return;
        };
        let x = client.x - self.container.left;
        let pct = x / self.container.width * 100.0;
        if pct.is_finite() {
            self.position = pct.clamp(0.0, 100.0);
        }
    }

    pub fn pointer_up(&mut self) {
        self.capture.end();
    }

    /// Composite both images at the current boundary
    pub fn compose(&self, original: &RgbaImage, processed: &RgbaImage) -> Result<RgbaImage> {
        if original.dimensions() != processed.dimensions() {
            let (ow, oh) = original.dimensions();
            let (pw, ph) = processed.dimensions();
            return Err(RasterError::DimensionMismatch(ow, oh, pw, ph));
        }
        let boundary = (original.width() as f32 * self.position / 100.0).round() as u32;
        Ok(RgbaImage::from_fn(original.width(), original.height(), |x, y| {
            if x < boundary {
                *processed.get_pixel(x, y)
            } else {
                *original.get_pixel(x, y)
            }
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering};
    use std::sync::Arc;

    /// Tracks how many listener sets are installed right now
    #[derive(Clone, Default)]
    pub(crate) struct CountingListeners {
        pub(crate) installed: Arc<AtomicIsize>,
    }

    impl ViewportListeners for CountingListeners {
        fn install(&mut self) {
            self.installed.fetch_add(1, Ordering::SeqCst);
        }
        fn remove(&mut self) {
            self.installed.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_position_clamped_for_any_x() {
        let mut cmp = Comparator::new(DisplayRect::new(100.0, 0.0, 200.0, 100.0));
        assert_eq!(cmp.position(), 50.0);
        cmp.pointer_down();
        for (x, expected) in [
            (150.0, 25.0),
            (-5000.0, 0.0),
            (99.0, 0.0),
            (300.0, 100.0),
            (1e9, 100.0),
            (200.0, 50.0),
        ] {
            cmp.pointer_move(&PointerInput::mouse(x, 10.0));
            assert_eq!(cmp.position(), expected, "x = {}", x);
        }
    }

    #[test]
    fn test_moves_ignored_without_drag() {
        let mut cmp = Comparator::new(DisplayRect::new(0.0, 0.0, 100.0, 100.0));
        cmp.pointer_move(&PointerInput::mouse(10.0, 10.0));
        assert_eq!(cmp.position(), 50.0);
        cmp.pointer_down();
        cmp.pointer_move(&PointerInput::touch(10.0, 10.0));
        cmp.pointer_up();
        cmp.pointer_move(&PointerInput::mouse(90.0, 10.0));
        assert_eq!(cmp.position(), 10.0);
    }

    #[test]
    fn test_listeners_installed_only_during_gesture() {
        let listeners = CountingListeners::default();
        let count = listeners.installed.clone();
        {
            let mut cmp = Comparator::with_listeners(DisplayRect::new(0.0, 0.0, 10.0, 10.0), listeners);
            assert_eq!(count.load(Ordering::SeqCst), 0);
            cmp.pointer_down();
            cmp.pointer_down();
            assert_eq!(count.load(Ordering::SeqCst), 1);
            cmp.pointer_up();
            assert_eq!(count.load(Ordering::SeqCst), 0);
            cmp.pointer_up();
            assert_eq!(count.load(Ordering::SeqCst), 0);
            // Torn down mid-gesture
            cmp.pointer_down();
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compose_splits_at_boundary() {
        let original = RgbaImage::from_pixel(10, 2, image::Rgba([0, 0, 0, 255]));
        let processed = RgbaImage::from_pixel(10, 2, image::Rgba([255, 255, 255, 255]));
        let mut cmp = Comparator::new(DisplayRect::new(0.0, 0.0, 100.0, 10.0));
        cmp.pointer_down();
        cmp.pointer_move(&PointerInput::mouse(30.0, 0.0));
        let out = cmp.compose(&original, &processed).unwrap();
        assert_eq!(out.get_pixel(2, 0)[0], 255);
        assert_eq!(out.get_pixel(3, 0)[0], 0);

        let small = RgbaImage::new(5, 2);
        assert!(matches!(
            cmp.compose(&original, &small),
            Err(RasterError::DimensionMismatch(10, 2, 5, 2))
        ));
    }
}
