// Pointer coordinate mapping
// Client (viewport) coordinates to canvas-internal pixel space

/// A point in some 2D pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// On-screen bounding box of a widget, in client coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Client point relative to the rect's top-left corner, unscaled
    pub fn to_local(&self, client: Point) -> Point {
        Point::new(client.x - self.left, client.y - self.top)
    }

    /// Client point mapped into a bitmap of `internal` size displayed in this rect.
    ///
    /// Returns `None` for a degenerate (zero-area) rect.
    pub fn to_internal(&self, client: Point, internal: (u32, u32)) -> Option<Point> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let scale_x = internal.0 as f32 / self.width;
        let scale_y = internal.1 as f32 / self.height;
        let local = self.to_local(client);
        Some(Point::new(local.x * scale_x, local.y * scale_y))
    }
}

/// A pointer event as delivered by the host, mouse or touch
#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Mouse { client_x: f32, client_y: f32 },
    /// Active touches; only the first one is tracked
    Touch(Vec<Point>),
}

impl PointerInput {
    pub fn mouse(client_x: f32, client_y: f32) -> Self {
        PointerInput::Mouse { client_x, client_y }
    }

    pub fn touch(client_x: f32, client_y: f32) -> Self {
        PointerInput::Touch(vec![Point::new(client_x, client_y)])
    }

    /// Client position of the event. A touch event with no active touches has none.
    pub fn client_point(&self) -> Option<Point> {
        match self {
            PointerInput::Mouse { client_x, client_y } => Some(Point::new(*client_x, *client_y)),
            PointerInput::Touch(touches) => touches.first().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_is_independent_of_display_size() {
        // 512 internal pixels shown at 256 css pixels
        let rect = DisplayRect::new(100.0, 50.0, 256.0, 256.0);
        let p = rect
            .to_internal(Point::new(228.0, 178.0), (512, 512))
            .unwrap();
        assert_eq!(p, Point::new(256.0, 256.0));

        // Same relative position at a different display size
        let rect = DisplayRect::new(0.0, 0.0, 1024.0, 512.0);
        let p = rect.to_internal(Point::new(512.0, 256.0), (512, 512)).unwrap();
        assert_eq!(p, Point::new(256.0, 256.0));
    }

    #[test]
    fn test_degenerate_rect() {
        let rect = DisplayRect::new(0.0, 0.0, 0.0, 10.0);
        assert!(rect.to_internal(Point::new(1.0, 1.0), (10, 10)).is_none());
    }

    #[test]
    fn test_touch_uses_first_touch() {
        let input = PointerInput::Touch(vec![Point::new(3.0, 4.0), Point::new(9.0, 9.0)]);
        assert_eq!(input.client_point(), Some(Point::new(3.0, 4.0)));
        assert_eq!(PointerInput::Touch(vec![]).client_point(), None);
        assert_eq!(PointerInput::mouse(1.0, 2.0).client_point(), Some(Point::new(1.0, 2.0)));
    }
}
