/// Axis-aligned rectangle in page (CSS pixel) space.
///
/// Follows DOM conventions: `x`/`y` is the top-left corner, `y` grows
/// downward.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Grows the rectangle by `margin` on every side (negative shrinks).
    pub fn inflate(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            (self.width + 2.0 * margin).max(0.0),
            (self.height + 2.0 * margin).max(0.0),
        )
    }

    /// Overlap test with open edges: rectangles that only touch do not
    /// intersect, matching how an intersection observer reports a
    /// zero-area overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn intersects_requires_positive_overlap() {
        let viewport = Rect::from_size(100.0, 100.0);
        assert!(viewport.intersects(&Rect::new(50.0, 50.0, 100.0, 100.0)));
        assert!(!viewport.intersects(&Rect::new(100.0, 0.0, 10.0, 10.0)));
        assert!(!viewport.intersects(&Rect::new(0.0, 120.0, 10.0, 10.0)));
        assert!(!viewport.intersects(&Rect::new(10.0, 10.0, 0.0, 10.0)));
    }

    #[test]
    fn inflate_expands_every_edge() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0).inflate(5.0);
        assert_eq!(r, Rect::new(5.0, 5.0, 30.0, 30.0));
        assert!(r.contains_point(5.0, 35.0));
    }
}
