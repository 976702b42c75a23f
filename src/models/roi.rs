use super::{Point, Quad};

/// Integer rectangle in frame coordinates (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoiRect {
    /// Left edge
    pub left: i32,
    /// Top edge
    pub top: i32,
    /// Right edge (exclusive)
    pub right: i32,
    /// Bottom edge (exclusive)
    pub bottom: i32,
}

impl RoiRect {
    /// Create a rect without clamping
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The whole frame
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Clamp into `[0,width] x [0,height]`, swapping inverted edges.
    pub fn clamped(self, width: usize, height: usize) -> Self {
        let (w, h) = (width as i32, height as i32);
        let mut r = Self::new(
            self.left.clamp(0, w),
            self.top.clamp(0, h),
            self.right.clamp(0, w),
            self.bottom.clamp(0, h),
        );
        if r.right < r.left {
            std::mem::swap(&mut r.right, &mut r.left);
        }
        if r.bottom < r.top {
            std::mem::swap(&mut r.bottom, &mut r.top);
        }
        r
    }

    /// Clamp and drop the rect if it has zero area
    pub fn clamped_nonempty(self, width: usize, height: usize) -> Option<Self> {
        let r = self.clamped(width, height);
        (!r.is_empty()).then_some(r)
    }

    /// Width in pixels
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height in pixels
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Area in pixels (zero for degenerate rects)
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    /// True when the rect covers no pixels
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Center point
    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    /// Grow every side by `ratio` of the rect's own width/height
    pub fn padded(&self, ratio: f32) -> Self {
        let dx = (self.width() as f32 * ratio).round() as i32;
        let dy = (self.height() as f32 * ratio).round() as i32;
        Self::new(
            self.left - dx,
            self.top - dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Square of side `side` centered on `center`
    pub fn square_around(center: Point, side: i32) -> Self {
        let left = (center.x - side as f32 / 2.0).round() as i32;
        let top = (center.y - side as f32 / 2.0).round() as i32;
        Self::new(left, top, left + side, top + side)
    }

    /// Smallest integer rect containing the quad
    pub fn bounding(quad: &Quad) -> Self {
        let (x0, y0, x1, y1) = quad.bounds();
        Self::new(
            x0.floor() as i32,
            y0.floor() as i32,
            x1.ceil() as i32,
            y1.ceil() as i32,
        )
    }

    /// Fraction of the frame area this rect covers
    pub fn coverage(&self, width: usize, height: usize) -> f32 {
        let total = (width * height) as f32;
        if total <= 0.0 {
            return 0.0;
        }
        self.clamped(width, height).area() as f32 / total
    }
}
