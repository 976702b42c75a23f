/// 2D point with floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation towards `other` (t = 0 returns self)
    pub fn lerp(&self, other: &Point, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Four-corner outline of a detected code, sub-pixel, in
/// top-left / top-right / bottom-right / bottom-left order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quad {
    /// Corners in TL, TR, BR, BL order
    pub corners: [Point; 4],
}

impl Quad {
    /// Create a quad from its four corners
    pub fn new(tl: Point, tr: Point, br: Point, bl: Point) -> Self {
        Self {
            corners: [tl, tr, br, bl],
        }
    }

    /// Centroid of the four corners
    pub fn center(&self) -> Point {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / 4.0, sy / 4.0)
    }

    /// Push every corner away from the centroid by `ratio` of its distance.
    ///
    /// Used to leave room for a quiet zone before rectifying.
    pub fn expanded(&self, ratio: f32) -> Self {
        let c = self.center();
        let mut corners = self.corners;
        for p in corners.iter_mut() {
            *p = c.lerp(p, 1.0 + ratio);
        }
        Self { corners }
    }

    /// Apply `f` to every corner
    pub fn map(&self, mut f: impl FnMut(Point) -> Point) -> Self {
        Self {
            corners: self.corners.map(&mut f),
        }
    }

    /// Axis-aligned bounds as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.corners.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// True when every coordinate is finite
    pub fn is_finite(&self) -> bool {
        self.corners.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }
}
