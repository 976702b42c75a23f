/// Perspective transforms and quad rectification
use crate::models::{Point, Quad};
use image::GrayImage;

/// Perspective transformation matrix (3x3, a33 fixed at 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveTransform {
    a11: f64,
    a12: f64,
    a13: f64,
    a21: f64,
    a22: f64,
    a23: f64,
    a31: f64,
    a32: f64,
}

impl PerspectiveTransform {
    /// Create transform from 4 source points to 4 destination points
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        // Direct linear transform: two equations per correspondence.
        let mut a = [[0.0f64; 8]; 8];
        let mut b = [0.0f64; 8];

        for i in 0..4 {
            let (sx, sy) = (src[i].x as f64, src[i].y as f64);
            let (dx, dy) = (dst[i].x as f64, dst[i].y as f64);

            let row = i * 2;
            a[row] = [sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy];
            b[row] = dx;
            a[row + 1] = [0.0, 0.0, 0.0, sx, sy, 1.0, -dy * sx, -dy * sy];
            b[row + 1] = dy;
        }

        solve_linear_system(&a, &b).map(|s| Self {
            a11: s[0],
            a12: s[1],
            a13: s[2],
            a21: s[3],
            a22: s[4],
            a23: s[5],
            a31: s[6],
            a32: s[7],
        })
    }

    /// Map the `side x side` square onto `quad` (corner order TL, TR, BR, BL)
    pub fn square_to_quad(side: f32, quad: &Quad) -> Option<Self> {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ];
        Self::from_points(&square, &quad.corners)
    }

    /// Transform a point; `None` on the line at infinity
    pub fn transform(&self, p: &Point) -> Option<Point> {
        let (x, y) = (p.x as f64, p.y as f64);
        let denominator = self.a31 * x + self.a32 * y + 1.0;
        if denominator.abs() < 1e-12 {
            return None;
        }
        let x_new = (self.a11 * x + self.a12 * y + self.a13) / denominator;
        let y_new = (self.a21 * x + self.a22 * y + self.a23) / denominator;
        Some(Point::new(x_new as f32, y_new as f32))
    }
}

/// Solve 8x8 linear system using Gaussian elimination with partial pivoting
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(a: &[[f64; 8]; 8], b: &[f64; 8]) -> Option<[f64; 8]> {
    let mut a = *a;
    let mut b = *b;
    let n = 8;

    for i in 0..n {
        let mut max_val = a[i][i].abs();
        let mut max_row = i;
        for k in (i + 1)..n {
            if a[k][i].abs() > max_val {
                max_val = a[k][i].abs();
                max_row = k;
            }
        }
        if max_val < 1e-12 {
            return None;
        }
        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }
        for k in (i + 1)..n {
            let factor = a[k][i] / a[i][i];
            b[k] -= factor * b[i];
            for j in i..n {
                a[k][j] -= factor * a[i][j];
            }
        }
    }

    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Some(x)
}

/// Bilinear sample with white outside the buffer
pub fn sample_bilinear(luma: &[u8], width: usize, height: usize, x: f32, y: f32) -> u8 {
    if !(x.is_finite() && y.is_finite()) || width == 0 || height == 0 {
        return 255;
    }
    let fx = x - 0.5;
    let fy = y - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let ax = fx - x0;
    let ay = fy - y0;
    let px = |xi: i64, yi: i64| -> f32 {
        if xi < 0 || yi < 0 || xi >= width as i64 || yi >= height as i64 {
            255.0
        } else {
            luma[yi as usize * width + xi as usize] as f32
        }
    };
    let (xi, yi) = (x0 as i64, y0 as i64);
    let top = px(xi, yi) * (1.0 - ax) + px(xi + 1, yi) * ax;
    let bottom = px(xi, yi + 1) * (1.0 - ax) + px(xi + 1, yi + 1) * ax;
    (top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8
}

/// Rectify `quad` from a luma buffer into a `side x side` image.
///
/// Returns the image plus the patch-to-frame transform.
pub fn warp_quad(
    luma: &[u8],
    width: usize,
    height: usize,
    quad: &Quad,
    side: u32,
) -> Option<(GrayImage, PerspectiveTransform)> {
    if side == 0 || !quad.is_finite() {
        return None;
    }
    let transform = PerspectiveTransform::square_to_quad(side as f32, quad)?;
    let img = GrayImage::from_fn(side, side, |x, y| {
        let v = transform
            .transform(&Point::new(x as f32 + 0.5, y as f32 + 0.5))
            .map_or(255, |p| sample_bilinear(luma, width, height, p.x, p.y));
        image::Luma([v])
    });
    Some((img, transform))
}
