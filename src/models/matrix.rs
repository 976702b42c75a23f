/// Compact bit matrix for binarized patches (true = dark)
#[derive(Debug, Clone)]
pub struct BitMatrix {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl BitMatrix {
    /// Create an all-light matrix
    pub fn new(width: usize, height: usize) -> Self {
        let bytes_needed = (width * height).div_ceil(8);
        Self {
            width,
            height,
            data: vec![0; bytes_needed],
        }
    }

    /// Binarize luma with a global threshold (`luma < threshold` is dark)
    pub fn from_threshold(luma: &[u8], width: usize, height: usize, threshold: u8) -> Self {
        let mut m = Self::new(width, height);
        for (i, &v) in luma.iter().take(width * height).enumerate() {
            if v < threshold {
                m.data[i / 8] |= 1 << (i % 8);
            }
        }
        m
    }

    /// Get matrix width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get matrix height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get bit at (x, y); out of bounds reads as light
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let index = y * self.width + x;
        (self.data[index / 8] >> (index % 8)) & 1 == 1
    }

    /// Set bit at (x, y); out of bounds writes are ignored
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = y * self.width + x;
        if value {
            self.data[index / 8] |= 1 << (index % 8);
        } else {
            self.data[index / 8] &= !(1 << (index % 8));
        }
    }

    /// Horizontal scanline `y` between `x0..x1`
    pub fn row_segment(&self, y: usize, x0: usize, x1: usize) -> Vec<bool> {
        (x0..x1.min(self.width)).map(|x| self.get(x, y)).collect()
    }

    /// Vertical scanline `x` between `y0..y1`
    pub fn col_segment(&self, x: usize, y0: usize, y1: usize) -> Vec<bool> {
        (y0..y1.min(self.height)).map(|y| self.get(x, y)).collect()
    }

    /// Bounds `(x0, y0, x1, y1)` (exclusive end) of rows and columns whose
    /// dark count reaches `min_fraction` of the opposite dimension.
    pub fn dark_bounds(&self, min_fraction: f32) -> Option<(usize, usize, usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let mut row_counts = vec![0usize; self.height];
        let mut col_counts = vec![0usize; self.width];
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    row_counts[y] += 1;
                    col_counts[x] += 1;
                }
            }
        }
        let row_min = ((self.width as f32 * min_fraction).ceil() as usize).max(1);
        let col_min = ((self.height as f32 * min_fraction).ceil() as usize).max(1);
        let y0 = row_counts.iter().position(|&c| c >= row_min)?;
        let y1 = row_counts.iter().rposition(|&c| c >= row_min)? + 1;
        let x0 = col_counts.iter().position(|&c| c >= col_min)?;
        let x1 = col_counts.iter().rposition(|&c| c >= col_min)? + 1;
        Some((x0, y0, x1, y1))
    }
}

impl Default for BitMatrix {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
