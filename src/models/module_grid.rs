/// Smallest valid code size in modules (version 1)
pub const MIN_GRID_SIZE: usize = 21;
/// Largest valid code size in modules (version 40)
pub const MAX_GRID_SIZE: usize = 177;

/// Tri-state module value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Dark module
    Black,
    /// Light module
    White,
    /// Not determined yet
    Unknown,
}

impl ModuleState {
    /// `Some(true)` for black, `Some(false)` for white
    pub fn as_bit(self) -> Option<bool> {
        match self {
            Self::Black => Some(true),
            Self::White => Some(false),
            Self::Unknown => None,
        }
    }

    /// State for a known bit
    pub fn from_bit(black: bool) -> Self {
        if black { Self::Black } else { Self::White }
    }
}

/// One grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleCell {
    /// Current state
    pub state: ModuleState,
    /// Estimated probability the module is dark, in [0, 1]
    pub p_black: f32,
}

impl ModuleCell {
    /// Confidence margin |p - 0.5|
    pub fn margin(&self) -> f32 {
        (self.p_black - 0.5).abs()
    }

    /// Most likely bit given `p_black`
    pub fn likely_black(&self) -> bool {
        self.p_black >= 0.5
    }
}

impl Default for ModuleCell {
    fn default() -> Self {
        Self {
            state: ModuleState::Unknown,
            p_black: 0.5,
        }
    }
}

/// Square grid of modules for a code of `size` x `size`
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleGrid {
    size: usize,
    cells: Vec<ModuleCell>,
}

impl ModuleGrid {
    /// All-unknown grid
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![ModuleCell::default(); size * size],
        }
    }

    /// Is `size` one of 21, 25, ..., 177
    pub fn is_valid_size(size: usize) -> bool {
        (MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&size) && (size - MIN_GRID_SIZE) % 4 == 0
    }

    /// Version number (1..=40) of a valid `size`
    pub fn version_for(size: usize) -> usize {
        size.saturating_sub(MIN_GRID_SIZE) / 4 + 1
    }

    /// Modules per side
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cell at column `x`, row `y`
    pub fn cell(&self, x: usize, y: usize) -> &ModuleCell {
        &self.cells[y * self.size + x]
    }

    /// Mutable cell at column `x`, row `y`
    pub fn cell_mut(&mut self, x: usize, y: usize) -> &mut ModuleCell {
        &mut self.cells[y * self.size + x]
    }

    /// Row-major cells
    pub fn cells(&self) -> &[ModuleCell] {
        &self.cells
    }

    /// Row-major cells, mutable
    pub fn cells_mut(&mut self) -> &mut [ModuleCell] {
        &mut self.cells
    }

    /// Row-major indices of unknown cells
    pub fn unknown_indices(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.state == ModuleState::Unknown)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of unknown cells
    pub fn unknown_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.state == ModuleState::Unknown)
            .count()
    }

    /// Bit for every cell, resolving unknowns to their likely value
    pub fn to_bits(&self) -> Vec<bool> {
        self.cells
            .iter()
            .map(|c| c.state.as_bit().unwrap_or_else(|| c.likely_black()))
            .collect()
    }
}
