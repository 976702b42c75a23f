pub mod frame;
pub mod matrix;
pub mod module_grid;
pub mod output;
pub mod point;
pub mod roi;

pub use frame::{Frame, Rotation};
pub use matrix::BitMatrix;
pub use module_grid::{MAX_GRID_SIZE, MIN_GRID_SIZE, ModuleCell, ModuleGrid, ModuleState};
pub use output::{HitKind, INVALID_PREFIX, PrimitiveHit, ScanOutput, ScanStage, TierSet};
pub use point::{Point, Quad};
pub use roi::RoiRect;
