pub mod dam;
pub mod layer;
pub mod raster;
pub mod stats;

pub use dam::{parse_retry_list, Dam, DamDataset, DamId, ReachId, RiverReach};
pub use layer::{AttributePredicate, VectorFeature, VectorLayer};
pub use raster::{CellIndex, GridAlignment, GridWindow, Raster};
pub use stats::{StatisticsRecord, TrackedVariables, AREA_FIELD, DEFAULT_SENTINEL};
