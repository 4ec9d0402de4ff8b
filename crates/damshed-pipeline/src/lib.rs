//! damshed pipeline - Dam to catchment resolution and zonal statistics
//!
//! This crate orchestrates the per-dam use cases on top of the core ports:
//! pour point selection, watershed delineation, zonal statistics, results
//! merging and variable raster preparation.

pub mod batch;
pub mod context;
pub mod delineate;
pub mod error;
pub mod merge;
pub mod pour_point;
pub mod report;
pub mod variables;
pub mod zonal;

pub use batch::{select_dams, AggregationMode, CatchmentBatch, PlannedAction, PlannedDam, StatisticsBatch};
pub use context::{RunContext, RunSettings};
pub use delineate::{DelineationMode, DelineationOutcome, WatershedDelineator};
pub use error::{FailureCategory, PipelineError};
pub use merge::{MergeSummary, ResultsMerger};
pub use pour_point::{PourPointSelector, PourPointStrategy};
pub use report::{DamFailure, RunReport, StatisticFailure};
pub use variables::{load_variable_set, VariableBuildSummary, VariableRasterBuilder};
pub use zonal::{AreaCheck, AreaGrid, VariableSet, ZonalOutcome, ZonalStatisticsEngine};
