//! Port trait definitions
//!
//! These traits define the interfaces that adapters must implement.

pub mod engine;
pub mod storage;

pub use engine::{FocalOp, FocalWindow, RasterEngine, ZonalOp};
pub use storage::{RasterStore, ResultsStore};
