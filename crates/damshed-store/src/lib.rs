//! Damshed Store - Raster and results storage adapters
//!
//! This crate provides in-memory and file-backed implementations of the
//! `RasterStore` and `ResultsStore` ports defined in `damshed-core`.

pub mod file;
pub mod jsonl;
pub mod memory;

pub use file::FileRasterStore;
pub use jsonl::JsonLinesResultsStore;
pub use memory::{MemoryRasterStore, MemoryResultsStore};
