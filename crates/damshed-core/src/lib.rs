//! damshed core - Domain models, run configuration, and port definitions
//!
//! This crate contains the dam, reach, raster and statistics models shared by
//! every other crate, plus the traits that raster engines and stores implement.

pub mod config;
pub mod error;
pub mod models;
pub mod ports;

pub use error::{DamshedError, Result};
