//! Damshed Geo - Grid engine, pixel areas and vector/raster file IO
//!
//! This crate provides the in-memory [`GridEngine`] implementation of the
//! raster engine port, D8 flow decoding, cell area computation, geometry
//! validation, and GeoJSON/raster document reading and writing.

pub mod area;
pub mod engine;
pub mod flow;
pub mod layer_io;
pub mod rasterize;
pub mod raster_io;
pub mod validation;

pub use engine::GridEngine;
