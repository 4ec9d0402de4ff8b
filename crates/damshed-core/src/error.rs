//! Error types for damshed

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DamshedError {
    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // Identifier errors
    #[error("Invalid {dataset} identifier '{raw}': {reason}")]
    InvalidIdentifier {
        dataset: String,
        raw: String,
        reason: String,
    },

    // Input data errors
    #[error("Reach {reach_id} not found in reach layer")]
    ReachNotFound { reach_id: u64 },

    #[error("Feature {feature_id} has no usable attribute '{field}'")]
    MissingAttribute { feature_id: String, field: String },

    #[error("Invalid geometry at feature {feature_id}: {reason}")]
    InvalidGeometry { feature_id: String, reason: String },

    // Raster errors
    #[error("Alignment mismatch: {reason}")]
    AlignmentMismatch { reason: String },

    #[error("Raster engine {operation} failed: {reason}")]
    RasterEngine { operation: String, reason: String },

    #[error("Raster '{name}' has no populated cells")]
    EmptyRaster { name: String },

    #[error("Zone and value rasters share no populated cells")]
    NoOverlap,

    // Pour point errors
    #[error("Reach {reach_id} has no interior cell above the threshold {threshold}")]
    NoInteriorCells { reach_id: u64, threshold: f64 },

    #[error("Reach {reach_id} did not rasterize to any usable cell")]
    EmptyReach { reach_id: u64 },

    #[error("Pour point for dam {dam_id} has no populated cell")]
    DegeneratePourPoint { dam_id: String },

    #[error("Cell ({row}, {col}) lies outside the raster window")]
    OutOfWindow { row: i64, col: i64 },

    // Store errors
    #[error("Raster already exists for key {key}")]
    AlreadyExists { key: String },

    #[error("Results for dam {dam_id} were already written in this run")]
    DuplicateKey { dam_id: String },

    #[error("Results store at {path} is incompatible: {reason}")]
    StoreIncompatible { path: PathBuf, reason: String },

    // Merge errors
    #[error("Stored vector for dam {dam_id} has {actual} values, field schema expects {expected}")]
    ShapeMismatch {
        dam_id: String,
        expected: usize,
        actual: usize,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DamshedError {
    /// Shorthand for a raster engine failure
    pub fn engine(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        DamshedError::RasterEngine {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Errors of shared resources that must halt a batch instead of
    /// failing a single dam
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DamshedError::Io(_)
                | DamshedError::StoreIncompatible { .. }
                | DamshedError::DuplicateKey { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DamshedError>;
