//! Per-dam failure taxonomy.

use damshed_core::error::DamshedError;
use damshed_core::models::DamId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A failure confined to one dam (or one statistic of one dam).
///
/// None of these abort a batch; they are collected into the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not derive pour point for dam {dam_id}: {source}")]
    PourPoint { dam_id: DamId, source: DamshedError },

    #[error("Could not delineate catchment for dam {dam_id}: {source}")]
    Delineation { dam_id: DamId, source: DamshedError },

    #[error("No {target} statistic for dam {dam_id}: {source}")]
    Statistic {
        dam_id: DamId,
        target: String,
        source: DamshedError,
    },

    #[error("Dam {dam_id} has no stored statistics")]
    MergeMiss { dam_id: DamId },
}

impl PipelineError {
    pub fn category(&self) -> FailureCategory {
        match self {
            PipelineError::PourPoint { .. } => FailureCategory::PourPoint,
            PipelineError::Delineation { .. } => FailureCategory::Delineation,
            PipelineError::Statistic { .. } => FailureCategory::Statistic,
            PipelineError::MergeMiss { .. } => FailureCategory::MergeMiss,
        }
    }

    pub fn dam_id(&self) -> &DamId {
        match self {
            PipelineError::PourPoint { dam_id, .. }
            | PipelineError::Delineation { dam_id, .. }
            | PipelineError::Statistic { dam_id, .. }
            | PipelineError::MergeMiss { dam_id } => dam_id,
        }
    }
}

/// Report grouping of [`PipelineError`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    PourPoint,
    Delineation,
    Statistic,
    MergeMiss,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCategory::PourPoint => "pour point",
            FailureCategory::Delineation => "delineation",
            FailureCategory::Statistic => "statistic",
            FailureCategory::MergeMiss => "merge miss",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_message() {
        let err = PipelineError::Statistic {
            dam_id: DamId::new("12"),
            target: "RC1_O3".to_string(),
            source: DamshedError::NoOverlap,
        };
        assert_eq!(err.category(), FailureCategory::Statistic);
        assert_eq!(err.dam_id().as_str(), "12");
        assert!(err.to_string().contains("RC1_O3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
