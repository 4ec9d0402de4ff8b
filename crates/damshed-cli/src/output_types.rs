use chrono::{DateTime, Utc};
use damshed_pipeline::{AreaCheck, DamFailure, FailureCategory, MergeSummary, PlannedAction, StatisticFailure};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tabled::Tabled;

/// Row of the failures-by-category table
#[derive(Debug, Tabled)]
pub struct CategoryRow {
    #[tabled(rename = "Category")]
    pub category: FailureCategory,
    #[tabled(rename = "Dams")]
    pub count: usize,
}

#[derive(Debug, Tabled)]
pub struct FailureRow {
    #[tabled(rename = "Dam")]
    pub dam_id: String,
    #[tabled(rename = "Category")]
    pub category: FailureCategory,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&DamFailure> for FailureRow {
    fn from(failure: &DamFailure) -> Self {
        Self {
            dam_id: failure.dam_id.to_string(),
            category: failure.category,
            reason: failure.reason.clone(),
        }
    }
}

#[derive(Debug, Tabled)]
pub struct StatisticFailureRow {
    #[tabled(rename = "Dam")]
    pub dam_id: String,
    #[tabled(rename = "Target")]
    pub target: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl From<&StatisticFailure> for StatisticFailureRow {
    fn from(failure: &StatisticFailure) -> Self {
        Self {
            dam_id: failure.dam_id.to_string(),
            target: failure.target.clone(),
            reason: failure.reason.clone(),
        }
    }
}

/// Catchment whose computed area strays from the reported one
#[derive(Debug, Tabled)]
pub struct ReviewRow {
    #[tabled(rename = "Dam")]
    pub dam_id: String,
    #[tabled(rename = "Computed km²")]
    pub computed_km2: String,
    #[tabled(rename = "Reported km²")]
    pub reported_km2: String,
    #[tabled(rename = "Ratio")]
    pub ratio: String,
}

impl From<&AreaCheck> for ReviewRow {
    fn from(check: &AreaCheck) -> Self {
        Self {
            dam_id: check.dam_id.to_string(),
            computed_km2: format!("{:.1}", check.computed_km2),
            reported_km2: format!("{:.1}", check.reported_km2),
            ratio: format!("{:.2}", check.ratio),
        }
    }
}

/// One planned item of a dry run: a dam or a variable
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct PlannedRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Action")]
    pub action: ActionLabel,
}

/// Display wrapper for [`PlannedAction`]
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct ActionLabel(pub PlannedAction);

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.0 {
            PlannedAction::Create => "create",
            PlannedAction::Replace => "replace",
            PlannedAction::Skip => "skip",
        };
        f.write_str(label)
    }
}

/// Output for build-variable-rasters
#[derive(Debug, Serialize)]
pub struct VariableBuildOutput {
    pub directory: PathBuf,
    pub built: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<VariableFailure>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct VariableFailure {
    #[tabled(rename = "Variable")]
    pub variable: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
}

/// Output for merge-results
#[derive(Debug, Serialize)]
pub struct MergeOutput {
    pub dataset: String,
    pub output: PathBuf,
    pub stored_records: usize,
    #[serde(flatten)]
    pub summary: MergeSummary,
    pub merged_at: DateTime<Utc>,
}

/// One configuration setting
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Setting")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

/// Output for config show
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub config_file: Option<PathBuf>,
    pub settings: Vec<ConfigRow>,
}
