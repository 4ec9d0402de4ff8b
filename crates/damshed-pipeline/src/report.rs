//! Run report collected while a command processes its dams.

use chrono::{DateTime, Utc};
use damshed_core::models::DamId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{FailureCategory, PipelineError};
use crate::zonal::AreaCheck;

/// A dam that could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamFailure {
    pub dam_id: DamId,
    pub category: FailureCategory,
    pub reason: String,
}

/// A single statistic that fell back to the sentinel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticFailure {
    pub dam_id: DamId,
    pub target: String,
    pub reason: String,
}

/// Summary of one command run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub command: String,
    pub batch: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<DamFailure>,
    pub statistic_failures: Vec<StatisticFailure>,
    /// Requested ids with no matching dam record
    pub unmatched: Vec<DamId>,
    /// Dam records dropped while loading, by feature label
    pub rejected: Vec<String>,
    pub area_checks: Vec<AreaCheck>,
    pub review_candidates: Vec<DamId>,
    pub area_tolerance: f64,
}

impl RunReport {
    pub fn new(command: impl Into<String>, batch: impl Into<String>, area_tolerance: f64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.into(),
            batch: batch.into(),
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            statistic_failures: Vec::new(),
            unmatched: Vec::new(),
            rejected: Vec::new(),
            area_checks: Vec::new(),
            review_candidates: Vec::new(),
            area_tolerance,
        }
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_unmatched(&mut self, dam_id: DamId) {
        self.unmatched.push(dam_id);
    }

    pub fn record_rejected(&mut self, labels: impl IntoIterator<Item = String>) {
        self.rejected.extend(labels);
    }

    /// Record a per-dam failure.
    ///
    /// Statistic failures do not fail the dam; its record is still written
    /// with the sentinel in place. Merge misses are expected and not kept.
    pub fn record_failure(&mut self, error: PipelineError) {
        match error {
            PipelineError::Statistic { dam_id, target, source } => {
                self.statistic_failures.push(StatisticFailure {
                    dam_id,
                    target,
                    reason: source.to_string(),
                });
            }
            PipelineError::MergeMiss { .. } => {}
            other => {
                self.failed += 1;
                self.failures.push(DamFailure {
                    dam_id: other.dam_id().clone(),
                    category: other.category(),
                    reason: match &other {
                        PipelineError::PourPoint { source, .. }
                        | PipelineError::Delineation { source, .. } => source.to_string(),
                        _ => other.to_string(),
                    },
                });
            }
        }
    }

    pub fn record_area_check(&mut self, check: AreaCheck) {
        if check.needs_review(self.area_tolerance) {
            tracing::info!(
                dam_id = %check.dam_id,
                computed_km2 = check.computed_km2,
                reported_km2 = check.reported_km2,
                "Catchment area differs from reported area"
            );
            self.review_candidates.push(check.dam_id.clone());
        }
        self.area_checks.push(check);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Failed dams per category, statistics included
    pub fn failures_by_category(&self) -> BTreeMap<FailureCategory, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.category).or_insert(0) += 1;
        }
        if !self.statistic_failures.is_empty() {
            counts.insert(FailureCategory::Statistic, self.statistic_failures.len());
        }
        counts
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.statistic_failures.is_empty()
            && self.unmatched.is_empty()
            && self.rejected.is_empty()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}
