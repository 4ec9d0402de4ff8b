//! Batch orchestration of the delineation and aggregation commands.
//!
//! Dams are processed one at a time. Per-dam failures are recorded in the
//! [`RunReport`] and the batch moves on; only failures of shared resources
//! (see [`DamshedError::is_fatal`]) stop it.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{Dam, DamId, Raster};
use damshed_core::ports::{RasterEngine, RasterStore, ResultsStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::context::RunContext;
use crate::delineate::{DelineationMode, WatershedDelineator};
use crate::error::PipelineError;
use crate::pour_point::{PourPointSelector, PourPointStrategy};
use crate::report::RunReport;
use crate::zonal::{AreaCheck, AreaGrid, VariableSet, ZonalStatisticsEngine};

/// What a run would do for one dam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    Create,
    Replace,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedDam {
    pub dam_id: DamId,
    pub action: PlannedAction,
}

/// Whether aggregation skips dams already in the results store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    Resume,
    Recompute,
}

/// Pick the dams named in a retry list, in list order.
///
/// Returns the selected dams and the requested ids without a dam record.
pub fn select_dams(dams: &[Dam], ids: &[DamId]) -> (Vec<Dam>, Vec<DamId>) {
    let by_id: HashMap<&DamId, &Dam> = dams.iter().map(|d| (&d.id, d)).collect();
    let mut selected = Vec::new();
    let mut unmatched = Vec::new();
    let mut seen = BTreeSet::new();

    for id in ids {
        if !seen.insert(id) {
            continue;
        }
        match by_id.get(id) {
            Some(dam) => selected.push((*dam).clone()),
            None => unmatched.push(id.clone()),
        }
    }
    (selected, unmatched)
}

/// Delineation runs over a list of dams
pub struct CatchmentBatch<'a, E, C, P>
where
    E: RasterEngine,
    C: RasterStore,
    P: RasterStore,
{
    engine: &'a E,
    context: &'a RunContext,
    catchments: &'a C,
    pour_points: &'a P,
}

impl<'a, E, C, P> CatchmentBatch<'a, E, C, P>
where
    E: RasterEngine,
    C: RasterStore,
    P: RasterStore,
{
    pub fn new(engine: &'a E, context: &'a RunContext, catchments: &'a C, pour_points: &'a P) -> Self {
        Self { engine, context, catchments, pour_points }
    }

    /// List what a run in `mode` would do, without touching any store
    pub fn plan(&self, dams: &[Dam], mode: DelineationMode) -> Result<Vec<PlannedDam>> {
        dams.iter()
            .map(|dam| {
                let exists = self.catchments.exists(dam.id.as_str())?;
                let action = match (mode, exists) {
                    (_, false) => PlannedAction::Create,
                    (DelineationMode::SkipExisting, true) => PlannedAction::Skip,
                    (DelineationMode::Replace, true) => PlannedAction::Replace,
                };
                Ok(PlannedDam { dam_id: dam.id.clone(), action })
            })
            .collect()
    }

    /// Delineate dams aligned to the river network from their own location
    pub fn delineate_direct(&self, dams: &[Dam], report: &mut RunReport) -> Result<()> {
        let delineator = self.delineator(DelineationMode::SkipExisting);
        let selector = PourPointSelector::new(self.engine, self.context);
        tracing::info!(dams = dams.len(), "Delineating catchments from dam locations");

        for dam in dams {
            if delineator.should_skip(&dam.id)? {
                report.record_skipped();
                continue;
            }

            let pour_point = match selector.from_location(dam) {
                Ok(raster) => raster,
                Err(source) => {
                    self.pour_point_failed(dam, source, report)?;
                    continue;
                }
            };

            self.finish_dam(&delineator, dam, &pour_point, report)?;
        }
        Ok(())
    }

    /// First pass over reach-linked dams: reach centre, existing catchments kept
    pub fn delineate_primary(&self, dams: &[Dam], report: &mut RunReport) -> Result<()> {
        self.delineate_via_reach(dams, PourPointStrategy::ReachCentre, DelineationMode::SkipExisting, report)
    }

    /// Operator-driven retry: most upstream pour point, catchments replaced.
    ///
    /// Statistics already stored for a replaced catchment describe the old
    /// one; each is invalidated in `stale` right after its catchment is
    /// written, so the next resumed aggregation recomputes it.
    pub fn delineate_fallback<R: ResultsStore>(
        &self,
        dams: &[Dam],
        retry: &[DamId],
        mut stale: Option<&mut R>,
        report: &mut RunReport,
    ) -> Result<()> {
        let (selected, unmatched) = select_dams(dams, retry);
        for id in unmatched {
            tracing::warn!(dam_id = %id, "Retry id has no dam record");
            report.record_unmatched(id);
        }
        self.run_via_reach(
            &selected,
            PourPointStrategy::MostUpstream,
            DelineationMode::Replace,
            report,
            |dam_id| {
                if let Some(results) = stale.as_deref_mut() {
                    if results.invalidate(dam_id)? {
                        tracing::info!(dam_id = %dam_id, "Stored statistics invalidated");
                    }
                }
                Ok(())
            },
        )
    }

    /// Delineate reach-linked dams with the given strategy.
    ///
    /// Under [`DelineationMode::SkipExisting`] a pour point left by an earlier
    /// run is reused; under [`DelineationMode::Replace`] it is regenerated and
    /// replaced.
    pub fn delineate_via_reach(
        &self,
        dams: &[Dam],
        strategy: PourPointStrategy,
        mode: DelineationMode,
        report: &mut RunReport,
    ) -> Result<()> {
        self.run_via_reach(dams, strategy, mode, report, |_| Ok(()))
    }

    fn run_via_reach<F>(
        &self,
        dams: &[Dam],
        strategy: PourPointStrategy,
        mode: DelineationMode,
        report: &mut RunReport,
        mut on_written: F,
    ) -> Result<()>
    where
        F: FnMut(&DamId) -> Result<()>,
    {
        let delineator = self.delineator(mode);
        let selector = PourPointSelector::new(self.engine, self.context);
        tracing::info!(dams = dams.len(), %strategy, ?mode, "Delineating catchments from river reaches");

        for dam in dams {
            if delineator.should_skip(&dam.id)? {
                report.record_skipped();
                continue;
            }

            let stored = match mode {
                DelineationMode::SkipExisting => match self.pour_points.load(dam.id.as_str()) {
                    Ok(stored) => stored,
                    Err(source) if source.is_fatal() => return Err(source),
                    Err(source) => {
                        tracing::warn!(dam_id = %dam.id, "Stored pour point unreadable, regenerating: {}", source);
                        None
                    }
                },
                DelineationMode::Replace => None,
            };

            let pour_point = match stored {
                Some(raster) => {
                    tracing::debug!(dam_id = %dam.id, "Reusing stored pour point");
                    raster
                }
                None => match selector.select(dam, strategy) {
                    Ok(raster) => {
                        self.pour_points.replace(dam.id.as_str(), &raster)?;
                        raster
                    }
                    Err(source) => {
                        self.pour_point_failed(dam, source, report)?;
                        continue;
                    }
                },
            };

            if self.finish_dam(&delineator, dam, &pour_point, report)? {
                on_written(&dam.id)?;
            }
        }
        Ok(())
    }

    fn delineator(&self, mode: DelineationMode) -> WatershedDelineator<'a, E, C> {
        WatershedDelineator::new(self.engine, self.context, self.catchments, mode)
    }

    fn pour_point_failed(&self, dam: &Dam, source: DamshedError, report: &mut RunReport) -> Result<()> {
        if source.is_fatal() {
            return Err(source);
        }
        tracing::warn!(dam_id = %dam.id, "Could not create pour point: {}", source);
        report.record_failure(PipelineError::PourPoint { dam_id: dam.id.clone(), source });
        Ok(())
    }

    fn finish_dam(
        &self,
        delineator: &WatershedDelineator<'a, E, C>,
        dam: &Dam,
        pour_point: &Raster,
        report: &mut RunReport,
    ) -> Result<bool> {
        match delineator.delineate(&dam.id, pour_point) {
            Ok(_) => {
                report.record_processed();
                Ok(true)
            }
            Err(source) if source.is_fatal() => Err(source),
            Err(source) => {
                tracing::warn!(dam_id = %dam.id, "Could not create catchment: {}", source);
                report.record_failure(PipelineError::Delineation { dam_id: dam.id.clone(), source });
                Ok(false)
            }
        }
    }
}

/// Zonal statistics over every stored catchment of a batch
pub struct StatisticsBatch<'a, E, C>
where
    E: RasterEngine,
    C: RasterStore,
{
    engine: &'a E,
    context: &'a RunContext,
    catchments: &'a C,
    area: &'a AreaGrid,
    variables: &'a VariableSet,
}

impl<'a, E, C> StatisticsBatch<'a, E, C>
where
    E: RasterEngine,
    C: RasterStore,
{
    pub fn new(
        engine: &'a E,
        context: &'a RunContext,
        catchments: &'a C,
        area: &'a AreaGrid,
        variables: &'a VariableSet,
    ) -> Self {
        Self { engine, context, catchments, area, variables }
    }

    /// Dams with a stored catchment, in key order
    pub fn catchment_ids(&self) -> Result<Vec<DamId>> {
        Ok(self.catchments.keys()?.into_iter().map(DamId::new).collect())
    }

    pub fn plan<R: ResultsStore>(&self, results: &R, mode: AggregationMode) -> Result<Vec<PlannedDam>> {
        Ok(self
            .catchment_ids()?
            .into_iter()
            .map(|dam_id| {
                let action = match (mode, results.contains(&dam_id)) {
                    (_, false) => PlannedAction::Create,
                    (AggregationMode::Resume, true) => PlannedAction::Skip,
                    (AggregationMode::Recompute, true) => PlannedAction::Replace,
                };
                PlannedDam { dam_id, action }
            })
            .collect())
    }

    /// Compute and store statistics for every catchment.
    ///
    /// `reported_areas` feeds the area plausibility check only.
    pub fn aggregate<R: ResultsStore>(
        &self,
        results: &mut R,
        reported_areas: &HashMap<DamId, f64>,
        mode: AggregationMode,
        report: &mut RunReport,
    ) -> Result<()> {
        let zonal = ZonalStatisticsEngine::new(self.engine, self.context, self.area, self.variables);
        let sentinel = self.context.settings.sentinel;
        let ids = self.catchment_ids()?;
        tracing::info!(catchments = ids.len(), variables = self.variables.variables().len(), "Aggregating statistics");

        for dam_id in ids {
            if mode == AggregationMode::Resume && results.contains(&dam_id) {
                report.record_skipped();
                continue;
            }

            let catchment = match self.catchments.load(dam_id.as_str()) {
                Ok(Some(raster)) => raster,
                Ok(None) => {
                    tracing::debug!(dam_id = %dam_id, "Catchment disappeared, skipping");
                    report.record_skipped();
                    continue;
                }
                Err(source) if source.is_fatal() => return Err(source),
                Err(source) => {
                    tracing::warn!(dam_id = %dam_id, "Unreadable catchment: {}", source);
                    report.record_failure(PipelineError::Delineation { dam_id, source });
                    continue;
                }
            };

            let outcome = zonal.compute(&dam_id, &catchment);
            let computed = outcome.record.area();
            for failure in outcome.failures {
                report.record_failure(failure);
            }
            results.insert(&dam_id, outcome.record)?;
            report.record_processed();

            if let (Some(computed), Some(reported)) = (computed, reported_areas.get(&dam_id)) {
                if computed != sentinel {
                    report.record_area_check(AreaCheck::new(dam_id, computed, *reported));
                }
            }
        }
        Ok(())
    }
}
