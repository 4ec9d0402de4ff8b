use crate::cli::FallbackArgs;
use crate::config_loader::LoadedConfig;
use crate::dry_run::{display_plan, DryRunPlan};
use crate::output::OutputWriter;
use crate::workspace::{self, DamSet};
use anyhow::{Context, Result};
use damshed_core::config::RunConfig;
use damshed_core::models::{parse_retry_list, DamDataset, DamId};
use damshed_geo::GridEngine;
use damshed_pipeline::{select_dams, CatchmentBatch, DelineationMode, RunContext, RunReport};
use damshed_store::{FileRasterStore, JsonLinesResultsStore};
use std::fs;

struct Delineation {
    config: RunConfig,
    context: RunContext,
    catchments: FileRasterStore,
    pour_points: FileRasterStore,
    dams: DamSet,
}

impl Delineation {
    fn load(loaded: &LoadedConfig, dataset: DamDataset) -> Result<Self> {
        let config = loaded.resolve()?;
        let mut context = workspace::open_context(&config)?;
        if dataset == DamDataset::Fhred {
            context = workspace::attach_reach_network(context, &config)?;
        }
        let dams = workspace::load_dams(&config, dataset)?;
        let catchments = workspace::catchment_store(&config, dataset)?;
        let pour_points = workspace::pour_point_store(&config)?;

        Ok(Self { config, context, catchments, pour_points, dams })
    }

    fn report(&self, command: &str) -> RunReport {
        let mut report = RunReport::new(command, self.config.batch.clone(), self.config.area_tolerance);
        report.record_rejected(self.dams.rejected.iter().cloned());
        report
    }

    fn plan(&self, command: &str, dataset: DamDataset, selected: &DamSet, mode: DelineationMode) -> Result<DryRunPlan> {
        let engine = GridEngine::new();
        let batch = CatchmentBatch::new(&engine, &self.context, &self.catchments, &self.pour_points);
        Ok(DryRunPlan::new(command)
            .with_detail(format!("Dataset: {}", dataset.name()))
            .with_detail(format!("Catchments: {}", self.catchments.dir().display()))
            .with_dams(batch.plan(&selected.dams, mode)?))
    }
}

pub fn grand(loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    const COMMAND: &str = "delineate-grand";
    let run = Delineation::load(loaded, DamDataset::Grand)?;

    if dry_run {
        let plan = run.plan(COMMAND, DamDataset::Grand, &run.dams, DelineationMode::SkipExisting)?;
        return display_plan(output, &plan);
    }

    let engine = GridEngine::new();
    let batch = CatchmentBatch::new(&engine, &run.context, &run.catchments, &run.pour_points);
    let mut report = run.report(COMMAND);
    batch.delineate_direct(&run.dams.dams, &mut report)?;
    report.finish();

    super::display_report(output, &report)
}

pub fn fhred_primary(loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    const COMMAND: &str = "delineate-fhred-primary";
    let run = Delineation::load(loaded, DamDataset::Fhred)?;

    if dry_run {
        let plan = run
            .plan(COMMAND, DamDataset::Fhred, &run.dams, DelineationMode::SkipExisting)?
            .with_detail(format!("Pour points: {}", run.pour_points.dir().display()));
        return display_plan(output, &plan);
    }

    let engine = GridEngine::new();
    let batch = CatchmentBatch::new(&engine, &run.context, &run.catchments, &run.pour_points);
    let mut report = run.report(COMMAND);
    batch.delineate_primary(&run.dams.dams, &mut report)?;
    report.finish();

    super::display_report(output, &report)
}

pub fn fhred_fallback(args: FallbackArgs, loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    const COMMAND: &str = "delineate-fhred-fallback";
    let retry = retry_ids(&args)?;
    let run = Delineation::load(loaded, DamDataset::Fhred)?;

    if dry_run {
        let (selected, unmatched) = select_dams(&run.dams.dams, &retry);
        let selected = DamSet { dams: selected, rejected: Vec::new() };
        let mut plan = run.plan(COMMAND, DamDataset::Fhred, &selected, DelineationMode::Replace)?;
        let results_path = run.config.results_path(DamDataset::Fhred);
        if results_path.is_file() {
            plan = plan.with_detail(format!(
                "Stored statistics of replaced catchments are invalidated in {}",
                results_path.display()
            ));
        }
        if !unmatched.is_empty() {
            let ids: Vec<String> = unmatched.iter().map(|id| id.to_string()).collect();
            plan = plan.with_detail(format!("No dam record for: {}", ids.join(", ")));
        }
        return display_plan(output, &plan);
    }

    let mut stale = open_existing_results(&run.config)?;

    let engine = GridEngine::new();
    let batch = CatchmentBatch::new(&engine, &run.context, &run.catchments, &run.pour_points);
    let mut report = run.report(COMMAND);
    batch.delineate_fallback(&run.dams.dams, &retry, stale.as_mut(), &mut report)?;
    report.finish();

    super::display_report(output, &report)
}

/// FHReD results store of the batch, when statistics were already aggregated
fn open_existing_results(config: &RunConfig) -> Result<Option<JsonLinesResultsStore>> {
    let path = config.results_path(DamDataset::Fhred);
    if !path.is_file() {
        return Ok(None);
    }
    let variables = config.tracked_variables()?;
    let store = JsonLinesResultsStore::open(&path, variables)
        .with_context(|| format!("Failed to open results store {}", path.display()))?;
    Ok(Some(store))
}

/// Dam ids from --dam or --retry-list, normalized with the FHReD rules
fn retry_ids(args: &FallbackArgs) -> Result<Vec<DamId>> {
    if let Some(path) = &args.retry_list {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read retry list {}", path.display()))?;
        return parse_retry_list(&text).with_context(|| format!("Invalid retry list {}", path.display()));
    }

    let mut ids: Vec<DamId> = Vec::with_capacity(args.dam.len());
    for raw in &args.dam {
        let id = DamDataset::Fhred
            .normalize_str(raw)
            .with_context(|| format!("Invalid --dam value '{}'", raw))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_retry_ids_from_flags() {
        let args = FallbackArgs { dam: vec!["7.0".to_string(), "12".to_string(), "7".to_string()], retry_list: None };
        assert_eq!(retry_ids(&args).unwrap(), vec![DamId::new("7"), DamId::new("12")]);

        let args = FallbackArgs { dam: vec!["seven".to_string()], retry_list: None };
        assert!(retry_ids(&args).is_err());
    }

    #[test]
    fn test_retry_ids_from_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "# rerun after review\n1004.0\n\n77\n").unwrap();

        let args = FallbackArgs { dam: Vec::new(), retry_list: Some(file.path().to_path_buf()) };
        assert_eq!(retry_ids(&args).unwrap(), vec![DamId::new("1004"), DamId::new("77")]);
    }
}
