use crate::cli::AggregateArgs;
use crate::config_loader::LoadedConfig;
use crate::dry_run::{display_plan, DryRunPlan};
use crate::output::OutputWriter;
use crate::workspace;
use anyhow::{Context, Result};
use damshed_core::models::DamDataset;
use damshed_geo::GridEngine;
use damshed_pipeline::{load_variable_set, AggregationMode, RunReport, StatisticsBatch};
use damshed_store::{JsonLinesResultsStore, MemoryResultsStore};
use std::collections::HashMap;

pub fn execute(args: AggregateArgs, loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    const COMMAND: &str = "aggregate-statistics";
    let dataset = DamDataset::from(args.dataset);
    let mode = if args.recompute {
        AggregationMode::Recompute
    } else {
        AggregationMode::Resume
    };

    let config = loaded.resolve()?;
    let variables = config.tracked_variables()?;
    let context = workspace::open_context(&config)?;
    let catchments = workspace::catchment_store(&config, dataset)?;
    let area = workspace::area_grid(&config, &context)?;
    let variable_set = load_variable_set(&workspace::variable_store(&config)?, &variables, &context)?;

    // Reported areas only feed the plausibility check
    let (reported_areas, rejected) = match config.dams_path(dataset) {
        Ok(_) => {
            let dams = workspace::load_dams(&config, dataset)?;
            (dams.reported_areas(), dams.rejected)
        }
        Err(_) => {
            tracing::info!(dataset = dataset.name(), "No dam dataset configured, skipping area checks");
            (HashMap::new(), Vec::new())
        }
    };

    let engine = GridEngine::new();
    let batch = StatisticsBatch::new(&engine, &context, &catchments, &area, &variable_set);
    let results_path = config.results_path(dataset);

    if dry_run {
        let planned = if results_path.is_file() {
            let store = JsonLinesResultsStore::open(&results_path, variables)
                .with_context(|| format!("Failed to open results store {}", results_path.display()))?;
            batch.plan(&store, mode)?
        } else {
            batch.plan(&MemoryResultsStore::new(variables), mode)?
        };
        let plan = DryRunPlan::new(COMMAND)
            .with_detail(format!("Dataset: {}", dataset.name()))
            .with_detail(format!("Catchments: {}", catchments.dir().display()))
            .with_detail(format!("Results store: {}", results_path.display()))
            .with_dams(planned);
        return display_plan(output, &plan);
    }

    let mut results = JsonLinesResultsStore::open(&results_path, variables)
        .with_context(|| format!("Failed to open results store {}", results_path.display()))?;

    let mut report = RunReport::new(COMMAND, config.batch.clone(), config.area_tolerance);
    report.record_rejected(rejected);
    batch.aggregate(&mut results, &reported_areas, mode, &mut report)?;
    report.finish();

    tracing::info!(path = %results.path().display(), "Statistics stored");
    super::display_report(output, &report)
}
