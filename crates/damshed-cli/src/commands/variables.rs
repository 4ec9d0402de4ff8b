use crate::cli::BuildVariablesArgs;
use crate::config_loader::LoadedConfig;
use crate::dry_run::{display_plan, DryRunPlan};
use crate::output::OutputWriter;
use crate::output_types::{VariableBuildOutput, VariableFailure};
use crate::workspace;
use anyhow::{Context, Result};
use damshed_core::ports::RasterStore;
use damshed_core::DamshedError;
use damshed_geo::layer_io::read_layer;
use damshed_geo::GridEngine;
use damshed_pipeline::{PlannedAction, VariableBuildSummary, VariableRasterBuilder};

pub fn execute(args: BuildVariablesArgs, loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let config = loaded.resolve()?;
    if config.variable_sources.is_empty() {
        return Err(DamshedError::ConfigMissing { key: "variable_sources".to_string() }.into());
    }

    let context = workspace::open_context(&config)?;
    let store = workspace::variable_store(&config)?;

    if dry_run {
        let mut plan = DryRunPlan::new("build-variable-rasters")
            .with_detail(format!("Variable rasters: {}", store.dir().display()));
        for source in &config.variable_sources {
            for field in &source.fields {
                let action = match (store.exists(field)?, args.force) {
                    (false, _) => PlannedAction::Create,
                    (true, true) => PlannedAction::Replace,
                    (true, false) => PlannedAction::Skip,
                };
                plan.push(field.clone(), action);
            }
        }
        return display_plan(output, &plan);
    }

    let engine = GridEngine::new();
    let builder = VariableRasterBuilder::new(&engine, &context, &store).with_force(args.force);
    let mut summary = VariableBuildSummary::default();

    for source in &config.variable_sources {
        let layer = read_layer(&source.path)
            .with_context(|| format!("Failed to read variable source {}", source.path.display()))?;
        tracing::info!(source = %source.path.display(), fields = source.fields.len(), "Rasterizing variable source");
        builder.build(&layer, &source.fields, &mut summary)?;
    }

    let result = VariableBuildOutput {
        directory: store.dir().to_path_buf(),
        built: summary.built,
        skipped: summary.skipped,
        failed: summary
            .failed
            .into_iter()
            .map(|(variable, reason)| VariableFailure { variable, reason })
            .collect(),
    };

    if output.is_json() {
        return output.result(&result);
    }

    output.section("Variable rasters");
    output.kv("Directory", result.directory.display());
    output.kv("Built", result.built.len());
    output.kv("Skipped", result.skipped.len());
    if result.failed.is_empty() {
        output.success("All variable rasters are in place");
    } else {
        output.table(result.failed);
        output.warning("Some variables could not be rasterized; aggregation will refuse to start until they exist");
    }
    Ok(())
}
