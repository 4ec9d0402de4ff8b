use crate::cli::MergeArgs;
use crate::config_loader::LoadedConfig;
use crate::dry_run::{display_plan, DryRunPlan};
use crate::errors;
use crate::output::OutputWriter;
use crate::output_types::MergeOutput;
use anyhow::{Context, Result};
use chrono::Utc;
use damshed_core::models::DamDataset;
use damshed_core::ports::ResultsStore;
use damshed_geo::layer_io::read_layer;
use damshed_pipeline::{PlannedAction, ResultsMerger};
use damshed_store::JsonLinesResultsStore;

pub fn execute(args: MergeArgs, loaded: &LoadedConfig, output: &OutputWriter, dry_run: bool) -> Result<()> {
    let dataset = DamDataset::from(args.dataset);
    let config = loaded.resolve()?;
    let variables = config.tracked_variables()?;

    let results_path = config.results_path(dataset);
    if !results_path.is_file() {
        let slug = match dataset {
            DamDataset::Grand => "grand",
            DamDataset::Fhred => "fhred",
        };
        return Err(errors::results_missing(&results_path, slug).into());
    }
    let results = JsonLinesResultsStore::open(&results_path, variables)
        .with_context(|| format!("Failed to open results store {}", results_path.display()))?;

    let dams_path = config.dams_path(dataset)?;
    let layer = read_layer(dams_path)
        .with_context(|| format!("Failed to read {} dams from {}", dataset.name(), dams_path.display()))?;
    let destination = args.output.unwrap_or_else(|| config.merged_path(dataset));
    let merger = ResultsMerger::new(&results, dataset);

    if dry_run {
        merger.check_shapes()?;
        let mut plan = DryRunPlan::new("merge-results")
            .with_detail(format!("Dam dataset: {}", dams_path.display()))
            .with_detail(format!("Output: {}", destination.display()));
        for feature in &layer.features {
            let id = feature
                .properties
                .get(dataset.id_field())
                .and_then(|raw| dataset.normalize_id(raw).ok());
            match id {
                Some(id) if results.contains(&id) => plan.push(id.to_string(), PlannedAction::Replace),
                Some(id) => plan.push(id.to_string(), PlannedAction::Skip),
                None => plan.push(feature.label(), PlannedAction::Skip),
            }
        }
        return display_plan(output, &plan);
    }

    let summary = merger.merge_to_file(&layer, &destination)?;
    let result = MergeOutput {
        dataset: dataset.name().to_string(),
        output: destination,
        stored_records: results.len(),
        summary,
        merged_at: Utc::now(),
    };

    if output.is_json() {
        return output.result(&result);
    }

    output.section(format!("Merged {} results", result.dataset));
    output.kv("Output", result.output.display());
    output.kv("Stored records", result.stored_records);
    output.kv("Rows updated", result.summary.updated);
    output.kv("Rows untouched", result.summary.untouched);
    if !result.summary.invalid_ids.is_empty() {
        output.warning(format!(
            "{} row(s) have an unusable {} and were left as they were",
            result.summary.invalid_ids.len(),
            dataset.id_field()
        ));
    }
    output.success(format!("Wrote {}", result.output.display()));
    Ok(())
}
