//! Command implementations

mod aggregate;
mod config;
mod delineate;
mod merge;
mod variables;

use crate::cli::{Cli, Commands};
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use crate::output_types::{CategoryRow, FailureRow, ReviewRow, StatisticFailureRow};
use anyhow::Result;
use damshed_core::config::CliConfigOverrides;
use damshed_pipeline::RunReport;

/// Execute a CLI command
pub fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let overrides = CliConfigOverrides {
        workspace: cli.workspace.clone(),
        batch: cli.batch.clone(),
    };
    let config = load_config(cli.config.as_deref(), overrides)?;

    match cli.command {
        Commands::DelineateGrand => delineate::grand(&config, &output, cli.dry_run),
        Commands::DelineateFhredPrimary => delineate::fhred_primary(&config, &output, cli.dry_run),
        Commands::DelineateFhredFallback(args) => delineate::fhred_fallback(args, &config, &output, cli.dry_run),
        Commands::BuildVariableRasters(args) => variables::execute(args, &config, &output, cli.dry_run),
        Commands::AggregateStatistics(args) => aggregate::execute(args, &config, &output, cli.dry_run),
        Commands::MergeResults(args) => merge::execute(args, &config, &output, cli.dry_run),
        Commands::Config(args) => config::execute(args, &config, &output),
    }
}

/// Print a finished run report
fn display_report(output: &OutputWriter, report: &RunReport) -> Result<()> {
    if output.is_json() {
        return output.result(report);
    }

    output.section(format!("Run report: {}", report.command));
    output.kv("Run id", report.run_id);
    output.kv("Batch", if report.batch.is_empty() { "(none)" } else { report.batch.as_str() });
    output.kv("Started", report.started_at.to_rfc3339());
    if let Some(finished) = report.finished_at {
        output.kv("Finished", finished.to_rfc3339());
    }
    if let Some(secs) = report.duration_secs() {
        output.kv("Duration", format!("{:.1}s", secs));
    }
    output.kv("Processed", report.processed);
    output.kv("Skipped", report.skipped);
    output.kv("Failed", report.failed);

    let by_category = report.failures_by_category();
    if !by_category.is_empty() {
        output.section("Failures by category");
        output.table(
            by_category
                .into_iter()
                .map(|(category, count)| CategoryRow { category, count })
                .collect(),
        );
    }

    if !report.failures.is_empty() {
        output.section("Failed dams");
        output.table(report.failures.iter().map(FailureRow::from).collect());
    }

    if !report.statistic_failures.is_empty() {
        output.section("Statistics set to the sentinel");
        output.table(report.statistic_failures.iter().map(StatisticFailureRow::from).collect());
    }

    if !report.review_candidates.is_empty() {
        output.section(format!(
            "Area review candidates (tolerance {:.0}%)",
            report.area_tolerance * 100.0
        ));
        output.table(
            report
                .area_checks
                .iter()
                .filter(|check| report.review_candidates.contains(&check.dam_id))
                .map(ReviewRow::from)
                .collect(),
        );
    }

    if !report.unmatched.is_empty() {
        let ids: Vec<String> = report.unmatched.iter().map(|id| id.to_string()).collect();
        output.warning(format!("No dam record for requested ids: {}", ids.join(", ")));
    }
    if !report.rejected.is_empty() {
        output.warning(format!(
            "{} dam record(s) could not be read and were left out",
            report.rejected.len()
        ));
    }

    println!();
    if report.is_clean() {
        output.success(format!("{} finished without failures", report.command));
    } else {
        output.warning(format!(
            "{} finished with failures; affected dams can be re-run safely",
            report.command
        ));
    }
    Ok(())
}
