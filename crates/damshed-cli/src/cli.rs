use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use damshed_core::models::DamDataset;
use std::path::PathBuf;

/// damshed - Dam catchment delineation and zonal statistics
#[derive(Parser, Debug)]
#[command(name = "damshed")]
#[command(about = "Resolve dams to their catchments and aggregate gridded variables per catchment", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// List what would be processed or skipped without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Configuration file (defaults to damshed.toml in the workspace)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Batch label appended to every output location
    #[arg(long, global = true, value_name = "LABEL")]
    pub batch: Option<String>,

    /// Workspace directory holding inputs and outputs
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Delineate GRanD catchments directly from the dam points
    DelineateGrand,

    /// Delineate FHReD catchments from the interior of each dam's river reach
    DelineateFhredPrimary,

    /// Re-delineate listed FHReD dams from the most upstream cell of their reach
    DelineateFhredFallback(FallbackArgs),

    /// Burn the configured polygon variables into rasters on the run grid
    BuildVariableRasters(BuildVariablesArgs),

    /// Compute per-catchment variable means and area
    AggregateStatistics(AggregateArgs),

    /// Write stored statistics back into the dam dataset
    MergeResults(MergeArgs),

    /// Inspect the layered configuration
    Config(ConfigArgs),
}

/// Dam dataset selection
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DatasetArg {
    /// Global Reservoir and Dam database
    Grand,
    /// Future Hydropower Reservoirs and Dams
    Fhred,
}

impl From<DatasetArg> for DamDataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::Grand => DamDataset::Grand,
            DatasetArg::Fhred => DamDataset::Fhred,
        }
    }
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("retry").required(true).args(["dam", "retry_list"])))]
pub struct FallbackArgs {
    /// Dam id to re-run (repeatable)
    #[arg(long = "dam", value_name = "ID")]
    pub dam: Vec<String>,

    /// File with one dam id per line; blank lines and '#' comments are ignored
    #[arg(long, value_name = "PATH")]
    pub retry_list: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct BuildVariablesArgs {
    /// Rebuild rasters that already exist
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct AggregateArgs {
    /// Dataset whose catchments are aggregated
    #[arg(long, value_enum)]
    pub dataset: DatasetArg,

    /// Recompute dams that already have stored statistics
    #[arg(long)]
    pub recompute: bool,
}

#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Dataset to merge into
    #[arg(long, value_enum)]
    pub dataset: DatasetArg,

    /// Output GeoJSON file (defaults to the merged_output directory)
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show every setting with the layer it came from
    Show,
}
