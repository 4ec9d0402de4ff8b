use console::style;
use damshed_core::DamshedError;
use std::fmt;
use std::path::Path;

/// Enhanced error type with suggestions
#[derive(Clone)]
pub struct CliError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
    pub help_command: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
            help_command: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, command: impl Into<String>) -> Self {
        self.help_command = Some(command.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}\n", style("✗").red().bold(), style(&self.message).red().bold());

        if let Some(ref context) = self.context {
            eprintln!("{}", context);
            eprintln!();
        }

        if !self.suggestions.is_empty() {
            eprintln!("{}", style("To fix this:").yellow().bold());
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, suggestion);
            }
            eprintln!();
        }

        if let Some(ref help_cmd) = self.help_command {
            eprintln!("{} {}", style("Need help?").cyan(), style(help_cmd).cyan().bold());
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Explicit --config file that does not exist
pub fn config_file_not_found(path: &Path) -> CliError {
    CliError::new("Configuration file not found")
        .with_context(format!("The file given with --config does not exist.\n\nPath: {}", path.display()))
        .with_suggestion("Check the path and try again")
        .with_suggestion("Or drop --config to use damshed.toml in the workspace")
        .with_help("Run: damshed --help")
}

pub fn config_missing(key: &str) -> CliError {
    CliError::new(format!("Missing configuration: {}", key))
        .with_context(format!("This command needs '{}' but no layer sets it.", key))
        .with_suggestion(format!("Add '{}' to damshed.toml in the workspace", key))
        .with_suggestion("Check the effective settings: damshed config show")
        .with_help("Run: damshed config show")
}

pub fn variable_rasters_missing(detail: &str) -> CliError {
    CliError::new("Variable rasters not built")
        .with_context(format!(
            "Aggregation needs one raster per tracked variable.\n\nMissing: {}",
            detail
        ))
        .with_suggestion("Build them first: damshed build-variable-rasters")
        .with_suggestion("Check that 'variable_sources' lists every tracked variable")
        .with_help("Run: damshed build-variable-rasters --help")
}

/// Create error for invalid configuration
pub fn invalid_config(key: &str, reason: &str) -> CliError {
    CliError::new(format!("Invalid configuration: {}", key))
        .with_context(format!("Configuration value is invalid.\n\nReason: {}", reason))
        .with_suggestion("Check damshed.toml and DAMSHED_* environment variables")
        .with_help("Run: damshed config show")
}

pub fn store_incompatible(path: &Path, reason: &str) -> CliError {
    CliError::new("Results store does not match this run")
        .with_context(format!("Path: {}\n\nReason: {}", path.display(), reason))
        .with_suggestion("Use a new --batch label when the tracked variables change")
        .with_suggestion("Or move the existing store aside and aggregate again")
        .with_help("Run: damshed aggregate-statistics --help")
}

pub fn results_missing(path: &Path, dataset: &str) -> CliError {
    CliError::new("No stored statistics to merge")
        .with_context(format!("Results store not found.\n\nPath: {}", path.display()))
        .with_suggestion(format!("Aggregate first: damshed aggregate-statistics --dataset {}", dataset))
        .with_suggestion("Check that --batch matches the aggregation run")
        .with_help("Run: damshed merge-results --help")
}

fn grids_misaligned(reason: &str) -> CliError {
    CliError::new("Grids do not share the flow direction alignment")
        .with_context(format!("Reason: {}", reason))
        .with_suggestion("Snap every grid to the flow direction grid's origin and cell size")
        .with_help("Run: damshed config show")
}

fn store_conflict(message: String) -> CliError {
    CliError::new("Results were not merged")
        .with_context(message)
        .with_suggestion("Re-run aggregate-statistics with --recompute for the affected batch")
}

/// Convert anyhow::Error to CliError with context
pub fn from_anyhow(error: anyhow::Error) -> CliError {
    if let Some(cli_error) = error.downcast_ref::<CliError>() {
        return cli_error.clone();
    }

    let message = format!("{:#}", error);

    if let Some(domain) = error.chain().find_map(|e| e.downcast_ref::<DamshedError>()) {
        match domain {
            DamshedError::ConfigMissing { key } if key.starts_with("variable rasters") => {
                return variable_rasters_missing(key)
            }
            DamshedError::ConfigMissing { key } => return config_missing(key),
            DamshedError::ConfigInvalid { key, reason } => return invalid_config(key, reason),
            DamshedError::StoreIncompatible { path, reason } => return store_incompatible(path, reason),
            DamshedError::AlignmentMismatch { reason } => return grids_misaligned(reason),
            DamshedError::ShapeMismatch { .. } => return store_conflict(message),
            _ => {}
        }
    }

    // Try to provide context based on error message
    if message.contains("No such file or directory") {
        CliError::new("File not found")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check the paths in damshed.toml: damshed config show")
    } else if message.to_lowercase().contains("permission denied") {
        CliError::new("Permission denied")
            .with_context(format!("Error: {}", message))
            .with_suggestion("Check file permissions")
            .with_suggestion("Or run with appropriate privileges")
    } else {
        CliError::new(message)
    }
}
