use crate::error::{DamshedError, Result};
use crate::models::{DamDataset, TrackedVariables, DEFAULT_SENTINEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// A polygon dataset whose numeric attributes become variable rasters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSource {
    /// GeoJSON file with polygon features
    pub path: PathBuf,

    /// Attributes to rasterize, one raster each
    pub fields: Vec<String>,
}

/// Layered configuration for a damshed run
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub workspace: ConfigValue<PathBuf>,
    pub batch: ConfigValue<String>,
    pub flow_direction: ConfigValue<Option<PathBuf>>,
    pub flow_accumulation: ConfigValue<Option<PathBuf>>,
    pub pixel_area: ConfigValue<Option<PathBuf>>,
    pub reaches: ConfigValue<Option<PathBuf>>,
    pub reach_id_field: ConfigValue<String>,
    pub grand_dams: ConfigValue<Option<PathBuf>>,
    pub fhred_dams: ConfigValue<Option<PathBuf>>,
    pub variables: ConfigValue<Vec<String>>,
    pub variable_sources: ConfigValue<Vec<VariableSource>>,
    pub sentinel: ConfigValue<f64>,
    pub interior_threshold: ConfigValue<f64>,
    pub focal_window: ConfigValue<usize>,
    pub area_tolerance: ConfigValue<f64>,
    pub merged_output: ConfigValue<PathBuf>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            workspace: ConfigValue::new(PathBuf::from("."), ConfigSource::Default),
            batch: ConfigValue::new(String::new(), ConfigSource::Default),
            flow_direction: ConfigValue::new(None, ConfigSource::Default),
            flow_accumulation: ConfigValue::new(None, ConfigSource::Default),
            pixel_area: ConfigValue::new(None, ConfigSource::Default),
            reaches: ConfigValue::new(None, ConfigSource::Default),
            reach_id_field: ConfigValue::new("OBJECTID".to_string(), ConfigSource::Default),
            grand_dams: ConfigValue::new(None, ConfigSource::Default),
            fhred_dams: ConfigValue::new(None, ConfigSource::Default),
            variables: ConfigValue::new(Vec::new(), ConfigSource::Default),
            variable_sources: ConfigValue::new(Vec::new(), ConfigSource::Default),
            sentinel: ConfigValue::new(DEFAULT_SENTINEL, ConfigSource::Default),
            interior_threshold: ConfigValue::new(2.0, ConfigSource::Default),
            focal_window: ConfigValue::new(3, ConfigSource::Default),
            area_tolerance: ConfigValue::new(0.5, ConfigSource::Default),
            merged_output: ConfigValue::new(PathBuf::from("merged"), ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| DamshedError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| DamshedError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(workspace) = file_config.workspace {
            self.workspace.update(workspace, ConfigSource::File);
        }
        if let Some(batch) = file_config.batch {
            self.batch.update(batch, ConfigSource::File);
        }
        if let Some(path) = file_config.flow_direction {
            self.flow_direction.update(Some(path), ConfigSource::File);
        }
        if let Some(path) = file_config.flow_accumulation {
            self.flow_accumulation.update(Some(path), ConfigSource::File);
        }
        if let Some(path) = file_config.pixel_area {
            self.pixel_area.update(Some(path), ConfigSource::File);
        }
        if let Some(path) = file_config.reaches {
            self.reaches.update(Some(path), ConfigSource::File);
        }
        if let Some(field) = file_config.reach_id_field {
            self.reach_id_field.update(field, ConfigSource::File);
        }
        if let Some(path) = file_config.grand_dams {
            self.grand_dams.update(Some(path), ConfigSource::File);
        }
        if let Some(path) = file_config.fhred_dams {
            self.fhred_dams.update(Some(path), ConfigSource::File);
        }
        if let Some(variables) = file_config.variables {
            self.variables.update(variables, ConfigSource::File);
        }
        if let Some(sources) = file_config.variable_sources {
            self.variable_sources.update(sources, ConfigSource::File);
        }
        if let Some(sentinel) = file_config.sentinel {
            self.sentinel.update(sentinel, ConfigSource::File);
        }
        if let Some(threshold) = file_config.interior_threshold {
            self.interior_threshold.update(threshold, ConfigSource::File);
        }
        if let Some(window) = file_config.focal_window {
            self.focal_window.update(window, ConfigSource::File);
        }
        if let Some(tolerance) = file_config.area_tolerance {
            self.area_tolerance.update(tolerance, ConfigSource::File);
        }
        if let Some(path) = file_config.merged_output {
            self.merged_output.update(path, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // DAMSHED_WORKSPACE
        if let Ok(workspace) = env::var("DAMSHED_WORKSPACE") {
            self.workspace.update(PathBuf::from(workspace), ConfigSource::Environment);
        }

        // DAMSHED_BATCH
        if let Ok(batch) = env::var("DAMSHED_BATCH") {
            self.batch.update(batch, ConfigSource::Environment);
        }

        // DAMSHED_SENTINEL
        if let Ok(raw) = env::var("DAMSHED_SENTINEL") {
            match raw.parse::<f64>() {
                Ok(v) => self.sentinel.update(v, ConfigSource::Environment),
                Err(_) => tracing::warn!("Invalid DAMSHED_SENTINEL value '{}': expected a number", raw),
            }
        }

        // DAMSHED_INTERIOR_THRESHOLD
        if let Ok(raw) = env::var("DAMSHED_INTERIOR_THRESHOLD") {
            match raw.parse::<f64>() {
                Ok(v) => self.interior_threshold.update(v, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid DAMSHED_INTERIOR_THRESHOLD value '{}': expected a number",
                    raw
                ),
            }
        }

        // DAMSHED_AREA_TOLERANCE
        if let Ok(raw) = env::var("DAMSHED_AREA_TOLERANCE") {
            match raw.parse::<f64>() {
                Ok(v) => self.area_tolerance.update(v, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid DAMSHED_AREA_TOLERANCE value '{}': expected a number",
                    raw
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(workspace) = overrides.workspace {
            self.workspace.update(workspace, ConfigSource::Cli);
        }

        if let Some(batch) = overrides.batch {
            self.batch.update(batch, ConfigSource::Cli);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "workspace".to_string(),
            (self.workspace.value.display().to_string(), self.workspace.source),
        );
        map.insert("batch".to_string(), (format!("{:?}", self.batch.value), self.batch.source));

        for (key, value) in [
            ("flow_direction", &self.flow_direction),
            ("flow_accumulation", &self.flow_accumulation),
            ("pixel_area", &self.pixel_area),
            ("reaches", &self.reaches),
            ("grand_dams", &self.grand_dams),
            ("fhred_dams", &self.fhred_dams),
        ] {
            let shown = value
                .value
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(unset)".to_string());
            map.insert(key.to_string(), (shown, value.source));
        }

        map.insert(
            "reach_id_field".to_string(),
            (self.reach_id_field.value.clone(), self.reach_id_field.source),
        );
        map.insert(
            "variables".to_string(),
            (self.variables.value.join(", "), self.variables.source),
        );
        map.insert(
            "variable_sources".to_string(),
            (format!("{} source(s)", self.variable_sources.value.len()), self.variable_sources.source),
        );
        map.insert("sentinel".to_string(), (self.sentinel.value.to_string(), self.sentinel.source));
        map.insert(
            "interior_threshold".to_string(),
            (self.interior_threshold.value.to_string(), self.interior_threshold.source),
        );
        map.insert(
            "focal_window".to_string(),
            (self.focal_window.value.to_string(), self.focal_window.source),
        );
        map.insert(
            "area_tolerance".to_string(),
            (self.area_tolerance.value.to_string(), self.area_tolerance.source),
        );
        map.insert(
            "merged_output".to_string(),
            (self.merged_output.value.display().to_string(), self.merged_output.source),
        );

        map
    }

    /// Validate the layered values and freeze them into a run configuration
    pub fn resolve(&self) -> Result<RunConfig> {
        let workspace = self.workspace.value.clone();
        let batch = self.batch.value.trim().to_string();

        if !batch.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(DamshedError::ConfigInvalid {
                key: "batch".to_string(),
                reason: format!(
                    "'{}' may only contain letters, digits, '_' and '-' since it names output directories",
                    batch
                ),
            });
        }

        let sentinel = self.sentinel.value;
        if !sentinel.is_finite() {
            return Err(DamshedError::ConfigInvalid {
                key: "sentinel".to_string(),
                reason: "sentinel must be a finite number".to_string(),
            });
        }

        let interior_threshold = self.interior_threshold.value;
        if !interior_threshold.is_finite() || interior_threshold < 0.0 {
            return Err(DamshedError::ConfigInvalid {
                key: "interior_threshold".to_string(),
                reason: format!("{} must be a non-negative number", interior_threshold),
            });
        }

        let focal_window = self.focal_window.value;
        if focal_window < 3 || focal_window % 2 == 0 {
            return Err(DamshedError::ConfigInvalid {
                key: "focal_window".to_string(),
                reason: format!("{} must be an odd number of cells, at least 3", focal_window),
            });
        }

        let area_tolerance = self.area_tolerance.value;
        if !(area_tolerance > 0.0 && area_tolerance <= 1.0) {
            return Err(DamshedError::ConfigInvalid {
                key: "area_tolerance".to_string(),
                reason: format!("{} must be in (0, 1]", area_tolerance),
            });
        }

        let variables = if self.variables.value.is_empty() {
            self.variable_sources
                .value
                .iter()
                .flat_map(|s| s.fields.iter().cloned())
                .collect()
        } else {
            self.variables.value.clone()
        };
        if !variables.is_empty() {
            // Fail early on duplicates or reserved names
            TrackedVariables::new(variables.clone())?;
        }

        let resolve = |p: &Option<PathBuf>| p.as_ref().map(|p| resolve_path(&workspace, p));

        Ok(RunConfig {
            flow_direction: resolve(&self.flow_direction.value),
            flow_accumulation: resolve(&self.flow_accumulation.value),
            pixel_area: resolve(&self.pixel_area.value),
            reaches: resolve(&self.reaches.value),
            reach_id_field: self.reach_id_field.value.clone(),
            grand_dams: resolve(&self.grand_dams.value),
            fhred_dams: resolve(&self.fhred_dams.value),
            variables,
            variable_sources: self
                .variable_sources
                .value
                .iter()
                .map(|s| VariableSource { path: resolve_path(&workspace, &s.path), fields: s.fields.clone() })
                .collect(),
            sentinel,
            interior_threshold,
            focal_window,
            area_tolerance,
            merged_output: resolve_path(&workspace, &self.merged_output.value),
            workspace,
            batch,
        })
    }
}

fn resolve_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Immutable configuration handed to every component of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub workspace: PathBuf,
    /// Partition label; suffixes every output location of this run
    pub batch: String,
    pub flow_direction: Option<PathBuf>,
    pub flow_accumulation: Option<PathBuf>,
    pub pixel_area: Option<PathBuf>,
    pub reaches: Option<PathBuf>,
    pub reach_id_field: String,
    pub grand_dams: Option<PathBuf>,
    pub fhred_dams: Option<PathBuf>,
    pub variables: Vec<String>,
    pub variable_sources: Vec<VariableSource>,
    pub sentinel: f64,
    pub interior_threshold: f64,
    pub focal_window: usize,
    pub area_tolerance: f64,
    pub merged_output: PathBuf,
}

impl RunConfig {
    fn require<'a>(value: &'a Option<PathBuf>, key: &str) -> Result<&'a Path> {
        value
            .as_deref()
            .ok_or_else(|| DamshedError::ConfigMissing { key: key.to_string() })
    }

    pub fn flow_direction_path(&self) -> Result<&Path> {
        Self::require(&self.flow_direction, "flow_direction")
    }

    pub fn flow_accumulation_path(&self) -> Result<&Path> {
        Self::require(&self.flow_accumulation, "flow_accumulation")
    }

    pub fn reaches_path(&self) -> Result<&Path> {
        Self::require(&self.reaches, "reaches")
    }

    pub fn dams_path(&self, dataset: DamDataset) -> Result<&Path> {
        match dataset {
            DamDataset::Grand => Self::require(&self.grand_dams, "grand_dams"),
            DamDataset::Fhred => Self::require(&self.fhred_dams, "fhred_dams"),
        }
    }

    /// Tracked variables for statistics; required by aggregation and merge
    pub fn tracked_variables(&self) -> Result<TrackedVariables> {
        if self.variables.is_empty() {
            return Err(DamshedError::ConfigMissing { key: "variables".to_string() });
        }
        TrackedVariables::new(self.variables.clone())
    }

    /// Catchment rasters of one dataset for this batch
    pub fn catchments_dir(&self, dataset: DamDataset) -> PathBuf {
        self.workspace.join(format!("{}_catch{}", dataset_slug(dataset), self.batch))
    }

    /// Pour point rasters derived from river reaches
    pub fn pour_points_dir(&self) -> PathBuf {
        self.workspace.join(format!("fhred_rivs{}", self.batch))
    }

    /// Pre-built variable rasters
    pub fn variables_dir(&self) -> PathBuf {
        self.workspace.join(format!("vars{}", self.batch))
    }

    /// Durable results store for one dataset
    pub fn results_path(&self, dataset: DamDataset) -> PathBuf {
        self.workspace.join(format!("{}_stats{}.jsonl", dataset_slug(dataset), self.batch))
    }

    /// Default destination of the merged dam dataset
    pub fn merged_path(&self, dataset: DamDataset) -> PathBuf {
        self.merged_output
            .join(format!("{}_results{}.geojson", dataset_slug(dataset), self.batch))
    }
}

fn dataset_slug(dataset: DamDataset) -> &'static str {
    match dataset {
        DamDataset::Grand => "grand",
        DamDataset::Fhred => "fhred",
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    workspace: Option<PathBuf>,
    batch: Option<String>,
    flow_direction: Option<PathBuf>,
    flow_accumulation: Option<PathBuf>,
    pixel_area: Option<PathBuf>,
    reaches: Option<PathBuf>,
    reach_id_field: Option<String>,
    grand_dams: Option<PathBuf>,
    fhred_dams: Option<PathBuf>,
    variables: Option<Vec<String>>,
    variable_sources: Option<Vec<VariableSource>>,
    sentinel: Option<f64>,
    interior_threshold: Option<f64>,
    focal_window: Option<usize>,
    area_tolerance: Option<f64>,
    merged_output: Option<PathBuf>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub batch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LayeredConfig::with_defaults();
        assert_eq!(config.sentinel.value, -9999.0);
        assert_eq!(config.sentinel.source, ConfigSource::Default);
        assert_eq!(config.interior_threshold.value, 2.0);
        assert_eq!(config.focal_window.value, 3);
        assert_eq!(config.batch.value, "");
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        // File should override default
        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);
        assert_eq!(value.source, ConfigSource::File);

        // Environment should override file
        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Environment);

        // CLI should override environment
        value.update(400, ConfigSource::Cli);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Cli);

        // Lower precedence should not override
        value.update(500, ConfigSource::File);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workspace = "/data/hydro_catchments"
batch = "3"
flow_direction = "grids/global_dir_15.json"
variables = ["RC1_O3", "RC1_O5"]
interior_threshold = 3
"#
        )
        .unwrap();

        let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(config.workspace.value, PathBuf::from("/data/hydro_catchments"));
        assert_eq!(config.batch.value, "3");
        assert_eq!(config.batch.source, ConfigSource::File);
        assert_eq!(config.variables.value, vec!["RC1_O3", "RC1_O5"]);
        assert_eq!(config.interior_threshold.value, 3.0);
        assert_eq!(config.focal_window.source, ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = LayeredConfig::with_defaults();

        config.update_from_cli(CliConfigOverrides {
            workspace: None,
            batch: Some("7".to_string()),
        });

        assert_eq!(config.batch.value, "7");
        assert_eq!(config.batch.source, ConfigSource::Cli);
        assert_eq!(config.workspace.source, ConfigSource::Default);
    }

    #[test]
    fn test_resolve_derives_paths_from_batch() {
        let mut config = LayeredConfig::with_defaults();
        config.workspace.update(PathBuf::from("/ws"), ConfigSource::Cli);
        config.batch.update("2".to_string(), ConfigSource::Cli);
        config.flow_direction.update(Some(PathBuf::from("dir.json")), ConfigSource::File);

        let run = config.resolve().unwrap();
        assert_eq!(run.flow_direction_path().unwrap(), Path::new("/ws/dir.json"));
        assert_eq!(run.catchments_dir(DamDataset::Fhred), PathBuf::from("/ws/fhred_catch2"));
        assert_eq!(run.pour_points_dir(), PathBuf::from("/ws/fhred_rivs2"));
        assert_eq!(run.results_path(DamDataset::Grand), PathBuf::from("/ws/grand_stats2.jsonl"));
        assert_eq!(
            run.merged_path(DamDataset::Grand),
            PathBuf::from("/ws/merged/grand_results2.geojson")
        );
        assert!(matches!(
            run.flow_accumulation_path(),
            Err(DamshedError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let mut config = LayeredConfig::with_defaults();
        config.focal_window.update(4, ConfigSource::File);
        assert!(config.resolve().is_err());

        let mut config = LayeredConfig::with_defaults();
        config.batch.update("../x".to_string(), ConfigSource::Cli);
        assert!(config.resolve().is_err());

        let mut config = LayeredConfig::with_defaults();
        config.area_tolerance.update(0.0, ConfigSource::File);
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_variables_default_to_source_fields() {
        let mut config = LayeredConfig::with_defaults();
        config.variable_sources.update(
            vec![
                VariableSource { path: PathBuf::from("hydro.geojson"), fields: vec!["RC1_O3".into()] },
                VariableSource { path: PathBuf::from("chg.geojson"), fields: vec!["RC1_O3rc".into()] },
            ],
            ConfigSource::File,
        );

        let run = config.resolve().unwrap();
        assert_eq!(run.variables, vec!["RC1_O3", "RC1_O3rc"]);
        assert_eq!(run.tracked_variables().unwrap().record_len(), 3);
    }

    #[test]
    fn test_inspection_map() {
        let config = LayeredConfig::with_defaults();
        let map = config.to_inspection_map();

        assert!(map.contains_key("workspace"));
        assert!(map.contains_key("flow_direction"));
        assert!(map.contains_key("sentinel"));

        let (value, source) = &map["flow_direction"];
        assert_eq!(value, "(unset)");
        assert_eq!(*source, ConfigSource::Default);
    }
}
