//! Shared run inputs and per-batch stores of a workspace.

use anyhow::{Context, Result};
use damshed_core::config::RunConfig;
use damshed_core::models::{Dam, DamDataset, DamId};
use damshed_geo::layer_io::read_layer;
use damshed_geo::raster_io::read_raster;
use damshed_pipeline::{AreaGrid, RunContext, RunSettings};
use damshed_store::FileRasterStore;
use std::collections::{HashMap, HashSet};

/// File name prefix of catchment rasters
pub const CATCHMENT_PREFIX: &str = "shed_";

/// File name prefix of reach-derived pour point rasters
pub const POUR_POINT_PREFIX: &str = "rivs_";

/// Dams loaded from one dataset
#[derive(Debug, Default)]
pub struct DamSet {
    pub dams: Vec<Dam>,
    /// Labels of records that could not be turned into a dam
    pub rejected: Vec<String>,
}

impl DamSet {
    pub fn reported_areas(&self) -> HashMap<DamId, f64> {
        self.dams
            .iter()
            .filter_map(|dam| dam.reported_area_km2.map(|area| (dam.id.clone(), area)))
            .collect()
    }
}

/// Run context over the flow direction grid alone
pub fn open_context(config: &RunConfig) -> Result<RunContext> {
    let path = config.flow_direction_path()?;
    let flow_direction = read_raster(path)
        .with_context(|| format!("Failed to read flow direction grid {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        rows = flow_direction.window.rows,
        cols = flow_direction.window.cols,
        "Loaded flow direction grid"
    );

    Ok(RunContext::new(flow_direction, RunSettings::from(config)))
}

/// Attach flow accumulation and the reach layer needed by reach-based pour points
pub fn attach_reach_network(context: RunContext, config: &RunConfig) -> Result<RunContext> {
    let acc_path = config.flow_accumulation_path()?;
    let accumulation = read_raster(acc_path)
        .with_context(|| format!("Failed to read flow accumulation grid {}", acc_path.display()))?;

    let reach_path = config.reaches_path()?;
    let reaches = read_layer(reach_path)
        .with_context(|| format!("Failed to read reach layer {}", reach_path.display()))?;
    tracing::info!(path = %reach_path.display(), reaches = reaches.len(), "Loaded reach layer");

    Ok(context
        .with_flow_accumulation(accumulation)
        .with_context(|| format!("Flow accumulation grid {} does not fit the run grid", acc_path.display()))?
        .with_reaches(reaches))
}

/// Load the dams of a dataset, dropping records that cannot be used
pub fn load_dams(config: &RunConfig, dataset: DamDataset) -> Result<DamSet> {
    let path = config.dams_path(dataset)?;
    let layer = read_layer(path)
        .with_context(|| format!("Failed to read {} dams from {}", dataset.name(), path.display()))?;

    let mut set = DamSet::default();
    let mut seen = HashSet::new();

    for feature in &layer.features {
        match Dam::from_feature(feature, dataset) {
            Ok(dam) if !seen.insert(dam.id.clone()) => {
                tracing::warn!(dam_id = %dam.id, dataset = dataset.name(), "Duplicate dam id, keeping the first record");
                set.rejected.push(feature.label());
            }
            Ok(dam) => set.dams.push(dam),
            Err(e) => {
                tracing::warn!(feature = %feature.label(), dataset = dataset.name(), "Skipping dam record: {}", e);
                set.rejected.push(feature.label());
            }
        }
    }

    tracing::info!(
        dataset = dataset.name(),
        dams = set.dams.len(),
        rejected = set.rejected.len(),
        "Loaded dam points"
    );
    Ok(set)
}

pub fn catchment_store(config: &RunConfig, dataset: DamDataset) -> Result<FileRasterStore> {
    Ok(FileRasterStore::with_prefix(config.catchments_dir(dataset), CATCHMENT_PREFIX)?)
}

pub fn pour_point_store(config: &RunConfig) -> Result<FileRasterStore> {
    Ok(FileRasterStore::with_prefix(config.pour_points_dir(), POUR_POINT_PREFIX)?)
}

pub fn variable_store(config: &RunConfig) -> Result<FileRasterStore> {
    Ok(FileRasterStore::open(config.variables_dir())?)
}

/// Pixel area source: the configured grid, or geodesic cell areas
pub fn area_grid(config: &RunConfig, context: &RunContext) -> Result<AreaGrid> {
    match &config.pixel_area {
        Some(path) => {
            let raster = read_raster(path)
                .with_context(|| format!("Failed to read pixel area grid {}", path.display()))?;
            let raster = context
                .align(raster)
                .with_context(|| format!("Pixel area grid {} does not fit the run grid", path.display()))?;
            Ok(AreaGrid::Raster(raster))
        }
        None => {
            tracing::info!("No pixel_area grid configured, using geodesic cell areas");
            Ok(AreaGrid::Geodesic)
        }
    }
}
