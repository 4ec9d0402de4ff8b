//! Immutable run context shared by every pipeline component.

use damshed_core::config::RunConfig;
use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{GridAlignment, Raster, VectorLayer, DEFAULT_SENTINEL};

/// Numeric knobs of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub sentinel: f64,
    /// Focal window sum a reach cell must exceed to count as interior
    pub interior_threshold: f64,
    /// Side of the square focal window, in cells
    pub focal_window: usize,
    /// Relative deviation from the reported area tolerated before review
    pub area_tolerance: f64,
    /// Reach layer attribute matched against a dam's reach id
    pub reach_id_field: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL,
            interior_threshold: 2.0,
            focal_window: 3,
            area_tolerance: 0.5,
            reach_id_field: "OBJECTID".to_string(),
        }
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            sentinel: config.sentinel,
            interior_threshold: config.interior_threshold,
            focal_window: config.focal_window,
            area_tolerance: config.area_tolerance,
            reach_id_field: config.reach_id_field.clone(),
        }
    }
}

/// Read-only inputs of one run.
///
/// The flow direction grid fixes the alignment; every other grid is rebased
/// onto it when attached and rejected if it does not snap.
#[derive(Debug, Clone)]
pub struct RunContext {
    alignment: GridAlignment,
    flow_direction: Raster,
    flow_accumulation: Option<Raster>,
    reaches: Option<VectorLayer>,
    pub settings: RunSettings,
}

impl RunContext {
    pub fn new(flow_direction: Raster, settings: RunSettings) -> Self {
        Self {
            alignment: flow_direction.alignment,
            flow_direction,
            flow_accumulation: None,
            reaches: None,
            settings,
        }
    }

    pub fn with_flow_accumulation(mut self, raster: Raster) -> Result<Self> {
        self.flow_accumulation = Some(self.align(raster)?);
        Ok(self)
    }

    pub fn with_reaches(mut self, reaches: VectorLayer) -> Self {
        self.reaches = Some(reaches);
        self
    }

    pub fn alignment(&self) -> &GridAlignment {
        &self.alignment
    }

    pub fn flow_direction(&self) -> &Raster {
        &self.flow_direction
    }

    pub fn flow_accumulation(&self) -> Result<&Raster> {
        self.flow_accumulation
            .as_ref()
            .ok_or_else(|| DamshedError::ConfigMissing { key: "flow_accumulation".to_string() })
    }

    pub fn reaches(&self) -> Result<&VectorLayer> {
        self.reaches
            .as_ref()
            .ok_or_else(|| DamshedError::ConfigMissing { key: "reaches".to_string() })
    }

    /// Re-express a raster on the run alignment
    pub fn align(&self, raster: Raster) -> Result<Raster> {
        raster.rebase(&self.alignment)
    }
}
