//! Variable raster preparation and loading.
//!
//! Each tracked variable is burned once from its polygon source onto the run
//! grid and stored under the variable name. Aggregation then loads the whole
//! set and refuses to start if any raster is missing.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{TrackedVariables, VectorLayer};
use damshed_core::ports::{RasterEngine, RasterStore};
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::zonal::VariableSet;

/// Per-variable results of a build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableBuildSummary {
    pub built: Vec<String>,
    pub skipped: Vec<String>,
    /// Variable name and reason
    pub failed: Vec<(String, String)>,
}

pub struct VariableRasterBuilder<'a, E, S>
where
    E: RasterEngine,
    S: RasterStore,
{
    engine: &'a E,
    context: &'a RunContext,
    store: &'a S,
    force: bool,
}

impl<'a, E, S> VariableRasterBuilder<'a, E, S>
where
    E: RasterEngine,
    S: RasterStore,
{
    pub fn new(engine: &'a E, context: &'a RunContext, store: &'a S) -> Self {
        Self { engine, context, store, force: false }
    }

    /// Rebuild rasters that already exist
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Burn each of `fields` from `layer` into its own raster
    pub fn build(&self, layer: &VectorLayer, fields: &[String], summary: &mut VariableBuildSummary) -> Result<()> {
        for field in fields {
            if !self.force && self.store.exists(field)? {
                tracing::debug!(variable = %field, "Variable raster exists, skipping");
                summary.skipped.push(field.clone());
                continue;
            }

            match self.engine.rasterize_polygons(layer, field, self.context.alignment()) {
                Ok(raster) => {
                    self.store.replace(field, &raster)?;
                    tracing::info!(variable = %field, cells = raster.count(), "Built variable raster");
                    summary.built.push(field.clone());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(variable = %field, source = %layer.name, "Could not rasterize variable: {}", e);
                    summary.failed.push((field.clone(), e.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Load one raster per tracked variable, aligned to the run grid
pub fn load_variable_set<S: RasterStore>(
    store: &S,
    variables: &TrackedVariables,
    context: &RunContext,
) -> Result<VariableSet> {
    let mut missing = Vec::new();
    let mut rasters = Vec::with_capacity(variables.len());

    for name in variables.names() {
        match store.load(name)? {
            Some(raster) => rasters.push(context.align(raster)?),
            None => missing.push(name.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(DamshedError::ConfigMissing {
            key: format!("variable rasters ({})", missing.join(", ")),
        });
    }
    VariableSet::new(variables.clone(), rasters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunSettings;
    use damshed_core::models::{GridAlignment, GridWindow, Raster, VectorFeature};
    use damshed_geo::GridEngine;
    use damshed_store::MemoryRasterStore;
    use geo::{polygon, Geometry};
    use serde_json::json;

    fn context() -> RunContext {
        let grid = GridAlignment::new(0.0, 10.0, 1.0).unwrap();
        RunContext::new(Raster::filled(grid, GridWindow::new(0, 0, 10, 10), 4.0), RunSettings::default())
    }

    fn scenarios() -> VectorLayer {
        VectorLayer::new(
            "scenarios",
            vec![VectorFeature {
                id: Some("1".to_string()),
                geometry: Some(Geometry::Polygon(polygon![
                    (x: 0.0, y: 10.0),
                    (x: 2.0, y: 10.0),
                    (x: 2.0, y: 8.0),
                    (x: 0.0, y: 8.0),
                ])),
                properties: json!({ "RC1": 0.25, "RC2": 1.5 }).as_object().cloned().unwrap_or_default(),
            }],
        )
    }

    #[test]
    fn test_build_skips_existing_unless_forced() {
        let context = context();
        let engine = GridEngine::new();
        let store = MemoryRasterStore::new();
        let fields = vec!["RC1".to_string(), "RC2".to_string(), "RC10".to_string()];

        let mut summary = VariableBuildSummary::default();
        VariableRasterBuilder::new(&engine, &context, &store)
            .build(&scenarios(), &fields, &mut summary)
            .unwrap();
        assert_eq!(summary.built, vec!["RC1", "RC2"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(store.load("RC1").unwrap().unwrap().count(), 4);

        let mut again = VariableBuildSummary::default();
        VariableRasterBuilder::new(&engine, &context, &store)
            .build(&scenarios(), &fields[..2], &mut again)
            .unwrap();
        assert_eq!(again.skipped, vec!["RC1", "RC2"]);

        let mut forced = VariableBuildSummary::default();
        VariableRasterBuilder::new(&engine, &context, &store)
            .with_force(true)
            .build(&scenarios(), &fields[..1], &mut forced)
            .unwrap();
        assert_eq!(forced.built, vec!["RC1"]);
    }

    #[test]
    fn test_load_reports_missing_rasters() {
        let context = context();
        let store = MemoryRasterStore::new();
        store
            .create("RC1", &Raster::filled(*context.alignment(), GridWindow::new(0, 0, 1, 1), 1.0))
            .unwrap();

        let vars = TrackedVariables::new(["RC1", "RC2"]).unwrap();
        match load_variable_set(&store, &vars, &context) {
            Err(DamshedError::ConfigMissing { key }) => assert!(key.contains("RC2") && !key.contains("RC1,")),
            other => panic!("unexpected result: {:?}", other.map(|s| s.variables().len())),
        }

        let vars = TrackedVariables::new(["RC1"]).unwrap();
        assert_eq!(load_variable_set(&store, &vars, &context).unwrap().variables().len(), 1);
    }
}
