//! Joins stored statistics back into the authoritative dam point dataset.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{DamDataset, VectorLayer};
use damshed_core::ports::ResultsStore;
use damshed_geo::layer_io::write_layer;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of a merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Rows whose result fields were overwritten
    pub updated: usize,
    /// Rows without stored statistics, left as they were
    pub untouched: usize,
    /// Row labels whose identifier could not be normalized
    pub invalid_ids: Vec<String>,
}

pub struct ResultsMerger<'a, R>
where
    R: ResultsStore,
{
    results: &'a R,
    dataset: DamDataset,
}

impl<'a, R> ResultsMerger<'a, R>
where
    R: ResultsStore,
{
    pub fn new(results: &'a R, dataset: DamDataset) -> Self {
        Self { results, dataset }
    }

    /// Every stored vector must match the field schema before any row changes
    pub fn check_shapes(&self) -> Result<()> {
        let expected = self.results.variables().record_len();
        for dam_id in self.results.ids() {
            if let Some(record) = self.results.get(&dam_id) {
                if record.len() != expected {
                    return Err(DamshedError::ShapeMismatch {
                        dam_id: dam_id.to_string(),
                        expected,
                        actual: record.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Overwrite the result fields of every row with stored statistics
    pub fn merge(&self, layer: &mut VectorLayer) -> Result<MergeSummary> {
        self.check_shapes()?;

        let fields = self.results.variables().field_names();
        let id_field = self.dataset.id_field();
        let mut summary = MergeSummary::default();

        for feature in &mut layer.features {
            let dam_id = match feature.properties.get(id_field).map(|raw| self.dataset.normalize_id(raw)) {
                Some(Ok(dam_id)) => dam_id,
                Some(Err(e)) => {
                    tracing::warn!(feature = %feature.label(), "Row left untouched: {}", e);
                    summary.invalid_ids.push(feature.label());
                    continue;
                }
                None => {
                    tracing::warn!(feature = %feature.label(), field = id_field, "Row has no identifier");
                    summary.invalid_ids.push(feature.label());
                    continue;
                }
            };

            let Some(record) = self.results.get(&dam_id) else {
                tracing::debug!(dam_id = %dam_id, "No stored statistics");
                summary.untouched += 1;
                continue;
            };

            for (field, value) in fields.iter().zip(record.values()) {
                feature.set_number(field, *value);
            }
            summary.updated += 1;
        }

        tracing::info!(
            updated = summary.updated,
            untouched = summary.untouched,
            invalid = summary.invalid_ids.len(),
            "Merged statistics into {}",
            layer.name
        );
        Ok(summary)
    }

    /// Merge into a copy of `layer` and write it as GeoJSON
    pub fn merge_to_file(&self, layer: &VectorLayer, output: &Path) -> Result<MergeSummary> {
        let mut merged = layer.clone();
        let summary = self.merge(&mut merged)?;
        write_layer(output, &merged)?;
        Ok(summary)
    }
}
