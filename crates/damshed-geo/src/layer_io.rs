//! GeoJSON vector layer reading and writing.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{VectorFeature, VectorLayer};
use geojson::{Feature, FeatureCollection, GeoJson};
use std::fs;
use std::path::Path;

/// Read a GeoJSON file into a vector layer.
///
/// A FeatureCollection yields one feature per entry, a bare Feature or
/// Geometry yields a single feature. Geometries that cannot be converted
/// (e.g. empty coordinates) are kept as features without geometry.
pub fn read_layer(path: &Path) -> Result<VectorLayer> {
    let content = fs::read_to_string(path)?;

    let geojson: GeoJson = content.parse().map_err(|e| {
        DamshedError::Serialization(format!("Failed to parse GeoJSON {}: {}", path.display(), e))
    })?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .enumerate()
            .map(|(idx, feature)| convert_feature(feature, idx))
            .collect(),
        GeoJson::Feature(feature) => vec![convert_feature(feature, 0)],
        GeoJson::Geometry(geometry) => vec![convert_feature(
            Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            },
            0,
        )],
    };

    Ok(VectorLayer::new(name, features))
}

/// Write a vector layer as a GeoJSON FeatureCollection
pub fn write_layer(path: &Path, layer: &VectorLayer) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let features = layer
        .features
        .iter()
        .map(|feature| Feature {
            bbox: None,
            geometry: feature
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: feature.id.clone().map(geojson::feature::Id::String),
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    let collection = FeatureCollection { bbox: None, features, foreign_members: None };
    let json = serde_json::to_string_pretty(&GeoJson::FeatureCollection(collection))
        .map_err(|e| DamshedError::Serialization(format!("Failed to serialize GeoJSON: {}", e)))?;

    let tmp = path.with_extension("geojson.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn convert_feature(feature: Feature, idx: usize) -> VectorFeature {
    let id = feature
        .id
        .map(|id| match id {
            geojson::feature::Id::String(s) => s,
            geojson::feature::Id::Number(n) => n.to_string(),
        })
        .or_else(|| Some(format!("#{}", idx)));

    let geometry = feature.geometry.and_then(|g| match geo::Geometry::<f64>::try_from(g) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            tracing::warn!(feature = idx, "Dropping unconvertible geometry: {}", e);
            None
        }
    });

    VectorFeature { id, geometry, properties: feature.properties.unwrap_or_default() }
}
