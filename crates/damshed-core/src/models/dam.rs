//! Dam records, river reaches and per-dataset identifier normalization.
//!
//! Dam point datasets disagree on how identifiers are stored. GRanD keeps a
//! plain integer, FHReD keeps a floating point value whose string form carries
//! a trailing `.0`. Both are normalized here to a bare decimal string so that
//! catchment rasters, results-store keys and retry lists agree.

use geo::{Geometry, LineString, MultiLineString, Point};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::layer::VectorFeature;
use crate::error::{DamshedError, Result};

/// Normalized dam identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DamId(String);

impl DamId {
    /// Wrap an already-normalized identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a river reach in the reach layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReachId(pub u64);

impl fmt::Display for ReachId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source dataset of a dam point file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamDataset {
    /// Dams aligned to the river network; delineated from their own location
    Grand,
    /// Dams resolved through their associated river reach
    Fhred,
}

impl DamDataset {
    pub fn name(&self) -> &'static str {
        match self {
            DamDataset::Grand => "GRanD",
            DamDataset::Fhred => "FHReD",
        }
    }

    /// Attribute holding the dam identifier
    pub fn id_field(&self) -> &'static str {
        match self {
            DamDataset::Grand => "GRAND_ID",
            DamDataset::Fhred => "DAM_ID",
        }
    }

    /// Attribute linking the dam to its river reach, if the dataset has one
    pub fn reach_field(&self) -> Option<&'static str> {
        match self {
            DamDataset::Grand => None,
            DamDataset::Fhred => Some("GOID"),
        }
    }

    /// Attribute holding the reported upstream area in km²
    pub fn reported_area_field(&self) -> &'static str {
        match self {
            DamDataset::Grand => "CATCH_SKM",
            DamDataset::Fhred => "UPLAND_SKM",
        }
    }

    /// Normalize a raw identifier attribute value
    pub fn normalize_id(&self, raw: &Value) -> Result<DamId> {
        match raw {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    return Ok(DamId(v.to_string()));
                }
                match n.as_f64() {
                    Some(v) => integral_to_id(v).ok_or_else(|| {
                        self.invalid(raw.to_string(), "expected a non-negative whole number")
                    }),
                    None => Err(self.invalid(raw.to_string(), "not a finite number")),
                }
            }
            Value::String(s) => self.normalize_str(s),
            other => Err(self.invalid(other.to_string(), "expected a number or string")),
        }
    }

    /// Normalize an identifier given as text
    pub fn normalize_str(&self, raw: &str) -> Result<DamId> {
        let trimmed = raw.trim();
        let digits = match self {
            DamDataset::Grand => trimmed,
            // FHReD ids are floats rendered with a ".0" suffix
            DamDataset::Fhred => trimmed.strip_suffix(".0").unwrap_or(trimmed),
        };

        if digits.is_empty() {
            return Err(self.invalid(raw, "identifier is empty"));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(self.invalid(raw, "identifier must be a whole number"));
        }

        // Same canonical text as the numeric form: "007" and 7 are one dam
        let canonical = digits.trim_start_matches('0');
        let canonical = if canonical.is_empty() { "0" } else { canonical };
        Ok(DamId(canonical.to_string()))
    }

    fn invalid(&self, raw: impl Into<String>, reason: &str) -> DamshedError {
        DamshedError::InvalidIdentifier {
            dataset: self.name().to_string(),
            raw: raw.into(),
            reason: reason.to_string(),
        }
    }
}

fn integral_to_id(v: f64) -> Option<DamId> {
    // 2^53: beyond this f64 no longer holds every integer
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= 9_007_199_254_740_992.0 {
        Some(DamId(format!("{}", v as u64)))
    } else {
        None
    }
}

/// A dam point record
#[derive(Debug, Clone, PartialEq)]
pub struct Dam {
    pub id: DamId,
    pub dataset: DamDataset,
    pub location: Point<f64>,
    pub reach: Option<ReachId>,
    /// Reported catchment area, used only for plausibility reporting
    pub reported_area_km2: Option<f64>,
}

impl Dam {
    /// Build a dam record from a point feature of the given dataset
    pub fn from_feature(feature: &VectorFeature, dataset: DamDataset) -> Result<Self> {
        let label = feature.label();

        let raw_id = feature.properties.get(dataset.id_field()).ok_or_else(|| {
            DamshedError::MissingAttribute {
                feature_id: label.clone(),
                field: dataset.id_field().to_string(),
            }
        })?;
        let id = dataset.normalize_id(raw_id)?;

        let location = match &feature.geometry {
            Some(Geometry::Point(p)) => *p,
            Some(Geometry::MultiPoint(mp)) if mp.0.len() == 1 => mp.0[0],
            Some(_) => {
                return Err(DamshedError::InvalidGeometry {
                    feature_id: id.to_string(),
                    reason: "dam geometry must be a single point".to_string(),
                })
            }
            None => {
                return Err(DamshedError::InvalidGeometry {
                    feature_id: id.to_string(),
                    reason: "dam has no geometry".to_string(),
                })
            }
        };

        if !location.x().is_finite() || !location.y().is_finite() {
            return Err(DamshedError::InvalidGeometry {
                feature_id: id.to_string(),
                reason: "coordinates must be finite".to_string(),
            });
        }

        let reach = match dataset.reach_field() {
            Some(field) => feature.number(field).and_then(|v| {
                if v >= 0.0 && v.fract() == 0.0 {
                    Some(ReachId(v as u64))
                } else {
                    None
                }
            }),
            None => None,
        };

        let reported_area_km2 = feature
            .number(dataset.reported_area_field())
            .filter(|v| v.is_finite() && *v > 0.0);

        Ok(Self {
            id,
            dataset,
            location,
            reach,
            reported_area_km2,
        })
    }
}

/// A river reach from the reach layer
#[derive(Debug, Clone, PartialEq)]
pub struct RiverReach {
    pub id: ReachId,
    pub geometry: MultiLineString<f64>,
}

impl RiverReach {
    /// Build a reach from a line feature
    pub fn from_feature(feature: &VectorFeature, id: ReachId) -> Result<Self> {
        let geometry = match &feature.geometry {
            Some(Geometry::LineString(ls)) => MultiLineString::new(vec![ls.clone()]),
            Some(Geometry::MultiLineString(mls)) => mls.clone(),
            _ => {
                return Err(DamshedError::InvalidGeometry {
                    feature_id: id.to_string(),
                    reason: "reach geometry must be a (multi)linestring".to_string(),
                })
            }
        };

        if geometry.0.iter().all(|ls: &LineString<f64>| ls.0.len() < 2) {
            return Err(DamshedError::InvalidGeometry {
                feature_id: id.to_string(),
                reason: "reach has fewer than two vertices".to_string(),
            });
        }

        Ok(Self { id, geometry })
    }
}

/// Parse an operator-supplied retry list.
///
/// One identifier per line or comma separated; blank lines and `#` comments
/// are ignored. Identifiers follow the FHReD normalization rules and are
/// returned in first-seen order without duplicates.
pub fn parse_retry_list(text: &str) -> Result<Vec<DamId>> {
    let mut ids: Vec<DamId> = Vec::new();

    for line in text.lines() {
        let content = line.split('#').next().unwrap_or("");
        for token in content.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let id = DamDataset::Fhred.normalize_str(token)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    Ok(ids)
}
