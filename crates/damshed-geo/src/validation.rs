use damshed_core::error::{DamshedError, Result};
use geo::Geometry;

/// Validation result with details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validation error with location details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub location: String,
    pub reason: String,
}

impl ValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    /// Add an error to the result
    pub fn add_error(&mut self, location: String, reason: String) {
        self.is_valid = false;
        self.errors.push(ValidationError { location, reason });
    }

    /// One-line description of the first problem found
    pub fn summary(&self) -> String {
        match self.errors.first() {
            Some(e) if self.errors.len() > 1 => {
                format!("{}: {} (+{} more)", e.location, e.reason, self.errors.len() - 1)
            }
            Some(e) => format!("{}: {}", e.location, e.reason),
            None => "valid".to_string(),
        }
    }

    fn absorb(&mut self, prefix: &str, other: ValidationResult) {
        for error in other.errors {
            self.add_error(format!("{}.{}", prefix, error.location), error.reason);
        }
    }
}

/// Validate a geometry's structure: finite coordinates, enough vertices, closed rings
pub fn validate_geometry(geometry: &Geometry<f64>) -> ValidationResult {
    match geometry {
        Geometry::Point(p) => validate_point(p),
        Geometry::LineString(ls) => validate_linestring(ls),
        Geometry::Polygon(poly) => validate_polygon(poly),
        Geometry::MultiPoint(mp) => {
            let mut result = ValidationResult::valid();
            for (i, point) in mp.0.iter().enumerate() {
                result.absorb(&format!("MultiPoint[{}]", i), validate_point(point));
            }
            result
        }
        Geometry::MultiLineString(mls) => {
            let mut result = ValidationResult::valid();
            for (i, linestring) in mls.0.iter().enumerate() {
                result.absorb(&format!("MultiLineString[{}]", i), validate_linestring(linestring));
            }
            result
        }
        Geometry::MultiPolygon(mp) => {
            let mut result = ValidationResult::valid();
            for (i, polygon) in mp.0.iter().enumerate() {
                result.absorb(&format!("MultiPolygon[{}]", i), validate_polygon(polygon));
            }
            result
        }
        other => {
            let mut result = ValidationResult::valid();
            result.add_error("Geometry".to_string(), format!("Unsupported geometry type {:?}", other));
            result
        }
    }
}

/// Fail with `InvalidGeometry` naming the feature when validation finds problems
pub fn ensure_valid(geometry: &Geometry<f64>, feature_id: &str) -> Result<()> {
    let validation = validate_geometry(geometry);
    if validation.is_valid {
        Ok(())
    } else {
        Err(DamshedError::InvalidGeometry {
            feature_id: feature_id.to_string(),
            reason: validation.summary(),
        })
    }
}

fn validate_point(point: &geo::Point<f64>) -> ValidationResult {
    let mut result = ValidationResult::valid();
    if !point.x().is_finite() || !point.y().is_finite() {
        result.add_error(
            format!("Point({}, {})", point.x(), point.y()),
            "Coordinates must be finite".to_string(),
        );
    }
    result
}

fn validate_linestring(linestring: &geo::LineString<f64>) -> ValidationResult {
    let mut result = ValidationResult::valid();

    // LineString must have at least 2 points
    if linestring.0.len() < 2 {
        result.add_error(
            "LineString".to_string(),
            format!("LineString must have at least 2 points, found {}", linestring.0.len()),
        );
        return result;
    }

    for (i, coord) in linestring.0.iter().enumerate() {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            result.add_error(format!("LineString[{}]", i), "Coordinates must be finite".to_string());
        }
    }

    result
}

fn validate_ring(location: String, ring: &geo::LineString<f64>, result: &mut ValidationResult) {
    if ring.0.len() < 4 {
        result.add_error(
            location.clone(),
            format!("Ring must have at least 4 points, found {}", ring.0.len()),
        );
    }

    if let (Some(first), Some(last)) = (ring.0.first(), ring.0.last()) {
        if first != last {
            result.add_error(
                location.clone(),
                "Ring must be closed (first point == last point)".to_string(),
            );
        }
    }

    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        result.add_error(location, "Coordinates must be finite".to_string());
    }
}

fn validate_polygon(polygon: &geo::Polygon<f64>) -> ValidationResult {
    let mut result = ValidationResult::valid();

    validate_ring("Polygon exterior".to_string(), polygon.exterior(), &mut result);
    for (i, interior) in polygon.interiors().iter().enumerate() {
        validate_ring(format!("Polygon interior[{}]", i), interior, &mut result);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiLineString, Point, Polygon};

    #[test]
    fn test_valid_polygon() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(validate_geometry(&Geometry::Polygon(polygon)).is_valid);
    }

    #[test]
    fn test_short_ring_is_invalid() {
        // geo closes rings on construction, so three distinct points is the minimum
        let polygon = Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]), vec![]);
        let result = validate_geometry(&Geometry::Polygon(polygon));
        assert!(!result.is_valid);
        assert!(result.summary().contains("at least 4 points"));
    }

    #[test]
    fn test_non_finite_point() {
        let result = validate_geometry(&Geometry::Point(Point::new(f64::NAN, 1.0)));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_multilinestring_reports_member() {
        let mls = MultiLineString::new(vec![
            LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
            LineString::from(vec![(2.0, 2.0)]),
        ]);
        let result = validate_geometry(&Geometry::MultiLineString(mls));
        assert!(!result.is_valid);
        assert!(result.errors[0].location.starts_with("MultiLineString[1]"));
    }

    #[test]
    fn test_ensure_valid_names_feature() {
        let err = ensure_valid(&Geometry::LineString(LineString::new(vec![])), "reach 7").unwrap_err();
        assert!(matches!(err, DamshedError::InvalidGeometry { feature_id, .. } if feature_id == "reach 7"));
    }
}
