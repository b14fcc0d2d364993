//! Court and complex records.
//!
//! `ComplexRecord` is the persisted document (one per complex, holding every
//! court). `CourtRegion` is the session-scoped view the tracker works with:
//! only configured courts with region points become regions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{CourtError, Result};
use crate::geometry::{Point, Polygon};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourtStatus {
    Available,
    InUse,
}

impl CourtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourtStatus::Available => "available",
            CourtStatus::InUse => "in-use",
        }
    }

    pub fn from_occupied(occupied: bool) -> Self {
        if occupied {
            CourtStatus::InUse
        } else {
            CourtStatus::Available
        }
    }
}

impl fmt::Display for CourtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourtStatus {
    type Err = CourtError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(CourtStatus::Available),
            "in-use" => Ok(CourtStatus::InUse),
            other => Err(CourtError::config(format!("unknown court status '{}'", other))),
        }
    }
}

/// Normalized region vertex as stored on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointData {
    pub x: f32,
    pub y: f32,
}

impl From<PointData> for Point {
    fn from(p: PointData) -> Self {
        Point::new(p.x, p.y)
    }
}

impl From<Point> for PointData {
    fn from(p: Point) -> Self {
        PointData { x: p.x, y: p.y }
    }
}

/// One court inside a complex document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtRecord {
    pub name: String,
    pub status: CourtStatus,
    pub is_configured: bool,
    #[serde(default)]
    pub surface: String,
    #[serde(default)]
    pub region_points: Option<Vec<PointData>>,
    #[serde(default)]
    pub last_updated_status: i64,
}

impl CourtRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CourtStatus::Available,
            is_configured: false,
            surface: String::new(),
            region_points: None,
            last_updated_status: 0,
        }
    }

    /// Configured and carrying at least one region point.
    pub fn is_watchable(&self) -> bool {
        self.is_configured
            && self
                .region_points
                .as_ref()
                .is_some_and(|points| !points.is_empty())
    }
}

/// On-disk document body. The id lives outside the body (row key).
#[derive(Debug, Serialize, Deserialize)]
struct ComplexDocument {
    name: String,
    courts: Vec<CourtRecord>,
}

/// A tennis complex and all of its courts.
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexRecord {
    pub id: String,
    pub name: String,
    pub courts: Vec<CourtRecord>,
}

impl ComplexRecord {
    /// Parse and validate a stored document.
    pub fn from_json(id: &str, json: &str) -> Result<Self> {
        let doc: ComplexDocument = serde_json::from_str(json)
            .map_err(|e| CourtError::config(format!("complex {}: {}", id, e)))?;
        let record = Self {
            id: id.to_string(),
            name: doc.name,
            courts: doc.courts,
        };
        record.validate()?;
        Ok(record)
    }

    /// Serialize the document body (without the id).
    pub fn to_json(&self) -> Result<String> {
        let doc = ComplexDocument {
            name: self.name.clone(),
            courts: self.courts.clone(),
        };
        serde_json::to_string(&doc)
            .map_err(|e| CourtError::config(format!("complex {}: {}", self.id, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CourtError::config("complex id must not be empty"));
        }
        let mut seen = HashSet::new();
        for court in &self.courts {
            if court.name.trim().is_empty() {
                return Err(CourtError::config(format!(
                    "complex {}: court name must not be empty",
                    self.id
                )));
            }
            if !seen.insert(court.name.as_str()) {
                return Err(CourtError::config(format!(
                    "complex {}: duplicate court name '{}'",
                    self.id, court.name
                )));
            }
            if let Some(points) = &court.region_points {
                if let Some(bad) = points.iter().find(|p| !is_normalized(p)) {
                    return Err(CourtError::config(format!(
                        "complex {}: court '{}' has point ({}, {}) outside [0,1]",
                        self.id, court.name, bad.x, bad.y
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn court(&self, name: &str) -> Option<&CourtRecord> {
        self.courts.iter().find(|c| c.name == name)
    }

    pub fn court_mut(&mut self, name: &str) -> Option<&mut CourtRecord> {
        self.courts.iter_mut().find(|c| c.name == name)
    }

    pub fn has_unconfigured_courts(&self) -> bool {
        self.courts.iter().any(|c| !c.is_configured)
    }

    /// Regions for every watchable court, in document order.
    pub fn configured_regions(&self) -> Vec<CourtRegion> {
        self.courts
            .iter()
            .filter(|c| c.is_watchable())
            .map(|c| CourtRegion {
                name: c.name.clone(),
                polygon: Polygon::new(
                    c.region_points
                        .iter()
                        .flatten()
                        .map(|p| Point::from(*p))
                        .collect(),
                ),
            })
            .collect()
    }
}

/// A configured court polygon in normalized coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct CourtRegion {
    pub name: String,
    pub polygon: Polygon,
}

fn is_normalized(p: &PointData) -> bool {
    p.x.is_finite() && p.y.is_finite() && (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)
}

/// Validate region points before they are saved for a court.
pub fn validate_region(points: &[PointData]) -> Result<()> {
    if points.len() < 3 {
        return Err(CourtError::region(format!(
            "a court region needs at least 3 points, got {}",
            points.len()
        )));
    }
    if let Some(bad) = points.iter().find(|p| !is_normalized(p)) {
        return Err(CourtError::region(format!(
            "point ({}, {}) is outside the normalized range [0,1]",
            bad.x, bad.y
        )));
    }
    let polygon = Polygon::new(points.iter().map(|p| Point::from(*p)).collect());
    if polygon.is_self_intersecting() {
        return Err(CourtError::region("region edges cross each other"));
    }
    Ok(())
}

/// Parse `"x,y;x,y;..."` into region points.
pub fn parse_points(raw: &str) -> Result<Vec<PointData>> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| CourtError::region(format!("expected 'x,y', got '{}'", pair)))?;
            let x: f32 = x
                .trim()
                .parse()
                .map_err(|_| CourtError::region(format!("invalid x in '{}'", pair)))?;
            let y: f32 = y
                .trim()
                .parse()
                .map_err(|_| CourtError::region(format!("invalid y in '{}'", pair)))?;
            Ok(PointData { x, y })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "name": "Riverside Tennis Club",
        "courts": [
            {
                "name": "Court 1",
                "status": "available",
                "isConfigured": true,
                "surface": "clay",
                "regionPoints": [{"x": 0.1, "y": 0.1}, {"x": 0.5, "y": 0.1}, {"x": 0.5, "y": 0.9}],
                "lastUpdatedStatus": 1700000000000
            },
            {
                "name": "Court 2",
                "status": "in-use",
                "isConfigured": false
            },
            {
                "name": "Court 3",
                "status": "available",
                "isConfigured": true,
                "regionPoints": []
            }
        ]
    }"#;

    #[test]
    fn parses_document_with_defaults() {
        let complex = ComplexRecord::from_json("riverside", DOC).unwrap();
        assert_eq!(complex.name, "Riverside Tennis Club");
        assert_eq!(complex.courts.len(), 3);

        let court2 = complex.court("Court 2").unwrap();
        assert_eq!(court2.status, CourtStatus::InUse);
        assert_eq!(court2.surface, "");
        assert!(court2.region_points.is_none());
        assert_eq!(court2.last_updated_status, 0);
        assert!(complex.has_unconfigured_courts());
    }

    #[test]
    fn only_watchable_courts_become_regions() {
        let complex = ComplexRecord::from_json("riverside", DOC).unwrap();
        let regions = complex.configured_regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "Court 1");
        assert_eq!(regions[0].polygon.len(), 3);
    }

    #[test]
    fn missing_required_field_is_config_error() {
        let json = r#"{"name": "x", "courts": [{"name": "c", "status": "available"}]}"#;
        let err = ComplexRecord::from_json("x", json).unwrap_err();
        assert!(matches!(err, CourtError::ConfigLoadError(_)));
    }

    #[test]
    fn unknown_status_is_config_error() {
        let json = r#"{"name": "x", "courts": [{"name": "c", "status": "closed", "isConfigured": true}]}"#;
        assert!(matches!(
            ComplexRecord::from_json("x", json),
            Err(CourtError::ConfigLoadError(_))
        ));
    }

    #[test]
    fn duplicate_court_names_rejected() {
        let json = r#"{"name": "x", "courts": [
            {"name": "c", "status": "available", "isConfigured": false},
            {"name": "c", "status": "available", "isConfigured": false}
        ]}"#;
        assert!(matches!(
            ComplexRecord::from_json("x", json),
            Err(CourtError::ConfigLoadError(_))
        ));
    }

    #[test]
    fn out_of_range_point_rejected() {
        let json = r#"{"name": "x", "courts": [
            {"name": "c", "status": "available", "isConfigured": true,
             "regionPoints": [{"x": 1.5, "y": 0.2}]}
        ]}"#;
        assert!(matches!(
            ComplexRecord::from_json("x", json),
            Err(CourtError::ConfigLoadError(_))
        ));
    }

    #[test]
    fn json_round_trip_preserves_camel_case() {
        let complex = ComplexRecord::from_json("riverside", DOC).unwrap();
        let json = complex.to_json().unwrap();
        assert!(json.contains("\"isConfigured\":true"));
        assert!(json.contains("\"lastUpdatedStatus\":1700000000000"));
        assert!(json.contains("\"status\":\"in-use\""));
        assert_eq!(ComplexRecord::from_json("riverside", &json).unwrap(), complex);
    }

    #[test]
    fn status_strings() {
        assert_eq!("in-use".parse::<CourtStatus>().unwrap(), CourtStatus::InUse);
        assert_eq!(CourtStatus::Available.to_string(), "available");
        assert_eq!(CourtStatus::from_occupied(true), CourtStatus::InUse);
        assert!("busy".parse::<CourtStatus>().is_err());
    }

    #[test]
    fn region_validation() {
        let square = parse_points("0.1,0.1; 0.9,0.1; 0.9,0.9; 0.1,0.9").unwrap();
        assert!(validate_region(&square).is_ok());

        let bow_tie = parse_points("0.1,0.1;0.9,0.9;0.9,0.1;0.1,0.9").unwrap();
        assert!(matches!(
            validate_region(&bow_tie),
            Err(CourtError::InvalidRegion(_))
        ));

        let too_few = parse_points("0.1,0.1;0.9,0.9").unwrap();
        assert!(validate_region(&too_few).is_err());

        let outside = parse_points("0.1,0.1;1.9,0.1;0.5,0.5").unwrap();
        assert!(validate_region(&outside).is_err());

        assert!(parse_points("0.1;0.2").is_err());
    }
}
