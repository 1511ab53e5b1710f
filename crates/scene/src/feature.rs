use std::collections::BTreeMap;

use foundation::math::{LngLat, close_ring, is_ring_closed};
use foundation::{FeatureId, LngLatBounds, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Point,
    LineString,
    Polygon,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Point => "Point",
            FeatureKind::LineString => "LineString",
            FeatureKind::Polygon => "Polygon",
        }
    }
}

/// Primitive property value. Numbers keep their JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value.into())
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(LngLat),
    LineString(Vec<LngLat>),
    /// First ring is the outer boundary, the rest are holes.
    Polygon(Vec<Vec<LngLat>>),
}

impl Geometry {
    pub fn kind(&self) -> FeatureKind {
        match self {
            Geometry::Point(_) => FeatureKind::Point,
            Geometry::LineString(_) => FeatureKind::LineString,
            Geometry::Polygon(_) => FeatureKind::Polygon,
        }
    }

    pub fn positions(&self) -> Box<dyn Iterator<Item = &LngLat> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::LineString(line) => Box::new(line.iter()),
            Geometry::Polygon(rings) => Box::new(rings.iter().flatten()),
        }
    }

    pub fn bounds(&self) -> Option<LngLatBounds> {
        LngLatBounds::from_points(self.positions())
    }

    /// Checks coordinate counts and repairs unclosed polygon rings in place.
    ///
    /// On error the geometry may have been partially repaired; callers
    /// validate a copy.
    pub fn normalize(&mut self) -> Result<(), FeatureError> {
        if let Some(bad) = self.positions().find(|p| !p.is_valid()) {
            return Err(FeatureError::InvalidGeometry(format!(
                "invalid coordinate [{}, {}]",
                bad.lng, bad.lat
            )));
        }
        match self {
            Geometry::Point(_) => Ok(()),
            Geometry::LineString(line) => {
                if line.len() < 2 {
                    return Err(FeatureError::InvalidGeometry(format!(
                        "LineString needs at least 2 positions, got {}",
                        line.len()
                    )));
                }
                Ok(())
            }
            Geometry::Polygon(rings) => {
                if rings.is_empty() {
                    return Err(FeatureError::InvalidGeometry(
                        "Polygon needs an outer ring".to_string(),
                    ));
                }
                for (idx, ring) in rings.iter_mut().enumerate() {
                    if !is_ring_closed(ring) {
                        close_ring(ring);
                    }
                    // Three distinct corners plus the closing position.
                    if ring.len() < 4 {
                        return Err(FeatureError::InvalidGeometry(format!(
                            "Polygon ring {idx} needs at least 3 distinct positions"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Coordinates as they appear in snapshots and GeoJSON, nested by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Coordinates {
    Point(LngLat),
    Line(Vec<LngLat>),
    Rings(Vec<Vec<LngLat>>),
}

impl Coordinates {
    pub(crate) fn into_geometry(self, kind: FeatureKind) -> Result<Geometry, FeatureError> {
        match (kind, self) {
            (FeatureKind::Point, Coordinates::Point(p)) => Ok(Geometry::Point(p)),
            (FeatureKind::LineString, Coordinates::Line(line)) => Ok(Geometry::LineString(line)),
            (FeatureKind::Polygon, Coordinates::Rings(rings)) => Ok(Geometry::Polygon(rings)),
            // An empty array parses as a line whatever the kind.
            (FeatureKind::Polygon, Coordinates::Line(line)) if line.is_empty() => {
                Ok(Geometry::Polygon(Vec::new()))
            }
            (kind, _) => Err(FeatureError::InvalidGeometry(format!(
                "coordinates do not match kind {}",
                kind.as_str()
            ))),
        }
    }
}

impl From<&Geometry> for Coordinates {
    fn from(value: &Geometry) -> Self {
        match value {
            Geometry::Point(p) => Coordinates::Point(*p),
            Geometry::LineString(line) => Coordinates::Line(line.clone()),
            Geometry::Polygon(rings) => Coordinates::Rings(rings.clone()),
        }
    }
}

/// A drawn geometry tracked by the [`crate::FeatureStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeatureRecord", into = "FeatureRecord")]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub properties: Properties,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Feature {
    pub fn kind(&self) -> FeatureKind {
        self.geometry.kind()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureRecord {
    id: FeatureId,
    kind: FeatureKind,
    coordinates: Coordinates,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    created_at: Timestamp,
    #[serde(default)]
    updated_at: Timestamp,
}

impl TryFrom<FeatureRecord> for Feature {
    type Error = FeatureError;

    fn try_from(value: FeatureRecord) -> Result<Self, Self::Error> {
        Ok(Feature {
            geometry: value.coordinates.into_geometry(value.kind)?,
            id: value.id,
            properties: value.properties,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl From<Feature> for FeatureRecord {
    fn from(value: Feature) -> Self {
        FeatureRecord {
            id: value.id,
            kind: value.geometry.kind(),
            coordinates: Coordinates::from(&value.geometry),
            properties: value.properties,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Input to [`crate::FeatureStore::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDraft {
    /// Engine-assigned id, adopted when present.
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl FeatureDraft {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: Properties::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<FeatureId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Partial update for [`crate::FeatureStore::update`].
///
/// Properties are merged key by key; a geometry replaces the stored one and
/// must keep the feature's kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaturePatch {
    pub geometry: Option<Geometry>,
    pub properties: Properties,
}

impl FeaturePatch {
    pub fn geometry(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: Properties::new(),
        }
    }

    pub fn property(key: &str, value: impl Into<PropertyValue>) -> Self {
        let mut properties = Properties::new();
        properties.insert(key.to_string(), value.into());
        Self {
            geometry: None,
            properties,
        }
    }
}
