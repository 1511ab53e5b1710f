//! GeoJSON interchange for drawn features.

use foundation::math::LngLat;
use foundation::{FeatureId, LngLatBounds};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::feature::{Coordinates, Feature, FeatureDraft, Geometry, Properties, PropertyValue};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoJsonError {
    #[error("not valid JSON: {0}")]
    Parse(String),
    #[error("not a GeoJSON object: {0}")]
    NotGeoJson(String),
}

/// Drafts recovered from a GeoJSON document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Import {
    pub drafts: Vec<FeatureDraft>,
    /// Geometries of unsupported type, or with malformed coordinates.
    pub skipped: usize,
}

impl Import {
    /// Bounds of every imported position, for framing the map.
    pub fn bounds(&self) -> Option<LngLatBounds> {
        LngLatBounds::from_points(self.drafts.iter().flat_map(|d| d.geometry.positions()))
    }
}

pub fn export_collection(features: &[Feature]) -> Value {
    let features: Vec<Value> = features.iter().map(export_feature).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

pub fn export_feature(feature: &Feature) -> Value {
    json!({
        "type": "Feature",
        "id": feature.id.as_str(),
        "geometry": {
            "type": feature.kind().as_str(),
            "coordinates": Coordinates::from(&feature.geometry),
        },
        "properties": feature.properties,
    })
}

pub fn import_str(text: &str) -> Result<Import, GeoJsonError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| GeoJsonError::Parse(e.to_string()))?;
    import_value(&value)
}

/// Accepts a `FeatureCollection`, a single `Feature` or a bare geometry.
pub fn import_value(value: &Value) -> Result<Import, GeoJsonError> {
    let ty = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeoJsonError::NotGeoJson("missing `type`".to_string()))?;

    let mut out = Import::default();
    match ty {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| GeoJsonError::NotGeoJson("missing `features`".to_string()))?;
            for f in features {
                import_feature(f, &mut out);
            }
        }
        "Feature" => import_feature(value, &mut out),
        _ => import_geometry(value, None, &Properties::new(), &mut out),
    }
    Ok(out)
}

fn import_feature(feature: &Value, out: &mut Import) {
    let id = match feature.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(FeatureId::new(s.clone())),
        Some(Value::Number(n)) => Some(FeatureId::new(n.to_string())),
        _ => None,
    };
    let properties = feature
        .get("properties")
        .and_then(Value::as_object)
        .map(properties_from_object)
        .unwrap_or_default();
    match feature.get("geometry") {
        Some(geometry) if !geometry.is_null() => {
            import_geometry(geometry, id, &properties, out)
        }
        _ => out.skipped += 1,
    }
}

/// Nested objects and arrays are kept as their JSON text.
pub fn properties_from_object(map: &Map<String, Value>) -> Properties {
    map.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::Null => PropertyValue::Null,
                Value::Bool(b) => PropertyValue::Bool(*b),
                Value::Number(n) => PropertyValue::Number(n.clone()),
                Value::String(s) => PropertyValue::String(s.clone()),
                other => PropertyValue::String(other.to_string()),
            };
            (k.clone(), value)
        })
        .collect()
}

fn import_geometry(
    geometry: &Value,
    id: Option<FeatureId>,
    properties: &Properties,
    out: &mut Import,
) {
    let ty = geometry.get("type").and_then(Value::as_str).unwrap_or("");
    if ty == "GeometryCollection" {
        let parts = geometry
            .get("geometries")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            import_geometry(part, None, properties, out);
        }
        return;
    }

    let coords = geometry.get("coordinates").unwrap_or(&Value::Null);
    let parts: Option<Vec<Geometry>> = match ty {
        "Point" => position(coords).map(|p| vec![Geometry::Point(p)]),
        "LineString" => line(coords).map(|l| vec![Geometry::LineString(l)]),
        "Polygon" => rings(coords).map(|r| vec![Geometry::Polygon(r)]),
        "MultiPoint" => {
            each(coords, position).map(|ps| ps.into_iter().map(Geometry::Point).collect())
        }
        "MultiLineString" => {
            each(coords, line).map(|ls| ls.into_iter().map(Geometry::LineString).collect())
        }
        "MultiPolygon" => {
            each(coords, rings).map(|ps| ps.into_iter().map(Geometry::Polygon).collect())
        }
        _ => None,
    };

    let Some(parts) = parts else {
        tracing::debug!(geometry_type = ty, "skipping unsupported geometry");
        out.skipped += 1;
        return;
    };
    // A feature id only survives when the geometry maps to one feature.
    let single = parts.len() == 1;
    for geometry in parts {
        out.drafts.push(FeatureDraft {
            id: if single { id.clone() } else { None },
            geometry,
            properties: properties.clone(),
        });
    }
}

fn position(v: &Value) -> Option<LngLat> {
    let arr = v.as_array()?;
    if arr.len() < 2 {
        return None;
    }
    // Altitude, if present, is dropped.
    Some(LngLat::new(arr[0].as_f64()?, arr[1].as_f64()?))
}

fn line(v: &Value) -> Option<Vec<LngLat>> {
    each(v, position)
}

fn rings(v: &Value) -> Option<Vec<Vec<LngLat>>> {
    each(v, line)
}

fn each<T>(v: &Value, f: impl Fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    v.as_array()?.iter().map(f).collect()
}
