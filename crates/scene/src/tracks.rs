//! GPX and KML import. Both yield the same [`Import`] as GeoJSON so callers
//! share one bulk-add and framing path.

use foundation::math::LngLat;
use kml::{Kml, quick_collection};
use thiserror::Error;

use crate::feature::{FeatureDraft, Geometry, Properties, PropertyValue};
use crate::geojson::Import;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("not a GPX document: {0}")]
    Gpx(String),
    #[error("not a KML document: {0}")]
    Kml(String),
}

/// Waypoints become points; every route and every track segment becomes a
/// line named after its route or track.
pub fn import_gpx(text: &str) -> Result<Import, TrackError> {
    let doc = gpx::read(text.as_bytes()).map_err(|e| TrackError::Gpx(e.to_string()))?;
    let mut out = Import::default();

    for wpt in &doc.waypoints {
        let mut properties = named(wpt.name.as_deref(), wpt.description.as_deref());
        if let Some(ele) = wpt.elevation.and_then(serde_json::Number::from_f64) {
            properties.insert("ele".to_string(), PropertyValue::Number(ele));
        }
        let p = wpt.point();
        push(Geometry::Point(LngLat::new(p.x(), p.y())), &properties, &mut out);
    }
    for route in &doc.routes {
        let properties = named(route.name.as_deref(), route.description.as_deref());
        push_line(waypoint_line(&route.points), &properties, &mut out);
    }
    for track in &doc.tracks {
        let properties = named(track.name.as_deref(), track.description.as_deref());
        for segment in &track.segments {
            push_line(waypoint_line(&segment.points), &properties, &mut out);
        }
    }

    tracing::debug!(drafts = out.drafts.len(), skipped = out.skipped, "gpx parsed");
    Ok(out)
}

/// Placemarks keep their name and description. Geometry outside a
/// placemark (folders included) is imported without properties.
pub fn import_kml(text: &str) -> Result<Import, TrackError> {
    let doc = text
        .parse::<Kml<f64>>()
        .map_err(|e| TrackError::Kml(e.to_string()))?;
    let mut out = Import::default();
    walk_kml(doc, &mut out);
    tracing::debug!(drafts = out.drafts.len(), skipped = out.skipped, "kml parsed");
    Ok(out)
}

fn walk_kml(element: Kml<f64>, out: &mut Import) {
    match element {
        Kml::KmlDocument(doc) => {
            for child in doc.elements {
                walk_kml(child, out);
            }
        }
        Kml::Document { elements, .. } => {
            for child in elements {
                walk_kml(child, out);
            }
        }
        Kml::Placemark(placemark) => {
            let properties = named(
                placemark.name.as_deref(),
                placemark.description.as_deref(),
            );
            collect_kml(Kml::Placemark(placemark), &properties, out);
        }
        other => collect_kml(other, &Properties::new(), out),
    }
}

fn collect_kml(element: Kml<f64>, properties: &Properties, out: &mut Import) {
    match quick_collection(element) {
        Ok(collection) => {
            for geometry in collection.0 {
                push_geo(geometry, properties, out);
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "skipping unreadable kml element");
            out.skipped += 1;
        }
    }
}

fn push_geo(geometry: geo_types::Geometry<f64>, properties: &Properties, out: &mut Import) {
    use geo_types::Geometry as G;
    match geometry {
        G::Point(p) => push(Geometry::Point(coord(p.0)), properties, out),
        G::LineString(line) => push_line(coords(line), properties, out),
        G::Polygon(polygon) => {
            let (exterior, interiors) = polygon.into_inner();
            let rings = std::iter::once(exterior)
                .chain(interiors)
                .map(coords)
                .collect();
            push(Geometry::Polygon(rings), properties, out);
        }
        G::MultiPoint(points) => {
            for p in points.0 {
                push(Geometry::Point(coord(p.0)), properties, out);
            }
        }
        G::MultiLineString(lines) => {
            for line in lines.0 {
                push_line(coords(line), properties, out);
            }
        }
        G::MultiPolygon(polygons) => {
            for polygon in polygons.0 {
                push_geo(G::Polygon(polygon), properties, out);
            }
        }
        G::GeometryCollection(parts) => {
            for part in parts.0 {
                push_geo(part, properties, out);
            }
        }
        _ => out.skipped += 1,
    }
}

fn named(name: Option<&str>, description: Option<&str>) -> Properties {
    let mut properties = Properties::new();
    for (key, value) in [("name", name), ("description", description)] {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            properties.insert(key.to_string(), PropertyValue::from(value));
        }
    }
    properties
}

fn waypoint_line(points: &[gpx::Waypoint]) -> Vec<LngLat> {
    points
        .iter()
        .map(|w| {
            let p = w.point();
            LngLat::new(p.x(), p.y())
        })
        .collect()
}

fn coord(c: geo_types::Coord<f64>) -> LngLat {
    LngLat::new(c.x, c.y)
}

fn coords(line: geo_types::LineString<f64>) -> Vec<LngLat> {
    line.0.into_iter().map(coord).collect()
}

/// Single-position tracks are GPS noise, not lines.
fn push_line(line: Vec<LngLat>, properties: &Properties, out: &mut Import) {
    if line.len() < 2 {
        out.skipped += 1;
        return;
    }
    push(Geometry::LineString(line), properties, out);
}

fn push(geometry: Geometry, properties: &Properties, out: &mut Import) {
    out.drafts.push(FeatureDraft {
        id: None,
        geometry,
        properties: properties.clone(),
    });
}
