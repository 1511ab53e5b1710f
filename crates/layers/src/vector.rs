use scene::{Feature, Marker, geojson};
use serde_json::{Value, json};

use crate::layer::{Layer, LayerId, LayerKind, LayerSpec};
use crate::symbology::{LayerStyle, MARKER_COLOR};

pub const FEATURES_SOURCE: &str = "drawn-features";
pub const MARKERS_SOURCE: &str = "markers";

/// Fill, outline and point layers over the drawn-features source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureLayer {
    pub style: LayerStyle,
}

impl FeatureLayer {
    pub fn extract(features: &[Feature]) -> Value {
        geojson::export_collection(features)
    }
}

impl Layer for FeatureLayer {
    fn id(&self) -> LayerId {
        LayerId::new(FEATURES_SOURCE)
    }

    fn specs(&self) -> Vec<LayerSpec> {
        let source = Some(FEATURES_SOURCE.to_string());
        let fill = LayerStyle {
            opacity: 0.1,
            ..self.style.clone()
        };
        vec![
            LayerSpec {
                id: LayerId::new("drawn-fill"),
                kind: LayerKind::Fill,
                source: source.clone(),
                geometry_filter: Some("Polygon"),
                style: fill,
            },
            LayerSpec {
                id: LayerId::new("drawn-line"),
                kind: LayerKind::Line,
                source: source.clone(),
                geometry_filter: None,
                style: self.style.clone(),
            },
            LayerSpec {
                id: LayerId::new("drawn-point"),
                kind: LayerKind::Circle,
                source,
                geometry_filter: Some("Point"),
                style: LayerStyle {
                    size: 5.0,
                    ..self.style.clone()
                },
            },
        ]
    }
}

/// Symbol layer over the markers source.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerLayer {
    pub style: LayerStyle,
}

impl Default for MarkerLayer {
    fn default() -> Self {
        Self {
            style: LayerStyle::new(MARKER_COLOR, 1.0, 1.0),
        }
    }
}

impl MarkerLayer {
    pub fn extract(markers: &[Marker]) -> Value {
        let features: Vec<Value> = markers
            .iter()
            .map(|m| {
                json!({
                    "type": "Feature",
                    "id": m.id.as_str(),
                    "geometry": { "type": "Point", "coordinates": m.location },
                    "properties": {
                        "title": m.title,
                        "description": m.description,
                        "icon": m.icon,
                        "color": m.color,
                        "hasImage": m.image.is_some(),
                    },
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}

impl Layer for MarkerLayer {
    fn id(&self) -> LayerId {
        LayerId::new(MARKERS_SOURCE)
    }

    fn specs(&self) -> Vec<LayerSpec> {
        vec![LayerSpec {
            id: LayerId::new("markers-symbol"),
            kind: LayerKind::Symbol,
            source: Some(MARKERS_SOURCE.to_string()),
            geometry_filter: None,
            style: self.style.clone(),
        }]
    }
}
