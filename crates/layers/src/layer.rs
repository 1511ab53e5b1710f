use std::fmt;

use serde_json::{Value, json};

use crate::symbology::LayerStyle;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
    Sky,
}

impl LayerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Fill => "fill",
            LayerKind::Line => "line",
            LayerKind::Circle => "circle",
            LayerKind::Symbol => "symbol",
            LayerKind::Sky => "sky",
        }
    }
}

/// One engine-side render layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: LayerId,
    pub kind: LayerKind,
    /// Source the layer draws from; sky layers have none.
    pub source: Option<String>,
    /// Geometry type filter (`Point`, `LineString`, `Polygon`).
    pub geometry_filter: Option<&'static str>,
    pub style: LayerStyle,
}

impl LayerSpec {
    /// Mapbox style-spec JSON for this layer.
    pub fn to_style_json(&self) -> Value {
        let mut layer = json!({
            "id": self.id.as_str(),
            "type": self.kind.as_str(),
            "paint": self.style.paint(self.kind),
            "layout": { "visibility": if self.style.visible { "visible" } else { "none" } },
        });
        if let Some(source) = &self.source {
            layer["source"] = Value::String(source.clone());
        }
        if let Some(filter) = self.geometry_filter {
            layer["filter"] = json!(["==", ["geometry-type"], filter]);
        }
        layer
    }
}

/// A group of engine layers that can be re-materialized as a unit.
pub trait Layer {
    fn id(&self) -> LayerId;
    fn specs(&self) -> Vec<LayerSpec>;
}

#[cfg(test)]
mod tests {
    use super::{LayerId, LayerKind, LayerSpec};
    use crate::symbology::LayerStyle;

    #[test]
    fn style_json_has_source_and_filter() {
        let spec = LayerSpec {
            id: LayerId::new("drawn-fill"),
            kind: LayerKind::Fill,
            source: Some("drawn-features".to_string()),
            geometry_filter: Some("Polygon"),
            style: LayerStyle::default(),
        };
        let json = spec.to_style_json();
        assert_eq!(json["type"], "fill");
        assert_eq!(json["source"], "drawn-features");
        assert_eq!(json["filter"][2], "Polygon");
        assert_eq!(json["layout"]["visibility"], "visible");
    }
}
