use serde_json::{Value, json};

use crate::layer::LayerKind;

pub const DRAWN_FEATURE_COLOR: &str = "#3bb2d0";
pub const MARKER_COLOR: &str = "#3887BE";

#[derive(Debug, Clone, PartialEq)]
pub struct LayerStyle {
    pub visible: bool,
    /// `#RRGGBB` color.
    pub color: String,
    pub opacity: f64,
    /// Line width or circle radius in pixels.
    pub size: f64,
}

impl LayerStyle {
    pub fn new(color: &str, opacity: f64, size: f64) -> Self {
        Self {
            visible: true,
            color: color.to_string(),
            opacity,
            size,
        }
    }

    /// Color of the feature's own `color` property, else the layer color.
    fn color_expr(&self) -> Value {
        json!(["coalesce", ["get", "color"], self.color])
    }

    pub fn paint(&self, kind: LayerKind) -> Value {
        match kind {
            LayerKind::Fill => json!({
                "fill-color": self.color_expr(),
                "fill-opacity": self.opacity,
            }),
            LayerKind::Line => json!({
                "line-color": self.color_expr(),
                "line-opacity": self.opacity,
                "line-width": self.size,
            }),
            LayerKind::Circle => json!({
                "circle-color": self.color_expr(),
                "circle-opacity": self.opacity,
                "circle-radius": self.size,
            }),
            LayerKind::Symbol => json!({
                "icon-color": self.color_expr(),
                "icon-opacity": self.opacity,
            }),
            LayerKind::Sky => json!({
                "sky-type": "atmosphere",
                "sky-atmosphere-sun": [0.0, 0.0],
                "sky-atmosphere-sun-intensity": 15,
            }),
        }
    }
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self::new(DRAWN_FEATURE_COLOR, 1.0, 2.0)
    }
}
