use std::fmt;
use std::str::FromStr;

use foundation::math::LngLat;
use foundation::{FeatureId, LngLatBounds};
use runtime::DrawTool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::layer::{LayerId, LayerSpec};
use crate::terrain::TerrainSpec;

/// Map SDK backing a session.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Mapbox,
    Google,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Mapbox => "mapbox",
            Platform::Google => "google",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = EngineFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mapbox" => Ok(Platform::Mapbox),
            "google" => Ok(Platform::Google),
            other => Err(EngineFailure::Unsupported(format!("platform `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineFailure {
    #[error("map style `{url}` failed to load: {reason}")]
    StyleLoad { url: String, reason: String },
    #[error("map engine error: {0}")]
    Engine(String),
    #[error("not supported by this map engine: {0}")]
    Unsupported(String),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Interaction the engine's drawing control should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawInteraction {
    Draw(DrawTool),
    Edit(FeatureId),
}

/// Capability surface of a map SDK.
///
/// Event subscription is the host's job: it forwards raw SDK callbacks to
/// an [`crate::EventNormalizer`].
pub trait MapEngine {
    fn platform(&self) -> Platform;

    fn add_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure>;
    fn update_source(&mut self, id: &str, data: &Value) -> Result<(), EngineFailure>;
    fn remove_source(&mut self, id: &str) -> Result<(), EngineFailure>;
    fn render_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineFailure>;
    fn remove_layer(&mut self, id: &LayerId) -> Result<(), EngineFailure>;

    fn project(&self, at: LngLat) -> ScreenPoint;
    fn unproject(&self, at: ScreenPoint) -> LngLat;
    fn fit_bounds(&mut self, bounds: LngLatBounds) -> Result<(), EngineFailure>;

    fn enable_draw_mode(&mut self, interaction: &DrawInteraction) -> Result<(), EngineFailure>;
    /// Leaves drawing, discarding any uncommitted geometry.
    fn disable_draw_mode(&mut self) -> Result<(), EngineFailure>;
    /// Ids currently held by the engine's drawing control.
    fn drawn_feature_ids(&self) -> Vec<FeatureId>;

    fn set_style(&mut self, url: &str) -> Result<(), EngineFailure>;
    fn supports_terrain(&self) -> bool;
    fn set_terrain(&mut self, terrain: Option<&TerrainSpec>) -> Result<(), EngineFailure>;
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn platform_names() {
        assert_eq!("google".parse::<Platform>().unwrap(), Platform::Google);
        assert_eq!(Platform::default().to_string(), "mapbox");
        assert!("leaflet".parse::<Platform>().is_err());
    }
}
