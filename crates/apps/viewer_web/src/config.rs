use foundation::math::LngLat;
use serde::{Deserialize, Serialize};

pub const OUTDOORS_STYLE: &str = "mapbox://styles/mapbox/outdoors-v12";
pub const SATELLITE_STYLE: &str = "mapbox://styles/mapbox/satellite-streets-v12";

/// Per-session settings. Every field has a default; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// How long to wait for the engine's ready event.
    pub ready_timeout_ms: i64,
    pub default_style: String,
    /// Style used when the active satellite style fails to load.
    pub fallback_style: String,
    pub center: LngLat,
    pub zoom: f64,
    pub terrain_exaggeration: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10_000,
            default_style: OUTDOORS_STYLE.to_string(),
            fallback_style: OUTDOORS_STYLE.to_string(),
            center: LngLat::new(-7.0, 31.5),
            zoom: 5.0,
            terrain_exaggeration: layers::terrain::DEFAULT_EXAGGERATION,
        }
    }
}

impl SessionConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }
}
