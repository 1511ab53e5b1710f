use serde_json::{Value, json};

use crate::layer::{Layer, LayerId, LayerKind, LayerSpec};
use crate::symbology::LayerStyle;

pub const DEM_SOURCE_ID: &str = "mapbox-dem";
pub const DEM_TILESET_URL: &str = "mapbox://mapbox.mapbox-terrain-dem-v1";
pub const SKY_LAYER_ID: &str = "sky";
pub const DEFAULT_EXAGGERATION: f64 = 1.5;

/// Engine terrain setting.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSpec {
    pub source: String,
    pub exaggeration: f64,
}

impl TerrainSpec {
    pub fn to_json(&self) -> Value {
        json!({ "source": self.source, "exaggeration": self.exaggeration })
    }
}

/// 3D terrain: DEM source, terrain setting and the sky layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainLayer {
    pub exaggeration: f64,
    pub sky: bool,
}

impl TerrainLayer {
    pub fn new(exaggeration: f64) -> Self {
        Self {
            exaggeration,
            sky: true,
        }
    }

    pub fn spec(&self) -> TerrainSpec {
        TerrainSpec {
            source: DEM_SOURCE_ID.to_string(),
            exaggeration: self.exaggeration,
        }
    }

    pub fn dem_source() -> Value {
        json!({
            "type": "raster-dem",
            "url": DEM_TILESET_URL,
            "tileSize": 512,
            "maxzoom": 14,
        })
    }
}

impl Default for TerrainLayer {
    fn default() -> Self {
        Self::new(DEFAULT_EXAGGERATION)
    }
}

impl Layer for TerrainLayer {
    fn id(&self) -> LayerId {
        LayerId::new(SKY_LAYER_ID)
    }

    fn specs(&self) -> Vec<LayerSpec> {
        if !self.sky {
            return Vec::new();
        }
        vec![LayerSpec {
            id: self.id(),
            kind: LayerKind::Sky,
            source: None,
            geometry_filter: None,
            style: LayerStyle::default(),
        }]
    }
}
