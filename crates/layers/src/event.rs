use foundation::FeatureId;
use foundation::math::LngLat;
use scene::{FeatureDraft, Geometry};
use serde_json::Value;

use crate::engine::Platform;
use crate::google::GoogleNormalizer;
use crate::mapbox::MapboxNormalizer;

/// Engine-independent event vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    FeatureCreated(FeatureDraft),
    FeatureUpdated { id: FeatureId, geometry: Geometry },
    FeatureDeleted(FeatureId),
    /// The user picked an existing feature (e.g. double-click).
    FeatureSelected(FeatureId),
    SelectionCleared,
    Click(LngLat),
    StyleReloaded,
    EngineReady,
    EngineError(String),
}

/// Translates raw SDK callbacks into [`MapEvent`]s.
///
/// Unknown event names and malformed payloads yield no events.
pub trait EventNormalizer {
    fn platform(&self) -> Platform;
    fn normalize(&self, name: &str, payload: &Value) -> Vec<MapEvent>;
}

pub fn normalizer_for(platform: Platform) -> Box<dyn EventNormalizer> {
    match platform {
        Platform::Mapbox => Box::new(MapboxNormalizer),
        Platform::Google => Box::new(GoogleNormalizer),
    }
}

/// Reads `{lng, lat}` (either order, either key spelling).
pub(crate) fn lnglat_object(v: &Value) -> Option<LngLat> {
    let lng = v.get("lng").or_else(|| v.get("lon"))?.as_f64()?;
    let lat = v.get("lat")?.as_f64()?;
    Some(LngLat::new(lng, lat))
}

pub(crate) fn error_message(payload: &Value) -> String {
    payload
        .pointer("/error/message")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown map error")
        .to_string()
}
