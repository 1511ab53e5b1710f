//! Google Maps JS API + DrawingManager callbacks.
//!
//! Overlays carry no ids of their own, so `overlaycomplete` mints one unless
//! the host supplies it. The session hands committed ids back to the host,
//! which tags the overlay and echoes the id on `path_changed` and
//! `overlayremoved`.
//!
//! Payloads: `{ type, id?, position: {lat, lng} }` for markers and
//! `{ type, id?, path: [{lat, lng}, ..] }` for polylines and polygons.

use foundation::FeatureId;
use foundation::math::{LngLat, close_ring};
use scene::{FeatureDraft, Geometry};
use serde_json::Value;

use crate::engine::Platform;
use crate::event::{EventNormalizer, MapEvent, error_message, lnglat_object};

#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleNormalizer;

impl GoogleNormalizer {
    fn geometry(payload: &Value) -> Option<Geometry> {
        let kind = payload.get("type").and_then(Value::as_str)?;
        match kind {
            "marker" => payload
                .get("position")
                .and_then(lnglat_object)
                .map(Geometry::Point),
            "polyline" => Self::path(payload).map(Geometry::LineString),
            "polygon" => Self::path(payload).map(|mut ring| {
                // Google paths are implicitly closed.
                close_ring(&mut ring);
                Geometry::Polygon(vec![ring])
            }),
            _ => None,
        }
    }

    fn path(payload: &Value) -> Option<Vec<LngLat>> {
        payload
            .get("path")?
            .as_array()?
            .iter()
            .map(lnglat_object)
            .collect()
    }

    fn id(payload: &Value) -> Option<FeatureId> {
        payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(FeatureId::from)
    }
}

impl EventNormalizer for GoogleNormalizer {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn normalize(&self, name: &str, payload: &Value) -> Vec<MapEvent> {
        match name {
            "tilesloaded" | "idle" => vec![MapEvent::EngineReady],
            "maptypeid_changed" => vec![MapEvent::StyleReloaded],
            "error" => vec![MapEvent::EngineError(error_message(payload))],
            "click" => payload
                .get("latLng")
                .and_then(lnglat_object)
                .map(MapEvent::Click)
                .into_iter()
                .collect(),
            "overlaycomplete" => match Self::geometry(payload) {
                Some(geometry) => {
                    let id = Self::id(payload).unwrap_or_else(FeatureId::generate);
                    vec![MapEvent::FeatureCreated(
                        FeatureDraft::new(geometry).with_id(id),
                    )]
                }
                None => {
                    tracing::debug!("ignoring unsupported google overlay");
                    Vec::new()
                }
            },
            "path_changed" => match (Self::id(payload), Self::geometry(payload)) {
                (Some(id), Some(geometry)) => vec![MapEvent::FeatureUpdated { id, geometry }],
                _ => Vec::new(),
            },
            "overlayremoved" => Self::id(payload)
                .map(MapEvent::FeatureDeleted)
                .into_iter()
                .collect(),
            "overlayselected" => Self::id(payload)
                .map(MapEvent::FeatureSelected)
                .into_iter()
                .collect(),
            "overlaydeselected" => vec![MapEvent::SelectionCleared],
            _ => Vec::new(),
        }
    }
}
