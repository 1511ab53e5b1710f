//! Mapbox GL + mapbox-gl-draw callbacks.
//!
//! mapbox-gl-draw selects every feature it just created, so
//! `draw.selectionchange` never starts an edit. Editing starts from
//! `dblclick`, for which the host hit-tests the draw layers and passes
//! `{ featureId }`.

use foundation::FeatureId;
use scene::geojson;
use serde_json::{Value, json};

use crate::engine::Platform;
use crate::event::{EventNormalizer, MapEvent, error_message, lnglat_object};

#[derive(Debug, Default, Clone, Copy)]
pub struct MapboxNormalizer;

impl MapboxNormalizer {
    fn drafts(payload: &Value) -> Vec<scene::FeatureDraft> {
        let features = payload.get("features").cloned().unwrap_or(Value::Null);
        let collection = json!({ "type": "FeatureCollection", "features": features });
        match geojson::import_value(&collection) {
            Ok(import) => import.drafts,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed draw payload");
                Vec::new()
            }
        }
    }

    fn ids(payload: &Value) -> Vec<FeatureId> {
        payload
            .get("features")
            .and_then(Value::as_array)
            .map(|fs| {
                fs.iter()
                    .filter_map(|f| f.get("id").and_then(Value::as_str))
                    .map(FeatureId::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl EventNormalizer for MapboxNormalizer {
    fn platform(&self) -> Platform {
        Platform::Mapbox
    }

    fn normalize(&self, name: &str, payload: &Value) -> Vec<MapEvent> {
        match name {
            "load" => vec![MapEvent::EngineReady],
            "style.load" => vec![MapEvent::StyleReloaded],
            "error" => vec![MapEvent::EngineError(error_message(payload))],
            "click" => payload
                .get("lngLat")
                .and_then(lnglat_object)
                .map(MapEvent::Click)
                .into_iter()
                .collect(),
            "draw.create" => Self::drafts(payload)
                .into_iter()
                .map(MapEvent::FeatureCreated)
                .collect(),
            "draw.update" => Self::drafts(payload)
                .into_iter()
                .filter_map(|d| {
                    let id = d.id?;
                    Some(MapEvent::FeatureUpdated {
                        id,
                        geometry: d.geometry,
                    })
                })
                .collect(),
            "draw.delete" => Self::ids(payload)
                .into_iter()
                .map(MapEvent::FeatureDeleted)
                .collect(),
            "draw.selectionchange" if Self::ids(payload).is_empty() => {
                vec![MapEvent::SelectionCleared]
            }
            "dblclick" => payload
                .get("featureId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(|id| MapEvent::FeatureSelected(FeatureId::from(id)))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use foundation::FeatureId;
    use foundation::math::LngLat;
    use pretty_assertions::assert_eq;
    use scene::Geometry;
    use serde_json::json;

    use super::MapboxNormalizer;
    use crate::event::{EventNormalizer, MapEvent};

    #[test]
    fn draw_create_keeps_engine_id() {
        let events = MapboxNormalizer.normalize(
            "draw.create",
            &json!({
                "features": [{
                    "id": "6f1c",
                    "type": "Feature",
                    "properties": {},
                    "geometry": { "type": "LineString", "coordinates": [[0, 0], [0, 0.01]] }
                }]
            }),
        );
        assert_eq!(events.len(), 1);
        let MapEvent::FeatureCreated(draft) = &events[0] else {
            panic!("expected create, got {events:?}");
        };
        assert_eq!(draft.id, Some(FeatureId::new("6f1c")));
        assert_eq!(
            draft.geometry,
            Geometry::LineString(vec![LngLat::new(0.0, 0.0), LngLat::new(0.0, 0.01)])
        );
    }

    #[test]
    fn update_delete_and_selection() {
        let feature = json!({
            "id": "a",
            "type": "Feature",
            "properties": {},
            "geometry": { "type": "Point", "coordinates": [1, 2] }
        });
        let n = MapboxNormalizer;
        assert_eq!(
            n.normalize("draw.update", &json!({ "features": [feature.clone()], "action": "move" })),
            vec![MapEvent::FeatureUpdated {
                id: FeatureId::new("a"),
                geometry: Geometry::Point(LngLat::new(1.0, 2.0))
            }]
        );
        assert_eq!(
            n.normalize("draw.delete", &json!({ "features": [feature.clone()] })),
            vec![MapEvent::FeatureDeleted(FeatureId::new("a"))]
        );
        assert!(
            n.normalize("draw.selectionchange", &json!({ "features": [feature] }))
                .is_empty()
        );
        assert_eq!(
            n.normalize("draw.selectionchange", &json!({ "features": [] })),
            vec![MapEvent::SelectionCleared]
        );
        assert_eq!(
            n.normalize("dblclick", &json!({ "featureId": "a", "point": { "x": 4, "y": 9 } })),
            vec![MapEvent::FeatureSelected(FeatureId::new("a"))]
        );
        assert!(n.normalize("dblclick", &json!({ "point": { "x": 4, "y": 9 } })).is_empty());
    }

    #[test]
    fn lifecycle_and_click() {
        let n = MapboxNormalizer;
        assert_eq!(n.normalize("load", &json!(null)), vec![MapEvent::EngineReady]);
        assert_eq!(n.normalize("style.load", &json!({})), vec![MapEvent::StyleReloaded]);
        assert_eq!(
            n.normalize("error", &json!({ "error": { "message": "satellite tiles 404" } })),
            vec![MapEvent::EngineError("satellite tiles 404".to_string())]
        );
        assert_eq!(
            n.normalize("click", &json!({ "lngLat": { "lng": -7.0, "lat": 31.5 } })),
            vec![MapEvent::Click(LngLat::new(-7.0, 31.5))]
        );
        assert!(n.normalize("move", &json!({})).is_empty());
        assert!(n.normalize("draw.create", &json!({ "features": 3 })).is_empty());
    }
}
