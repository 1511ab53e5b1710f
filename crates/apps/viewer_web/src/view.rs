//! JSON snapshots handed to the UI layer, and the edit forms it sends back.

use catalog::SnapshotStore;
use foundation::math::LngLat;
use runtime::Notice;
use scene::geojson;
use scene::{MarkerIcon, MarkerPatch, Properties};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::error::SessionError;
use crate::session::MapSession;

/// Marker edit form. Absent fields are left alone; `"image": null` clears
/// the image.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MarkerForm {
    location: Option<LngLat>,
    title: Option<String>,
    description: Option<String>,
    icon: Option<MarkerIcon>,
    color: Option<String>,
    #[serde(default, deserialize_with = "present")]
    image: Option<Option<String>>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(d).map(Some)
}

pub fn marker_patch_from_json(text: &str) -> Result<MarkerPatch, SessionError> {
    let form: MarkerForm =
        serde_json::from_str(text).map_err(|e| SessionError::Form(format!("marker: {e}")))?;
    Ok(MarkerPatch {
        location: form.location,
        title: form.title,
        description: form.description,
        icon: form.icon,
        color: form.color,
        image: form.image,
    })
}

/// Feature edit form: a flat JSON object of properties.
pub fn properties_from_json(text: &str) -> Result<Properties, SessionError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(geojson::properties_from_object(&map)),
        Ok(_) => Err(SessionError::Form(
            "feature properties must be a JSON object".to_string(),
        )),
        Err(e) => Err(SessionError::Form(format!("feature properties: {e}"))),
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    json!({
        "id": notice.id,
        "severity": notice.severity.as_str(),
        "message": notice.message,
        "retry": notice.retry,
        "postedAt": notice.posted_at.millis(),
    })
}

impl<S: SnapshotStore> MapSession<S> {
    /// One row per measurable feature, in feature order.
    pub fn measurements_json(&self) -> Value {
        let rows: Vec<Value> = self
            .features()
            .iter()
            .filter_map(|f| {
                let m = self.measurement(&f.id)?;
                let display: Vec<Value> = m
                    .display()
                    .into_iter()
                    .map(|(label, value)| json!({ "label": label, "value": value }))
                    .collect();
                Some(json!({ "id": f.id, "measurement": m, "display": display }))
            })
            .collect();
        Value::Array(rows)
    }

    /// Every feature as a GeoJSON feature plus its measurement, if any.
    pub fn features_json(&self) -> Value {
        let rows: Vec<Value> = self
            .features()
            .iter()
            .map(|f| {
                let mut row = geojson::export_feature(f);
                row["measurement"] = json!(self.measurement(&f.id));
                row
            })
            .collect();
        Value::Array(rows)
    }

    pub fn notices_json(&self) -> Value {
        Value::Array(self.notices().iter().map(notice_json).collect())
    }

    pub fn markers_json(&self) -> Value {
        json!(self.markers())
    }

    pub fn status_json(&self) -> Value {
        json!({
            "platform": self.platform(),
            "mode": self.mode().to_string(),
            "ready": self.is_ready(),
            "placingMarker": self.is_placing_marker(),
            "style": self.active_style(),
            "terrain": self.terrain_enabled(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use catalog::InMemorySnapshotStore;
    use foundation::ManualClock;
    use foundation::math::LngLat;
    use layers::MapEvent;
    use layers::headless::HeadlessEngine;
    use layers::Platform;
    use scene::{FeatureDraft, Geometry};

    use foundation::{FeatureId, MarkerId};
    use scene::{MarkerDraft, MarkerIcon, PropertyValue};

    use super::{marker_patch_from_json, properties_from_json};
    use crate::config::SessionConfig;
    use crate::error::SessionError;
    use crate::session::MapSession;

    fn ready_session() -> MapSession<InMemorySnapshotStore> {
        let mut session = MapSession::new(
            InMemorySnapshotStore::new(),
            Box::new(HeadlessEngine::new(Platform::Mapbox)),
            Rc::new(ManualClock::new(0)),
            SessionConfig::default(),
        );
        session.handle_event(MapEvent::EngineReady);
        session
    }

    #[test]
    fn measurement_rows_skip_points() {
        let mut session = MapSession::new(
            InMemorySnapshotStore::new(),
            Box::new(HeadlessEngine::new(Platform::Mapbox)),
            Rc::new(ManualClock::new(0)),
            SessionConfig::default(),
        );
        session.handle_event(MapEvent::EngineReady);
        session.handle_event(MapEvent::FeatureCreated(
            FeatureDraft::new(Geometry::Point(LngLat::new(1.0, 1.0))).with_id("p"),
        ));
        session.handle_event(MapEvent::FeatureCreated(
            FeatureDraft::new(Geometry::LineString(vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(0.0, 0.01),
            ]))
            .with_id("l"),
        ));

        let rows = session.measurements_json();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "l");
        assert_eq!(rows[0]["measurement"]["kind"], "line");
        assert_eq!(rows[0]["display"][0]["label"], "Distance");
        assert_eq!(rows[0]["display"][0]["value"], "1.11 km");

        let status = session.status_json();
        assert_eq!(status["platform"], "mapbox");
        assert_eq!(status["mode"], "idle");
        assert_eq!(status["ready"], true);
    }

    #[test]
    fn notices_serialize_for_the_ui() {
        let mut session = MapSession::new(
            InMemorySnapshotStore::new(),
            Box::new(HeadlessEngine::new(Platform::Google)),
            Rc::new(ManualClock::new(5)),
            SessionConfig::default(),
        );
        assert!(session.set_terrain(true).is_err());
        let notices = session.notices_json();
        assert_eq!(notices[0]["severity"], "error");
        assert_eq!(notices[0]["postedAt"], 5);
        assert_eq!(session.markers_json(), serde_json::json!([]));
    }

    #[test]
    fn feature_rows_carry_geometry_properties_and_measurement() {
        let mut session = ready_session();
        session.handle_event(MapEvent::FeatureCreated(
            FeatureDraft::new(Geometry::Point(LngLat::new(1.0, 1.0))).with_id("p"),
        ));
        session.handle_event(MapEvent::FeatureCreated(
            FeatureDraft::new(Geometry::LineString(vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(0.0, 0.01),
            ]))
            .with_id("l")
            .with_property("name", "trail"),
        ));

        let rows = session.features_json();
        assert_eq!(rows.as_array().map(Vec::len), Some(2));
        assert_eq!(rows[0]["id"], "p");
        assert_eq!(rows[0]["geometry"]["type"], "Point");
        assert!(rows[0]["measurement"].is_null());
        assert_eq!(rows[1]["properties"]["name"], "trail");
        assert_eq!(rows[1]["measurement"]["kind"], "line");
    }

    #[test]
    fn property_form_updates_the_feature() {
        let mut session = ready_session();
        let id = FeatureId::new("l");
        session.handle_event(MapEvent::FeatureCreated(
            FeatureDraft::new(Geometry::LineString(vec![
                LngLat::new(0.0, 0.0),
                LngLat::new(0.0, 0.01),
            ]))
            .with_id("l"),
        ));
        let props = properties_from_json(r#"{"name": "ridge", "lanes": 2}"#).unwrap();
        session.update_feature_properties(&id, props).unwrap();
        let feature = session.feature(&id).unwrap();
        assert_eq!(feature.properties["name"], PropertyValue::from("ridge"));
        assert_eq!(feature.properties["lanes"], PropertyValue::from(2_i64));

        assert!(matches!(
            properties_from_json("[1, 2]"),
            Err(SessionError::Form(_))
        ));
    }

    #[test]
    fn marker_form_patches_and_clears_image() {
        let mut session = ready_session();
        let mut draft = MarkerDraft::new(LngLat::new(-7.0, 31.5), "Camp");
        draft.image = Some("data:image/gif;base64,R0lGODlh".to_string());
        let id: MarkerId = session.create_marker(draft).unwrap();

        let patch = marker_patch_from_json(
            r##"{"title": "Base camp", "icon": "flag", "color": "#AA0000", "image": null}"##,
        )
        .unwrap();
        assert_eq!(patch.image, Some(None));
        assert_eq!(patch.location, None);
        session.update_marker(&id, patch).unwrap();

        let marker = &session.markers()[0];
        assert_eq!(marker.title, "Base camp");
        assert_eq!(marker.icon, MarkerIcon::Flag);
        assert_eq!(marker.image, None);
        assert_eq!(marker.location, LngLat::new(-7.0, 31.5));

        let untouched = marker_patch_from_json(r#"{"location": [1.0, 2.0]}"#).unwrap();
        assert_eq!(untouched.image, None);
        assert!(matches!(
            marker_patch_from_json(r##"{"colour": "#fff"}"##),
            Err(SessionError::Form(_))
        ));
    }
}
