use std::rc::Rc;

use base64::Engine as _;
use catalog::{MARKERS_KEY, SnapshotStore, StorageError};
use foundation::math::LngLat;
use foundation::{Clock, MarkerId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{MarkerError, RestoreError};

pub const DEFAULT_MARKER_COLOR: &str = "#3887BE";
pub const PLACED_MARKER_TITLE: &str = "New Marker";
/// Largest decoded marker image accepted.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerIcon {
    #[default]
    Pin,
    Star,
    Flag,
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub id: MarkerId,
    pub location: LngLat,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: MarkerIcon,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

fn default_color() -> String {
    DEFAULT_MARKER_COLOR.to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDraft {
    pub location: LngLat,
    pub title: String,
    pub description: String,
    pub icon: Option<MarkerIcon>,
    pub color: Option<String>,
    pub image: Option<String>,
}

impl MarkerDraft {
    pub fn new(location: LngLat, title: impl Into<String>) -> Self {
        Self {
            location,
            title: title.into(),
            description: String::new(),
            icon: None,
            color: None,
            image: None,
        }
    }

    /// Draft created by a click while marker placement is armed.
    pub fn placed_at(location: LngLat) -> Self {
        Self::new(location, PLACED_MARKER_TITLE)
    }
}

/// Edit-form changes. `image: Some(None)` clears the image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerPatch {
    pub location: Option<LngLat>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<MarkerIcon>,
    pub color: Option<String>,
    pub image: Option<Option<String>>,
}

pub fn validate_color(color: &str) -> Result<(), MarkerError> {
    let hex = color
        .strip_prefix('#')
        .filter(|h| h.len() == 6 && h.chars().all(|c| c.is_ascii_hexdigit()));
    match hex {
        Some(_) => Ok(()),
        None => Err(MarkerError::Invalid(format!(
            "color `{color}` is not a #RRGGBB hex string"
        ))),
    }
}

/// Accepts `data:<mime>;base64,<payload>` URLs whose payload decodes.
pub fn validate_image(image: &str) -> Result<(), MarkerError> {
    let invalid = |why: &str| MarkerError::Invalid(format!("image {why}"));
    let rest = image
        .strip_prefix("data:")
        .ok_or_else(|| invalid("must be a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("is missing its payload"))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("must be base64 encoded"))?;
    if !mime.starts_with("image/") {
        return Err(invalid("must have an image mime type"));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| MarkerError::Invalid(format!("image payload: {e}")))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(invalid("exceeds 10 MB"));
    }
    Ok(())
}

fn normalized_title(title: &str) -> Result<String, MarkerError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(MarkerError::Invalid("title is required".to_string()));
    }
    Ok(title.to_string())
}

fn validate_location(location: LngLat) -> Result<(), MarkerError> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(MarkerError::Invalid(format!(
            "invalid location [{}, {}]",
            location.lng, location.lat
        )))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerChange {
    Added(MarkerId),
    Updated(MarkerId),
    Removed(MarkerId),
    Reset,
}

/// User-placed markers, persisted as one set independent of features.
pub struct MarkerStore<S: SnapshotStore> {
    markers: Vec<Marker>,
    pending: Vec<MarkerChange>,
    sink: S,
    clock: Rc<dyn Clock>,
    persist_error: Option<StorageError>,
}

impl<S: SnapshotStore> MarkerStore<S> {
    pub fn new(sink: S, clock: Rc<dyn Clock>) -> Self {
        Self {
            markers: Vec::new(),
            pending: Vec::new(),
            sink,
            clock,
            persist_error: None,
        }
    }

    pub fn list(&self) -> &[Marker] {
        &self.markers
    }

    pub fn get(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn create(&mut self, draft: MarkerDraft) -> Result<MarkerId, MarkerError> {
        validate_location(draft.location)?;
        let title = normalized_title(&draft.title)?;
        let color = draft.color.unwrap_or_else(default_color);
        validate_color(&color)?;
        if let Some(image) = draft.image.as_deref() {
            validate_image(image)?;
        }

        let now = self.clock.now();
        let id = MarkerId::generate();
        self.markers.push(Marker {
            id: id.clone(),
            location: draft.location,
            title,
            description: draft.description,
            icon: draft.icon.unwrap_or_default(),
            color,
            image: draft.image,
            created_at: now,
            updated_at: now,
        });
        tracing::debug!(id = %id, "marker created");
        self.pending.push(MarkerChange::Added(id.clone()));
        self.persist();
        Ok(id)
    }

    pub fn update(&mut self, id: &MarkerId, patch: MarkerPatch) -> Result<(), MarkerError> {
        let idx = self
            .markers
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| MarkerError::NotFound(id.clone()))?;

        let mut next = self.markers[idx].clone();
        if let Some(location) = patch.location {
            validate_location(location)?;
            next.location = location;
        }
        if let Some(title) = patch.title {
            next.title = normalized_title(&title)?;
        }
        if let Some(description) = patch.description {
            next.description = description;
        }
        if let Some(icon) = patch.icon {
            next.icon = icon;
        }
        if let Some(color) = patch.color {
            validate_color(&color)?;
            next.color = color;
        }
        if let Some(image) = patch.image {
            if let Some(data) = image.as_deref() {
                validate_image(data)?;
            }
            next.image = image;
        }
        next.updated_at = self.clock.now();

        self.markers[idx] = next;
        self.pending.push(MarkerChange::Updated(id.clone()));
        self.persist();
        Ok(())
    }

    /// Deletes a marker. Unknown ids are ignored.
    pub fn remove(&mut self, id: &MarkerId) -> bool {
        let Some(idx) = self.markers.iter().position(|m| &m.id == id) else {
            return false;
        };
        self.markers.remove(idx);
        self.pending.push(MarkerChange::Removed(id.clone()));
        self.persist();
        true
    }

    /// Replaces the contents from a snapshot; fails open to an empty set.
    pub fn restore(&mut self, blob: &str) -> Result<usize, RestoreError> {
        self.markers.clear();
        self.pending.push(MarkerChange::Reset);
        if blob.trim().is_empty() {
            return Ok(0);
        }
        match serde_json::from_str::<Vec<Marker>>(blob) {
            Ok(markers) => {
                self.markers = markers;
                Ok(self.markers.len())
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupt marker snapshot");
                Err(RestoreError::Corrupt(e.to_string()))
            }
        }
    }

    pub fn restore_from_sink(&mut self) -> Result<usize, RestoreError> {
        match self.sink.read(MARKERS_KEY) {
            Ok(blob) => self.restore(blob.as_deref().unwrap_or("")),
            Err(e) => {
                let _ = self.restore("");
                Err(RestoreError::Storage(e))
            }
        }
    }

    pub fn drain_changes(&mut self) -> Vec<MarkerChange> {
        std::mem::take(&mut self.pending)
    }

    pub fn take_persist_error(&mut self) -> Option<StorageError> {
        self.persist_error.take()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn persist(&mut self) {
        let result = serde_json::to_string(&self.markers)
            .map_err(|e| StorageError::Io(e.to_string()))
            .and_then(|raw| self.sink.write(MARKERS_KEY, &raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist markers");
            self.persist_error = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use catalog::{InMemorySnapshotStore, MARKERS_KEY, SnapshotStore};
    use foundation::math::LngLat;
    use foundation::{ManualClock, MarkerId};
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> MarkerStore<InMemorySnapshotStore> {
        MarkerStore::new(InMemorySnapshotStore::new(), Rc::new(ManualClock::new(42)))
    }

    #[test]
    fn create_applies_defaults() {
        let mut s = store();
        let id = s
            .create(MarkerDraft::new(LngLat::new(-7.6, 33.5), "  Camp  "))
            .unwrap();
        let m = s.get(&id).unwrap();
        assert_eq!(m.title, "Camp");
        assert_eq!(m.icon, MarkerIcon::Pin);
        assert_eq!(m.color, DEFAULT_MARKER_COLOR);
        assert_eq!(m.image, None);
        assert!(s.sink().read(MARKERS_KEY).unwrap().is_some());
        assert_eq!(s.drain_changes(), vec![MarkerChange::Added(id)]);
    }

    #[test]
    fn placed_marker_has_default_title() {
        let mut s = store();
        let id = s.create(MarkerDraft::placed_at(LngLat::new(1.0, 2.0))).unwrap();
        assert_eq!(s.get(&id).unwrap().title, PLACED_MARKER_TITLE);
    }

    #[test]
    fn title_is_required() {
        let mut s = store();
        let err = s.create(MarkerDraft::new(LngLat::new(0.0, 0.0), "   "));
        assert!(matches!(err, Err(MarkerError::Invalid(_))));
        assert!(s.is_empty());
    }

    #[test]
    fn color_and_image_are_validated() {
        assert!(validate_color("#3887BE").is_ok());
        assert!(validate_color("#3887B").is_err());
        assert!(validate_color("3887BE").is_err());
        assert!(validate_color("#GG87BE").is_err());

        assert!(validate_image("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_image("https://example.com/a.png").is_err());
        assert!(validate_image("data:image/png,raw").is_err());
        assert!(validate_image("data:text/plain;base64,aGk=").is_err());
        assert!(validate_image("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn update_is_all_or_nothing() {
        let mut s = store();
        let id = s.create(MarkerDraft::new(LngLat::new(0.0, 0.0), "A")).unwrap();
        let err = s.update(
            &id,
            MarkerPatch {
                title: Some("B".to_string()),
                color: Some("red".to_string()),
                ..Default::default()
            },
        );
        assert!(err.is_err());
        assert_eq!(s.get(&id).unwrap().title, "A");

        s.update(
            &id,
            MarkerPatch {
                icon: Some(MarkerIcon::Flag),
                image: Some(Some("data:image/gif;base64,R0lGODlh".to_string())),
                ..Default::default()
            },
        )
        .unwrap();
        let m = s.get(&id).unwrap();
        assert_eq!(m.icon, MarkerIcon::Flag);
        assert!(m.image.is_some());

        s.update(
            &id,
            MarkerPatch {
                image: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(s.get(&id).unwrap().image, None);
    }

    #[test]
    fn update_unknown_marker_is_not_found() {
        let mut s = store();
        let missing = MarkerId::new("gone");
        assert_eq!(
            s.update(&missing, MarkerPatch::default()),
            Err(MarkerError::NotFound(missing.clone()))
        );
        assert!(!s.remove(&missing));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut s = store();
        s.create(MarkerDraft {
            icon: Some(MarkerIcon::Star),
            description: "view point".to_string(),
            ..MarkerDraft::new(LngLat::new(-5.0, 35.0), "Summit")
        })
        .unwrap();
        let raw = s.sink().read(MARKERS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"icon\":\"star\""));

        let mut other = store();
        assert_eq!(other.restore(&raw).unwrap(), 1);
        assert_eq!(other.list(), s.list());

        assert!(other.restore("42").is_err());
        assert!(other.is_empty());
    }
}
