use std::collections::HashSet;
use std::rc::Rc;

use catalog::{FEATURES_KEY, SnapshotStore, StorageError};
use foundation::{Clock, FeatureId};

use crate::error::{FeatureError, RestoreError};
use crate::feature::{Feature, FeatureDraft, FeaturePatch};

/// Change notification queued by every successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureChange {
    Added(FeatureId),
    Updated {
        id: FeatureId,
        geometry_changed: bool,
    },
    Removed(FeatureId),
    /// Contents were replaced wholesale (restore or clear).
    Reset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Records that parsed but violated an invariant.
    pub dropped: usize,
}

/// Ordered collection of drawn features mirrored into a snapshot sink.
///
/// Mutations are all-or-nothing: validation happens on a copy and the
/// stored state only changes once it passes.
pub struct FeatureStore<S: SnapshotStore> {
    features: Vec<Feature>,
    retired: HashSet<FeatureId>,
    pending: Vec<FeatureChange>,
    sink: S,
    clock: Rc<dyn Clock>,
    persist_error: Option<StorageError>,
}

impl<S: SnapshotStore> FeatureStore<S> {
    pub fn new(sink: S, clock: Rc<dyn Clock>) -> Self {
        Self {
            features: Vec::new(),
            retired: HashSet::new(),
            pending: Vec::new(),
            sink,
            clock,
            persist_error: None,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features in insertion order.
    pub fn list(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| &f.id == id)
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.get(id).is_some()
    }

    pub fn add(&mut self, draft: FeatureDraft) -> Result<FeatureId, FeatureError> {
        let id = self.insert(draft)?;
        self.persist();
        Ok(id)
    }

    /// Adds several features with one persistence write. Each draft is
    /// accepted or rejected on its own.
    pub fn add_many(
        &mut self,
        drafts: impl IntoIterator<Item = FeatureDraft>,
    ) -> Vec<Result<FeatureId, FeatureError>> {
        let results: Vec<_> = drafts.into_iter().map(|d| self.insert(d)).collect();
        if results.iter().any(Result::is_ok) {
            self.persist();
        }
        results
    }

    fn insert(&mut self, draft: FeatureDraft) -> Result<FeatureId, FeatureError> {
        let FeatureDraft {
            id,
            mut geometry,
            properties,
        } = draft;
        geometry.normalize()?;

        let id = match id {
            Some(id) => {
                if self.contains(&id) || self.retired.contains(&id) {
                    return Err(FeatureError::DuplicateId(id));
                }
                id
            }
            None => FeatureId::generate(),
        };

        let now = self.clock.now();
        tracing::debug!(id = %id, kind = geometry.kind().as_str(), "feature added");
        self.features.push(Feature {
            id: id.clone(),
            geometry,
            properties,
            created_at: now,
            updated_at: now,
        });
        self.pending.push(FeatureChange::Added(id.clone()));
        Ok(id)
    }

    pub fn update(&mut self, id: &FeatureId, patch: FeaturePatch) -> Result<(), FeatureError> {
        let idx = self
            .features
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| FeatureError::NotFound(id.clone()))?;

        let mut next = self.features[idx].clone();
        let geometry_changed = match patch.geometry {
            Some(mut geometry) => {
                if geometry.kind() != next.kind() {
                    return Err(FeatureError::InvalidGeometry(format!(
                        "cannot change a {} into a {}",
                        next.kind().as_str(),
                        geometry.kind().as_str()
                    )));
                }
                geometry.normalize()?;
                let changed = geometry != next.geometry;
                next.geometry = geometry;
                changed
            }
            None => false,
        };
        next.properties.extend(patch.properties);
        if next == self.features[idx] {
            return Ok(());
        }
        next.updated_at = self.clock.now();

        self.features[idx] = next;
        tracing::debug!(id = %id, geometry_changed, "feature updated");
        self.pending.push(FeatureChange::Updated {
            id: id.clone(),
            geometry_changed,
        });
        self.persist();
        Ok(())
    }

    /// Removes a feature. Unknown ids are ignored.
    pub fn remove(&mut self, id: &FeatureId) -> bool {
        let Some(idx) = self.features.iter().position(|f| &f.id == id) else {
            return false;
        };
        let removed = self.features.remove(idx);
        self.retired.insert(removed.id.clone());
        tracing::debug!(id = %id, "feature removed");
        self.pending.push(FeatureChange::Removed(removed.id));
        self.persist();
        true
    }

    pub fn clear(&mut self) {
        if self.features.is_empty() {
            return;
        }
        for f in self.features.drain(..) {
            self.retired.insert(f.id);
        }
        self.pending.push(FeatureChange::Reset);
        self.persist();
    }

    /// Serialized snapshot of the current contents.
    pub fn snapshot(&self) -> Result<String, StorageError> {
        serde_json::to_string(&self.features).map_err(|e| StorageError::Io(e.to_string()))
    }

    /// Replaces the contents with a persisted snapshot.
    ///
    /// An unparseable blob leaves the store empty. Records that parse but
    /// break an invariant (bad geometry, repeated id) are dropped and counted.
    pub fn restore(&mut self, blob: &str) -> Result<RestoreReport, RestoreError> {
        self.features.clear();
        self.retired.clear();
        self.pending.push(FeatureChange::Reset);

        if blob.trim().is_empty() {
            return Ok(RestoreReport::default());
        }
        let records: Vec<serde_json::Value> = match serde_json::from_str(blob) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupt feature snapshot");
                return Err(RestoreError::Corrupt(e.to_string()));
            }
        };

        let mut report = RestoreReport::default();
        for record in records {
            let parsed = serde_json::from_value::<Feature>(record)
                .map_err(|e| FeatureError::InvalidGeometry(e.to_string()))
                .and_then(|mut f| {
                    f.geometry.normalize()?;
                    if self.contains(&f.id) {
                        return Err(FeatureError::DuplicateId(f.id));
                    }
                    Ok(f)
                });
            match parsed {
                Ok(feature) => {
                    self.features.push(feature);
                    report.restored += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping invalid feature record");
                    report.dropped += 1;
                }
            }
        }
        tracing::info!(
            restored = report.restored,
            dropped = report.dropped,
            "feature snapshot restored"
        );
        Ok(report)
    }

    /// Restores from the sink's features entry. A missing entry is an
    /// empty store.
    pub fn restore_from_sink(&mut self) -> Result<RestoreReport, RestoreError> {
        match self.sink.read(FEATURES_KEY) {
            Ok(Some(blob)) => self.restore(&blob),
            Ok(None) => self.restore(""),
            Err(e) => {
                tracing::warn!(error = %e, "feature snapshot unreadable");
                let _ = self.restore("");
                Err(RestoreError::Storage(e))
            }
        }
    }

    /// Changes queued since the last drain, oldest first.
    pub fn drain_changes(&mut self) -> Vec<FeatureChange> {
        std::mem::take(&mut self.pending)
    }

    /// Most recent failed persistence write, if any.
    pub fn take_persist_error(&mut self) -> Option<StorageError> {
        self.persist_error.take()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn persist(&mut self) {
        let result = self
            .snapshot()
            .and_then(|raw| self.sink.write(FEATURES_KEY, &raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist features");
            self.persist_error = Some(e);
        }
    }
}
