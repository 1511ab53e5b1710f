use catalog::StorageError;
use compute::analysis::ProfileError;
use foundation::math::ProjectionError;
use layers::EngineFailure;
use runtime::{NotReadyReason, Severity, ToolError};
use scene::geojson::GeoJsonError;
use scene::tracks::TrackError;
use scene::{FeatureError, MarkerError, RestoreError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Engine(#[from] EngineFailure),
    #[error("saved data could not be restored: {0}")]
    Restore(#[from] RestoreError),
    #[error("changes could not be saved: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("import failed: {0}")]
    GeoJson(#[from] GeoJsonError),
    #[error("import failed: {0}")]
    Tracks(#[from] TrackError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("invalid form: {0}")]
    Form(String),
    #[error("map is not ready ({0}); cannot place a marker")]
    PlacementNotReady(NotReadyReason),
    #[error("map session has been disposed")]
    Disposed,
}

impl SessionError {
    pub fn severity(&self) -> Severity {
        match self {
            SessionError::Restore(_) | SessionError::Storage(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Engine trouble may clear up on its own; validation errors will not.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Engine(_) | SessionError::Tool(_) | SessionError::PlacementNotReady(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::SessionError;
    use catalog::StorageError;
    use foundation::FeatureId;
    use layers::EngineFailure;
    use runtime::Severity;
    use scene::FeatureError;

    #[test]
    fn classifies_for_notices() {
        let e = SessionError::from(FeatureError::NotFound(FeatureId::new("a")));
        assert_eq!(e.severity(), Severity::Error);
        assert!(!e.retryable());
        assert_eq!(e.to_string(), "feature `a` not found");

        let e = SessionError::from(EngineFailure::Engine("tiles".to_string()));
        assert!(e.retryable());

        let e = SessionError::from(StorageError::Unavailable);
        assert_eq!(e.severity(), Severity::Warning);
    }
}
