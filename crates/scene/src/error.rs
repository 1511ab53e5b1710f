use catalog::StorageError;
use foundation::{FeatureId, MarkerId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("feature `{0}` not found")]
    NotFound(FeatureId),
    #[error("feature id `{0}` is already in use")]
    DuplicateId(FeatureId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkerError {
    #[error("invalid marker: {0}")]
    Invalid(String),
    #[error("marker `{0}` not found")]
    NotFound(MarkerId),
}

/// Failure to load a persisted snapshot. The store is left empty.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestoreError {
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("snapshot could not be read: {0}")]
    Storage(#[from] StorageError),
}
