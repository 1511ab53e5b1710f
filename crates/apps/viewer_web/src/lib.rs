//! Browser-side map session: drawn features, markers, tool modes and the
//! engine adapter owned together for the lifetime of one map view.

pub mod config;
pub mod error;
pub mod session;
pub mod view;

#[cfg(target_arch = "wasm32")]
mod web;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{EventOutcome, ImportSummary, MapSession, SessionEvent, preferred_platform};
