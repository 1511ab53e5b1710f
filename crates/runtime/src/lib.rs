pub mod event_bus;
pub mod notice;
pub mod readiness;
pub mod tool_mode;

pub use event_bus::*;
pub use notice::*;
pub use readiness::*;
pub use tool_mode::*;
