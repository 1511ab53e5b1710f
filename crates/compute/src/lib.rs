pub mod analysis;
pub mod format;
pub mod measurement;

pub use format::*;
pub use measurement::*;
