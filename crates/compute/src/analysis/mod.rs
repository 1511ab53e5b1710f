pub mod profile;
pub mod statistics;

pub use profile::*;
pub use statistics::*;
