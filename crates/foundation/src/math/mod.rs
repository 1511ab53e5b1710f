pub mod geodesy;
pub mod lnglat;
pub mod measure;
pub mod projection;

pub use geodesy::*;
pub use lnglat::*;
pub use measure::*;
pub use projection::*;
