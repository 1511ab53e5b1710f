pub mod error;
pub mod feature;
pub mod geojson;
pub mod marker;
pub mod store;
pub mod tracks;

pub use error::*;
pub use feature::*;
pub use marker::*;
pub use store::*;
