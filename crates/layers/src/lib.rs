pub mod adapter;
pub mod engine;
pub mod event;
pub mod google;
pub mod headless;
pub mod layer;
pub mod mapbox;
pub mod symbology;
pub mod terrain;
pub mod vector;

pub use adapter::*;
pub use engine::*;
pub use event::*;
pub use layer::*;
