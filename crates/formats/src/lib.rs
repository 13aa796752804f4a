pub mod geojson;
pub mod snapshot;
pub mod wire;

pub use geojson::*;
pub use snapshot::*;
