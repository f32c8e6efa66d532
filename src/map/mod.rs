pub mod grid;
pub mod location;
pub mod terrain;

pub use grid::{TerrainGrid, TerrainMap};
pub use location::Location;
pub use terrain::{TerrainCode, TerrainMatch, OFF_MAP_USER};
