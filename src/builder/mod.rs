pub mod animation;
pub mod compiler;
pub mod engine;
pub mod images;
pub mod rotation;
pub mod rule;
pub mod ruleset;
pub mod tilemap;

pub use animation::{Animation, ImageLocator};
pub use compiler::CompileError;
pub use engine::{noise, BuildReport, BuildSettings, MatchStrategy, TerrainBuilder};
pub use images::{ImageCatalog, ImageDirectory};
pub use rule::{ImageId, RuleScope, TerrainLayer};
pub use ruleset::{CompileSettings, CompileSummary, RuleSet};
pub use tilemap::{Tile, TileMap};
