#[cfg(test)]
#[macro_use]
extern crate quickcheck_macros;

mod baker;
mod config;
pub mod record;
mod sky;
pub mod vertex;

pub use baker::{
    bake_level, bake_level_with_config, BakeError, BakedLevel, LightmapExtents, FULLBRIGHT,
};
pub use config::BakeConfig;
pub use record::{Record, RecordBuffer};
pub use sky::{Bounds, SKY_INFLATE, SKY_LAYER_SPACING};
pub use vertex::{ComponentKind, MapVertex, VertexAttribute, VERTEX_ATTRIBUTES};
