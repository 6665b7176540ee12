//! World-storage records: key/position mapping and block decoding.

pub mod block;
pub mod builder;
pub mod pos;
mod reader;

pub use block::{Block, BlockError, BlockFlags, Content, Voxel, BLOCK_SIZE, NODE_COUNT, SUPPORTED_VERSION};
pub use pos::{BlockPos, CoordError, WorldKey, column_bounds};
pub use reader::ReadError;
