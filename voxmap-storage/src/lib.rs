use anyhow::Result;
use voxmap_block::{WorldKey, column_bounds};

pub mod memory;
pub mod reader;
pub mod sqlite;

pub use memory::MemoryStore;
pub use reader::{ColumnRead, WorldReader};
pub use sqlite::SqliteStore;

/// One record as stored: key plus the still-compressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub key: WorldKey,
    pub data: Vec<u8>,
}

/// Read access to persisted world blocks.
pub trait WorldStore: Send + Sync {
    /// Records with keys in `lo..=hi` where `(key - lo) % 4096 == 0`, in no particular order.
    fn query_column(&self, lo: WorldKey, hi: WorldKey) -> Result<Vec<RawBlock>>;

    /// Visit every record in the store.
    fn scan(&self, visit: &mut dyn FnMut(RawBlock) -> Result<()>) -> Result<()>;

    /// All records of the vertical column at block (x, z).
    fn load_column(&self, x: i32, z: i32) -> Result<Vec<RawBlock>> {
        let (lo, hi) = column_bounds(x, z)?;
        self.query_column(lo, hi)
    }
}
