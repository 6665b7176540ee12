//! Column reads: store query plus per-block decoding.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use voxmap_block::{Block, BlockError};

use crate::WorldStore;

/// Decoded blocks of one column and what was dropped on the way.
#[derive(Debug, Default)]
pub struct ColumnRead {
    pub blocks: Vec<Block>,
    /// Records with an unsupported format version.
    pub unsupported: usize,
    /// Records that failed to decode.
    pub corrupt: usize,
    /// Wholly air / wholly ignore blocks left out by the visibility filter.
    pub hidden: usize,
}

pub struct WorldReader {
    store: Arc<dyn WorldStore>,
}

impl WorldReader {
    pub fn new(store: Arc<dyn WorldStore>) -> Self {
        Self { store }
    }

    /// Decode the column at block (x, z).
    ///
    /// Bad records are logged and skipped; only store failures are errors.
    /// With `only_visible` set, blocks that are wholly air or wholly ignore are dropped.
    pub fn column(&self, x: i32, z: i32, only_visible: bool) -> Result<ColumnRead> {
        let mut read = ColumnRead::default();

        for raw in self.store.load_column(x, z)? {
            match Block::decode(raw.key, &raw.data) {
                Ok(block) if only_visible && block.is_invisible() => read.hidden += 1,
                Ok(block) => read.blocks.push(block),
                Err(e @ BlockError::UnsupportedVersion { .. }) => {
                    warn!("Skipping block: {}", e);
                    read.unsupported += 1;
                }
                Err(e) => {
                    warn!("Skipping corrupt block (key {}): {}", raw.key.0, e);
                    read.corrupt += 1;
                }
            }
        }

        debug!(
            "Column ({}, {}): {} blocks, {} hidden, {} unsupported, {} corrupt",
            x, z, read.blocks.len(), read.hidden, read.unsupported, read.corrupt
        );
        Ok(read)
    }

    /// Every distinct (x, z) block column present in the store.
    pub fn columns(&self) -> Result<BTreeSet<(i32, i32)>> {
        let mut columns = BTreeSet::new();
        self.store.scan(&mut |raw| {
            match raw.key.decode() {
                Ok(pos) => {
                    columns.insert((pos.x, pos.z));
                }
                Err(e) => warn!("Skipping record with invalid key: {}", e),
            }
            Ok(())
        })?;
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use voxmap_block::builder::BlockBuilder;
    use voxmap_block::pos::encode;
    use voxmap_block::WorldKey;

    fn fixture() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let put = |x, y, z, builder: BlockBuilder| store.insert(encode(x, y, z).unwrap(), builder.build().unwrap());

        put(0, 0, 0, BlockBuilder::new().fill("default:stone"));
        put(0, 1, 0, BlockBuilder::new()); // only air
        put(0, 2, 0, BlockBuilder::new().fill("ignore"));
        put(0, 3, 0, BlockBuilder::new().version(24).fill("default:dirt"));
        put(1, 0, 0, BlockBuilder::new().fill("default:stone"));
        put(1, 0, -1, BlockBuilder::new().fill("default:stone"));
        store.insert(encode(0, -1, 0).unwrap(), vec![25, 0, 2, 2, 0xDE, 0xAD]);
        store
    }

    #[test]
    fn test_column_skips_bad_blocks() {
        let reader = WorldReader::new(fixture());
        let read = reader.column(0, 0, true).unwrap();

        assert_eq!(read.blocks.len(), 1);
        assert_eq!(read.blocks[0].pos.y, 0);
        assert_eq!(read.hidden, 2);
        assert_eq!(read.unsupported, 1);
        assert_eq!(read.corrupt, 1);
    }

    #[test]
    fn test_column_without_visibility_filter() {
        let reader = WorldReader::new(fixture());
        let read = reader.column(0, 0, false).unwrap();
        assert_eq!(read.blocks.len(), 3);
        assert_eq!(read.hidden, 0);
    }

    #[test]
    fn test_missing_column_is_empty() {
        let reader = WorldReader::new(fixture());
        let read = reader.column(40, 40, true).unwrap();
        assert!(read.blocks.is_empty());
    }

    #[test]
    fn test_columns_are_distinct() {
        let store = fixture();
        store.insert(WorldKey(i64::MAX), vec![]);
        let reader = WorldReader::new(store);
        let columns: Vec<_> = reader.columns().unwrap().into_iter().collect();
        assert_eq!(columns, vec![(0, 0), (1, -1), (1, 0)]);
    }
}
