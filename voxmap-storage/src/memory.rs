use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use voxmap_block::WorldKey;

use crate::{RawBlock, WorldStore};

const COLUMN_STRIDE: i64 = 4096;

/// In-process store, mostly for tests and fixtures.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<i64, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: WorldKey, data: Vec<u8>) {
        // A poisoned lock still holds a consistent map; inserts are single operations.
        let mut blocks = self.blocks.write().unwrap_or_else(|e| e.into_inner());
        blocks.insert(key.0, data);
    }
}

impl WorldStore for MemoryStore {
    fn query_column(&self, lo: WorldKey, hi: WorldKey) -> Result<Vec<RawBlock>> {
        let blocks = self.blocks.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(blocks
            .range(lo.0..=hi.0)
            .filter(|(key, _)| (**key - lo.0) % COLUMN_STRIDE == 0)
            .map(|(key, data)| RawBlock { key: WorldKey(*key), data: data.clone() })
            .collect())
    }

    fn scan(&self, visit: &mut dyn FnMut(RawBlock) -> Result<()>) -> Result<()> {
        let blocks = self.blocks.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        for (key, data) in blocks.iter() {
            visit(RawBlock { key: WorldKey(*key), data: data.clone() })?;
        }
        Ok(())
    }
}
