use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OpenFlags, params};
use voxmap_block::WorldKey;

use crate::{RawBlock, WorldStore};

/// Minetest `map.sqlite` backend: one `blocks (pos, data)` table keyed by [`WorldKey`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an existing world read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open world database {}", path.display()))?;
        log::info!("Opened world database {}", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Fresh writable database with the world schema.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blocks (
                pos INT PRIMARY KEY,
                data BLOB
            );",
        )
        .context("Failed to init blocks schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn insert(&self, key: WorldKey, data: &[u8]) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))?;
        conn.execute(
            "INSERT INTO blocks (pos, data) VALUES (?1, ?2)
             ON CONFLICT (pos) DO UPDATE SET data = ?2",
            params![key.0, data],
        )
        .context("Failed to insert block")?;
        Ok(())
    }
}

impl WorldStore for SqliteStore {
    fn query_column(&self, lo: WorldKey, hi: WorldKey) -> Result<Vec<RawBlock>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))?;
        let mut stmt = conn.prepare_cached(
            "SELECT pos, data FROM blocks WHERE pos >= ?1 AND pos <= ?2 AND (pos - ?1) % 4096 = 0",
        )?;
        let rows = stmt.query_map(params![lo.0, hi.0], |row| {
            Ok(RawBlock { key: WorldKey(row.get(0)?), data: row.get(1)? })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to query column {}..={}", lo.0, hi.0))
    }

    fn scan(&self, visit: &mut dyn FnMut(RawBlock) -> Result<()>) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))?;
        let mut stmt = conn.prepare("SELECT pos, data FROM blocks")?;
        let mut rows = stmt.query([]).context("Failed to scan blocks")?;
        while let Some(row) = rows.next()? {
            visit(RawBlock { key: WorldKey(row.get(0)?), data: row.get(1)? })?;
        }
        Ok(())
    }
}
