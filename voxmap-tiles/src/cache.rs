//! Persisted tiles keyed by (zoom, x, z).
//!
//! Entries are immutable: `put` never replaces an existing tile, only
//! `invalidate` removes one.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{ImageFormat, RgbaImage};
use log::{debug, error};
use thiserror::Error;

use crate::TileKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("png codec: {0}")]
    Image(#[from] image::ImageError),
    #[error("tile cache lock poisoned")]
    Poisoned,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io { path: path.to_path_buf(), source }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CacheError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CacheError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

pub trait TileCache: Send + Sync {
    fn contains(&self, key: TileKey) -> bool;

    /// PNG bytes of a cached tile.
    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Publish a tile unless one already exists. Returns whether this call wrote it.
    fn put(&self, key: TileKey, png: &[u8]) -> Result<bool, CacheError>;

    /// Remove a tile. Returns whether it existed.
    fn invalidate(&self, key: TileKey) -> Result<bool, CacheError>;

    /// Every cached tile of one zoom level.
    fn keys(&self, zoom: u8) -> Result<Vec<TileKey>, CacheError>;

    /// Filesystem location of a tile, for backends that have one.
    fn location(&self, _key: TileKey) -> Option<PathBuf> {
        None
    }
}

/// `<root>/<zoom>/<x>/<-z>.png`, z negated to match the viewer's y axis.
pub struct DiskCache {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), tmp_counter: AtomicU64::new(0) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, key: TileKey) -> PathBuf {
        self.root
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.png", -(key.z as i64)))
    }

    /// Idempotent `mkdir -p` for a tile's directory.
    fn ensure_dir(&self, dir: &Path) -> Result<(), CacheError> {
        fs::create_dir_all(dir).map_err(io_err(dir))
    }

    fn tmp_path(&self, dir: &Path, key: TileKey) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(".{}.{}.{}.tmp", -(key.z as i64), std::process::id(), n))
    }

    /// Move a fully written temporary file into place.
    ///
    /// A hard link never replaces an existing file, so concurrent writers of one key
    /// publish exactly once. Filesystems without hard links fall back to `rename`, which
    /// is still atomic for readers, but between the `exists` check and the rename a
    /// concurrent writer's tile can be replaced by an equivalent one.
    fn publish(&self, tmp: &Path, path: &Path) -> Result<bool, CacheError> {
        match fs::hard_link(tmp, path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                debug!("hard link into {} failed ({}), falling back to rename", path.display(), e);
                if path.exists() {
                    return Ok(false);
                }
                fs::rename(tmp, path).map_err(io_err(path))?;
                Ok(true)
            }
        }
    }
}

impl TileCache for DiskCache {
    fn contains(&self, key: TileKey) -> bool {
        self.tile_path(key).is_file()
    }

    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.tile_path(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn put(&self, key: TileKey, png: &[u8]) -> Result<bool, CacheError> {
        let path = self.tile_path(key);
        if path.exists() {
            return Ok(false);
        }
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        self.ensure_dir(&dir)?;

        let tmp = self.tmp_path(&dir, key);
        let result = fs::write(&tmp, png).map_err(io_err(&tmp)).and_then(|_| self.publish(&tmp, &path));
        if tmp.exists() {
            let _ = fs::remove_file(&tmp);
        }
        if let Err(e) = &result {
            error!("Failed to write tile {:?}: {}", key, e);
        }
        result
    }

    fn invalidate(&self, key: TileKey) -> Result<bool, CacheError> {
        let path = self.tile_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn keys(&self, zoom: u8) -> Result<Vec<TileKey>, CacheError> {
        let level = self.root.join(zoom.to_string());
        let columns = match fs::read_dir(&level) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&level)(e)),
        };

        let mut keys = Vec::new();
        for column in columns {
            let column = column.map_err(io_err(&level))?;
            let Some(x) = column.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
                continue;
            };
            let dir = column.path();
            if !dir.is_dir() {
                continue;
            }
            for tile in fs::read_dir(&dir).map_err(io_err(&dir))? {
                let tile = tile.map_err(io_err(&dir))?;
                let path = tile.path();
                if path.extension().and_then(|e| e.to_str()) != Some("png") {
                    continue;
                }
                if let Some(stored_z) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<i64>().ok()) {
                    keys.push(TileKey::new(zoom, x, -stored_z as i32));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn location(&self, key: TileKey) -> Option<PathBuf> {
        Some(self.tile_path(key))
    }
}

/// Process-local cache for tests and one-shot renders.
#[derive(Default)]
pub struct MemoryCache {
    tiles: RwLock<HashMap<TileKey, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileCache for MemoryCache {
    fn contains(&self, key: TileKey) -> bool {
        self.tiles.read().map(|t| t.contains_key(&key)).unwrap_or(false)
    }

    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, CacheError> {
        let tiles = self.tiles.read().map_err(|_| CacheError::Poisoned)?;
        Ok(tiles.get(&key).cloned())
    }

    fn put(&self, key: TileKey, png: &[u8]) -> Result<bool, CacheError> {
        let mut tiles = self.tiles.write().map_err(|_| CacheError::Poisoned)?;
        if tiles.contains_key(&key) {
            return Ok(false);
        }
        tiles.insert(key, png.to_vec());
        Ok(true)
    }

    fn invalidate(&self, key: TileKey) -> Result<bool, CacheError> {
        let mut tiles = self.tiles.write().map_err(|_| CacheError::Poisoned)?;
        Ok(tiles.remove(&key).is_some())
    }

    fn keys(&self, zoom: u8) -> Result<Vec<TileKey>, CacheError> {
        let tiles = self.tiles.read().map_err(|_| CacheError::Poisoned)?;
        let mut keys: Vec<TileKey> = tiles.keys().copied().filter(|k| k.zoom == zoom).collect();
        keys.sort();
        Ok(keys)
    }
}
