//! Tile cache, zoom pyramid and the world -> tile pipeline.

use image::Rgba;
use image::imageops::FilterType;

pub mod cache;
pub mod pyramid;
pub mod renderer;

pub use cache::{CacheError, DiskCache, MemoryCache, TileCache};
pub use pyramid::{LevelSummary, PyramidBuilder};
pub use renderer::{GenerationSummary, MapRenderer, TileStatus};

/// Address of one tile. At the base zoom, (x, z) is a block column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u8,
    pub x: i32,
    pub z: i32,
}

impl TileKey {
    pub const fn new(zoom: u8, x: i32, z: i32) -> Self {
        Self { zoom, x, z }
    }
}

pub const MAX_ZOOM_LEVELS: u8 = 8;

#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Coarser levels above the base. The base tiles live at zoom `zoom_levels`, the coarsest at 0.
    pub zoom_levels: u8,
    /// Downsampling filter for coarser levels.
    pub filter: FilterType,
    /// Fill for regions with no base tile.
    pub blank: Rgba<u8>,
    /// Drop wholly air / wholly ignore blocks before resolving.
    pub only_visible: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom_levels: 3,
            filter: FilterType::Lanczos3,
            blank: Rgba([0, 0, 0, 255]),
            only_visible: true,
        }
    }
}

impl MapConfig {
    pub fn base_zoom(&self) -> u8 {
        self.zoom_levels
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.zoom_levels > MAX_ZOOM_LEVELS {
            anyhow::bail!("zoom levels must be at most {}, got {}", MAX_ZOOM_LEVELS, self.zoom_levels);
        }
        Ok(())
    }
}
