//! World -> base tile -> pyramid pipeline.
//!
//! One base tile is a sequential read / decode / resolve / composite /
//! cache-write. Batch generation runs independent columns in parallel.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbaImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use voxmap_benchmark::RenderMetrics;
use voxmap_render::{RenderError, TextureResolver, TileCompositor, resolve_column};
use voxmap_storage::{WorldReader, WorldStore};

use crate::cache::{TileCache, encode_png};
use crate::pyramid::{LevelSummary, PyramidBuilder};
use crate::{MapConfig, TileKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Rendered,
    Cached,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationSummary {
    pub columns: usize,
    pub rendered: usize,
    pub cached: usize,
    /// Columns with no surface anywhere (nothing but air / ignore loaded).
    pub empty: usize,
    pub failed: usize,
    pub levels: Vec<LevelSummary>,
}

pub struct MapRenderer {
    reader: WorldReader,
    compositor: TileCompositor,
    cache: Arc<dyn TileCache>,
    pyramid: PyramidBuilder,
    config: MapConfig,
    metrics: Arc<RenderMetrics>,
}

impl MapRenderer {
    pub fn new(
        store: Arc<dyn WorldStore>,
        textures: Arc<dyn TextureResolver>,
        cache: Arc<dyn TileCache>,
        config: MapConfig,
        metrics: Arc<RenderMetrics>,
    ) -> Self {
        Self {
            reader: WorldReader::new(store),
            compositor: TileCompositor::new(textures),
            pyramid: PyramidBuilder::new(cache.clone(), config.clone(), metrics.clone()),
            cache,
            config,
            metrics,
        }
    }

    pub fn base_key(&self, x: i32, z: i32) -> TileKey {
        TileKey::new(self.config.base_zoom(), x, z)
    }

    /// Render the base tile of block column (x, z) without touching the cache.
    pub fn render_column(&self, x: i32, z: i32) -> Result<RgbaImage> {
        let start = Instant::now();
        let read = self.reader.column(x, z, self.config.only_visible)?;
        self.metrics.record_column_read(
            start.elapsed(),
            read.blocks.len(),
            read.unsupported + read.corrupt,
        );

        let resolve_start = Instant::now();
        let surface = resolve_column(x, z, &read.blocks);
        self.metrics.record_resolve(resolve_start.elapsed());

        let composite_start = Instant::now();
        let tile = self.compositor.render(&surface)?;
        self.metrics.record_composite(composite_start.elapsed());

        self.metrics.record_render(start.elapsed());
        Ok(tile)
    }

    /// Make sure the base tile of (x, z) is cached, rendering it if needed.
    ///
    /// A failed render caches nothing.
    pub fn ensure_base_tile(&self, x: i32, z: i32) -> Result<TileStatus> {
        let key = self.base_key(x, z);
        if self.cache.contains(key) {
            self.metrics.record_cache_hit();
            return Ok(TileStatus::Cached);
        }
        self.metrics.record_cache_miss();

        let tile = self.render_column(x, z).inspect_err(|_| self.metrics.record_render_failure())?;
        let png = encode_png(&tile)?;
        if self.cache.put(key, &png).with_context(|| format!("Failed to cache tile {key:?}"))? {
            self.metrics.record_cache_write(png.len());
        }
        Ok(TileStatus::Rendered)
    }

    /// PNG bytes of the base tile at (x, z), rendered on demand.
    pub fn base_tile(&self, x: i32, z: i32) -> Result<Vec<u8>> {
        let key = self.base_key(x, z);
        self.ensure_base_tile(x, z)?;
        self.cache
            .get(key)?
            .with_context(|| format!("Tile {key:?} vanished from the cache"))
    }

    /// Render every column of the world, then build the pyramid.
    ///
    /// Per-column failures are logged and counted; they never stop the run.
    pub fn generate(&self) -> Result<GenerationSummary> {
        let columns: Vec<(i32, i32)> = self.reader.columns()?.into_iter().collect();
        info!("Found {} columns", columns.len());

        let outcomes: Vec<Result<TileStatus>> =
            columns.par_iter().map(|&(x, z)| self.ensure_base_tile(x, z)).collect();

        let mut summary = GenerationSummary { columns: columns.len(), ..Default::default() };
        for (outcome, &(x, z)) in outcomes.into_iter().zip(&columns) {
            match outcome {
                Ok(TileStatus::Rendered) => summary.rendered += 1,
                Ok(TileStatus::Cached) => summary.cached += 1,
                Err(e) => match e.downcast_ref::<RenderError>() {
                    Some(render) if render.is_blank() => {
                        debug!("Column ({}, {}) has no surface", x, z);
                        summary.empty += 1;
                    }
                    _ => {
                        warn!("Column ({}, {}) failed: {:#}", x, z, e);
                        summary.failed += 1;
                    }
                },
            }
        }
        info!(
            "Base level tiles done: {} rendered, {} cached, {} empty, {} failed",
            summary.rendered, summary.cached, summary.empty, summary.failed
        );

        summary.levels = self.build_pyramid()?;
        Ok(summary)
    }

    /// Build the coarser levels from whatever base tiles are cached.
    pub fn build_pyramid(&self) -> Result<Vec<LevelSummary>> {
        self.pyramid.build_from_cache().context("Failed to list base tiles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiskCache, MemoryCache};
    use crate::cache::decode_png;
    use image::Rgba;
    use voxmap_block::builder::BlockBuilder;
    use voxmap_block::pos::encode;
    use voxmap_render::StaticTextures;
    use voxmap_storage::MemoryStore;

    const GRASS: [u8; 4] = [20, 180, 20, 255];
    const STONE: [u8; 4] = [100, 100, 100, 255];

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        renderer: MapRenderer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let textures = Arc::new(StaticTextures::new().color("default:grass", GRASS).color("default:stone", STONE));
        let renderer = MapRenderer::new(
            store.clone(),
            textures,
            cache.clone(),
            MapConfig::default(),
            Arc::new(RenderMetrics::default()),
        );
        Fixture { store, cache, renderer }
    }

    fn put(store: &MemoryStore, x: i32, y: i32, z: i32, builder: BlockBuilder) {
        store.insert(encode(x, y, z).unwrap(), builder.build().unwrap());
    }

    fn ground(store: &MemoryStore, x: i32, z: i32) {
        put(store, x, 0, z, BlockBuilder::new().fill("default:stone").fill_layer(15, "default:grass"));
        put(store, x, 1, z, BlockBuilder::new()); // sky
    }

    #[test]
    fn test_on_demand_tile_is_cached() {
        let f = fixture();
        ground(&f.store, 2, -3);

        let png = f.renderer.base_tile(2, -3).unwrap();
        let image = decode_png(&png).unwrap();
        assert_eq!(image.dimensions(), (256, 256));
        assert_eq!(*image.get_pixel(128, 128), Rgba(GRASS));
        assert!(f.cache.contains(TileKey::new(3, 2, -3)));

        assert_eq!(f.renderer.ensure_base_tile(2, -3).unwrap(), TileStatus::Cached);
        assert_eq!(f.renderer.base_tile(2, -3).unwrap(), png);
    }

    #[test]
    fn test_gap_fails_single_tile_only() {
        let f = fixture();
        ground(&f.store, 0, 0);
        // Sibling with a hole punched through every layer at local (4, 9)
        let mut holed = BlockBuilder::new().fill("default:stone");
        for y in 0..16 {
            holed = holed.set_node(4, y, 9, "air");
        }
        put(&f.store, 1, 0, 0, holed);

        let err = f.renderer.ensure_base_tile(1, 0).unwrap_err();
        let render = err.downcast_ref::<RenderError>().unwrap();
        assert_eq!(*render, RenderError::IncompleteColumn { x: 1, z: 0, missing: 1, first: (20, 9) });
        assert!(!f.cache.contains(TileKey::new(3, 1, 0)));

        assert_eq!(f.renderer.ensure_base_tile(0, 0).unwrap(), TileStatus::Rendered);
    }

    #[test]
    fn test_corrupt_block_is_skipped() {
        let f = fixture();
        ground(&f.store, 0, 0);
        f.store.insert(encode(0, 5, 0).unwrap(), vec![25, 0, 2, 2, 1, 2, 3]);
        put(&f.store, 0, 6, 0, BlockBuilder::new().version(21).fill("default:stone"));

        let image = f.renderer.render_column(0, 0).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgba(GRASS));
    }

    #[test]
    fn test_generate_builds_everything() {
        let f = fixture();
        for (x, z) in [(0, 0), (1, 0), (0, 1), (-1, -1)] {
            ground(&f.store, x, z);
        }
        put(&f.store, 9, 9, 9, BlockBuilder::new()); // air only column
        let mut holed = BlockBuilder::new();
        holed = holed.fill_layer(0, "default:stone").set_node(0, 0, 0, "air");
        put(&f.store, 5, 0, 5, holed);

        let summary = f.renderer.generate().unwrap();
        assert_eq!(summary.columns, 6);
        assert_eq!(summary.rendered, 4);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.levels.len(), 3);
        assert_eq!(f.cache.keys(3).unwrap().len(), 4);
        // (0,0), (1,0), (0,1) share one zoom-2 tile; (-1,-1) has its own
        assert_eq!(f.cache.keys(2).unwrap().len(), 2);

        let again = f.renderer.generate().unwrap();
        assert_eq!(again.rendered, 0);
        assert_eq!(again.cached, 4);
        assert!(again.levels.iter().all(|l| l.built == 0));
    }

    #[test]
    fn test_cache_write_failure_is_not_cached() {
        let root = std::env::temp_dir().join(format!("voxmap-renderer-unwritable-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        // Column x = 1 would live under <root>/3/1/, which is a regular file
        std::fs::create_dir_all(root.join("3")).unwrap();
        std::fs::write(root.join("3").join("1"), b"not a directory").unwrap();

        let store = Arc::new(MemoryStore::new());
        ground(&store, 0, 0);
        ground(&store, 1, 0);
        let cache = Arc::new(DiskCache::new(&root));
        let textures = Arc::new(StaticTextures::new().color("default:grass", GRASS).color("default:stone", STONE));
        let renderer = MapRenderer::new(
            store,
            textures,
            cache.clone(),
            MapConfig::default(),
            Arc::new(RenderMetrics::default()),
        );

        assert!(renderer.ensure_base_tile(1, 0).is_err());
        assert!(!cache.contains(TileKey::new(3, 1, 0)));

        let summary = renderer.generate().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.rendered, 1);
        assert!(cache.contains(TileKey::new(3, 0, 0)));
        assert!(!cache.contains(TileKey::new(3, 1, 0)));
        assert!(cache.contains(TileKey::new(2, 0, 0)));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
