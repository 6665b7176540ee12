//! Coarser zoom levels built from base tiles.
//!
//! Level `d` (1..=zoom_levels) groups `2^d x 2^d` base tiles into one
//! tile at zoom `base - d`. Each base tile is downsampled to `256 / 2^d`
//! pixels and pasted at column `sx`, row `factor - sz - 1` so that z grows
//! upward in the image, matching the base tiles.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use image::imageops;
use image::RgbaImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use voxmap_benchmark::RenderMetrics;
use voxmap_render::TILE_SIZE;

use crate::cache::{CacheError, TileCache, decode_png, encode_png};
use crate::{MapConfig, TileKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub zoom: u8,
    pub built: usize,
    pub cached: usize,
    pub failed: usize,
}

enum Outcome {
    Built,
    Cached,
}

pub struct PyramidBuilder {
    cache: Arc<dyn TileCache>,
    config: MapConfig,
    metrics: Arc<RenderMetrics>,
}

impl PyramidBuilder {
    pub fn new(cache: Arc<dyn TileCache>, config: MapConfig, metrics: Arc<RenderMetrics>) -> Self {
        Self { cache, config, metrics }
    }

    /// Build every coarser level from the base tiles currently in the cache.
    pub fn build_from_cache(&self) -> Result<Vec<LevelSummary>, CacheError> {
        let base: BTreeSet<(i32, i32)> = self
            .cache
            .keys(self.config.base_zoom())?
            .into_iter()
            .map(|key| (key.x, key.z))
            .collect();
        info!("Building pyramid from {} base tiles", base.len());
        Ok(self.build(&base))
    }

    /// Build every coarser level covering the given base tile coordinates.
    pub fn build(&self, base: &BTreeSet<(i32, i32)>) -> Vec<LevelSummary> {
        (1..=self.config.zoom_levels).map(|level| self.build_level(level, base)).collect()
    }

    fn build_level(&self, level: u8, base: &BTreeSet<(i32, i32)>) -> LevelSummary {
        let factor = 1i32 << level;
        let zoom = self.config.base_zoom() - level;
        let destinations: Vec<(i32, i32)> = base
            .iter()
            .map(|&(x, z)| (x.div_euclid(factor), z.div_euclid(factor)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let outcomes: Vec<Result<Outcome, CacheError>> = destinations
            .par_iter()
            .map(|&(x, z)| self.build_tile(TileKey::new(zoom, x, z)))
            .collect();

        let mut summary = LevelSummary { zoom, ..Default::default() };
        for (outcome, (x, z)) in outcomes.into_iter().zip(destinations) {
            match outcome {
                Ok(Outcome::Built) => summary.built += 1,
                Ok(Outcome::Cached) => summary.cached += 1,
                Err(e) => {
                    warn!("Pyramid tile ({}, {}, {}) failed: {}", zoom, x, z, e);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "Zoom {}: {} built, {} already cached, {} failed",
            zoom, summary.built, summary.cached, summary.failed
        );
        summary
    }

    fn build_tile(&self, key: TileKey) -> Result<Outcome, CacheError> {
        if self.cache.contains(key) {
            self.metrics.record_cache_hit();
            return Ok(Outcome::Cached);
        }
        self.metrics.record_cache_miss();

        let start = Instant::now();
        let image = self.compose(key);
        let png = encode_png(&image)?;
        if !self.cache.put(key, &png)? {
            return Ok(Outcome::Cached);
        }
        self.metrics.record_cache_write(png.len());
        self.metrics.record_pyramid_tile(start.elapsed());
        Ok(Outcome::Built)
    }

    /// Assemble the tile at `key` from its base tiles, in fixed row-major order.
    ///
    /// `key.zoom` must be coarser than the base zoom.
    fn compose(&self, key: TileKey) -> RgbaImage {
        let level = self.config.base_zoom() - key.zoom;
        let factor = 1u32 << level;
        let size = TILE_SIZE / factor;
        let mut dest = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, self.config.blank);

        for sz in 0..factor {
            for sx in 0..factor {
                let source = TileKey::new(
                    self.config.base_zoom(),
                    key.x * factor as i32 + sx as i32,
                    key.z * factor as i32 + sz as i32,
                );
                let Some(tile) = self.load(source) else {
                    // Blank region; dest is already filled with it.
                    continue;
                };
                let scaled = imageops::resize(&tile, size, size, self.config.filter);
                imageops::replace(&mut dest, &scaled, (size * sx) as i64, (size * (factor - sz - 1)) as i64);
            }
        }
        dest
    }

    fn load(&self, key: TileKey) -> Option<RgbaImage> {
        match self.cache.get(key) {
            Ok(Some(bytes)) => match decode_png(&bytes) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("Unreadable base tile {:?}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read base tile {:?}: {}", key, e);
                None
            }
        }
    }

    /// Remove one tile. Removing a base tile also removes every coarser tile built from it,
    /// so the next build recomposes them. Returns how many tiles existed.
    pub fn invalidate(&self, key: TileKey) -> Result<usize, CacheError> {
        let mut removed = usize::from(self.cache.invalidate(key)?);
        if key.zoom == self.config.base_zoom() {
            removed += self.invalidate_ancestors(key.x, key.z)?;
        }
        Ok(removed)
    }

    /// Drop every coarser tile covering base tile (x, z). Returns how many existed.
    fn invalidate_ancestors(&self, x: i32, z: i32) -> Result<usize, CacheError> {
        let mut removed = 0;
        for level in 1..=self.config.zoom_levels {
            let factor = 1i32 << level;
            let key = TileKey::new(self.config.base_zoom() - level, x.div_euclid(factor), z.div_euclid(factor));
            if self.cache.invalidate(key)? {
                debug!("Invalidated {:?}", key);
                removed += 1;
            }
        }
        Ok(removed)
    }
}
