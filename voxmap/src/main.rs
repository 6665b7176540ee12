use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use voxmap_benchmark::RenderMetrics;
use voxmap_render::AssetTextures;
use voxmap_storage::SqliteStore;
use voxmap_tiles::{DiskCache, MapConfig, MapRenderer, PyramidBuilder, TileCache, TileKey, TileStatus};

const TEXTURE_CACHE_SIZE: usize = 512;

#[derive(Parser)]
#[command(name = "voxmap", about = "Render a voxel world's map.sqlite into a slippy-map tile pyramid")]
pub struct Args {
    /// World database, or a world directory containing map.sqlite
    #[arg(short, long, env = "VOXMAP_WORLD", default_value = "map.sqlite")]
    pub world: PathBuf,

    /// Tile cache root: <cache>/<zoom>/<x>/<-z>.png
    #[arg(short, long, env = "VOXMAP_CACHE", default_value = "images")]
    pub cache_dir: PathBuf,

    /// Game mods directory holding <mod>/textures/<mod>_<item>.png
    #[arg(short, long, env = "VOXMAP_TEXTURES", default_value = "/usr/share/minetest/games/minetest_game/mods")]
    pub textures: PathBuf,

    /// Number of coarser zoom levels above the base tiles
    #[arg(short, long, default_value = "3")]
    pub zoom_levels: u8,

    /// Print run summaries as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render every column of the world, then build the pyramid
    Generate,
    /// Render one base tile if it is not cached yet and print its path
    Tile {
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,
    },
    /// Rebuild coarser levels from cached base tiles only
    Pyramid,
    /// Remove one cached tile; a base tile takes its coarser tiles with it
    Invalidate {
        zoom: u8,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,
    },
}

fn world_database(path: &Path) -> PathBuf {
    if path.is_dir() { path.join("map.sqlite") } else { path.to_path_buf() }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = MapConfig { zoom_levels: args.zoom_levels, ..Default::default() };
    config.validate()?;
    let cache: Arc<dyn TileCache> = Arc::new(DiskCache::new(&args.cache_dir));

    let metrics = Arc::new(RenderMetrics::new(format!(
        "world={} cache={} zoom_levels={}",
        args.world.display(),
        args.cache_dir.display(),
        args.zoom_levels
    )));

    // Cache-only commands never touch the world database.
    match args.command {
        Command::Invalidate { zoom, x, z } => {
            let pyramid = PyramidBuilder::new(cache.clone(), config.clone(), metrics.clone());
            let removed = pyramid.invalidate(TileKey::new(zoom, x, z))?;
            info!("Invalidated tile ({}, {}, {}): {} cached tiles removed", zoom, x, z, removed);
            return Ok(());
        }
        Command::Pyramid => {
            let pyramid = PyramidBuilder::new(cache.clone(), config.clone(), metrics.clone());
            let levels = pyramid.build_from_cache()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&levels)?);
            } else {
                for level in levels {
                    println!("zoom {}: {} built, {} cached, {} failed", level.zoom, level.built, level.cached, level.failed);
                }
            }
            return Ok(());
        }
        Command::Generate | Command::Tile { .. } => {}
    }

    let database = world_database(&args.world);
    let store = Arc::new(SqliteStore::open(&database).context("Could not open world")?);
    let capacity = NonZeroUsize::new(TEXTURE_CACHE_SIZE).context("texture cache size must be non-zero")?;
    let textures = Arc::new(AssetTextures::new(&args.textures, capacity));
    let renderer = MapRenderer::new(store, textures.clone(), cache.clone(), config, metrics.clone());

    match args.command {
        Command::Generate => {
            let summary = renderer.generate()?;
            let missing = textures.missing();
            if !missing.is_empty() {
                info!("{} content types rendered with the placeholder texture", missing.len());
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", metrics.generate_report());
            }
        }
        Command::Tile { x, z } => {
            let status = renderer.ensure_base_tile(x, z)?;
            let key = renderer.base_key(x, z);
            let location = cache.location(key).unwrap_or_default();
            match status {
                TileStatus::Rendered => info!("Rendered tile for column ({}, {})", x, z),
                TileStatus::Cached => info!("Tile for column ({}, {}) already cached", x, z),
            }
            println!("{}", location.display());
        }
        Command::Invalidate { .. } | Command::Pyramid => {}
    }

    Ok(())
}
