//! Content identifier -> RGBA texture lookup.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use log::{debug, warn};
use lru::LruCache;

/// Side length of one voxel texture in pixels.
pub const TEXTURE_SIZE: u32 = 16;

const PLACEHOLDER_MOD: &str = "default";
const PLACEHOLDER_ITEM: &str = "mese_block";
const CHECKER_A: Rgba<u8> = Rgba([255, 0, 255, 255]);
const CHECKER_B: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub trait TextureResolver: Send + Sync {
    /// Texture for `identifier`, or the placeholder. Never fails.
    fn resolve(&self, identifier: &str) -> Arc<RgbaImage>;
}

/// 16x16 magenta/black checker in 8px squares, used when even the placeholder asset is missing.
pub fn checker_placeholder() -> RgbaImage {
    RgbaImage::from_fn(TEXTURE_SIZE, TEXTURE_SIZE, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 { CHECKER_A } else { CHECKER_B }
    })
}

/// Scale any texture to the voxel texture size.
pub fn fit_texture(image: RgbaImage) -> RgbaImage {
    if image.dimensions() == (TEXTURE_SIZE, TEXTURE_SIZE) {
        image
    } else {
        imageops::resize(&image, TEXTURE_SIZE, TEXTURE_SIZE, FilterType::Nearest)
    }
}

/// Content families that share one texture.
pub fn texture_alias(identifier: &str) -> &str {
    if identifier.contains("dirt") {
        "default:dirt"
    } else if identifier.contains("cactus") {
        "default:cactus_top"
    } else if identifier.contains("water") {
        "default:water"
    } else if identifier.contains("stone") {
        "default:stone"
    } else {
        identifier
    }
}

/// `<root>/<mod>/textures/<mod>_<item>.png`, or `None` when the identifier has no namespace.
pub fn asset_path(root: &Path, identifier: &str) -> Option<PathBuf> {
    let (module, item) = identifier.split_once(':')?;
    if module.is_empty() || item.is_empty() {
        return None;
    }
    Some(root.join(module).join("textures").join(format!("{module}_{item}.png")))
}

/// Textures read from a game's mod directory, with an LRU of decoded images.
pub struct AssetTextures {
    root: PathBuf,
    placeholder: Arc<RgbaImage>,
    cache: Mutex<LruCache<String, Arc<RgbaImage>>>,
    reported: Mutex<HashSet<String>>,
}

impl AssetTextures {
    pub fn new(root: impl Into<PathBuf>, capacity: NonZeroUsize) -> Self {
        let root = root.into();
        let placeholder_id = format!("{PLACEHOLDER_MOD}:{PLACEHOLDER_ITEM}");
        let placeholder = match asset_path(&root, &placeholder_id).map(|p| image::open(&p)) {
            Some(Ok(image)) => fit_texture(image.to_rgba8()),
            _ => {
                warn!("Placeholder texture missing under {}, using checker", root.display());
                checker_placeholder()
            }
        };
        Self {
            root,
            placeholder: Arc::new(placeholder),
            cache: Mutex::new(LruCache::new(capacity)),
            reported: Mutex::new(HashSet::new()),
        }
    }

    pub fn placeholder(&self) -> Arc<RgbaImage> {
        self.placeholder.clone()
    }

    /// Identifiers that fell back to the placeholder so far, sorted.
    pub fn missing(&self) -> Vec<String> {
        let reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
        let mut missing: Vec<String> = reported.iter().cloned().collect();
        missing.sort();
        missing
    }

    fn load(&self, identifier: &str) -> Arc<RgbaImage> {
        let loaded = asset_path(&self.root, identifier)
            .ok_or_else(|| "no namespace".to_string())
            .and_then(|path| image::open(&path).map_err(|e| format!("{}: {}", path.display(), e)));
        match loaded {
            Ok(image) => Arc::new(fit_texture(image.to_rgba8())),
            Err(reason) => {
                let mut reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
                if reported.insert(identifier.to_string()) {
                    warn!("No texture found for {} ({}), using placeholder", identifier, reason);
                }
                self.placeholder.clone()
            }
        }
    }
}

impl TextureResolver for AssetTextures {
    fn resolve(&self, identifier: &str) -> Arc<RgbaImage> {
        let identifier = texture_alias(identifier);
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(image) = cache.get(identifier) {
                return image.clone();
            }
        }
        // Decoded outside the lock.
        let image = self.load(identifier);
        debug!("Loaded texture {}", identifier);
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(identifier.to_string(), image.clone());
        image
    }
}

/// Fixed in-memory textures: solid colours or explicit images, checker for anything else.
#[derive(Default)]
pub struct StaticTextures {
    images: HashMap<String, Arc<RgbaImage>>,
}

impl StaticTextures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(self, identifier: &str, color: [u8; 4]) -> Self {
        let image = RgbaImage::from_pixel(TEXTURE_SIZE, TEXTURE_SIZE, Rgba(color));
        self.image(identifier, image)
    }

    pub fn image(mut self, identifier: &str, image: RgbaImage) -> Self {
        self.images.insert(identifier.to_string(), Arc::new(fit_texture(image)));
        self
    }
}

impl TextureResolver for StaticTextures {
    fn resolve(&self, identifier: &str) -> Arc<RgbaImage> {
        self.images.get(identifier).cloned().unwrap_or_else(|| Arc::new(checker_placeholder()))
    }
}
