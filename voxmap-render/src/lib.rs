//! Surface extraction and base tile compositing.

pub mod compositor;
pub mod surface;
pub mod texture;

pub use compositor::{RenderError, TILE_SIZE, TileCompositor, alpha_composite};
pub use surface::{ColumnSurface, SurfaceCell, resolve_column};
pub use texture::{AssetTextures, StaticTextures, TEXTURE_SIZE, TextureResolver};
