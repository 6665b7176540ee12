//! Base tile rendering: one block column -> one 256x256 RGBA tile.

use std::sync::Arc;

use image::imageops;
use image::{Pixel, RgbaImage};
use thiserror::Error;

use crate::surface::ColumnSurface;
use crate::texture::{TEXTURE_SIZE, TextureResolver, fit_texture};

/// Side length of every tile in pixels.
pub const TILE_SIZE: u32 = 256;

const CELLS: u32 = TILE_SIZE / TEXTURE_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("column ({x}, {z}) is incomplete: {missing} of 256 cells have no surface, first at {first:?}")]
    IncompleteColumn { x: i32, z: i32, missing: usize, first: (i32, i32) },
}

impl RenderError {
    /// True when the column had no surface at all (nothing loaded there).
    pub fn is_blank(&self) -> bool {
        matches!(self, RenderError::IncompleteColumn { missing, .. } if *missing == (CELLS * CELLS) as usize)
    }
}

/// Porter-Duff "over": `top` composited onto `bottom` in place.
///
/// Both images must have the same dimensions. Fully opaque top pixels replace the bottom exactly.
pub fn alpha_composite(bottom: &mut RgbaImage, top: &RgbaImage) {
    debug_assert_eq!(bottom.dimensions(), top.dimensions());
    for (dst, src) in bottom.pixels_mut().zip(top.pixels()) {
        let sa = src[3] as u32;
        if sa == 255 {
            *dst = *src;
            continue;
        }
        if sa == 0 {
            continue;
        }
        let da = dst[3] as u32;
        // 255^2-scaled output alpha
        let out_a = sa * 255 + da * (255 - sa);
        let channels = dst.channels_mut();
        for c in 0..3 {
            let num = src[c] as u32 * sa * 255 + channels[c] as u32 * da * (255 - sa);
            channels[c] = ((num + out_a / 2) / out_a) as u8;
        }
        channels[3] = ((out_a + 127) / 255) as u8;
    }
}

pub struct TileCompositor {
    textures: Arc<dyn TextureResolver>,
}

impl TileCompositor {
    pub fn new(textures: Arc<dyn TextureResolver>) -> Self {
        Self { textures }
    }

    fn texture(&self, identifier: &str) -> RgbaImage {
        fit_texture((*self.textures.resolve(identifier)).clone())
    }

    /// Render the base tile of a fully resolved column.
    ///
    /// Local z grows upward in the tile: cell row 0 is the bottom-most 16 pixel rows.
    pub fn render(&self, surface: &ColumnSurface<'_>) -> Result<RgbaImage, RenderError> {
        let gaps = surface.gaps();
        if let Some(&first) = gaps.first() {
            return Err(RenderError::IncompleteColumn { x: surface.x, z: surface.z, missing: gaps.len(), first });
        }

        let mut tile = RgbaImage::new(TILE_SIZE, TILE_SIZE);
        for lz in 0..CELLS {
            for lx in 0..CELLS {
                let Some(cell) = surface.cell(lx as usize, lz as usize) else {
                    // gaps() was empty
                    continue;
                };
                let top = self.texture(&cell.top.content.identifier());
                let pixels = match cell.below {
                    Some(below) => {
                        let mut under = self.texture(&below.content.identifier());
                        alpha_composite(&mut under, &top);
                        under
                    }
                    None => top,
                };
                let flipped = CELLS - lz - 1;
                imageops::replace(&mut tile, &pixels, (lx * TEXTURE_SIZE) as i64, (flipped * TEXTURE_SIZE) as i64);
            }
        }
        Ok(tile)
    }
}
