//! Ground resolution: the top two non-empty voxels of every (x, z) in a column.

use log::warn;
use voxmap_block::{BLOCK_SIZE, Block, Voxel};

/// Highest non-empty voxel at one (x, z) and the next one down, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCell<'a> {
    pub top: Voxel<'a>,
    pub below: Option<Voxel<'a>>,
}

impl<'a> SurfaceCell<'a> {
    /// Keep the strict top two by absolute y. Equal heights keep whichever came first.
    fn offer(slot: &mut Option<SurfaceCell<'a>>, voxel: Voxel<'a>) {
        match slot {
            None => *slot = Some(SurfaceCell { top: voxel, below: None }),
            Some(cell) if voxel.abs_y > cell.top.abs_y => {
                cell.below = Some(cell.top);
                cell.top = voxel;
            }
            Some(cell) if voxel.abs_y < cell.top.abs_y && cell.below.is_none_or(|b| voxel.abs_y > b.abs_y) => {
                cell.below = Some(voxel);
            }
            Some(_) => {}
        }
    }
}

/// Surface of one block column: 16 x 16 cells, indexed by local (x, z).
#[derive(Debug, Clone)]
pub struct ColumnSurface<'a> {
    pub x: i32,
    pub z: i32,
    cells: [[Option<SurfaceCell<'a>>; BLOCK_SIZE]; BLOCK_SIZE],
}

impl<'a> ColumnSurface<'a> {
    pub fn empty(x: i32, z: i32) -> Self {
        Self { x, z, cells: [[None; BLOCK_SIZE]; BLOCK_SIZE] }
    }

    pub fn cell(&self, local_x: usize, local_z: usize) -> Option<&SurfaceCell<'a>> {
        self.cells[local_z][local_x].as_ref()
    }

    /// Absolute (x, z) of every cell without a surface.
    pub fn gaps(&self) -> Vec<(i32, i32)> {
        let size = BLOCK_SIZE as i32;
        let mut gaps = Vec::new();
        for (lz, row) in self.cells.iter().enumerate() {
            for (lx, cell) in row.iter().enumerate() {
                if cell.is_none() {
                    gaps.push((self.x * size + lx as i32, self.z * size + lz as i32));
                }
            }
        }
        gaps
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_some)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_none)
    }

    fn offer(&mut self, voxel: Voxel<'a>) {
        let (lx, _, lz) = voxel.local;
        SurfaceCell::offer(&mut self.cells[lz as usize][lx as usize], voxel);
    }
}

/// Resolve the ground of block column (x, z) from its decoded blocks, in any order.
///
/// Air and ignore are never surface; blocks from other columns are ignored.
pub fn resolve_column(x: i32, z: i32, blocks: &[Block]) -> ColumnSurface<'_> {
    let mut surface = ColumnSurface::empty(x, z);
    for block in blocks {
        if block.pos.x != x || block.pos.z != z {
            warn!("Block {:?} does not belong to column ({}, {})", block.pos, x, z);
            continue;
        }
        if block.is_invisible() {
            continue;
        }
        for voxel in block.voxels().filter(|v| !v.content.is_empty()) {
            surface.offer(voxel);
        }
    }
    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxmap_block::builder::BlockBuilder;
    use voxmap_block::pos::encode;
    use voxmap_block::Content;

    fn block(x: i32, y: i32, z: i32, builder: BlockBuilder) -> Block {
        Block::decode(encode(x, y, z).unwrap(), &builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_top_and_undercoat_skip_air() {
        let blocks = vec![block(
            0,
            0,
            0,
            BlockBuilder::new()
                .set_node(0, 5, 0, "default:stone")
                .set_node(0, 9, 0, "air")
                .set_node(0, 12, 0, "default:dirt"),
        )];
        let surface = resolve_column(0, 0, &blocks);
        let cell = surface.cell(0, 0).unwrap();

        assert_eq!(cell.top.abs_y, 12);
        assert_eq!(cell.top.content, Content::Named("default:dirt"));
        let below = cell.below.unwrap();
        assert_eq!(below.abs_y, 5);
        assert_eq!(below.content, Content::Named("default:stone"));
    }

    #[test]
    fn test_true_running_second_highest() {
        // Offer order 5, 12, 9: the undercoat must end up at 9, not 5.
        let blocks = vec![block(
            0,
            0,
            0,
            BlockBuilder::new().set_node(3, 5, 4, "a:low").set_node(3, 12, 4, "a:high").set_node(3, 9, 4, "a:mid"),
        )];
        let mut slot = None;
        for y in [5u8, 12, 9] {
            SurfaceCell::offer(&mut slot, blocks[0].voxel(3, y, 4));
        }
        let cell = slot.unwrap();
        assert_eq!(cell.top.abs_y, 12);
        assert_eq!(cell.below.map(|v| v.abs_y), Some(9));

        let surface = resolve_column(0, 0, &blocks);
        assert_eq!(surface.cell(3, 4), Some(&cell));
    }

    #[test]
    fn test_order_independent_across_blocks() {
        let low = block(2, -1, 3, BlockBuilder::new().fill("default:stone"));
        let high = block(2, 4, 3, BlockBuilder::new().fill_layer(0, "default:grass"));
        let forward = vec![low.clone(), high.clone()];
        let backward = vec![high, low];

        let a = resolve_column(2, 3, &forward);
        let b = resolve_column(2, 3, &backward);
        assert!(a.is_complete());
        for lz in 0..16 {
            for lx in 0..16 {
                let (ca, cb) = (a.cell(lx, lz).unwrap(), b.cell(lx, lz).unwrap());
                assert_eq!(ca.top.abs_y, 64);
                assert_eq!(ca.below.map(|v| v.abs_y), Some(-1));
                assert_eq!(ca.top.abs_y, cb.top.abs_y);
                assert_eq!(ca.below.map(|v| v.abs_y), cb.below.map(|v| v.abs_y));
            }
        }
    }

    #[test]
    fn test_invisible_blocks_contribute_nothing() {
        let blocks = vec![
            block(0, 1, 0, BlockBuilder::new()),
            block(0, 2, 0, BlockBuilder::new().fill("ignore")),
        ];
        let surface = resolve_column(0, 0, &blocks);
        assert!(surface.is_blank());
        assert_eq!(surface.gaps().len(), 256);
    }

    #[test]
    fn test_gaps_report_absolute_coordinates() {
        let blocks = vec![block(-1, 0, 2, BlockBuilder::new().fill("default:stone").set_node(0, 0, 0, "air"))];
        let mut surface = resolve_column(-1, 2, &blocks);
        // Stone above the air cell still covers (0, 0)
        assert!(surface.is_complete());

        surface.cells[0][0] = None;
        assert_eq!(surface.gaps(), vec![(-16, 32)]);
        assert!(!surface.is_complete());
    }

    #[test]
    fn test_foreign_blocks_ignored() {
        let blocks = vec![block(1, 0, 0, BlockBuilder::new().fill("default:stone"))];
        assert!(resolve_column(0, 0, &blocks).is_blank());
    }

    #[test]
    fn test_unresolved_voxels_are_surface() {
        let blocks = vec![block(
            0,
            0,
            0,
            BlockBuilder::new().set_node(9, 2, 9, "default:stone").set_raw(1, 7, 1, 321),
        )];
        let surface = resolve_column(0, 0, &blocks);
        let cell = surface.cell(1, 1).unwrap();
        assert_eq!(cell.top.content, Content::Unresolved(321));
        assert!(cell.below.is_none());
        assert_eq!(surface.cell(9, 9).unwrap().top.content, Content::Named("default:stone"));
    }

    #[test]
    fn test_air_only_table_hides_raw_ids() {
        // Name table is exactly {0: "air"}; the raw id has no entry, so the whole block is empty.
        let data = block(0, 0, 0, BlockBuilder::new().set_raw(1, 7, 1, 321));
        assert!(data.is_only_air());
        assert!(resolve_column(0, 0, &[data]).is_blank());
    }
}
