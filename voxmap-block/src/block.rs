//! Decoding of one world-storage record into a 16x16x16 block.
//!
//! Record layout (all integers big-endian):
//! - `[version:1][flags:1][content_width:1][params_width:1]`
//! - zlib: `param0` (4096 x u16 ids), `param1` (4096 bytes), `param2` (4096 bytes)
//! - zlib: node metadata (skipped)
//! - static objects: `[version:1][count:2]` then `count` x `[type:1][x:4][y:4][z:4][len:2][data:len]`
//! - `[timestamp:4]`, `0xFFFFFFFF` meaning unknown
//! - name-id mapping: `[version:1][count:2]` then `count` x `[id:2][len:2][name:len]`
//!
//! Anything after the mapping (node timers) is ignored.

use std::collections::BTreeMap;

use log::debug;
use thiserror::Error;

use crate::pos::{BlockPos, CoordError, WorldKey};
use crate::reader::{ReadError, Reader, inflate};

/// The only record format version this decoder understands.
pub const SUPPORTED_VERSION: u8 = 25;

pub const BLOCK_SIZE: usize = 16;
pub const NODE_COUNT: usize = BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE;

const PARAM0_BYTES: usize = NODE_COUNT * 2;
const PARAM_PLANE_BYTES: usize = NODE_COUNT;
const NODE_DATA_BYTES: usize = PARAM0_BYTES + 2 * PARAM_PLANE_BYTES;
const TIMESTAMP_UNKNOWN: u32 = u32::MAX;
// type + 3 x i32 position; the u16 data length is read separately
const STATIC_OBJECT_FIXED: usize = 1 + 3 * 4;

pub const AIR: &str = "air";
pub const IGNORE: &str = "ignore";

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block {pos:?}: unsupported format version {version}")]
    UnsupportedVersion { pos: BlockPos, version: u8 },
    #[error("block {pos:?}: corrupt record: {source}")]
    Corrupt {
        pos: BlockPos,
        #[source]
        source: ReadError,
    },
    #[error("block {pos:?}: node data is {len} bytes, expected {}", NODE_DATA_BYTES)]
    BadNodeData { pos: BlockPos, len: usize },
    #[error(transparent)]
    Key(#[from] CoordError),
}

impl BlockError {
    /// Version mismatches are reportable skips; everything else means the record is damaged.
    pub fn is_corrupt(&self) -> bool {
        !matches!(self, BlockError::UnsupportedVersion { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags {
    pub is_underground: bool,
    pub day_night_differs: bool,
    pub lighting_expired: bool,
    pub generated: bool,
}

impl BlockFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            is_underground: bits & 0x01 != 0,
            day_night_differs: bits & 0x02 != 0,
            lighting_expired: bits & 0x04 != 0,
            generated: bits & 0x08 != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        (self.is_underground as u8)
            | (self.day_night_differs as u8) << 1
            | (self.lighting_expired as u8) << 2
            | (self.generated as u8) << 3
    }
}

/// Content of one voxel: a name from the block's mapping, or the raw id when the mapping lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Content<'a> {
    Named(&'a str),
    Unresolved(u16),
}

impl Content<'_> {
    /// Air and ignore never form a surface.
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Named(name) if *name == AIR || *name == IGNORE)
    }

    /// `"namespace:item"` for named content, `"unknown:<id>"` otherwise.
    pub fn identifier(&self) -> String {
        match self {
            Content::Named(name) => name.to_string(),
            Content::Unresolved(id) => format!("unknown:{id}"),
        }
    }
}

/// One resolved cell of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voxel<'a> {
    /// Local coordinates inside the owning block, each `0..16`.
    pub local: (u8, u8, u8),
    pub block: BlockPos,
    pub abs_x: i32,
    pub abs_y: i32,
    pub abs_z: i32,
    pub content: Content<'a>,
}

/// One decoded world-storage record.
#[derive(Debug, Clone)]
pub struct Block {
    pub pos: BlockPos,
    pub version: u8,
    pub flags: BlockFlags,
    pub content_width: u8,
    pub params_width: u8,
    /// Last save time, `None` when stored as unknown.
    pub timestamp: Option<u32>,
    ids: Vec<u16>,
    param1: Vec<u8>,
    param2: Vec<u8>,
    names: BTreeMap<u16, String>,
}

#[inline]
pub fn node_index(x: usize, y: usize, z: usize) -> usize {
    x + y * BLOCK_SIZE + z * BLOCK_SIZE * BLOCK_SIZE
}

impl Block {
    /// Decode the raw record stored under `key`.
    pub fn decode(key: WorldKey, data: &[u8]) -> Result<Self, BlockError> {
        let pos = key.decode()?;
        let corrupt = |source: ReadError| BlockError::Corrupt { pos, source };

        let mut header = Reader::new(data);
        let version = header.u8().map_err(corrupt)?;
        if version != SUPPORTED_VERSION {
            return Err(BlockError::UnsupportedVersion { pos, version });
        }
        let flags = BlockFlags::from_bits(header.u8().map_err(corrupt)?);
        let content_width = header.u8().map_err(corrupt)?;
        let params_width = header.u8().map_err(corrupt)?;

        let body = &data[4..];
        let (node_data, used) = inflate(body, NODE_DATA_BYTES).map_err(corrupt)?;
        if node_data.len() != NODE_DATA_BYTES {
            return Err(BlockError::BadNodeData { pos, len: node_data.len() });
        }
        let ids: Vec<u16> = node_data[..PARAM0_BYTES]
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect();
        let param1 = node_data[PARAM0_BYTES..PARAM0_BYTES + PARAM_PLANE_BYTES].to_vec();
        let param2 = node_data[PARAM0_BYTES + PARAM_PLANE_BYTES..].to_vec();

        // Node metadata: inflated only to find where it ends.
        let rest = &body[used..];
        let (_metadata, used) = inflate(rest, 0).map_err(corrupt)?;
        let mut r = Reader::new(&rest[used..]);

        let (timestamp, names) = Self::parse_tail(&mut r).map_err(corrupt)?;

        let block = Self {
            pos,
            version,
            flags,
            content_width,
            params_width,
            timestamp,
            ids,
            param1,
            param2,
            names,
        };

        let unresolved = block.ids.iter().filter(|id| !block.names.contains_key(id)).count();
        if unresolved > 0 {
            debug!("Block {:?}: {} voxels have ids missing from the name table", pos, unresolved);
        }

        Ok(block)
    }

    fn parse_tail(r: &mut Reader<'_>) -> Result<(Option<u32>, BTreeMap<u16, String>), ReadError> {
        let _static_version = r.u8()?;
        let static_count = r.u16()?;
        for _ in 0..static_count {
            r.skip(STATIC_OBJECT_FIXED)?;
            let data_len = r.u16()?;
            r.skip(data_len as usize)?;
        }

        let timestamp = match r.u32()? {
            TIMESTAMP_UNKNOWN => None,
            t => Some(t),
        };

        let _mapping_version = r.u8()?;
        let count = r.u16()?;
        let mut names = BTreeMap::new();
        for _ in 0..count {
            let id = r.u16()?;
            let len = r.u16()?;
            names.insert(id, r.string(len as usize)?);
        }

        Ok((timestamp, names))
    }

    pub fn names(&self) -> &BTreeMap<u16, String> {
        &self.names
    }

    /// Raw content id at local coordinates.
    pub fn id_at(&self, x: usize, y: usize, z: usize) -> u16 {
        self.ids[node_index(x, y, z)]
    }

    pub fn param1(&self) -> &[u8] {
        &self.param1
    }

    pub fn param2(&self) -> &[u8] {
        &self.param2
    }

    fn is_only(&self, name: &str) -> bool {
        self.names.len() == 1 && self.names.get(&0).is_some_and(|n| n == name)
    }

    /// Name table is exactly `{0: "air"}`.
    pub fn is_only_air(&self) -> bool {
        self.is_only(AIR)
    }

    /// Name table is exactly `{0: "ignore"}`: edge of the loaded world.
    pub fn is_only_ignore(&self) -> bool {
        self.is_only(IGNORE)
    }

    /// True when no voxel of this block can contribute to a surface.
    pub fn is_invisible(&self) -> bool {
        self.is_only_air() || self.is_only_ignore()
    }

    pub fn content(&self, id: u16) -> Content<'_> {
        match self.names.get(&id) {
            Some(name) => Content::Named(name.as_str()),
            None => Content::Unresolved(id),
        }
    }

    pub fn voxel(&self, x: u8, y: u8, z: u8) -> Voxel<'_> {
        let id = self.id_at(x as usize, y as usize, z as usize);
        let size = BLOCK_SIZE as i32;
        Voxel {
            local: (x, y, z),
            block: self.pos,
            abs_x: self.pos.x * size + x as i32,
            abs_y: self.pos.y * size + y as i32,
            abs_z: self.pos.z * size + z as i32,
            content: self.content(id),
        }
    }

    /// All 4096 voxels, x outermost then z then y.
    pub fn voxels(&self) -> impl Iterator<Item = Voxel<'_>> {
        (0..BLOCK_SIZE as u8).flat_map(move |x| {
            (0..BLOCK_SIZE as u8)
                .flat_map(move |z| (0..BLOCK_SIZE as u8).map(move |y| self.voxel(x, y, z)))
        })
    }
}
