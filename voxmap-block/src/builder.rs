use std::collections::HashMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::block::{AIR, BLOCK_SIZE, NODE_COUNT, SUPPORTED_VERSION, node_index};

/// Node timer section written after the name-id mapping: `[data_len:1][count:2]`.
pub const NODE_TIMERS: [u8; 3] = [10, 0, 0];

const METADATA_VERSION: u8 = 0;

struct StaticObject {
    kind: u8,
    pos: [i32; 3],
    data: Vec<u8>,
}

/// Encodes world-storage records in the format [`crate::Block::decode`] reads.
///
/// Nodes default to air; names get ids in order of first appearance.
pub struct BlockBuilder {
    version: u8,
    flags: u8,
    timestamp: Option<u32>,
    fill: String,
    // Key: (x, y, z), Value: node name
    custom_nodes: HashMap<(u8, u8, u8), String>,
    // Key: y, Value: node name
    full_layers: HashMap<u8, String>,
    raw_ids: HashMap<(u8, u8, u8), u16>,
    static_objects: Vec<StaticObject>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            flags: 0,
            timestamp: None,
            fill: AIR.to_string(),
            custom_nodes: HashMap::new(),
            full_layers: HashMap::new(),
            raw_ids: HashMap::new(),
            static_objects: Vec::new(),
        }
    }
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn timestamp(mut self, timestamp: Option<u32>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Background node for every cell not otherwise set.
    pub fn fill(mut self, name: &str) -> Self {
        self.fill = name.to_string();
        self
    }

    /// Fill an entire local y-layer.
    pub fn fill_layer(mut self, y: u8, name: &str) -> Self {
        if (y as usize) < BLOCK_SIZE {
            self.full_layers.insert(y, name.to_string());
            // Single nodes at this y are overwritten by the layer
            self.custom_nodes.retain(|(_, ny, _), _| *ny != y);
        }
        self
    }

    pub fn set_node(mut self, x: u8, y: u8, z: u8, name: &str) -> Self {
        if [x, y, z].iter().all(|&v| (v as usize) < BLOCK_SIZE) {
            self.custom_nodes.insert((x, y, z), name.to_string());
        }
        self
    }

    /// Store a raw id that will have no entry in the name table.
    pub fn set_raw(mut self, x: u8, y: u8, z: u8, id: u16) -> Self {
        self.raw_ids.insert((x, y, z), id);
        self
    }

    pub fn static_object(mut self, kind: u8, pos: [i32; 3], data: Vec<u8>) -> Self {
        self.static_objects.push(StaticObject { kind, pos, data });
        self
    }

    fn name_at(&self, x: u8, y: u8, z: u8) -> &str {
        if let Some(name) = self.custom_nodes.get(&(x, y, z)) {
            name
        } else if let Some(name) = self.full_layers.get(&y) {
            name
        } else {
            &self.fill
        }
    }

    /// Serialize the record: header, two zlib streams, static objects, timestamp, name table, timers.
    pub fn build(&self) -> std::io::Result<Vec<u8>> {
        let mut ids = vec![0u16; NODE_COUNT];
        let mut names: Vec<&str> = Vec::new();
        let mut name_to_id: HashMap<&str, u16> = HashMap::new();

        // Index order: x + y*16 + z*256
        for z in 0..BLOCK_SIZE as u8 {
            for y in 0..BLOCK_SIZE as u8 {
                for x in 0..BLOCK_SIZE as u8 {
                    let idx = node_index(x as usize, y as usize, z as usize);
                    if let Some(&raw) = self.raw_ids.get(&(x, y, z)) {
                        ids[idx] = raw;
                        continue;
                    }
                    let name = self.name_at(x, y, z);
                    let id = *name_to_id.entry(name).or_insert_with(|| {
                        names.push(name);
                        (names.len() - 1) as u16
                    });
                    ids[idx] = id;
                }
            }
        }

        let mut node_data = Vec::with_capacity(NODE_COUNT * 4);
        for id in &ids {
            node_data.extend_from_slice(&id.to_be_bytes());
        }
        node_data.resize(NODE_COUNT * 4, 0); // param1 + param2

        let mut out = vec![self.version, self.flags, 2, 2];
        out.extend_from_slice(&zlib(&node_data)?);
        out.extend_from_slice(&zlib(&[METADATA_VERSION])?);

        out.push(0); // static object version
        out.extend_from_slice(&(self.static_objects.len() as u16).to_be_bytes());
        for obj in &self.static_objects {
            out.push(obj.kind);
            for v in obj.pos {
                out.extend_from_slice(&v.to_be_bytes());
            }
            out.extend_from_slice(&(obj.data.len() as u16).to_be_bytes());
            out.extend_from_slice(&obj.data);
        }

        out.extend_from_slice(&self.timestamp.unwrap_or(u32::MAX).to_be_bytes());

        out.push(0); // name-id mapping version
        out.extend_from_slice(&(names.len() as u16).to_be_bytes());
        for (id, name) in names.iter().enumerate() {
            out.extend_from_slice(&(id as u16).to_be_bytes());
            out.extend_from_slice(&(name.len() as u16).to_be_bytes());
            out.extend_from_slice(name.as_bytes());
        }

        out.extend_from_slice(&NODE_TIMERS);
        Ok(out)
    }
}

fn zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let data = BlockBuilder::new().version(25).flags(0x0F).build().unwrap();
        assert_eq!(&data[..4], &[25, 0x0F, 2, 2]);
        assert_eq!(&data[data.len() - 3..], &NODE_TIMERS);
    }

    #[test]
    fn test_layer_overrides_single_nodes() {
        let builder = BlockBuilder::new()
            .set_node(3, 5, 3, "default:dirt")
            .fill_layer(5, "default:stone")
            .set_node(4, 5, 4, "default:wood");
        assert_eq!(builder.name_at(3, 5, 3), "default:stone");
        assert_eq!(builder.name_at(4, 5, 4), "default:wood");
        assert_eq!(builder.name_at(0, 0, 0), AIR);
    }

    #[test]
    fn test_out_of_bounds_nodes_ignored() {
        let builder = BlockBuilder::new().set_node(16, 0, 0, "default:dirt").fill_layer(16, "default:dirt");
        assert!(builder.custom_nodes.is_empty());
        assert!(builder.full_layers.is_empty());
    }
}
