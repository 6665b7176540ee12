//! Block positions and the linear world-storage key.
//!
//! World storage addresses every block by one signed integer:
//! `x + y * 4096 + z * 16777216`, each axis in `-2048..=2047`.
//! Keys are plain linear sums (no per-axis offset), so one vertical
//! column occupies keys `lo, lo + 4096, lo + 2 * 4096, ...`.

use thiserror::Error;

pub const AXIS_MIN: i32 = -2048;
pub const AXIS_MAX: i32 = 2047;

const AXIS_SPAN: i64 = 4096; // values per axis
const HALF_SPAN: i64 = 2048;

const MIN_KEY: i64 = AXIS_MIN as i64 * (1 + AXIS_SPAN + AXIS_SPAN * AXIS_SPAN);
const MAX_KEY: i64 = AXIS_MAX as i64 * (1 + AXIS_SPAN + AXIS_SPAN * AXIS_SPAN);

/// Signed linear key of a block in world storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldKey(pub i64);

/// Block coordinate (one unit = 16 voxels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordError {
    #[error("block coordinate ({x}, {y}, {z}) is outside -2048..=2047")]
    OutOfRange { x: i32, y: i32, z: i32 },
    #[error("world key {0} does not encode a block position")]
    KeyOutOfRange(i64),
}

fn in_range(v: i32) -> bool {
    (AXIS_MIN..=AXIS_MAX).contains(&v)
}

// 0..4096 -> -2048..2048
fn unsigned_to_signed(v: i64) -> i64 {
    if v < HALF_SPAN { v } else { v - AXIS_SPAN }
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Encode into a storage key. Fails instead of wrapping when an axis is out of range.
    pub fn encode(self) -> Result<WorldKey, CoordError> {
        let Self { x, y, z } = self;
        if !(in_range(x) && in_range(y) && in_range(z)) {
            return Err(CoordError::OutOfRange { x, y, z });
        }
        Ok(WorldKey(x as i64 + y as i64 * AXIS_SPAN + z as i64 * AXIS_SPAN * AXIS_SPAN))
    }
}

impl WorldKey {
    /// Inverse of [`BlockPos::encode`].
    pub fn decode(self) -> Result<BlockPos, CoordError> {
        // Every key in MIN_KEY..=MAX_KEY has exactly one position, so the steps below cannot overflow.
        if !(MIN_KEY..=MAX_KEY).contains(&self.0) {
            return Err(CoordError::KeyOutOfRange(self.0));
        }
        let mut i = self.0;
        let x = unsigned_to_signed(i.rem_euclid(AXIS_SPAN));
        i = (i - x) / AXIS_SPAN;
        let y = unsigned_to_signed(i.rem_euclid(AXIS_SPAN));
        i = (i - y) / AXIS_SPAN;
        let z = unsigned_to_signed(i.rem_euclid(AXIS_SPAN));
        i = (i - z) / AXIS_SPAN;

        if i != 0 {
            return Err(CoordError::KeyOutOfRange(self.0));
        }
        Ok(BlockPos::new(x as i32, y as i32, z as i32))
    }
}

/// Inclusive key bounds of the vertical column at block (x, z).
///
/// Members of the column are exactly the keys in `lo..=hi` with `(key - lo) % 4096 == 0`.
pub fn column_bounds(x: i32, z: i32) -> Result<(WorldKey, WorldKey), CoordError> {
    let lo = BlockPos::new(x, AXIS_MIN, z).encode()?;
    let hi = BlockPos::new(x, AXIS_MAX, z).encode()?;
    Ok((lo, hi))
}

/// Shortcut for `BlockPos::new(x, y, z).encode()`.
pub fn encode(x: i32, y: i32, z: i32) -> Result<WorldKey, CoordError> {
    BlockPos::new(x, y, z).encode()
}

/// Shortcut for `WorldKey(key).decode()` returning a tuple.
pub fn decode(key: i64) -> Result<(i32, i32, i32), CoordError> {
    let pos = WorldKey(key).decode()?;
    Ok((pos.x, pos.y, pos.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_keys() {
        assert_eq!(encode(0, 0, 0), Ok(WorldKey(0)));
        assert_eq!(encode(1, 0, 0), Ok(WorldKey(1)));
        assert_eq!(encode(0, 1, 0), Ok(WorldKey(4096)));
        assert_eq!(decode(16777216), Ok((0, 0, 1)));
        assert_eq!(decode(-1), Ok((-1, 0, 0)));
    }

    #[test]
    fn test_round_trip_corners() {
        let values = [AXIS_MIN, AXIS_MIN + 1, -1, 0, 1, 2046, AXIS_MAX];
        for &x in &values {
            for &y in &values {
                for &z in &values {
                    let key = encode(x, y, z).expect("in range");
                    assert_eq!(decode(key.0), Ok((x, y, z)), "key {}", key.0);
                }
            }
        }
    }

    #[test]
    fn test_round_trip_sweep() {
        // Every value on each axis with the other two held at awkward offsets
        for v in AXIS_MIN..=AXIS_MAX {
            for (x, y, z) in [(v, -7, 13), (2047, v, -2048), (-1, 1, v)] {
                let key = encode(x, y, z).unwrap();
                assert_eq!(key.decode(), Ok(BlockPos::new(x, y, z)));
            }
        }
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            encode(2048, 0, 0),
            Err(CoordError::OutOfRange { x: 2048, y: 0, z: 0 })
        );
        assert!(encode(0, -2049, 0).is_err());
        assert!(encode(0, 0, i32::MAX).is_err());

        // One past the largest z
        let too_far = encode(0, 0, AXIS_MAX).unwrap().0 + 2048 * 4096 * 4096;
        assert_eq!(decode(too_far), Err(CoordError::KeyOutOfRange(too_far)));
    }

    #[test]
    fn test_extreme_keys_do_not_overflow() {
        for key in [i64::MAX, i64::MIN, i64::MAX - 1, i64::MIN + 2047, MAX_KEY + 1, MIN_KEY - 1] {
            assert_eq!(decode(key), Err(CoordError::KeyOutOfRange(key)));
        }
        assert_eq!(decode(MIN_KEY), Ok((AXIS_MIN, AXIS_MIN, AXIS_MIN)));
        assert_eq!(decode(MAX_KEY), Ok((AXIS_MAX, AXIS_MAX, AXIS_MAX)));
    }

    #[test]
    fn test_column_bounds() {
        let (lo, hi) = column_bounds(3, -5).unwrap();
        assert_eq!(lo.decode(), Ok(BlockPos::new(3, AXIS_MIN, -5)));
        assert_eq!(hi.decode(), Ok(BlockPos::new(3, AXIS_MAX, -5)));
        assert_eq!((hi.0 - lo.0) % 4096, 0);

        let mid = encode(3, 17, -5).unwrap();
        assert!(mid.0 > lo.0 && mid.0 < hi.0);
        assert_eq!((mid.0 - lo.0) % 4096, 0);
    }
}
