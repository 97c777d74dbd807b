//! Coordinate types for world, column, sub-chunk, and local positions.
//!
//! A *column* is the full vertical chunk of blocks at one (x, z) grid
//! position. Columns are partitioned vertically into fixed-height
//! *sub-chunks*, the unit of lighting and meshing work.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Horizontal footprint of a column in blocks (X axis).
pub const CHUNK_SIZE_X: u32 = 32;
/// Horizontal footprint of a column in blocks (Z axis).
pub const CHUNK_SIZE_Z: u32 = 32;
/// Height of one sub-chunk in blocks.
pub const SUB_CHUNK_HEIGHT: u32 = 64;
/// Number of sub-chunks stacked in one column.
pub const SUB_CHUNKS_PER_COLUMN: u32 = 16;
/// Total world height in blocks.
pub const WORLD_HEIGHT: u32 = SUB_CHUNK_HEIGHT * SUB_CHUNKS_PER_COLUMN;
/// Number of block slots in one sub-chunk.
pub const SUB_CHUNK_VOLUME: usize =
    (CHUNK_SIZE_X * CHUNK_SIZE_Z * SUB_CHUNK_HEIGHT) as usize;

/// World coordinate of a single block (global position).
///
/// Uses 64-bit axes so worlds can extend past the 32-bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct BlockPos {
    /// X coordinate in world space
    pub x: i64,
    /// Y coordinate in world space
    pub y: i64,
    /// Z coordinate in world space
    pub z: i64,
}

impl BlockPos {
    /// Creates a new block position.
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Returns the column containing this block.
    #[must_use]
    pub const fn column(self) -> ColumnPos {
        ColumnPos {
            x: self.x.div_euclid(CHUNK_SIZE_X as i64) as i32,
            z: self.z.div_euclid(CHUNK_SIZE_Z as i64) as i32,
        }
    }

    /// Returns the vertical sub-chunk index, or `None` outside world height.
    #[must_use]
    pub const fn sub_y(self) -> Option<u8> {
        if self.y < 0 || self.y >= WORLD_HEIGHT as i64 {
            None
        } else {
            Some((self.y / SUB_CHUNK_HEIGHT as i64) as u8)
        }
    }

    /// Returns the local position within the containing sub-chunk.
    ///
    /// The remainder is always non-negative, including for negative world
    /// coordinates.
    #[must_use]
    pub const fn local(self) -> LocalPos {
        LocalPos {
            x: self.x.rem_euclid(CHUNK_SIZE_X as i64) as u8,
            y: self.y.rem_euclid(SUB_CHUNK_HEIGHT as i64) as u8,
            z: self.z.rem_euclid(CHUNK_SIZE_Z as i64) as u8,
        }
    }

    /// Returns the sub-chunk containing this block, or `None` outside world
    /// height.
    #[must_use]
    pub const fn sub_chunk(self) -> Option<SubChunkPos> {
        match self.sub_y() {
            Some(sub_y) => Some(SubChunkPos {
                column: self.column(),
                sub_y,
            }),
            None => None,
        }
    }

    /// Returns the position offset by the given deltas.
    #[must_use]
    pub const fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The six face-adjacent neighbor positions.
    #[must_use]
    pub const fn face_neighbors(self) -> [Self; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Column coordinate (identifies a vertical chunk of blocks in the grid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct ColumnPos {
    /// X coordinate in chunk-grid space
    pub x: i32,
    /// Z coordinate in chunk-grid space
    pub z: i32,
}

impl ColumnPos {
    /// Creates a new column position.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Returns the world position of this column's origin (min corner, y=0).
    #[must_use]
    pub const fn base(self) -> BlockPos {
        BlockPos {
            x: (self.x as i64) * (CHUNK_SIZE_X as i64),
            y: 0,
            z: (self.z as i64) * (CHUNK_SIZE_Z as i64),
        }
    }

    /// Packs the column coordinate into a single map key.
    ///
    /// The packing is injective and round-trips exactly, including negative
    /// coordinates.
    #[must_use]
    pub const fn packed(self) -> u64 {
        ((self.x as u32 as u64) << 32) | (self.z as u32 as u64)
    }

    /// Recovers a column position from a packed key.
    #[must_use]
    pub const fn from_packed(key: u64) -> Self {
        Self {
            x: (key >> 32) as u32 as i32,
            z: key as u32 as i32,
        }
    }

    /// Chebyshev distance to another column in chunk-grid units.
    #[must_use]
    pub const fn grid_distance(self, other: Self) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dz = (self.z - other.z).unsigned_abs();
        if dx > dz {
            dx
        } else {
            dz
        }
    }

    /// The four cardinal neighbor columns (+X, -X, +Z, -Z).
    #[must_use]
    pub const fn cardinal_neighbors(self) -> [Self; 4] {
        [
            Self::new(self.x + 1, self.z),
            Self::new(self.x - 1, self.z),
            Self::new(self.x, self.z + 1),
            Self::new(self.x, self.z - 1),
        ]
    }

    /// The eight surrounding columns (cardinals plus diagonals).
    #[must_use]
    pub const fn ring_neighbors(self) -> [Self; 8] {
        [
            Self::new(self.x + 1, self.z),
            Self::new(self.x - 1, self.z),
            Self::new(self.x, self.z + 1),
            Self::new(self.x, self.z - 1),
            Self::new(self.x + 1, self.z + 1),
            Self::new(self.x + 1, self.z - 1),
            Self::new(self.x - 1, self.z + 1),
            Self::new(self.x - 1, self.z - 1),
        ]
    }
}

impl std::fmt::Display for ColumnPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Column({}, {})", self.x, self.z)
    }
}

/// Position of one sub-chunk: a column plus a vertical slice index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubChunkPos {
    /// The owning column
    pub column: ColumnPos,
    /// Vertical slice index within the column (0..16)
    pub sub_y: u8,
}

impl SubChunkPos {
    /// Creates a new sub-chunk position.
    #[must_use]
    pub const fn new(column: ColumnPos, sub_y: u8) -> Self {
        Self { column, sub_y }
    }

    /// Returns the world position of this sub-chunk's min corner.
    #[must_use]
    pub const fn base(self) -> BlockPos {
        let col = self.column.base();
        BlockPos {
            x: col.x,
            y: (self.sub_y as i64) * (SUB_CHUNK_HEIGHT as i64),
            z: col.z,
        }
    }

    /// Packs the sub-chunk position into a single map key.
    ///
    /// The packing is injective and round-trips exactly, including negative
    /// column coordinates.
    #[must_use]
    pub const fn packed(self) -> u128 {
        ((self.column.packed() as u128) << 8) | (self.sub_y as u128)
    }

    /// Recovers a sub-chunk position from a packed key.
    #[must_use]
    pub const fn from_packed(key: u128) -> Self {
        Self {
            column: ColumnPos::from_packed((key >> 8) as u64),
            sub_y: key as u8,
        }
    }
}

impl std::fmt::Display for SubChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({}, {}, y{})", self.column.x, self.column.z, self.sub_y)
    }
}

/// Local coordinate within a sub-chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct LocalPos {
    /// X within the sub-chunk (0..32)
    pub x: u8,
    /// Y within the sub-chunk (0..64)
    pub y: u8,
    /// Z within the sub-chunk (0..32)
    pub z: u8,
}

impl LocalPos {
    /// Creates a new local position.
    #[must_use]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Returns whether this position lies inside the sub-chunk extents.
    #[must_use]
    pub const fn in_bounds(self) -> bool {
        (self.x as u32) < CHUNK_SIZE_X
            && (self.y as u32) < SUB_CHUNK_HEIGHT
            && (self.z as u32) < CHUNK_SIZE_Z
    }

    /// Converts to the linear array index (Y-major layout).
    #[must_use]
    pub const fn index(self) -> usize {
        (self.y as usize) * (CHUNK_SIZE_X * CHUNK_SIZE_Z) as usize
            + (self.z as usize) * CHUNK_SIZE_X as usize
            + (self.x as usize)
    }

    /// Recovers a local position from a linear index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        let plane = (CHUNK_SIZE_X * CHUNK_SIZE_Z) as usize;
        Self {
            x: (index % CHUNK_SIZE_X as usize) as u8,
            y: (index / plane) as u8,
            z: (index % plane / CHUNK_SIZE_X as usize) as u8,
        }
    }

    /// Converts back to a world position given the owning sub-chunk.
    #[must_use]
    pub const fn to_world(self, sub: SubChunkPos) -> BlockPos {
        let base = sub.base();
        BlockPos {
            x: base.x + self.x as i64,
            y: base.y + self.y as i64,
            z: base.z + self.z as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_column_floor_division() {
        assert_eq!(BlockPos::new(0, 0, 0).column(), ColumnPos::new(0, 0));
        assert_eq!(BlockPos::new(31, 0, 31).column(), ColumnPos::new(0, 0));
        assert_eq!(BlockPos::new(32, 0, 0).column(), ColumnPos::new(1, 0));
        assert_eq!(BlockPos::new(-1, 0, -1).column(), ColumnPos::new(-1, -1));
        assert_eq!(BlockPos::new(-33, 0, 0).column(), ColumnPos::new(-2, 0));
    }

    #[test]
    fn test_local_never_negative() {
        let local = BlockPos::new(-1, 5, -33).local();
        assert_eq!(local, LocalPos::new(31, 5, 31));
    }

    #[test]
    fn test_sub_y_bounds() {
        assert_eq!(BlockPos::new(0, 0, 0).sub_y(), Some(0));
        assert_eq!(BlockPos::new(0, 63, 0).sub_y(), Some(0));
        assert_eq!(BlockPos::new(0, 64, 0).sub_y(), Some(1));
        assert_eq!(BlockPos::new(0, 1023, 0).sub_y(), Some(15));
        assert_eq!(BlockPos::new(0, 1024, 0).sub_y(), None);
        assert_eq!(BlockPos::new(0, -1, 0).sub_y(), None);
    }

    #[test]
    fn test_round_trip_beyond_32_bit() {
        let pos = BlockPos::new(1 << 35, 512, -(1 << 35));
        let sub = pos.sub_chunk().expect("y in range");
        let back = pos.local().to_world(sub);
        assert_eq!(back, pos);
    }

    #[test]
    fn test_column_key_round_trip() {
        for coord in [
            ColumnPos::new(0, 0),
            ColumnPos::new(-1, 1),
            ColumnPos::new(i32::MIN, i32::MAX),
        ] {
            assert_eq!(ColumnPos::from_packed(coord.packed()), coord);
        }
    }

    #[test]
    fn test_sub_chunk_key_round_trip() {
        for (x, z, sub_y) in [(0, 0, 0), (-5, 7, 15), (100_000, -100_000, 3)] {
            let pos = SubChunkPos::new(ColumnPos::new(x, z), sub_y);
            assert_eq!(SubChunkPos::from_packed(pos.packed()), pos);
        }
    }

    #[test]
    fn test_local_index_layout() {
        // Y-major: index = y*32*32 + z*32 + x
        assert_eq!(LocalPos::new(0, 0, 0).index(), 0);
        assert_eq!(LocalPos::new(1, 0, 0).index(), 1);
        assert_eq!(LocalPos::new(0, 0, 1).index(), 32);
        assert_eq!(LocalPos::new(0, 1, 0).index(), 1024);
        assert_eq!(LocalPos::new(31, 63, 31).index(), SUB_CHUNK_VOLUME - 1);
    }

    #[test]
    fn test_neighbor_sets() {
        let pos = BlockPos::new(0, 10, 0);
        let neighbors = pos.face_neighbors();
        assert_eq!(neighbors.len(), 6);
        assert!(neighbors.contains(&BlockPos::new(-1, 10, 0)));
        assert!(neighbors.contains(&BlockPos::new(0, 11, 0)));

        let column = ColumnPos::new(0, 0);
        assert_eq!(column.cardinal_neighbors().len(), 4);
        let ring = column.ring_neighbors();
        assert_eq!(ring.len(), 8);
        assert!(ring.contains(&ColumnPos::new(-1, -1)));
        assert!(!ring.contains(&column));
    }

    #[test]
    fn test_grid_distance() {
        let a = ColumnPos::new(0, 0);
        assert_eq!(a.grid_distance(ColumnPos::new(3, -2)), 3);
        assert_eq!(a.grid_distance(ColumnPos::new(-1, 5)), 5);
        assert_eq!(a.grid_distance(a), 0);
    }

    proptest! {
        #[test]
        fn prop_world_round_trip(x in -(1i64 << 35)..(1i64 << 35),
                                 y in 0i64..1024,
                                 z in -(1i64 << 35)..(1i64 << 35)) {
            let pos = BlockPos::new(x, y, z);
            let sub = pos.sub_chunk().expect("y in range");
            prop_assert_eq!(pos.local().to_world(sub), pos);
        }

        #[test]
        fn prop_local_index_round_trip(x in 0u8..32, y in 0u8..64, z in 0u8..32) {
            let local = LocalPos::new(x, y, z);
            prop_assert_eq!(LocalPos::from_index(local.index()), local);
        }

        #[test]
        fn prop_column_key_injective(x1 in any::<i32>(), z1 in any::<i32>(),
                                     x2 in any::<i32>(), z2 in any::<i32>()) {
            let a = ColumnPos::new(x1, z1);
            let b = ColumnPos::new(x2, z2);
            prop_assert_eq!(a.packed() == b.packed(), a == b);
        }
    }
}
