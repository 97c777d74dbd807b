//! Sub-chunk and column storage with serialization.
//!
//! A [`SubChunk`] owns two dense arrays over its 32x32x64 extent: 16-bit
//! block ids and 8-bit packed light (high nibble skylight, low nibble
//! blocklight). A [`ChunkColumn`] stacks up to 16 sparse sub-chunks and
//! tracks lifecycle and dirty state.

use serde::{Deserialize, Serialize};
use strata_common::{
    BlockId, BlockPos, ColumnPos, LocalPos, MagicBytes, SchemaVersion, WorldError, WorldResult,
    CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNKS_PER_COLUMN, SUB_CHUNK_HEIGHT, SUB_CHUNK_VOLUME,
    WORLD_HEIGHT,
};
use thiserror::Error;

/// Chunk serialization errors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Serialization failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
    /// Deserialization failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
    /// Invalid magic bytes
    #[error("Invalid chunk format")]
    InvalidFormat,
    /// Version mismatch
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version
        actual: String,
    },
    /// Compression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),
}

/// Result type for chunk serialization.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Sub-chunk wire header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubChunkHeader {
    /// Magic bytes for format identification
    pub magic: [u8; 4],
    /// Schema version
    pub version: SchemaVersion,
    /// Owning column X
    pub column_x: i32,
    /// Owning column Z
    pub column_z: i32,
    /// Vertical slice index
    pub sub_y: u8,
    /// Compression type (0 = none, 1 = lz4)
    pub compression: u8,
}

impl SubChunkHeader {
    /// Creates a new header.
    #[must_use]
    pub fn new(column: ColumnPos, sub_y: u8) -> Self {
        Self {
            magic: MagicBytes::SUB_CHUNK.0,
            version: SchemaVersion::SUB_CHUNK,
            column_x: column.x,
            column_z: column.z,
            sub_y,
            compression: 1,
        }
    }

    /// Validates the header.
    pub fn validate(&self) -> ChunkResult<()> {
        if self.magic != MagicBytes::SUB_CHUNK.0 {
            return Err(ChunkError::InvalidFormat);
        }
        if !SchemaVersion::SUB_CHUNK.can_read(&self.version) {
            return Err(ChunkError::VersionMismatch {
                expected: SchemaVersion::SUB_CHUNK.to_string(),
                actual: self.version.to_string(),
            });
        }
        Ok(())
    }
}

const SKY_SHIFT: u8 = 4;
const NIBBLE: u8 = 0x0F;

/// One 32x32x64 slice of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubChunk {
    /// Block ids, Y-major layout
    blocks: Vec<u16>,
    /// Packed light: high nibble skylight, low nibble blocklight
    light: Vec<u8>,
    /// Number of non-air slots, kept in sync by mutations
    non_air: u32,
}

impl SubChunk {
    /// Creates an all-air sub-chunk with zero light.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![0; SUB_CHUNK_VOLUME],
            light: vec![0; SUB_CHUNK_VOLUME],
            non_air: 0,
        }
    }

    fn check(local: LocalPos) -> WorldResult<usize> {
        if local.in_bounds() {
            Ok(local.index())
        } else {
            Err(WorldError::OutOfBounds {
                x: i64::from(local.x),
                y: i64::from(local.y),
                z: i64::from(local.z),
            })
        }
    }

    /// Returns the block id at a local position.
    pub fn block_id(&self, local: LocalPos) -> WorldResult<BlockId> {
        let index = Self::check(local)?;
        Ok(BlockId::from_raw(self.blocks[index]))
    }

    /// Sets the block id at a local position.
    ///
    /// Returns whether the stored value actually changed, so callers can
    /// skip downstream work on no-op writes.
    pub fn set_block_id(&mut self, local: LocalPos, id: BlockId) -> WorldResult<bool> {
        let index = Self::check(local)?;
        let old = self.blocks[index];
        if old == id.raw() {
            return Ok(false);
        }
        if old == 0 {
            self.non_air += 1;
        } else if id.is_air() {
            self.non_air -= 1;
        }
        self.blocks[index] = id.raw();
        Ok(true)
    }

    /// Returns the skylight level (0-15) at a local position.
    pub fn skylight(&self, local: LocalPos) -> WorldResult<u8> {
        let index = Self::check(local)?;
        Ok((self.light[index] >> SKY_SHIFT) & NIBBLE)
    }

    /// Sets the skylight level without touching the blocklight nibble.
    pub fn set_skylight(&mut self, local: LocalPos, level: u8) -> WorldResult<()> {
        let index = Self::check(local)?;
        self.light[index] = (self.light[index] & NIBBLE) | ((level & NIBBLE) << SKY_SHIFT);
        Ok(())
    }

    /// Returns the blocklight level (0-15) at a local position.
    pub fn blocklight(&self, local: LocalPos) -> WorldResult<u8> {
        let index = Self::check(local)?;
        Ok(self.light[index] & NIBBLE)
    }

    /// Sets the blocklight level without touching the skylight nibble.
    pub fn set_blocklight(&mut self, local: LocalPos, level: u8) -> WorldResult<()> {
        let index = Self::check(local)?;
        self.light[index] = (self.light[index] & (NIBBLE << SKY_SHIFT)) | (level & NIBBLE);
        Ok(())
    }

    /// Scans downward from the top of the sub-chunk and returns the local Y
    /// of the first non-air block in the (x, z) pillar, or `None` if the
    /// pillar is empty.
    #[must_use]
    pub fn highest_block_at(&self, x: u8, z: u8) -> Option<u8> {
        if u32::from(x) >= CHUNK_SIZE_X || u32::from(z) >= CHUNK_SIZE_Z {
            return None;
        }
        for y in (0..SUB_CHUNK_HEIGHT as u8).rev() {
            let index = LocalPos::new(x, y, z).index();
            if self.blocks[index] != 0 {
                return Some(y);
            }
        }
        None
    }

    /// Whether every slot is air.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.non_air == 0
    }

    /// Whether every slot holds an opaque block (useful as an occluder).
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.non_air as usize == SUB_CHUNK_VOLUME
    }

    /// Raw block array, no copy.
    #[must_use]
    pub fn blocks_raw(&self) -> &[u16] {
        &self.blocks
    }

    /// Raw light array, no copy.
    #[must_use]
    pub fn light_raw(&self) -> &[u8] {
        &self.light
    }

    /// Owned copy of the block array for worker transfer.
    #[must_use]
    pub fn blocks_owned(&self) -> Vec<u16> {
        self.blocks.clone()
    }

    /// Owned copy of the light array for worker transfer.
    #[must_use]
    pub fn light_owned(&self) -> Vec<u8> {
        self.light.clone()
    }

    /// Replaces the light array wholesale (background lighting results).
    ///
    /// Rejects arrays of the wrong length.
    pub fn replace_light(&mut self, light: Vec<u8>) -> WorldResult<()> {
        if light.len() != SUB_CHUNK_VOLUME {
            return Err(WorldError::InvalidData(format!(
                "light array length {} != {SUB_CHUNK_VOLUME}",
                light.len()
            )));
        }
        self.light = light;
        Ok(())
    }

    /// Builds a sub-chunk from raw arrays (deserialization, tests).
    pub fn from_arrays(blocks: Vec<u16>, light: Vec<u8>) -> WorldResult<Self> {
        if blocks.len() != SUB_CHUNK_VOLUME || light.len() != SUB_CHUNK_VOLUME {
            return Err(WorldError::InvalidData(format!(
                "array lengths {}/{} != {SUB_CHUNK_VOLUME}",
                blocks.len(),
                light.len()
            )));
        }
        let non_air = blocks.iter().filter(|&&b| b != 0).count() as u32;
        Ok(Self {
            blocks,
            light,
            non_air,
        })
    }

    /// Serializes the sub-chunk to bytes.
    pub fn serialize(&self, column: ColumnPos, sub_y: u8) -> ChunkResult<Vec<u8>> {
        let header = SubChunkHeader::new(column, sub_y);
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| ChunkError::SerializationFailed(e.to_string()))?;

        let mut payload = Vec::with_capacity(SUB_CHUNK_VOLUME * 3);
        payload.extend_from_slice(bytemuck::cast_slice(&self.blocks));
        payload.extend_from_slice(&self.light);

        let compressed = lz4_flex::compress_prepend_size(&payload);

        let mut result = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
        result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&compressed);
        Ok(result)
    }

    /// Deserializes a sub-chunk from bytes, returning its address and data.
    pub fn deserialize(bytes: &[u8]) -> ChunkResult<(ColumnPos, u8, Self)> {
        if bytes.len() < 8 {
            return Err(ChunkError::DeserializationFailed("data too short".into()));
        }
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + header_len {
            return Err(ChunkError::DeserializationFailed(
                "header length mismatch".into(),
            ));
        }
        let header: SubChunkHeader = bincode::deserialize(&bytes[4..4 + header_len])
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        header.validate()?;

        let payload = lz4_flex::decompress_size_prepended(&bytes[4 + header_len..])
            .map_err(|e| ChunkError::CompressionFailed(e.to_string()))?;
        if payload.len() != SUB_CHUNK_VOLUME * 3 {
            return Err(ChunkError::DeserializationFailed(
                "payload size mismatch".into(),
            ));
        }

        let blocks: Vec<u16> = bytemuck::pod_collect_to_vec(&payload[..SUB_CHUNK_VOLUME * 2]);
        let light = payload[SUB_CHUNK_VOLUME * 2..].to_vec();
        let sub = Self::from_arrays(blocks, light)
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        Ok((
            ColumnPos::new(header.column_x, header.column_z),
            header.sub_y,
            sub,
        ))
    }
}

impl Default for SubChunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnState {
    /// No storage allocated
    Unloaded,
    /// Generation in progress
    Generating,
    /// Fully generated and lit
    Loaded,
}

/// A full-height vertical chunk: up to 16 sparse sub-chunks plus lifecycle
/// and dirty tracking.
#[derive(Debug)]
pub struct ChunkColumn {
    pos: ColumnPos,
    subs: Vec<Option<SubChunk>>,
    state: ColumnState,
    dirty: Vec<bool>,
}

impl ChunkColumn {
    /// Creates an empty column in the `Generating` state.
    #[must_use]
    pub fn new(pos: ColumnPos) -> Self {
        Self {
            pos,
            subs: (0..SUB_CHUNKS_PER_COLUMN).map(|_| None).collect(),
            state: ColumnState::Generating,
            dirty: vec![false; SUB_CHUNKS_PER_COLUMN as usize],
        }
    }

    /// Returns the column position.
    #[must_use]
    pub const fn pos(&self) -> ColumnPos {
        self.pos
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ColumnState {
        self.state
    }

    /// Transitions the lifecycle state.
    pub fn set_state(&mut self, state: ColumnState) {
        self.state = state;
    }

    /// Borrows a sub-chunk if it exists.
    #[must_use]
    pub fn sub_chunk(&self, sub_y: u8) -> Option<&SubChunk> {
        self.subs.get(sub_y as usize).and_then(Option::as_ref)
    }

    /// Mutably borrows a sub-chunk if it exists.
    pub fn sub_chunk_mut(&mut self, sub_y: u8) -> Option<&mut SubChunk> {
        self.subs.get_mut(sub_y as usize).and_then(Option::as_mut)
    }

    /// Mutably borrows a sub-chunk, creating an all-air one if absent.
    pub fn sub_chunk_or_insert(&mut self, sub_y: u8) -> WorldResult<&mut SubChunk> {
        if u32::from(sub_y) >= SUB_CHUNKS_PER_COLUMN {
            return Err(WorldError::HeightOutOfRange {
                y: i64::from(sub_y) * i64::from(SUB_CHUNK_HEIGHT),
            });
        }
        Ok(self.subs[sub_y as usize].get_or_insert_with(SubChunk::new))
    }

    /// Indices of the sub-chunks that exist.
    pub fn present_sub_chunks(&self) -> impl Iterator<Item = u8> + '_ {
        self.subs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as u8)
    }

    fn split_y(world_y: i64) -> WorldResult<(u8, u8)> {
        if !(0..i64::from(WORLD_HEIGHT)).contains(&world_y) {
            return Err(WorldError::HeightOutOfRange { y: world_y });
        }
        Ok((
            (world_y / i64::from(SUB_CHUNK_HEIGHT)) as u8,
            (world_y % i64::from(SUB_CHUNK_HEIGHT)) as u8,
        ))
    }

    /// Returns the block id at column-local coordinates.
    ///
    /// Absent sub-chunks read as air; out-of-height queries are rejected.
    pub fn block_id_at(&self, x: u8, world_y: i64, z: u8) -> WorldResult<BlockId> {
        let (sub_y, local_y) = Self::split_y(world_y)?;
        match self.sub_chunk(sub_y) {
            Some(sub) => sub.block_id(LocalPos::new(x, local_y, z)),
            None => {
                // Validate x/z even when the slice is absent.
                SubChunk::check(LocalPos::new(x, local_y, z))?;
                Ok(BlockId::AIR)
            }
        }
    }

    /// Sets the block id at column-local coordinates.
    ///
    /// Writing air into an absent sub-chunk is a no-op rather than
    /// materializing an all-air slice. Returns whether the stored value
    /// changed; a change marks the touched sub-chunk dirty.
    pub fn set_block_id_at(&mut self, x: u8, world_y: i64, z: u8, id: BlockId) -> WorldResult<bool> {
        let (sub_y, local_y) = Self::split_y(world_y)?;
        let local = LocalPos::new(x, local_y, z);
        if id.is_air() && self.sub_chunk(sub_y).is_none() {
            SubChunk::check(local)?;
            return Ok(false);
        }
        let changed = self.sub_chunk_or_insert(sub_y)?.set_block_id(local, id)?;
        if changed {
            self.dirty[sub_y as usize] = true;
        }
        Ok(changed)
    }

    /// Returns the skylight level at column-local coordinates.
    ///
    /// Absent sub-chunks read as full skylight (open sky).
    pub fn skylight_at(&self, x: u8, world_y: i64, z: u8) -> WorldResult<u8> {
        let (sub_y, local_y) = Self::split_y(world_y)?;
        match self.sub_chunk(sub_y) {
            Some(sub) => sub.skylight(LocalPos::new(x, local_y, z)),
            None => {
                SubChunk::check(LocalPos::new(x, local_y, z))?;
                Ok(15)
            }
        }
    }

    /// Returns the blocklight level at column-local coordinates.
    pub fn blocklight_at(&self, x: u8, world_y: i64, z: u8) -> WorldResult<u8> {
        let (sub_y, local_y) = Self::split_y(world_y)?;
        match self.sub_chunk(sub_y) {
            Some(sub) => sub.blocklight(LocalPos::new(x, local_y, z)),
            None => {
                SubChunk::check(LocalPos::new(x, local_y, z))?;
                Ok(0)
            }
        }
    }

    /// Scans sub-chunks top-down for the highest non-air block in the
    /// (x, z) pillar, returning its world Y.
    #[must_use]
    pub fn highest_block_at(&self, x: u8, z: u8) -> Option<i64> {
        for sub_y in (0..SUB_CHUNKS_PER_COLUMN as u8).rev() {
            if let Some(sub) = self.sub_chunk(sub_y) {
                if let Some(local_y) = sub.highest_block_at(x, z) {
                    return Some(
                        i64::from(sub_y) * i64::from(SUB_CHUNK_HEIGHT) + i64::from(local_y),
                    );
                }
            }
        }
        None
    }

    /// Marks one sub-chunk dirty (light mutation, neighbor boundary edit).
    pub fn mark_dirty(&mut self, sub_y: u8) {
        if let Some(flag) = self.dirty.get_mut(sub_y as usize) {
            *flag = true;
        }
    }

    /// Marks every present sub-chunk dirty.
    pub fn mark_all_dirty(&mut self) {
        for sub_y in 0..SUB_CHUNKS_PER_COLUMN as usize {
            if self.subs[sub_y].is_some() {
                self.dirty[sub_y] = true;
            }
        }
    }

    /// Whether any sub-chunk is dirty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&d| d)
    }

    /// Whether one sub-chunk is dirty.
    #[must_use]
    pub fn is_sub_dirty(&self, sub_y: u8) -> bool {
        self.dirty.get(sub_y as usize).copied().unwrap_or(false)
    }

    /// Drains the dirty set, returning the sub-chunk indices that were set.
    /// Called by the meshing/lighting consumer.
    pub fn take_dirty(&mut self) -> Vec<u8> {
        let mut taken = Vec::new();
        for (i, flag) in self.dirty.iter_mut().enumerate() {
            if *flag {
                *flag = false;
                taken.push(i as u8);
            }
        }
        taken
    }

    /// Serializes every present sub-chunk (wire format per slice).
    pub fn serialize(&self) -> ChunkResult<Vec<Vec<u8>>> {
        let mut slices = Vec::new();
        for sub_y in 0..SUB_CHUNKS_PER_COLUMN as u8 {
            if let Some(sub) = self.sub_chunk(sub_y) {
                slices.push(sub.serialize(self.pos, sub_y)?);
            }
        }
        Ok(slices)
    }

    /// Rebuilds a column from serialized sub-chunk slices.
    pub fn deserialize(pos: ColumnPos, slices: &[Vec<u8>]) -> ChunkResult<Self> {
        let mut column = Self::new(pos);
        for bytes in slices {
            let (slice_pos, sub_y, sub) = SubChunk::deserialize(bytes)?;
            if slice_pos != pos {
                return Err(ChunkError::DeserializationFailed(format!(
                    "slice addressed to {slice_pos}, expected {pos}"
                )));
            }
            if u32::from(sub_y) >= SUB_CHUNKS_PER_COLUMN {
                return Err(ChunkError::DeserializationFailed(format!(
                    "sub-chunk index {sub_y} out of range"
                )));
            }
            column.subs[sub_y as usize] = Some(sub);
        }
        column.state = ColumnState::Loaded;
        Ok(column)
    }

    /// World position of a column-local coordinate.
    #[must_use]
    pub fn world_pos(&self, x: u8, world_y: i64, z: u8) -> BlockPos {
        let base = self.pos.base();
        BlockPos::new(base.x + i64::from(x), world_y, base.z + i64::from(z))
    }
}
