//! Skylight and blocklight computation.
//!
//! Both channels are recomputed from scratch by a bounded breadth-first
//! flood fill over a column's stacked sub-chunks. Skylight seeds at level 15
//! down every pillar open to the sky; blocklight seeds from emitting blocks.
//! Each hop into a cell costs that cell's attenuation (at least 1), and
//! propagation stops at opaque cells, which store zero light.
//!
//! Recomputation is idempotent: running it twice over unchanged block data
//! produces identical light arrays and reports no changes, which is what
//! lets the background correction pass run perpetually without churn.

use std::collections::VecDeque;
use std::sync::Arc;

use strata_common::{
    BlockId, CHUNK_SIZE_X, CHUNK_SIZE_Z, SUB_CHUNKS_PER_COLUMN, SUB_CHUNK_HEIGHT,
    SUB_CHUNK_VOLUME, WORLD_HEIGHT,
};
use thiserror::Error;

use crate::chunk::ChunkColumn;
use crate::registry::BlockRegistry;

/// Maximum light level for either channel.
pub const MAX_LIGHT: u8 = 15;

/// Lighting computation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LightError {
    /// Input arrays are inconsistent with the sub-chunk extents.
    #[error("Malformed lighting input: {0}")]
    MalformedInput(String),
}

/// One sub-chunk's worth of input to a recompute.
#[derive(Debug, Clone)]
pub struct LightSlice {
    /// Vertical slice index within the column
    pub sub_y: u8,
    /// Block id array (Y-major)
    pub blocks: Vec<u16>,
    /// Current packed light array, used for change detection
    pub light: Vec<u8>,
}

/// A recomputed sub-chunk light array plus whether anything changed.
#[derive(Debug, Clone)]
pub struct LightResult {
    /// Vertical slice index within the column
    pub sub_y: u8,
    /// Fresh packed light array
    pub light: Vec<u8>,
    /// Whether the fresh array differs from the input
    pub changed: bool,
}

/// Output of a full-column recompute.
#[derive(Debug, Clone)]
pub struct LightPass {
    /// Per-sub-chunk results, in ascending `sub_y` order
    pub updated: Vec<LightResult>,
}

impl LightPass {
    /// Whether any sub-chunk's light changed.
    #[must_use]
    pub fn any_changed(&self) -> bool {
        self.updated.iter().any(|r| r.changed)
    }

    /// Indices of the sub-chunks whose light changed.
    #[must_use]
    pub fn changed_sub_chunks(&self) -> Vec<u8> {
        self.updated
            .iter()
            .filter(|r| r.changed)
            .map(|r| r.sub_y)
            .collect()
    }
}

const PLANE: usize = (CHUNK_SIZE_X * CHUNK_SIZE_Z) as usize;
const COLUMN_VOLUME: usize = PLANE * WORLD_HEIGHT as usize;

const fn cell_index(x: usize, y: usize, z: usize) -> usize {
    y * PLANE + z * CHUNK_SIZE_X as usize + x
}

/// Recomputes column lighting via flood fill.
///
/// The engine is cheap to clone around worker threads: it carries only a
/// shared handle to the read-only block registry.
#[derive(Debug, Clone)]
pub struct LightingEngine {
    registry: Arc<BlockRegistry>,
}

impl LightingEngine {
    /// Creates an engine over the given registry.
    #[must_use]
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self { registry }
    }

    /// Recomputes both light channels for a column from scratch.
    ///
    /// `slices` holds the column's present sub-chunks; absent slices are
    /// treated as open air. Returns a fresh light array per input slice and
    /// a changed flag computed against the input light.
    pub fn recompute(&self, slices: &[LightSlice]) -> Result<LightPass, LightError> {
        Self::validate(slices)?;

        // Stack the sparse slices into dense full-height arrays. Gaps are
        // air, which both channels traverse freely.
        let mut blocks = vec![0u16; COLUMN_VOLUME];
        for slice in slices {
            let base = slice.sub_y as usize * SUB_CHUNK_HEIGHT as usize * PLANE;
            blocks[base..base + SUB_CHUNK_VOLUME].copy_from_slice(&slice.blocks);
        }

        let sky = self.flood_skylight(&blocks);
        let blk = self.flood_blocklight(&blocks);

        let mut updated = Vec::with_capacity(slices.len());
        for slice in slices {
            let base = slice.sub_y as usize * SUB_CHUNK_HEIGHT as usize * PLANE;
            let mut light = vec![0u8; SUB_CHUNK_VOLUME];
            for (i, slot) in light.iter_mut().enumerate() {
                *slot = (sky[base + i] << 4) | blk[base + i];
            }
            let changed = light != slice.light;
            updated.push(LightResult {
                sub_y: slice.sub_y,
                light,
                changed,
            });
        }
        updated.sort_by_key(|r| r.sub_y);
        Ok(LightPass { updated })
    }

    /// Synchronous path used during generation: recomputes the column and
    /// writes the fresh arrays back in place. Returns the changed indices.
    pub fn light_column(&self, column: &mut ChunkColumn) -> Result<Vec<u8>, LightError> {
        let slices: Vec<LightSlice> = column
            .present_sub_chunks()
            .filter_map(|sub_y| {
                column.sub_chunk(sub_y).map(|sub| LightSlice {
                    sub_y,
                    blocks: sub.blocks_owned(),
                    light: sub.light_owned(),
                })
            })
            .collect();
        let pass = self.recompute(&slices)?;
        let mut changed = Vec::new();
        for result in pass.updated {
            if !result.changed {
                continue;
            }
            if let Some(sub) = column.sub_chunk_mut(result.sub_y) {
                sub.replace_light(result.light)
                    .map_err(|e| LightError::MalformedInput(e.to_string()))?;
                changed.push(result.sub_y);
            }
        }
        Ok(changed)
    }

    fn validate(slices: &[LightSlice]) -> Result<(), LightError> {
        let mut seen = [false; SUB_CHUNKS_PER_COLUMN as usize];
        for slice in slices {
            if u32::from(slice.sub_y) >= SUB_CHUNKS_PER_COLUMN {
                return Err(LightError::MalformedInput(format!(
                    "sub-chunk index {} out of range",
                    slice.sub_y
                )));
            }
            if seen[slice.sub_y as usize] {
                return Err(LightError::MalformedInput(format!(
                    "duplicate sub-chunk index {}",
                    slice.sub_y
                )));
            }
            seen[slice.sub_y as usize] = true;
            if slice.blocks.len() != SUB_CHUNK_VOLUME {
                return Err(LightError::MalformedInput(format!(
                    "block array length {} != {SUB_CHUNK_VOLUME}",
                    slice.blocks.len()
                )));
            }
            if slice.light.len() != SUB_CHUNK_VOLUME {
                return Err(LightError::MalformedInput(format!(
                    "light array length {} != {SUB_CHUNK_VOLUME}",
                    slice.light.len()
                )));
            }
        }
        Ok(())
    }

    fn opaque(&self, id: u16) -> bool {
        self.registry.is_opaque(BlockId::from_raw(id))
    }

    fn attenuation(&self, id: u16) -> u8 {
        self.registry.get(BlockId::from_raw(id)).attenuation.max(1)
    }

    fn flood_skylight(&self, blocks: &[u16]) -> Vec<u8> {
        let mut light = vec![0u8; COLUMN_VOLUME];
        let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();

        // Seed: level 15 straight down every pillar while it stays open air.
        for z in 0..CHUNK_SIZE_Z as usize {
            for x in 0..CHUNK_SIZE_X as usize {
                for y in (0..WORLD_HEIGHT as usize).rev() {
                    let idx = cell_index(x, y, z);
                    if blocks[idx] != 0 {
                        break;
                    }
                    light[idx] = MAX_LIGHT;
                    queue.push_back((x, y, z));
                }
            }
        }

        self.flood(blocks, &mut light, &mut queue);
        light
    }

    fn flood_blocklight(&self, blocks: &[u16]) -> Vec<u8> {
        let mut light = vec![0u8; COLUMN_VOLUME];
        let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();

        for y in 0..WORLD_HEIGHT as usize {
            for z in 0..CHUNK_SIZE_Z as usize {
                for x in 0..CHUNK_SIZE_X as usize {
                    let idx = cell_index(x, y, z);
                    let id = blocks[idx];
                    if id == 0 {
                        continue;
                    }
                    let emission = self.registry.get(BlockId::from_raw(id)).emission;
                    if emission > 0 {
                        light[idx] = emission.min(MAX_LIGHT);
                        queue.push_back((x, y, z));
                    }
                }
            }
        }

        self.flood(blocks, &mut light, &mut queue);

        // Opaque emitters glow outward but store zero in their own cell.
        for (idx, slot) in light.iter_mut().enumerate() {
            if blocks[idx] != 0 && self.opaque(blocks[idx]) {
                *slot = 0;
            }
        }
        light
    }

    /// Monotone relaxation: pop a cell, offer `level - attenuation(neighbor)`
    /// to each non-opaque neighbor, keep the max, and requeue on improvement.
    fn flood(&self, blocks: &[u16], light: &mut [u8], queue: &mut VecDeque<(usize, usize, usize)>) {
        const OFFSETS: [(i64, i64, i64); 6] = [
            (1, 0, 0),
            (-1, 0, 0),
            (0, 1, 0),
            (0, -1, 0),
            (0, 0, 1),
            (0, 0, -1),
        ];
        while let Some((x, y, z)) = queue.pop_front() {
            let level = light[cell_index(x, y, z)];
            if level <= 1 {
                continue;
            }
            for (dx, dy, dz) in OFFSETS {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                let nz = z as i64 + dz;
                if nx < 0
                    || ny < 0
                    || nz < 0
                    || nx >= i64::from(CHUNK_SIZE_X)
                    || ny >= i64::from(WORLD_HEIGHT)
                    || nz >= i64::from(CHUNK_SIZE_Z)
                {
                    continue;
                }
                let nidx = cell_index(nx as usize, ny as usize, nz as usize);
                let nid = blocks[nidx];
                if nid != 0 && self.opaque(nid) {
                    continue;
                }
                let cost = self.attenuation(nid);
                let candidate = level.saturating_sub(cost);
                if candidate > light[nidx] {
                    light[nidx] = candidate;
                    queue.push_back((nx as usize, ny as usize, nz as usize));
                }
            }
        }
    }
}

/// Combines the two channels into the level used for tinting: the brighter
/// of skylight and blocklight.
#[must_use]
pub const fn combined_level(skylight: u8, blocklight: u8) -> u8 {
    if skylight > blocklight {
        skylight
    } else {
        blocklight
    }
}
