//! Column loading, unloading, and world-level block access.
//!
//! The [`ChunkManager`] exclusively owns every loaded [`ChunkColumn`]. All
//! mutation happens on the owning thread; background workers only ever see
//! copies of the block and light arrays.

use ahash::AHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use strata_common::{
    BlockId, BlockPos, ColumnPos, SubChunkPos, WorldError, WorldResult, CHUNK_SIZE_X,
    CHUNK_SIZE_Z, SUB_CHUNKS_PER_COLUMN, SUB_CHUNK_HEIGHT, WORLD_HEIGHT,
};

use crate::block_state::BlockStateStore;
use crate::chunk::{ChunkColumn, ChunkError, ColumnState};
use crate::collision::BlockVolume;
use crate::events::{WorldEvent, WorldEvents};
use crate::lighting::{combined_level, LightingEngine};
use crate::registry::BlockRegistry;

/// Errors surfaced by column generation.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// A terrain feature failed while scanning the column.
    #[error("Feature '{feature}' failed: {reason}")]
    Feature {
        /// Feature name
        feature: String,
        /// Failure description
        reason: String,
    },
    /// Lighting after generation failed.
    #[error("Lighting failed: {0}")]
    Lighting(String),
}

/// Fills a freshly allocated column with terrain.
pub trait ColumnGenerator {
    /// Writes blocks into the column. The column is in the `Generating`
    /// state for the duration of the call.
    fn generate(&self, column: &mut ChunkColumn) -> Result<(), GenerationError>;
}

/// Per-sub-chunk block arrays of the four horizontal neighbors, for
/// cross-boundary face visibility in the mesher. `None` means the neighbor
/// column is not loaded.
#[derive(Debug, Default)]
pub struct NeighborArrays {
    /// Neighbor at +X
    pub pos_x: Option<Vec<u16>>,
    /// Neighbor at -X
    pub neg_x: Option<Vec<u16>>,
    /// Neighbor at +Z
    pub pos_z: Option<Vec<u16>>,
    /// Neighbor at -Z
    pub neg_z: Option<Vec<u16>>,
}

/// Chunk manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// World save directory
    pub save_dir: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("saves/world"),
        }
    }
}

/// Owns every loaded column and mediates all block access.
pub struct ChunkManager {
    config: ManagerConfig,
    columns: AHashMap<ColumnPos, ChunkColumn>,
    block_states: BlockStateStore,
    registry: Arc<BlockRegistry>,
    lighting: LightingEngine,
    events: WorldEvents,
}

impl ChunkManager {
    /// Creates a manager over the given registry.
    #[must_use]
    pub fn new(config: ManagerConfig, registry: Arc<BlockRegistry>) -> Self {
        let lighting = LightingEngine::new(Arc::clone(&registry));
        Self {
            config,
            columns: AHashMap::new(),
            block_states: BlockStateStore::new(),
            registry,
            lighting,
            events: WorldEvents::default(),
        }
    }

    /// Returns the block registry handle.
    #[must_use]
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &WorldEvents {
        &self.events
    }

    /// Loads a column, generating and lighting it if absent.
    ///
    /// Idempotent: a column that is already loaded is left untouched and
    /// `Ok(false)` is returned. On generation failure the column still
    /// reaches the `Loaded` state (with whatever was generated before the
    /// failure) and the error propagates.
    pub fn load_column(
        &mut self,
        pos: ColumnPos,
        generator: &dyn ColumnGenerator,
    ) -> Result<bool, GenerationError> {
        if self.columns.contains_key(&pos) {
            return Ok(false);
        }

        debug!("Generating column {pos}");
        let mut column = ChunkColumn::new(pos);
        let generated = generator.generate(&mut column);

        // The lifecycle must resolve to a terminal state even on failure;
        // a column stuck in Generating would wedge every tracker keyed on it.
        let lit = match &generated {
            Ok(()) => self
                .lighting
                .light_column(&mut column)
                .map_err(|e| GenerationError::Lighting(e.to_string())),
            Err(_) => Ok(Vec::new()),
        };
        column.set_state(ColumnState::Loaded);
        column.mark_all_dirty();
        self.columns.insert(pos, column);
        self.events.publish(WorldEvent::ColumnLoaded { column: pos });

        generated?;
        lit?;
        Ok(true)
    }

    /// Unloads a column, releasing its storage and clearing every
    /// per-column tracking structure. Returns the column for persistence.
    pub fn unload_column(&mut self, pos: ColumnPos) -> Option<ChunkColumn> {
        let column = self.columns.remove(&pos)?;
        self.block_states.clear_column(pos);
        self.events
            .publish(WorldEvent::ColumnUnloaded { column: pos });
        info!("Unloaded column {pos}");
        Some(column)
    }

    /// Whether a column is loaded.
    #[must_use]
    pub fn is_loaded(&self, pos: ColumnPos) -> bool {
        self.columns.contains_key(&pos)
    }

    /// Number of loaded columns.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.columns.len()
    }

    /// Borrows a loaded column.
    #[must_use]
    pub fn column(&self, pos: ColumnPos) -> Option<&ChunkColumn> {
        self.columns.get(&pos)
    }

    /// Mutably borrows a loaded column.
    pub fn column_mut(&mut self, pos: ColumnPos) -> Option<&mut ChunkColumn> {
        self.columns.get_mut(&pos)
    }

    /// Iterates over loaded columns.
    pub fn columns(&self) -> impl Iterator<Item = &ChunkColumn> {
        self.columns.values()
    }

    /// Returns the per-coordinate block state side table.
    pub fn block_states(&mut self) -> &mut BlockStateStore {
        &mut self.block_states
    }

    /// Reads a block. Unloaded columns and out-of-height positions read as
    /// air; this is a well-defined absence, not an error.
    #[must_use]
    pub fn block_id_at(&self, pos: BlockPos) -> BlockId {
        if !(0..i64::from(WORLD_HEIGHT)).contains(&pos.y) {
            return BlockId::AIR;
        }
        let local = pos.local();
        self.columns
            .get(&pos.column())
            .and_then(|column| column.block_id_at(local.x, pos.y, local.z).ok())
            .unwrap_or(BlockId::AIR)
    }

    /// Writes a block.
    ///
    /// The owning column must be loaded. Returns whether the stored value
    /// changed; a change marks the touched sub-chunk dirty, propagates
    /// dirtiness to boundary neighbors (their face exposure depends on this
    /// cell), and drops any side-table state the old block owned.
    pub fn set_block_at(&mut self, pos: BlockPos, id: BlockId) -> WorldResult<bool> {
        let column_pos = pos.column();
        let local = pos.local();
        let column = self
            .columns
            .get_mut(&column_pos)
            .ok_or(WorldError::ColumnNotLoaded {
                x: column_pos.x,
                z: column_pos.z,
            })?;

        let changed = column.set_block_id_at(local.x, pos.y, local.z, id)?;
        if !changed {
            return Ok(false);
        }

        // Vertical boundary: the slice above/below shares an exposed face.
        if let Some(sub_y) = pos.sub_y() {
            if local.y == 0 && sub_y > 0 {
                column.mark_dirty(sub_y - 1);
            }
            if u32::from(local.y) == SUB_CHUNK_HEIGHT - 1
                && u32::from(sub_y) + 1 < SUB_CHUNKS_PER_COLUMN
            {
                column.mark_dirty(sub_y + 1);
            }
        }

        // Horizontal boundary: adjacent columns must remesh too.
        let mut dirty_columns = vec![column_pos];
        let mut mark_neighbor = |manager: &mut Self, neighbor: ColumnPos| {
            if let Some(other) = manager.columns.get_mut(&neighbor) {
                if let Some(sub_y) = pos.sub_y() {
                    other.mark_dirty(sub_y);
                }
                dirty_columns.push(neighbor);
            }
        };
        if local.x == 0 {
            mark_neighbor(self, ColumnPos::new(column_pos.x - 1, column_pos.z));
        }
        if u32::from(local.x) == CHUNK_SIZE_X - 1 {
            mark_neighbor(self, ColumnPos::new(column_pos.x + 1, column_pos.z));
        }
        if local.z == 0 {
            mark_neighbor(self, ColumnPos::new(column_pos.x, column_pos.z - 1));
        }
        if u32::from(local.z) == CHUNK_SIZE_Z - 1 {
            mark_neighbor(self, ColumnPos::new(column_pos.x, column_pos.z + 1));
        }

        self.block_states.remove(pos);
        self.events.publish(WorldEvent::BlockChanged {
            pos,
            dirty: dirty_columns,
        });
        Ok(true)
    }

    /// Skylight at a world position. Unloaded columns read as open sky.
    #[must_use]
    pub fn skylight_at(&self, pos: BlockPos) -> u8 {
        if pos.y >= i64::from(WORLD_HEIGHT) {
            return 15;
        }
        if pos.y < 0 {
            return 0;
        }
        let local = pos.local();
        self.columns
            .get(&pos.column())
            .and_then(|column| column.skylight_at(local.x, pos.y, local.z).ok())
            .unwrap_or(15)
    }

    /// Blocklight at a world position.
    #[must_use]
    pub fn blocklight_at(&self, pos: BlockPos) -> u8 {
        if !(0..i64::from(WORLD_HEIGHT)).contains(&pos.y) {
            return 0;
        }
        let local = pos.local();
        self.columns
            .get(&pos.column())
            .and_then(|column| column.blocklight_at(local.x, pos.y, local.z).ok())
            .unwrap_or(0)
    }

    /// Light level used to tint a block's geometry: solid blocks store zero
    /// internally, so they take the brightest immediately adjacent
    /// non-solid cell; everything else reads its own cell.
    #[must_use]
    pub fn render_light_at(&self, pos: BlockPos) -> u8 {
        if self.registry.is_solid(self.block_id_at(pos)) {
            pos.face_neighbors()
                .iter()
                .filter(|&&n| !self.registry.is_solid(self.block_id_at(n)))
                .map(|&n| combined_level(self.skylight_at(n), self.blocklight_at(n)))
                .max()
                .unwrap_or(0)
        } else {
            combined_level(self.skylight_at(pos), self.blocklight_at(pos))
        }
    }

    /// Highest non-air block in the (x, z) pillar, or `None` if empty or
    /// unloaded.
    #[must_use]
    pub fn highest_block_at(&self, x: i64, z: i64) -> Option<i64> {
        let pos = BlockPos::new(x, 0, z);
        let local = pos.local();
        self.columns
            .get(&pos.column())
            .and_then(|column| column.highest_block_at(local.x, local.z))
    }

    /// Copies the four horizontal neighbors' block arrays for one sub-chunk,
    /// for the mesh worker. Missing neighbors stay `None` and the mesher
    /// treats them as exposed.
    #[must_use]
    pub fn neighbor_arrays(&self, sub: SubChunkPos) -> NeighborArrays {
        let fetch = |pos: ColumnPos| -> Option<Vec<u16>> {
            self.columns
                .get(&pos)?
                .sub_chunk(sub.sub_y)
                .map(|s| s.blocks_owned())
        };
        let column = sub.column;
        NeighborArrays {
            pos_x: fetch(ColumnPos::new(column.x + 1, column.z)),
            neg_x: fetch(ColumnPos::new(column.x - 1, column.z)),
            pos_z: fetch(ColumnPos::new(column.x, column.z + 1)),
            neg_z: fetch(ColumnPos::new(column.x, column.z - 1)),
        }
    }

    /// Drains the dirty flags of every loaded column into a list of
    /// sub-chunk positions that need remeshing.
    pub fn take_dirty_sub_chunks(&mut self) -> Vec<SubChunkPos> {
        let mut dirty = Vec::new();
        for (pos, column) in &mut self.columns {
            for sub_y in column.take_dirty() {
                dirty.push(SubChunkPos::new(*pos, sub_y));
            }
        }
        dirty
    }

    /// Saves a column's sub-chunk slices to the save directory.
    pub fn save_column(&self, pos: ColumnPos) -> Result<(), ChunkError> {
        let column = self.columns.get(&pos).ok_or_else(|| {
            ChunkError::SerializationFailed(format!("column {pos} not loaded"))
        })?;
        let slices = column.serialize()?;
        let path = self.column_path(pos);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChunkError::SerializationFailed(format!("mkdir failed: {e}")))?;
        }
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(slices.len() as u32).to_le_bytes());
        for slice in &slices {
            bytes.extend_from_slice(&(slice.len() as u32).to_le_bytes());
            bytes.extend_from_slice(slice);
        }
        std::fs::write(&path, bytes)
            .map_err(|e| ChunkError::SerializationFailed(format!("write failed: {e}")))?;
        debug!("Saved column {pos} ({} slices)", slices.len());
        Ok(())
    }

    /// Loads a previously saved column from the save directory, bypassing
    /// generation. Returns `Ok(false)` if no save exists.
    pub fn load_saved_column(&mut self, pos: ColumnPos) -> Result<bool, ChunkError> {
        if self.columns.contains_key(&pos) {
            return Ok(false);
        }
        let path = self.column_path(pos);
        if !path.exists() {
            return Ok(false);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| ChunkError::DeserializationFailed(format!("read failed: {e}")))?;
        let slices = split_column_file(&bytes)?;
        let column = ChunkColumn::deserialize(pos, &slices)?;
        self.columns.insert(pos, column);
        self.events.publish(WorldEvent::ColumnLoaded { column: pos });
        Ok(true)
    }

    /// Saves every loaded column, logging failures at warn level.
    pub fn save_all(&self) -> usize {
        let mut saved = 0;
        for pos in self.columns.keys() {
            if let Err(e) = self.save_column(*pos) {
                warn!("Failed to save column {pos}: {e}");
            } else {
                saved += 1;
            }
        }
        info!("Saved {saved} columns");
        saved
    }

    fn column_path(&self, pos: ColumnPos) -> PathBuf {
        self.config
            .save_dir
            .join(format!("column_{}_{}.stcl", pos.x, pos.z))
    }
}

impl BlockVolume for ChunkManager {
    fn is_solid(&self, x: i64, y: i64, z: i64) -> bool {
        self.registry.is_solid(self.block_id_at(BlockPos::new(x, y, z)))
    }
}

fn split_column_file(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ChunkError> {
    let too_short = || ChunkError::DeserializationFailed("column file too short".into());
    if bytes.len() < 4 {
        return Err(too_short());
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let mut slices = Vec::with_capacity(count);
    let mut offset = 4;
    for _ in 0..count {
        if bytes.len() < offset + 4 {
            return Err(too_short());
        }
        let len = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        offset += 4;
        if bytes.len() < offset + len {
            return Err(too_short());
        }
        slices.push(bytes[offset..offset + len].to_vec());
        offset += len;
    }
    Ok(slices)
}
