//! Engine runtime: wires the world, generation, lighting correction,
//! meshing, and visibility into a single update loop.
//!
//! The loop is strictly single-threaded; the runtime's `tick` pumps work to
//! the offload workers and reconciles whatever results have arrived, never
//! blocking on any of them.

use ahash::{AHashMap, AHashSet};
use glam::{Mat4, Vec3};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tracing::debug;

use strata_common::{BlockId, BlockPos, ColumnPos, SubChunkPos};
use strata_world::collision::{step_body, Body, StepResult};
use strata_world::events::WorldEvent;
use strata_world::lighting::LightingEngine;
use strata_world::registry::{default_registry, BlockRegistry, CoreBlocks};
use strata_world::streaming::{ChunkManager, GenerationError, ManagerConfig};
use strata_worldgen::TerrainGenerator;

use crate::config::EngineConfig;
use crate::mesher::{MeshInput, MeshOutput, MeshTables};
use crate::relight::BackgroundRelight;
use crate::visibility::{mesh_bounds, VisibilityPipeline, VisibleSet};
use crate::workers::{spawn_mesh_worker, MeshRequest, MeshResponse, Worker};

/// The assembled engine core.
pub struct Runtime {
    config: EngineConfig,
    registry: Arc<BlockRegistry>,
    core_blocks: CoreBlocks,
    manager: ChunkManager,
    generator: TerrainGenerator,
    relight: BackgroundRelight,
    mesh_worker: Worker<MeshRequest, MeshResponse>,
    mesh_tables: MeshTables,
    remesh_queue: VecDeque<SubChunkPos>,
    remesh_queued: AHashSet<SubChunkPos>,
    mesh_pending: AHashSet<SubChunkPos>,
    meshes: AHashMap<SubChunkPos, MeshOutput>,
    visibility: VisibilityPipeline,
    player_column: ColumnPos,
}

impl Runtime {
    /// Builds the runtime from configuration.
    pub fn new(config: EngineConfig) -> io::Result<Self> {
        let (registry, core_blocks) = default_registry();
        let registry = Arc::new(registry);
        let manager = ChunkManager::new(
            ManagerConfig {
                save_dir: config.save_dir.clone(),
            },
            Arc::clone(&registry),
        );
        let generator = TerrainGenerator::new(config.generation.clone(), core_blocks);
        let relight = BackgroundRelight::new(
            LightingEngine::new(Arc::clone(&registry)),
            config.relight.clone(),
        )?;
        let visibility =
            VisibilityPipeline::new(config.occlusion.clone(), config.raster.clone())?;
        let mesh_tables = MeshTables::from_registry(&registry);

        Ok(Self {
            config,
            registry,
            core_blocks,
            manager,
            generator,
            relight,
            mesh_worker: spawn_mesh_worker()?,
            mesh_tables,
            remesh_queue: VecDeque::new(),
            remesh_queued: AHashSet::new(),
            mesh_pending: AHashSet::new(),
            meshes: AHashMap::new(),
            visibility,
            player_column: ColumnPos::new(0, 0),
        })
    }

    /// The block registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Ids of the built-in block types.
    #[must_use]
    pub const fn core_blocks(&self) -> CoreBlocks {
        self.core_blocks
    }

    /// The chunk manager.
    #[must_use]
    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    /// Loads every column within the render distance of `center`,
    /// generating the missing ones.
    pub fn ensure_loaded(&mut self, center: ColumnPos) -> Result<(), GenerationError> {
        self.player_column = center;
        let r = self.config.render_distance as i32;
        for dz in -r..=r {
            for dx in -r..=r {
                let pos = ColumnPos::new(center.x + dx, center.z + dz);
                if self.manager.is_loaded(pos) {
                    continue;
                }
                self.manager.load_column(pos, &self.generator)?;
            }
        }
        Ok(())
    }

    /// Unloads a column and deregisters it everywhere. Persistence is the
    /// caller's choice via [`ChunkManager::save_column`] before unloading.
    pub fn unload_column(&mut self, pos: ColumnPos) {
        self.manager.unload_column(pos);
    }

    /// Reads a block.
    #[must_use]
    pub fn block_at(&self, pos: BlockPos) -> BlockId {
        self.manager.block_id_at(pos)
    }

    /// Places or removes a block. The mutation is visible to physics and
    /// light queries immediately, before the next tick.
    pub fn set_block(&mut self, pos: BlockPos, id: BlockId) -> Result<bool, strata_common::WorldError> {
        self.manager.set_block_at(pos, id)
    }

    /// Advances one update tick: reconciles world events, pumps background
    /// lighting, and exchanges meshing work with the mesh worker.
    pub fn tick(&mut self) {
        self.drain_world_events();
        self.relight.tick(&mut self.manager, self.player_column);
        self.collect_mesh_results();
        self.queue_dirty_sub_chunks();
        self.dispatch_remeshes();
    }

    /// Runs the visibility pipeline for this frame.
    pub fn begin_frame(&mut self, camera: Vec3, view_proj: Mat4) -> VisibleSet {
        self.visibility.begin_frame(camera, view_proj)
    }

    /// Built mesh for a sub-chunk, if any.
    #[must_use]
    pub fn mesh(&self, pos: SubChunkPos) -> Option<&MeshOutput> {
        self.meshes.get(&pos)
    }

    /// Integrates a physics body against the loaded world.
    pub fn step_physics(&self, body: &mut Body, dt: f32) -> StepResult {
        step_body(body, &self.manager, dt)
    }

    /// Background relight scheduler (observability).
    #[must_use]
    pub const fn relight(&self) -> &BackgroundRelight {
        &self.relight
    }

    /// Visibility pipeline (observability, cache management).
    pub fn visibility_mut(&mut self) -> &mut VisibilityPipeline {
        &mut self.visibility
    }

    fn drain_world_events(&mut self) {
        for event in self.manager.events().drain() {
            match event {
                WorldEvent::ColumnLoaded { column } => {
                    self.relight.enqueue(column);
                }
                WorldEvent::ColumnUnloaded { column } => {
                    self.relight.forget(column);
                    self.visibility.remove_column(column);
                    self.meshes.retain(|pos, _| pos.column != column);
                    self.mesh_pending.retain(|pos| pos.column != column);
                    self.remesh_queued.retain(|pos| pos.column != column);
                    self.remesh_queue.retain(|pos| pos.column != column);
                    debug!("Deregistered column {column} from meshing and visibility");
                }
                WorldEvent::BlockChanged { .. } | WorldEvent::LightingUpdated { .. } => {
                    // Dirty flags drive remeshing; nothing extra to do here.
                }
            }
        }
    }

    fn collect_mesh_results(&mut self) {
        for MeshResponse { pos, output } in self.mesh_worker.try_collect() {
            if !self.mesh_pending.remove(&pos) {
                continue;
            }
            // Results for unloaded columns are dropped silently.
            if !self.manager.is_loaded(pos.column) {
                continue;
            }
            self.visibility.update_bounds(pos, mesh_bounds(pos, &output));
            if output.is_empty() {
                self.meshes.remove(&pos);
            } else {
                self.meshes.insert(pos, output);
            }
        }
    }

    fn queue_dirty_sub_chunks(&mut self) {
        for pos in self.manager.take_dirty_sub_chunks() {
            self.refresh_occluder(pos);
            if self.remesh_queued.insert(pos) {
                self.remesh_queue.push_back(pos);
            }
        }
    }

    fn dispatch_remeshes(&mut self) {
        let mut dispatched = 0;
        while dispatched < self.config.remeshes_per_tick {
            let Some(pos) = self.remesh_queue.pop_front() else {
                break;
            };
            self.remesh_queued.remove(&pos);
            if self.mesh_pending.contains(&pos) {
                // Already in flight; the dirty flag will resurface if the
                // data changed again.
                continue;
            }
            let Some(column) = self.manager.column(pos.column) else {
                continue;
            };
            let input = match column.sub_chunk(pos.sub_y) {
                Some(sub) => MeshInput {
                    blocks: sub.blocks_owned(),
                    light: sub.light_owned(),
                    neighbors: self.manager.neighbor_arrays(pos),
                    tables: self.mesh_tables.clone(),
                },
                None => {
                    // The slice is gone (all air); clear any stale mesh.
                    self.meshes.remove(&pos);
                    self.visibility.update_bounds(pos, None);
                    continue;
                }
            };
            if self.mesh_worker.dispatch(MeshRequest { pos, input }) {
                self.mesh_pending.insert(pos);
                dispatched += 1;
            }
        }
    }

    /// Re-evaluates whether a sub-chunk still qualifies as a raster
    /// occluder after its blocks changed.
    fn refresh_occluder(&mut self, pos: SubChunkPos) {
        let fully_opaque = self
            .manager
            .column(pos.column)
            .and_then(|column| column.sub_chunk(pos.sub_y))
            .is_some_and(|sub| {
                sub.is_full()
                    && sub
                        .blocks_raw()
                        .iter()
                        .all(|&id| self.mesh_tables.opaque.contains(&id))
            });
        self.visibility.set_occluder(pos, fully_opaque);
    }

    /// Number of meshes currently built.
    #[must_use]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of remesh requests in flight.
    #[must_use]
    pub fn pending_mesh_count(&self) -> usize {
        self.mesh_pending.len()
    }
}
