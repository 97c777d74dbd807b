//! Background lighting correction.
//!
//! Generation lights columns synchronously, but edits and cross-column
//! effects drift, so every loaded column cycles through a correction queue
//! forever: one column per tick is copied out, recomputed on the lighting
//! worker, and the fresh arrays applied when the response arrives. Columns
//! near the player come back around on a shorter cooldown than far ones.
//!
//! At most one request per column is ever in flight, and results for
//! columns that unloaded in the meantime are dropped without effect.

use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use std::io;
use tracing::warn;

use strata_common::ColumnPos;
use strata_world::events::WorldEvent;
use strata_world::lighting::{LightSlice, LightingEngine};
use strata_world::streaming::ChunkManager;

use crate::workers::{spawn_lighting_worker, LightRequest, LightResponse, Worker};

/// Scheduling parameters for the correction pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RelightConfig {
    /// Columns within this chunk-grid distance of the player use the near
    /// cooldown
    pub near_radius: u32,
    /// Ticks between recomputes for near columns
    pub near_cooldown: u64,
    /// Ticks between recomputes for far columns
    pub far_cooldown: u64,
    /// Columns dispatched per tick
    pub columns_per_tick: usize,
}

impl Default for RelightConfig {
    fn default() -> Self {
        Self {
            near_radius: 4,
            near_cooldown: 40,
            far_cooldown: 240,
            columns_per_tick: 1,
        }
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelightStats {
    /// Requests dispatched to the worker
    pub dispatched: u64,
    /// Responses applied to columns
    pub applied: u64,
    /// Responses whose column had unloaded
    pub dropped_stale: u64,
    /// Failed recomputes (logged and discarded)
    pub failures: u64,
}

/// The background relight scheduler.
pub struct BackgroundRelight {
    config: RelightConfig,
    worker: Worker<LightRequest, LightResponse>,
    queue: VecDeque<ColumnPos>,
    queued: AHashSet<ColumnPos>,
    pending: AHashSet<ColumnPos>,
    last_processed: AHashMap<ColumnPos, u64>,
    tick: u64,
    stats: RelightStats,
}

impl BackgroundRelight {
    /// Creates the scheduler and spawns its worker.
    pub fn new(engine: LightingEngine, config: RelightConfig) -> io::Result<Self> {
        Ok(Self {
            config,
            worker: spawn_lighting_worker(engine)?,
            queue: VecDeque::new(),
            queued: AHashSet::new(),
            pending: AHashSet::new(),
            last_processed: AHashMap::new(),
            tick: 0,
            stats: RelightStats::default(),
        })
    }

    /// Adds a column to the correction cycle (column load).
    pub fn enqueue(&mut self, column: ColumnPos) {
        if self.queued.insert(column) {
            self.queue.push_back(column);
        }
    }

    /// Removes a column from every tracking structure (column unload). Any
    /// in-flight result will be discarded when it arrives.
    pub fn forget(&mut self, column: ColumnPos) {
        self.queued.remove(&column);
        self.pending.remove(&column);
        self.last_processed.remove(&column);
        self.queue.retain(|&c| c != column);
    }

    /// Number of columns with an in-flight request.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of columns in the rotation.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Current counters.
    #[must_use]
    pub const fn stats(&self) -> RelightStats {
        self.stats
    }

    /// One update tick: apply arrived results, then dispatch the next due
    /// column(s).
    pub fn tick(&mut self, manager: &mut ChunkManager, player: ColumnPos) {
        self.tick += 1;
        self.apply_results(manager);
        self.dispatch_due(manager, player);
    }

    fn apply_results(&mut self, manager: &mut ChunkManager) {
        for response in self.worker.try_collect() {
            let column_pos = response.column();
            // The column may have been unloaded and even re-enqueued since;
            // only a response we are actually waiting for counts.
            if !self.pending.remove(&column_pos) {
                self.stats.dropped_stale += 1;
                continue;
            }
            match response {
                LightResponse::Failed { column, error } => {
                    warn!("Background lighting failed for {column}: {error}");
                    self.stats.failures += 1;
                }
                LightResponse::Done { column, updated } => {
                    let Some(chunk_column) = manager.column_mut(column) else {
                        self.stats.dropped_stale += 1;
                        continue;
                    };
                    let mut changed = Vec::new();
                    for result in updated {
                        if !result.changed {
                            continue;
                        }
                        if let Some(sub) = chunk_column.sub_chunk_mut(result.sub_y) {
                            if sub.replace_light(result.light).is_ok() {
                                chunk_column.mark_dirty(result.sub_y);
                                changed.push(result.sub_y);
                            }
                        }
                    }
                    self.stats.applied += 1;
                    if !changed.is_empty() {
                        manager.events().publish(WorldEvent::LightingUpdated {
                            column,
                            sub_chunks: changed,
                        });
                    }
                }
            }
        }
    }

    fn dispatch_due(&mut self, manager: &ChunkManager, player: ColumnPos) {
        let mut dispatched = 0;
        // Bound the scan to one rotation so cooldown re-queues cannot spin
        // the loop forever.
        let mut remaining = self.queue.len();
        while dispatched < self.config.columns_per_tick && remaining > 0 {
            remaining -= 1;
            let Some(column) = self.queue.pop_front() else {
                break;
            };

            let Some(chunk_column) = manager.column(column) else {
                // Unloaded without a forget(); drop it from the rotation.
                self.queued.remove(&column);
                self.last_processed.remove(&column);
                continue;
            };

            if self.pending.contains(&column) {
                self.queue.push_back(column);
                continue;
            }

            let cooldown = if column.grid_distance(player) <= self.config.near_radius {
                self.config.near_cooldown
            } else {
                self.config.far_cooldown
            };
            let due = self
                .last_processed
                .get(&column)
                .map_or(true, |&last| self.tick.saturating_sub(last) >= cooldown);
            if !due {
                self.queue.push_back(column);
                continue;
            }

            let slices: Vec<LightSlice> = chunk_column
                .present_sub_chunks()
                .filter_map(|sub_y| {
                    chunk_column.sub_chunk(sub_y).map(|sub| LightSlice {
                        sub_y,
                        blocks: sub.blocks_owned(),
                        light: sub.light_owned(),
                    })
                })
                .collect();
            if self.worker.dispatch(LightRequest { column, slices }) {
                self.pending.insert(column);
                self.last_processed.insert(column, self.tick);
                self.stats.dispatched += 1;
                dispatched += 1;
            }
            // Perpetual correction: processed columns rejoin at the tail.
            self.queue.push_back(column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use strata_common::BlockPos;
    use strata_world::registry::default_registry;
    use strata_world::streaming::{ColumnGenerator, GenerationError, ManagerConfig};
    use strata_world::ChunkColumn;

    fn setup() -> (ChunkManager, BackgroundRelight, strata_world::registry::CoreBlocks) {
        let (registry, core) = default_registry();
        let registry = Arc::new(registry);
        let manager = ChunkManager::new(ManagerConfig::default(), Arc::clone(&registry));
        let engine = LightingEngine::new(registry);
        let relight = BackgroundRelight::new(
            engine,
            RelightConfig {
                near_cooldown: 1,
                far_cooldown: 1000,
                ..RelightConfig::default()
            },
        )
        .unwrap();
        (manager, relight, core)
    }

    /// Test generator: a flat stone slab.
    struct Flat(strata_world::registry::CoreBlocks);

    impl ColumnGenerator for Flat {
        fn generate(&self, column: &mut ChunkColumn) -> Result<(), GenerationError> {
            for x in 0..32u8 {
                for z in 0..32u8 {
                    for y in 0..=8 {
                        column.set_block_id_at(x, y, z, self.0.stone).ok();
                    }
                }
            }
            Ok(())
        }
    }

    fn flat(core: strata_world::registry::CoreBlocks) -> Flat {
        Flat(core)
    }

    fn pump(
        relight: &mut BackgroundRelight,
        manager: &mut ChunkManager,
        until: impl Fn(&BackgroundRelight) -> bool,
    ) {
        for _ in 0..200 {
            relight.tick(manager, ColumnPos::new(0, 0));
            if until(relight) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("background relight did not settle in time");
    }

    #[test]
    fn test_one_in_flight_per_column() {
        let (mut manager, mut relight, core) = setup();
        let pos = ColumnPos::new(0, 0);
        manager.load_column(pos, &flat(core)).unwrap();
        relight.enqueue(pos);

        relight.tick(&mut manager, pos);
        assert_eq!(relight.pending_count(), 1);
        let dispatched = relight.stats().dispatched;

        // While pending, further ticks must not dispatch the same column.
        relight.tick(&mut manager, pos);
        assert_eq!(relight.stats().dispatched, dispatched);
        assert_eq!(relight.queue_len(), 1); // still in rotation
    }

    #[test]
    fn test_result_applied_and_idempotent() {
        let (mut manager, mut relight, core) = setup();
        let pos = ColumnPos::new(0, 0);
        manager.load_column(pos, &flat(core)).unwrap();

        // Disturb the light so the first pass has something to fix.
        manager
            .column_mut(pos)
            .unwrap()
            .sub_chunk_mut(0)
            .unwrap()
            .set_skylight(strata_common::LocalPos::new(0, 60, 0), 3)
            .unwrap();

        relight.enqueue(pos);
        pump(&mut relight, &mut manager, |r| r.stats().applied >= 1);
        assert_eq!(manager.skylight_at(BlockPos::new(0, 60, 0)), 15);

        // A second full pass over the corrected data changes nothing.
        manager.events().drain();
        let applied = relight.stats().applied;
        pump(&mut relight, &mut manager, move |r| {
            r.stats().applied > applied
        });
        let lighting_events = manager
            .events()
            .drain()
            .into_iter()
            .filter(|e| matches!(e, WorldEvent::LightingUpdated { .. }))
            .count();
        assert_eq!(lighting_events, 0);
    }

    #[test]
    fn test_unloaded_result_dropped_silently() {
        let (mut manager, mut relight, core) = setup();
        let pos = ColumnPos::new(0, 0);
        manager.load_column(pos, &flat(core)).unwrap();
        relight.enqueue(pos);

        relight.tick(&mut manager, pos);
        assert_eq!(relight.pending_count(), 1);

        // Unload while the request is in flight.
        manager.unload_column(pos);
        relight.forget(pos);

        // The response eventually arrives and is dropped without effect.
        pump(&mut relight, &mut manager, |r| r.stats().dropped_stale >= 1);
        assert_eq!(relight.stats().applied, 0);
        assert!(!manager.is_loaded(pos));
    }

    #[test]
    fn test_cooldown_requeues_at_tail() {
        let (mut manager, mut relight, core) = setup();
        // Far column: cooldown 1000 ticks, so it processes once and then
        // keeps cycling without re-dispatch.
        let far = ColumnPos::new(50, 50);
        manager.load_column(far, &flat(core)).unwrap();
        relight.enqueue(far);

        pump(&mut relight, &mut manager, |r| r.stats().applied >= 1);
        let dispatched = relight.stats().dispatched;
        for _ in 0..10 {
            relight.tick(&mut manager, ColumnPos::new(0, 0));
        }
        assert_eq!(relight.stats().dispatched, dispatched);
        assert_eq!(relight.queue_len(), 1);
    }

    #[test]
    fn test_forget_clears_rotation() {
        let (mut manager, mut relight, core) = setup();
        let pos = ColumnPos::new(0, 0);
        manager.load_column(pos, &flat(core)).unwrap();
        relight.enqueue(pos);
        relight.forget(pos);
        assert_eq!(relight.queue_len(), 0);
        relight.tick(&mut manager, pos);
        assert_eq!(relight.stats().dispatched, 0);
    }
}
