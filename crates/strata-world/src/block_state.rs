//! Per-coordinate mutable block state.
//!
//! Block definitions are stateless flyweights; anything mutable that a
//! particular placed block owns (furnace contents, growth stage) lives in
//! this side table, keyed by world coordinate. Entries are created on first
//! access or explicit insert and destroyed when the owning block is removed
//! or its column unloads.

use ahash::AHashMap;
use std::any::Any;
use strata_common::{BlockPos, ColumnPos};

/// Boxed per-block state. Concrete types are recovered by downcast.
pub type BoxedState = Box<dyn Any + Send>;

/// Sparse map from block coordinate to auxiliary state.
#[derive(Default)]
pub struct BlockStateStore {
    entries: AHashMap<BlockPos, BoxedState>,
}

impl BlockStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts state for a coordinate, replacing any previous entry.
    pub fn insert<S: Any + Send>(&mut self, pos: BlockPos, state: S) {
        self.entries.insert(pos, Box::new(state));
    }

    /// Borrows typed state at a coordinate, if present and of type `S`.
    #[must_use]
    pub fn get<S: Any + Send>(&self, pos: BlockPos) -> Option<&S> {
        self.entries.get(&pos).and_then(|s| s.downcast_ref())
    }

    /// Mutably borrows typed state at a coordinate.
    pub fn get_mut<S: Any + Send>(&mut self, pos: BlockPos) -> Option<&mut S> {
        self.entries.get_mut(&pos).and_then(|s| s.downcast_mut())
    }

    /// Borrows typed state, inserting a default-constructed value on first
    /// access.
    pub fn get_or_insert<S: Any + Send + Default>(&mut self, pos: BlockPos) -> &mut S {
        let slot = self
            .entries
            .entry(pos)
            .or_insert_with(|| Box::new(S::default()));
        if !slot.is::<S>() {
            // A different state type occupied the slot; the new block owner
            // takes over.
            *slot = Box::new(S::default());
        }
        slot.downcast_mut()
            .expect("slot was just ensured to hold S")
    }

    /// Removes state at a coordinate (block removed), returning whether an
    /// entry existed.
    pub fn remove(&mut self, pos: BlockPos) -> bool {
        self.entries.remove(&pos).is_some()
    }

    /// Drops every entry belonging to a column (column unload).
    pub fn clear_column(&mut self, column: ColumnPos) {
        self.entries.retain(|pos, _| pos.column() != column);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
