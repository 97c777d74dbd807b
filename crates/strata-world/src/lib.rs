//! # Strata World
//!
//! World management for Strata: sub-chunk and column storage, the chunk
//! manager, the block registry and per-coordinate state side table, the
//! flood-fill lighting engine, and block-grid collision.
//!
//! Ownership is strict: the [`streaming::ChunkManager`] exclusively owns
//! every loaded column, and sub-chunk arrays are only ever mutated by the
//! thread that owns the manager. Anything that runs elsewhere (lighting
//! recomputation, meshing) receives copies of the arrays and hands copies
//! back.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block_state;
pub mod chunk;
pub mod collision;
pub mod events;
pub mod lighting;
pub mod registry;
pub mod streaming;

pub use block_state::BlockStateStore;
pub use chunk::{ChunkColumn, ChunkError, ChunkResult, ColumnState, SubChunk};
pub use collision::{step_body, Aabb, BlockVolume, Body, StepResult};
pub use events::{WorldEvent, WorldEvents};
pub use lighting::{LightError, LightPass, LightResult, LightSlice, LightingEngine};
pub use registry::{default_registry, BlockDef, BlockRegistry, CoreBlocks, RegistryBuilder};
pub use streaming::{
    ChunkManager, ColumnGenerator, GenerationError, ManagerConfig, NeighborArrays,
};
