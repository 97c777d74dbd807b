//! # Strata Worldgen
//!
//! Procedural generation for Strata: noise-driven terrain columns, tunnel
//! and cavern cave carving, and water body placement.
//!
//! Every feature is a pure function of (seed, world coordinates), so any
//! system can re-derive terrain facts (surface height, cave presence)
//! without materializing chunks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caves;
pub mod terrain;
pub mod water;

pub use caves::{CaveConfig, CaveField};
pub use terrain::{GenConfig, TerrainGenerator};
pub use water::{WaterConfig, WaterFill};
