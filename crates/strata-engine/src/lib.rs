//! # Strata Engine
//!
//! The client-side core of Strata: greedy sub-chunk meshing, the
//! three-stage visibility pipeline (frustum, analytic occlusion, software
//! raster occlusion), the offload workers those stages and the lighting
//! correction pass run on, and the runtime that wires it all to the world.
//!
//! Concurrency model: one single-threaded update/render loop plus a fixed
//! set of workers reached only through channels carrying owned buffers.
//! The loop dispatches work, keeps going, and applies results whenever
//! they arrive; it never blocks on a worker.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod frustum;
pub mod mesher;
pub mod occlusion;
pub mod raster;
pub mod relight;
pub mod runtime;
pub mod visibility;
pub mod workers;

pub use config::EngineConfig;
pub use frustum::Frustum;
pub use mesher::{build_mesh, MeshBatch, MeshInput, MeshOutput, MeshTables, MeshVertex};
pub use occlusion::{filter_occluded, CullBox, OcclusionConfig};
pub use raster::{DepthRaster, RasterConfig, RasterStats};
pub use relight::{BackgroundRelight, RelightConfig, RelightStats};
pub use runtime::Runtime;
pub use visibility::{FrameStats, VisibilityPipeline, VisibleSet};
pub use workers::{
    spawn_lighting_worker, spawn_mesh_worker, spawn_occlusion_worker, LightRequest,
    LightResponse, MeshRequest, MeshResponse, OcclusionRequest, OcclusionResponse, Worker,
};
