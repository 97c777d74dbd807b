//! Per-frame visibility: frustum, analytic occlusion, and the pipelined
//! software raster stage.
//!
//! Candidate bounds come from actual built geometry, cached per sub-chunk
//! and invalidated on rebuild, so a sub-chunk with one block in a corner is
//! not culled as if it filled its whole 32x32x64 extent. Occluders for the
//! raster stage come from a separate fully-opaque cache: a buried sub-chunk
//! with no mesh is still a perfectly good occluder.
//!
//! The raster stage runs at one frame of latency: each `begin_frame` first
//! applies the worker's result for the previous frame, then dispatches this
//! frame's request. Results carrying any other frame id are stale and
//! silently dropped.

use ahash::AHashMap;
use glam::{Mat4, Vec3};
use std::io;

use strata_common::{FrameId, SubChunkPos, SUB_CHUNK_HEIGHT};
use strata_world::collision::Aabb;

use crate::frustum::Frustum;
use crate::mesher::MeshOutput;
use crate::occlusion::{filter_occluded, CullBox, OcclusionConfig};
use crate::raster::RasterConfig;
use crate::workers::{spawn_occlusion_worker, OcclusionRequest, OcclusionResponse, Worker};

/// Per-frame visibility counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Candidates with cached bounds
    pub candidates: usize,
    /// Survivors of the frustum stage
    pub after_frustum: usize,
    /// Survivors of the analytic stage
    pub after_analytic: usize,
    /// Survivors after applying the previous frame's raster result
    pub visible: usize,
}

/// The visible set for one frame.
#[derive(Debug, Default)]
pub struct VisibleSet {
    /// Sub-chunks to submit, nearest-first
    pub visible: Vec<SubChunkPos>,
    /// Stage counters
    pub stats: FrameStats,
}

/// World-space bounding box of built geometry, offset to the sub-chunk's
/// base. `None` when the mesh is empty.
#[must_use]
pub fn mesh_bounds(pos: SubChunkPos, output: &MeshOutput) -> Option<Aabb> {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    let mut any = false;
    for batch in &output.batches {
        for vertex in &batch.vertices {
            min = min.min(Vec3::from_array(vertex.position));
            max = max.max(Vec3::from_array(vertex.position));
            any = true;
        }
    }
    for instance in &output.instances {
        let p = Vec3::from_array(instance.position);
        min = min.min(p);
        max = max.max(p + Vec3::ONE);
        any = true;
    }
    if !any {
        return None;
    }
    let base = pos.base();
    let offset = Vec3::new(base.x as f32, base.y as f32, base.z as f32);
    Some(Aabb::new(min + offset, max + offset))
}

/// Full-extent box of a sub-chunk, used for occluders.
#[must_use]
pub fn sub_chunk_extent(pos: SubChunkPos) -> Aabb {
    let base = pos.base();
    let min = Vec3::new(base.x as f32, base.y as f32, base.z as f32);
    Aabb::new(min, min + Vec3::new(32.0, SUB_CHUNK_HEIGHT as f32, 32.0))
}

/// The three-stage visibility pipeline.
pub struct VisibilityPipeline {
    occlusion_config: OcclusionConfig,
    worker: Worker<OcclusionRequest, OcclusionResponse>,
    /// Bounds of built geometry per sub-chunk
    bounds: AHashMap<SubChunkPos, Aabb>,
    /// Fully-opaque sub-chunks usable as occluders
    occluders: AHashMap<SubChunkPos, Aabb>,
    /// Latest raster result, applied one frame late
    last_result: Option<OcclusionResponse>,
    /// Frame id of the most recently dispatched request
    dispatched_frame: Option<FrameId>,
    frame: FrameId,
}

impl VisibilityPipeline {
    /// Creates the pipeline and spawns its raster worker.
    pub fn new(occlusion: OcclusionConfig, raster: RasterConfig) -> io::Result<Self> {
        Ok(Self {
            occlusion_config: occlusion,
            worker: spawn_occlusion_worker(raster)?,
            bounds: AHashMap::new(),
            occluders: AHashMap::new(),
            last_result: None,
            dispatched_frame: None,
            frame: FrameId::ZERO,
        })
    }

    /// Records the bounds of a freshly built mesh (or clears them when the
    /// rebuild came back empty).
    pub fn update_bounds(&mut self, pos: SubChunkPos, bounds: Option<Aabb>) {
        match bounds {
            Some(aabb) => {
                self.bounds.insert(pos, aabb);
            }
            None => {
                self.bounds.remove(&pos);
            }
        }
    }

    /// Marks or unmarks a sub-chunk as a fully-opaque occluder.
    pub fn set_occluder(&mut self, pos: SubChunkPos, fully_opaque: bool) {
        if fully_opaque {
            self.occluders.insert(pos, sub_chunk_extent(pos));
        } else {
            self.occluders.remove(&pos);
        }
    }

    /// Drops every cache entry belonging to a column (column unload).
    pub fn remove_column(&mut self, column: strata_common::ColumnPos) {
        self.bounds.retain(|pos, _| pos.column != column);
        self.occluders.retain(|pos, _| pos.column != column);
    }

    /// Number of cached candidate bounds.
    #[must_use]
    pub fn tracked_candidates(&self) -> usize {
        self.bounds.len()
    }

    /// Number of cached occluders.
    #[must_use]
    pub fn tracked_occluders(&self) -> usize {
        self.occluders.len()
    }

    /// Runs the pipeline for one frame.
    ///
    /// Applies the raster verdicts computed for the previous frame, then
    /// dispatches this frame's raster work before returning the visible set.
    pub fn begin_frame(&mut self, camera: Vec3, view_proj: Mat4) -> VisibleSet {
        // Collect worker output; only the result for the frame we last
        // dispatched is usable, anything else is stale.
        for response in self.worker.try_collect() {
            if Some(response.frame) == self.dispatched_frame {
                self.last_result = Some(response);
            }
        }

        let mut stats = FrameStats {
            candidates: self.bounds.len(),
            ..FrameStats::default()
        };

        // Stage 1: frustum.
        let frustum = Frustum::from_view_proj(view_proj);
        let in_frustum: Vec<CullBox> = self
            .bounds
            .iter()
            .filter(|&(_, aabb)| frustum.intersects_aabb(aabb))
            .map(|(&id, &aabb)| CullBox { id, aabb })
            .collect();
        stats.after_frustum = in_frustum.len();

        // Stage 2: analytic occlusion over frustum survivors only.
        let analytic = filter_occluded(camera, &in_frustum, &self.occlusion_config);
        stats.after_analytic = analytic.len();

        // Stage 3: previous frame's raster verdicts.
        let raster_hidden: Vec<SubChunkPos> = self
            .last_result
            .as_ref()
            .map(|r| r.occluded.clone())
            .unwrap_or_default();
        let visible: Vec<SubChunkPos> = analytic
            .iter()
            .filter(|c| !raster_hidden.contains(&c.id))
            .map(|c| c.id)
            .collect();
        stats.visible = visible.len();

        // Dispatch this frame's raster work on the analytic survivors.
        self.frame = self.frame.next();
        self.dispatched_frame = Some(self.frame);
        self.worker.dispatch(OcclusionRequest {
            frame: self.frame,
            view_proj,
            occluders: self.occluders.values().copied().collect(),
            candidates: analytic,
        });

        VisibleSet { visible, stats }
    }

    /// Test/tool helper: blocks until the most recently dispatched raster
    /// result is in hand for the next frame.
    pub fn wait_for_raster(&mut self) {
        while let Some(response) = self.worker.recv_blocking() {
            if Some(response.frame) == self.dispatched_frame {
                self.last_result = Some(response);
                return;
            }
        }
    }
}
