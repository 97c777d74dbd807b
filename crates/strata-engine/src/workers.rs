//! Offload workers and their request/response protocols.
//!
//! Each worker is one OS thread behind a pair of channels. Requests carry
//! owned buffers (copies of the main thread's arrays) and responses carry
//! owned buffers back; nothing is ever aliased across the boundary, so no
//! locks exist anywhere in the pipeline. The main loop dispatches without
//! blocking and drains responses at its own pace.

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Mat4;
use std::io;
use std::thread::JoinHandle;
use tracing::debug;

use strata_common::{ColumnPos, FrameId, SubChunkPos};
use strata_world::collision::Aabb;
use strata_world::lighting::{LightError, LightResult, LightSlice, LightingEngine};

use crate::mesher::{build_mesh, MeshInput, MeshOutput};
use crate::occlusion::CullBox;
use crate::raster::{DepthRaster, RasterConfig, RasterStats};

/// A single background worker processing `Req` into `Res` in FIFO order.
#[derive(Debug)]
pub struct Worker<Req: Send + 'static, Res: Send + 'static> {
    sender: Option<Sender<Req>>,
    receiver: Receiver<Res>,
    handle: Option<JoinHandle<()>>,
}

impl<Req: Send + 'static, Res: Send + 'static> Worker<Req, Res> {
    /// Spawns a named worker thread around a handler function.
    pub fn spawn(
        name: &str,
        mut handler: impl FnMut(Req) -> Res + Send + 'static,
    ) -> io::Result<Self> {
        let (req_tx, req_rx) = unbounded::<Req>();
        let (res_tx, res_rx) = unbounded::<Res>();
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Ok(request) = req_rx.recv() {
                    if res_tx.send(handler(request)).is_err() {
                        break;
                    }
                }
            })?;
        debug!("Spawned worker '{name}'");
        Ok(Self {
            sender: Some(req_tx),
            receiver: res_rx,
            handle: Some(handle),
        })
    }

    /// Queues a request without blocking. Returns false if the worker died.
    pub fn dispatch(&self, request: Req) -> bool {
        self.sender
            .as_ref()
            .map_or(false, |s| s.send(request).is_ok())
    }

    /// Drains every response that has arrived so far.
    pub fn try_collect(&self) -> Vec<Res> {
        let mut responses = Vec::new();
        while let Ok(response) = self.receiver.try_recv() {
            responses.push(response);
        }
        responses
    }

    /// Blocks for a single response. Test/tool helper.
    pub fn recv_blocking(&self) -> Option<Res> {
        self.receiver.recv().ok()
    }
}

impl<Req: Send + 'static, Res: Send + 'static> Drop for Worker<Req, Res> {
    fn drop(&mut self) {
        // Closing the request channel lets the thread run down its queue
        // and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Lighting recompute request: a column's copied block+light slices.
#[derive(Debug)]
pub struct LightRequest {
    /// The column being relit
    pub column: ColumnPos,
    /// Present sub-chunk data
    pub slices: Vec<LightSlice>,
}

/// Lighting recompute response.
#[derive(Debug)]
pub enum LightResponse {
    /// Recompute succeeded
    Done {
        /// The column
        column: ColumnPos,
        /// Fresh per-sub-chunk light arrays with change flags
        updated: Vec<LightResult>,
    },
    /// Recompute failed; prior light state must stay untouched
    Failed {
        /// The column
        column: ColumnPos,
        /// What went wrong
        error: LightError,
    },
}

impl LightResponse {
    /// The column this response belongs to.
    #[must_use]
    pub const fn column(&self) -> ColumnPos {
        match self {
            Self::Done { column, .. } | Self::Failed { column, .. } => *column,
        }
    }
}

/// Spawns the lighting worker.
pub fn spawn_lighting_worker(
    engine: LightingEngine,
) -> io::Result<Worker<LightRequest, LightResponse>> {
    Worker::spawn("strata-lighting", move |request: LightRequest| {
        match engine.recompute(&request.slices) {
            Ok(pass) => LightResponse::Done {
                column: request.column,
                updated: pass.updated,
            },
            Err(error) => LightResponse::Failed {
                column: request.column,
                error,
            },
        }
    })
}

/// Meshing request: one sub-chunk's copied arrays plus neighbor arrays.
#[derive(Debug)]
pub struct MeshRequest {
    /// The sub-chunk being meshed
    pub pos: SubChunkPos,
    /// Meshing input
    pub input: MeshInput,
}

/// Meshing response.
#[derive(Debug)]
pub struct MeshResponse {
    /// The sub-chunk that was meshed
    pub pos: SubChunkPos,
    /// Resulting batches and instances
    pub output: MeshOutput,
}

/// Spawns a mesh worker.
pub fn spawn_mesh_worker() -> io::Result<Worker<MeshRequest, MeshResponse>> {
    Worker::spawn("strata-mesh", |request: MeshRequest| MeshResponse {
        pos: request.pos,
        output: build_mesh(&request.input),
    })
}

/// Occlusion request for one frame.
#[derive(Debug)]
pub struct OcclusionRequest {
    /// Frame the result belongs to
    pub frame: FrameId,
    /// Camera view-projection matrix
    pub view_proj: Mat4,
    /// Fully-opaque sub-chunk boxes to rasterize
    pub occluders: Vec<Aabb>,
    /// Candidate boxes to test
    pub candidates: Vec<CullBox>,
}

/// Occlusion response for one frame.
#[derive(Debug)]
pub struct OcclusionResponse {
    /// Frame the result belongs to
    pub frame: FrameId,
    /// Candidates proven hidden
    pub occluded: Vec<SubChunkPos>,
    /// Raster counters
    pub stats: RasterStats,
}

/// Spawns the software-occlusion worker. The depth buffer lives on the
/// worker thread and is reused across frames.
pub fn spawn_occlusion_worker(
    config: RasterConfig,
) -> io::Result<Worker<OcclusionRequest, OcclusionResponse>> {
    let mut raster = DepthRaster::new(&config);
    Worker::spawn("strata-occlusion", move |request: OcclusionRequest| {
        let mut stats = RasterStats::default();
        raster.clear();
        raster.draw_occluders(request.view_proj, &request.occluders, &mut stats);
        let occluded = raster.test_candidates(request.view_proj, &request.candidates, &mut stats);
        OcclusionResponse {
            frame: request.frame,
            occluded,
            stats,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesher::MeshTables;
    use glam::Vec3;
    use std::sync::Arc;
    use strata_common::{LocalPos, SUB_CHUNK_VOLUME};
    use strata_world::registry::default_registry;
    use strata_world::streaming::NeighborArrays;

    #[test]
    fn test_worker_round_trip() {
        let worker = Worker::spawn("test-double", |x: u32| x * 2).unwrap();
        assert!(worker.dispatch(21));
        assert_eq!(worker.recv_blocking(), Some(42));
    }

    #[test]
    fn test_worker_fifo_order() {
        let worker = Worker::spawn("test-fifo", |x: u32| x + 1).unwrap();
        for i in 0..10 {
            worker.dispatch(i);
        }
        let mut got = Vec::new();
        while got.len() < 10 {
            got.extend(worker.try_collect());
        }
        assert_eq!(got, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_lighting_worker_reports_errors() {
        let (registry, _) = default_registry();
        let engine = LightingEngine::new(Arc::new(registry));
        let worker = spawn_lighting_worker(engine).unwrap();

        worker.dispatch(LightRequest {
            column: ColumnPos::new(1, 2),
            slices: vec![LightSlice {
                sub_y: 0,
                blocks: vec![0; 3], // wrong length
                light: vec![0; SUB_CHUNK_VOLUME],
            }],
        });
        match worker.recv_blocking().unwrap() {
            LightResponse::Failed { column, error } => {
                assert_eq!(column, ColumnPos::new(1, 2));
                assert!(matches!(error, LightError::MalformedInput(_)));
            }
            LightResponse::Done { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn test_lighting_worker_success() {
        let (registry, _) = default_registry();
        let engine = LightingEngine::new(Arc::new(registry));
        let worker = spawn_lighting_worker(engine).unwrap();

        worker.dispatch(LightRequest {
            column: ColumnPos::new(0, 0),
            slices: vec![LightSlice {
                sub_y: 15,
                blocks: vec![0; SUB_CHUNK_VOLUME],
                light: vec![0; SUB_CHUNK_VOLUME],
            }],
        });
        match worker.recv_blocking().unwrap() {
            LightResponse::Done { updated, .. } => {
                assert_eq!(updated.len(), 1);
                assert!(updated[0].changed);
                // All air under open sky: full skylight everywhere.
                assert!(updated[0].light.iter().all(|&l| l >> 4 == 15));
            }
            LightResponse::Failed { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn test_mesh_worker_round_trip() {
        let (registry, core) = default_registry();
        let worker = spawn_mesh_worker().unwrap();

        let mut blocks = vec![0u16; SUB_CHUNK_VOLUME];
        blocks[LocalPos::new(8, 8, 8).index()] = core.stone.raw();
        worker.dispatch(MeshRequest {
            pos: SubChunkPos::new(ColumnPos::new(0, 0), 2),
            input: MeshInput {
                blocks,
                light: vec![0xF0; SUB_CHUNK_VOLUME],
                neighbors: NeighborArrays::default(),
                tables: MeshTables::from_registry(&registry),
            },
        });
        let response = worker.recv_blocking().unwrap();
        assert_eq!(response.pos.sub_y, 2);
        assert_eq!(response.output.stats.quads, 6);
    }

    #[test]
    fn test_occlusion_worker_round_trip() {
        let worker = spawn_occlusion_worker(RasterConfig::default()).unwrap();
        let proj = Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 500.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);

        worker.dispatch(OcclusionRequest {
            frame: FrameId::from_raw(7),
            view_proj: proj * view,
            occluders: vec![Aabb::new(
                Vec3::new(-30.0, -30.0, -12.0),
                Vec3::new(30.0, 30.0, -10.0),
            )],
            candidates: vec![CullBox {
                id: SubChunkPos::new(ColumnPos::new(5, 5), 1),
                aabb: Aabb::new(Vec3::new(-2.0, -2.0, -60.0), Vec3::new(2.0, 2.0, -56.0)),
            }],
        });
        let response = worker.recv_blocking().unwrap();
        assert_eq!(response.frame, FrameId::from_raw(7));
        assert_eq!(response.occluded.len(), 1);
        assert_eq!(response.stats.occluders, 1);
    }
}
