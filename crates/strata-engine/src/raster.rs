//! Software-rasterized occlusion culling.
//!
//! Occluder boxes (sub-chunks known to be fully opaque) are rasterized
//! face-by-face into a small CPU depth buffer under the frame's
//! view-projection matrix. A candidate box is reported occluded only when
//! every texel its screen-space bounds touch holds a strictly nearer depth
//! than the candidate's nearest corner. Anything that clips the near plane
//! or leaves the viewport is treated as visible; this stage may only ever
//! hide things the buffer proves are hidden.

use glam::{Mat4, Vec3, Vec4Swizzles};
use serde::{Deserialize, Serialize};
use strata_common::SubChunkPos;
use strata_world::collision::Aabb;

use crate::occlusion::CullBox;

/// Depth-buffer dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Buffer width in texels
    pub width: usize,
    /// Buffer height in texels
    pub height: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 72,
        }
    }
}

/// Counters reported with each occlusion result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterStats {
    /// Occluder boxes rasterized
    pub occluders: usize,
    /// Occluder boxes skipped for clipping the near plane
    pub clipped_occluders: usize,
    /// Candidates tested
    pub candidates: usize,
    /// Candidates found occluded
    pub occluded: usize,
}

/// A small software depth buffer.
#[derive(Debug, Clone)]
pub struct DepthRaster {
    width: usize,
    height: usize,
    depth: Vec<f32>,
}

/// A corner projected into screen space.
#[derive(Debug, Clone, Copy)]
struct Projected {
    x: f32,
    y: f32,
    depth: f32,
}

const CORNER_SELECT: [(bool, bool, bool); 8] = [
    (false, false, false),
    (true, false, false),
    (false, true, false),
    (true, true, false),
    (false, false, true),
    (true, false, true),
    (false, true, true),
    (true, true, true),
];

// Box faces as corner indices into `CORNER_SELECT`.
const FACES: [[usize; 4]; 6] = [
    [0, 2, 6, 4], // -X
    [1, 5, 7, 3], // +X
    [0, 4, 5, 1], // -Y
    [2, 3, 7, 6], // +Y
    [0, 1, 3, 2], // -Z
    [4, 6, 7, 5], // +Z
];

impl DepthRaster {
    /// Creates a buffer cleared to the far plane.
    #[must_use]
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            width: config.width.max(1),
            height: config.height.max(1),
            depth: vec![f32::INFINITY; config.width.max(1) * config.height.max(1)],
        }
    }

    /// Resets every texel to the far plane.
    pub fn clear(&mut self) {
        self.depth.fill(f32::INFINITY);
    }

    /// Buffer width in texels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Buffer height in texels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    fn project(&self, view_proj: Mat4, point: Vec3) -> Option<Projected> {
        let clip = view_proj * point.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        Some(Projected {
            x: (ndc.x * 0.5 + 0.5) * self.width as f32,
            y: (1.0 - (ndc.y * 0.5 + 0.5)) * self.height as f32,
            depth: ndc.z,
        })
    }

    fn corners(aabb: &Aabb) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        for (i, &(px, py, pz)) in CORNER_SELECT.iter().enumerate() {
            corners[i] = Vec3::new(
                if px { aabb.max.x } else { aabb.min.x },
                if py { aabb.max.y } else { aabb.min.y },
                if pz { aabb.max.z } else { aabb.min.z },
            );
        }
        corners
    }

    /// Rasterizes one triangle, keeping the nearest depth per texel.
    fn fill_triangle(&mut self, a: Projected, b: Projected, c: Projected) {
        let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        if area.abs() < 1e-6 {
            return;
        }

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as usize).min(self.width);
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
        let max_y = (a.y.max(b.y).max(c.y).ceil() as usize).min(self.height);

        for ty in min_y..max_y {
            for tx in min_x..max_x {
                let px = tx as f32 + 0.5;
                let py = ty as f32 + 0.5;
                let w0 = ((b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)) / area;
                let w1 = ((c.x - b.x) * (py - b.y) - (c.y - b.y) * (px - b.x)) / area;
                let w2 = ((a.x - c.x) * (py - c.y) - (a.y - c.y) * (px - c.x)) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                // Barycentric weights: w1 belongs to vertex a, w2 to b, w0 to c.
                let depth = a.depth * w1 + b.depth * w2 + c.depth * w0;
                let slot = &mut self.depth[ty * self.width + tx];
                if depth < *slot {
                    *slot = depth;
                }
            }
        }
    }

    /// Rasterizes opaque occluder boxes into the buffer.
    pub fn draw_occluders(
        &mut self,
        view_proj: Mat4,
        occluders: &[Aabb],
        stats: &mut RasterStats,
    ) {
        for aabb in occluders {
            let corners = Self::corners(aabb);
            let mut projected = [None; 8];
            let mut clipped = false;
            for (i, corner) in corners.iter().enumerate() {
                match self.project(view_proj, *corner) {
                    Some(p) => projected[i] = Some(p),
                    None => {
                        clipped = true;
                        break;
                    }
                }
            }
            if clipped {
                // Near-plane straddlers contribute nothing rather than
                // something wrong.
                stats.clipped_occluders += 1;
                continue;
            }
            for face in &FACES {
                let [i0, i1, i2, i3] = *face;
                let (Some(p0), Some(p1), Some(p2), Some(p3)) =
                    (projected[i0], projected[i1], projected[i2], projected[i3])
                else {
                    continue;
                };
                self.fill_triangle(p0, p1, p2);
                self.fill_triangle(p0, p2, p3);
            }
            stats.occluders += 1;
        }
    }

    /// Tests candidates for full occlusion, returning the hidden ids.
    #[must_use]
    pub fn test_candidates(
        &self,
        view_proj: Mat4,
        candidates: &[CullBox],
        stats: &mut RasterStats,
    ) -> Vec<SubChunkPos> {
        let mut occluded = Vec::new();
        for candidate in candidates {
            stats.candidates += 1;
            if self.is_occluded(view_proj, &candidate.aabb) {
                stats.occluded += 1;
                occluded.push(candidate.id);
            }
        }
        occluded
    }

    fn is_occluded(&self, view_proj: Mat4, aabb: &Aabb) -> bool {
        let corners = Self::corners(aabb);
        let mut min_x = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        let mut nearest = f32::INFINITY;

        for corner in corners {
            let Some(p) = self.project(view_proj, corner) else {
                // Touching the near plane: cannot be hidden by the buffer.
                return false;
            };
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
            nearest = nearest.min(p.depth);
        }

        let x0 = min_x.floor().max(0.0) as usize;
        let x1 = (max_x.ceil().max(0.0) as usize).min(self.width);
        let y0 = min_y.floor().max(0.0) as usize;
        let y1 = (max_y.ceil().max(0.0) as usize).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            // Degenerate or fully off-screen footprint; leave it to the
            // frustum stage.
            return false;
        }

        for ty in y0..y1 {
            for tx in x0..x1 {
                if self.depth[ty * self.width + tx] >= nearest {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::ColumnPos;

    fn view_proj() -> Mat4 {
        let proj = Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, 16.0 / 9.0, 0.1, 500.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        proj * view
    }

    fn candidate(id: i32, min: Vec3, max: Vec3) -> CullBox {
        CullBox {
            id: SubChunkPos::new(ColumnPos::new(id, 0), 0),
            aabb: Aabb::new(min, max),
        }
    }

    #[test]
    fn test_empty_buffer_hides_nothing() {
        let raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        let target = candidate(1, Vec3::new(-1.0, -1.0, -60.0), Vec3::new(1.0, 1.0, -58.0));
        let occluded = raster.test_candidates(view_proj(), &[target], &mut stats);
        assert!(occluded.is_empty());
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.occluded, 0);
    }

    #[test]
    fn test_wall_hides_box_behind() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        let wall = Aabb::new(Vec3::new(-30.0, -30.0, -12.0), Vec3::new(30.0, 30.0, -10.0));
        raster.draw_occluders(view_proj(), &[wall], &mut stats);
        assert_eq!(stats.occluders, 1);

        let behind = candidate(1, Vec3::new(-2.0, -2.0, -60.0), Vec3::new(2.0, 2.0, -56.0));
        let occluded = raster.test_candidates(view_proj(), &[behind], &mut stats);
        assert_eq!(occluded.len(), 1);
    }

    #[test]
    fn test_box_in_front_of_wall_visible() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        let wall = Aabb::new(Vec3::new(-30.0, -30.0, -12.0), Vec3::new(30.0, 30.0, -10.0));
        raster.draw_occluders(view_proj(), &[wall], &mut stats);

        let front = candidate(1, Vec3::new(-2.0, -2.0, -6.0), Vec3::new(2.0, 2.0, -4.0));
        let occluded = raster.test_candidates(view_proj(), &[front], &mut stats);
        assert!(occluded.is_empty());
    }

    #[test]
    fn test_box_beside_wall_visible() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        // Narrow wall only covering the center of the view.
        let wall = Aabb::new(Vec3::new(-3.0, -30.0, -12.0), Vec3::new(3.0, 30.0, -10.0));
        raster.draw_occluders(view_proj(), &[wall], &mut stats);

        let beside = candidate(1, Vec3::new(30.0, -2.0, -60.0), Vec3::new(34.0, 2.0, -56.0));
        let occluded = raster.test_candidates(view_proj(), &[beside], &mut stats);
        assert!(occluded.is_empty());
    }

    #[test]
    fn test_near_plane_straddler_never_occluded() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        let wall = Aabb::new(Vec3::new(-30.0, -30.0, -12.0), Vec3::new(30.0, 30.0, -10.0));
        raster.draw_occluders(view_proj(), &[wall], &mut stats);

        // Box surrounding the camera.
        let straddler = candidate(1, Vec3::splat(-1.0), Vec3::splat(1.0));
        let occluded = raster.test_candidates(view_proj(), &[straddler], &mut stats);
        assert!(occluded.is_empty());
    }

    #[test]
    fn test_clipped_occluder_skipped() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        // Occluder straddling the camera position.
        let straddler = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        raster.draw_occluders(view_proj(), &[straddler], &mut stats);
        assert_eq!(stats.occluders, 0);
        assert_eq!(stats.clipped_occluders, 1);

        let target = candidate(1, Vec3::new(-1.0, -1.0, -60.0), Vec3::new(1.0, 1.0, -58.0));
        let occluded = raster.test_candidates(view_proj(), &[target], &mut stats);
        assert!(occluded.is_empty());
    }

    #[test]
    fn test_clear_resets_buffer() {
        let mut raster = DepthRaster::new(&RasterConfig::default());
        let mut stats = RasterStats::default();
        let wall = Aabb::new(Vec3::new(-30.0, -30.0, -12.0), Vec3::new(30.0, 30.0, -10.0));
        raster.draw_occluders(view_proj(), &[wall], &mut stats);
        raster.clear();

        let behind = candidate(1, Vec3::new(-2.0, -2.0, -60.0), Vec3::new(2.0, 2.0, -56.0));
        let occluded = raster.test_candidates(view_proj(), &[behind], &mut stats);
        assert!(occluded.is_empty());
    }
}
