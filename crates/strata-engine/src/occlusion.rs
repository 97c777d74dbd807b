//! Analytic occlusion culling.
//!
//! A coarse, conservative middle stage between the frustum test and the
//! rasterized depth test: a candidate is dropped only when some much closer
//! candidate's bounding box sits on the camera ray, looms large enough in
//! the view, and blocks nearly all of a small set of sample points. The
//! thresholds are deliberately tunable config rather than derived values;
//! false "visible" verdicts are acceptable, false "occluded" verdicts are
//! not.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strata_common::SubChunkPos;
use strata_world::collision::Aabb;

/// A culling candidate: a sub-chunk and its world-space bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullBox {
    /// The sub-chunk this box belongs to
    pub id: SubChunkPos,
    /// World-space bounding box
    pub aabb: Aabb,
}

/// Tunables for the analytic stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// The nearest N candidates are never occluded
    pub exempt_nearest: usize,
    /// Minimum apparent angular size of an occluder, in degrees
    pub min_angular_size_deg: f32,
    /// Fraction of sample points an occluder must block
    pub min_blocked_fraction: f32,
    /// Occluder distance must be below this fraction of the candidate's
    pub max_distance_ratio: f32,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            exempt_nearest: 4,
            min_angular_size_deg: 45.0,
            min_blocked_fraction: 0.8,
            max_distance_ratio: 0.9,
        }
    }
}

/// Ray/box intersection restricted to the segment `origin -> origin + dir`.
fn segment_hits_aabb(origin: Vec3, dir: Vec3, aabb: &Aabb) -> bool {
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        let lo = aabb.min[axis];
        let hi = aabb.max[axis];
        if d.abs() < 1e-8 {
            if o < lo || o > hi {
                return false;
            }
        } else {
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return false;
            }
        }
    }
    true
}

/// Sample points of a candidate box: its center plus four spread corners.
fn sample_points(aabb: &Aabb) -> [Vec3; 5] {
    let min = aabb.min;
    let max = aabb.max;
    [
        aabb.center(),
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(min.x, max.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(max.x, max.y, min.z),
    ]
}

/// Apparent angular diameter of a box from a viewpoint, in degrees.
fn angular_size_deg(camera: Vec3, aabb: &Aabb) -> f32 {
    let radius = (aabb.max - aabb.min).length() * 0.5;
    let distance = (aabb.center() - camera).length();
    if distance <= radius {
        return 180.0;
    }
    (2.0 * (radius / distance).atan()).to_degrees()
}

/// Runs the analytic stage over frustum survivors, returning the candidates
/// still considered visible, ordered nearest-first.
#[must_use]
pub fn filter_occluded(
    camera: Vec3,
    candidates: &[CullBox],
    config: &OcclusionConfig,
) -> Vec<CullBox> {
    let mut sorted: Vec<(f32, CullBox)> = candidates
        .iter()
        .map(|c| ((c.aabb.center() - camera).length(), *c))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    // 5 sample points per candidate (center plus four corners).
    let required_hits = (5.0 * config.min_blocked_fraction).ceil() as usize;

    let mut survivors = Vec::with_capacity(sorted.len());
    for (index, &(distance, candidate)) in sorted.iter().enumerate() {
        // Too close to be meaningfully hidden by coarse box tests.
        if index < config.exempt_nearest {
            survivors.push(candidate);
            continue;
        }

        let samples = sample_points(&candidate.aabb);
        let occluded = sorted[..index].iter().any(|&(occluder_distance, occluder)| {
            if occluder_distance > distance * config.max_distance_ratio {
                return false;
            }
            if angular_size_deg(camera, &occluder.aabb) < config.min_angular_size_deg {
                return false;
            }
            // The occluder must sit on the ray toward the candidate center.
            if !segment_hits_aabb(camera, candidate.aabb.center() - camera, &occluder.aabb) {
                return false;
            }
            let blocked = samples
                .iter()
                .filter(|&&p| segment_hits_aabb(camera, p - camera, &occluder.aabb))
                .count();
            blocked >= required_hits
        });

        if !occluded {
            survivors.push(candidate);
        }
    }
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::ColumnPos;

    fn cull_box(id: i32, min: Vec3, max: Vec3) -> CullBox {
        CullBox {
            id: SubChunkPos::new(ColumnPos::new(id, 0), 0),
            aabb: Aabb::new(min, max),
        }
    }

    fn ids(boxes: &[CullBox]) -> Vec<i32> {
        boxes.iter().map(|b| b.id.column.x).collect()
    }

    #[test]
    fn test_aligned_far_box_occluded() {
        let camera = Vec3::ZERO;
        // A big wall close to the camera, a small box far behind it.
        let wall = cull_box(1, Vec3::new(-20.0, -20.0, -6.0), Vec3::new(20.0, 20.0, -4.0));
        let hidden = cull_box(2, Vec3::new(-1.0, -1.0, -51.0), Vec3::new(1.0, 1.0, -49.0));
        let config = OcclusionConfig {
            exempt_nearest: 1,
            ..OcclusionConfig::default()
        };
        let survivors = filter_occluded(camera, &[wall, hidden], &config);
        assert_eq!(ids(&survivors), vec![1]);
    }

    #[test]
    fn test_off_axis_box_survives() {
        let camera = Vec3::ZERO;
        let wall = cull_box(1, Vec3::new(-20.0, -20.0, -6.0), Vec3::new(20.0, 20.0, -4.0));
        // Far to the side: rays to it miss the wall.
        let visible = cull_box(2, Vec3::new(200.0, -1.0, -51.0), Vec3::new(202.0, 1.0, -49.0));
        let config = OcclusionConfig {
            exempt_nearest: 1,
            ..OcclusionConfig::default()
        };
        let survivors = filter_occluded(camera, &[wall, visible], &config);
        assert_eq!(ids(&survivors), vec![1, 2]);
    }

    #[test]
    fn test_exempt_nearest_never_occluded() {
        let camera = Vec3::ZERO;
        let wall = cull_box(1, Vec3::new(-20.0, -20.0, -6.0), Vec3::new(20.0, 20.0, -4.0));
        let near = cull_box(2, Vec3::new(-1.0, -1.0, -9.0), Vec3::new(1.0, 1.0, -7.0));
        // Default exempt_nearest = 4 covers both candidates.
        let survivors = filter_occluded(camera, &[wall, near], &OcclusionConfig::default());
        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_small_occluder_ignored() {
        let camera = Vec3::ZERO;
        // A tiny box close by subtends far less than the angular threshold.
        let speck = cull_box(1, Vec3::new(-0.1, -0.1, -5.1), Vec3::new(0.1, 0.1, -4.9));
        let target = cull_box(2, Vec3::new(-1.0, -1.0, -51.0), Vec3::new(1.0, 1.0, -49.0));
        let config = OcclusionConfig {
            exempt_nearest: 1,
            ..OcclusionConfig::default()
        };
        let survivors = filter_occluded(camera, &[speck, target], &config);
        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_similar_distance_not_substantially_closer() {
        let camera = Vec3::ZERO;
        let front = cull_box(1, Vec3::new(-20.0, -20.0, -50.0), Vec3::new(20.0, 20.0, -48.0));
        // Slightly behind the first; fails the distance-ratio test.
        let behind = cull_box(2, Vec3::new(-1.0, -1.0, -53.0), Vec3::new(1.0, 1.0, -51.0));
        let config = OcclusionConfig {
            exempt_nearest: 1,
            ..OcclusionConfig::default()
        };
        let survivors = filter_occluded(camera, &[front, behind], &config);
        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_partial_block_survives() {
        let camera = Vec3::ZERO;
        // A wall that covers the candidate center but not its corners.
        let sliver = cull_box(1, Vec3::new(-0.6, -20.0, -6.0), Vec3::new(0.6, 20.0, -4.0));
        let target = cull_box(2, Vec3::new(-10.0, -10.0, -51.0), Vec3::new(10.0, 10.0, -49.0));
        let config = OcclusionConfig {
            exempt_nearest: 1,
            ..OcclusionConfig::default()
        };
        let survivors = filter_occluded(camera, &[sliver, target], &config);
        assert_eq!(survivors.len(), 2);
    }

    #[test]
    fn test_survivors_sorted_near_first() {
        let camera = Vec3::ZERO;
        let far = cull_box(1, Vec3::new(-1.0, -1.0, -90.0), Vec3::new(1.0, 1.0, -88.0));
        let near = cull_box(2, Vec3::new(-1.0, -1.0, -10.0), Vec3::new(1.0, 1.0, -8.0));
        let survivors = filter_occluded(camera, &[far, near], &OcclusionConfig::default());
        assert_eq!(ids(&survivors), vec![2, 1]);
    }
}
