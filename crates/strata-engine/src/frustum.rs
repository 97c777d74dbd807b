//! View frustum extraction and box intersection tests.

use glam::{Mat4, Vec3, Vec4};
use strata_world::collision::Aabb;

/// One frustum plane in the form `normal . p + d >= 0` for inside points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Plane normal (points inward)
    pub normal: Vec3,
    /// Plane offset
    pub d: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let normal = Vec3::new(v.x, v.y, v.z);
        let len = normal.length();
        if len > f32::EPSILON {
            Self {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                d: 0.0,
            }
        }
    }

    /// Signed distance from a point to the plane.
    #[must_use]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Camera frustum: six inward-facing planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes from a combined view-projection matrix.
    #[must_use]
    pub fn from_view_proj(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self {
            planes: [
                Plane::from_vec4(r3 + r0), // left
                Plane::from_vec4(r3 - r0), // right
                Plane::from_vec4(r3 + r1), // bottom
                Plane::from_vec4(r3 - r1), // top
                Plane::from_vec4(r3 + r2), // near
                Plane::from_vec4(r3 - r2), // far
            ],
        }
    }

    /// Conservative box test: the box survives unless it lies fully outside
    /// some plane.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Pick the box corner furthest along the plane normal.
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 {
                    aabb.max.x
                } else {
                    aabb.min.x
                },
                if plane.normal.y >= 0.0 {
                    aabb.max.y
                } else {
                    aabb.min.y
                },
                if plane.normal.z >= 0.0 {
                    aabb.max.z
                } else {
                    aabb.min.z
                },
            );
            if plane.distance(positive) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Point containment.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look_down_neg_z() -> Frustum {
        // Camera at origin looking down -Z.
        let proj = Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_proj(proj * view)
    }

    #[test]
    fn test_box_in_front_survives() {
        let frustum = look_down_neg_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -10.0), Vec3::new(1.0, 1.0, -8.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_culled() {
        let frustum = look_down_neg_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 8.0), Vec3::new(1.0, 1.0, 10.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_past_far_plane_culled() {
        let frustum = look_down_neg_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -210.0), Vec3::new(1.0, 1.0, -205.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_straddling_plane_survives() {
        let frustum = look_down_neg_z();
        // Straddles the near plane.
        let aabb = Aabb::new(Vec3::new(-0.5, -0.5, -1.0), Vec3::new(0.5, 0.5, 1.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_point_containment() {
        let frustum = look_down_neg_z();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -5.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_wide_box_off_axis_culled() {
        let frustum = look_down_neg_z();
        // Far to the left at a shallow depth: outside the 90 degree cone.
        let aabb = Aabb::new(Vec3::new(-50.0, -1.0, -2.0), Vec3::new(-40.0, 1.0, -1.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }
}
