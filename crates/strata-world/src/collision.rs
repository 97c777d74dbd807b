//! Collision queries and body movement against the block grid.
//!
//! Movement is resolved one axis at a time (Y, then X, then Z) against a
//! candidate set gathered once per step from the swept region, so a fast
//! mover cannot tunnel between broad-phase queries. The world is reached
//! through the [`BlockVolume`] trait, which the chunk manager implements
//! and tests replace with a mock grid.

use glam::Vec3;

/// Longest time step integrated at once, in seconds. Larger frame hitches
/// are clamped rather than integrated in one unstable leap.
pub const MAX_STEP_SECONDS: f32 = 0.1;

/// Solidity queries against the block grid.
pub trait BlockVolume {
    /// Whether the block cell at integer world coordinates is solid.
    fn is_solid(&self, x: i64, y: i64, z: i64) -> bool;
}

/// Mock block volume for testing.
#[derive(Debug, Default)]
pub struct MockVolume {
    solid: std::collections::HashSet<(i64, i64, i64)>,
    floor_level: Option<i64>,
}

impl MockVolume {
    /// Creates an empty volume.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one cell solid.
    pub fn set_solid(&mut self, x: i64, y: i64, z: i64) {
        self.solid.insert((x, y, z));
    }

    /// Makes every cell at `y <= level` solid.
    pub fn set_floor(&mut self, level: i64) {
        self.floor_level = Some(level);
    }
}

impl BlockVolume for MockVolume {
    fn is_solid(&self, x: i64, y: i64, z: i64) -> bool {
        if let Some(level) = self.floor_level {
            if y <= level {
                return true;
            }
        }
        self.solid.contains(&(x, y, z))
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Creates an AABB from corners.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates an AABB from center and half-extents.
    #[must_use]
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// The unit cube for the block cell at integer coordinates.
    #[must_use]
    pub fn block_cell(x: i64, y: i64, z: i64) -> Self {
        let min = Vec3::new(x as f32, y as f32, z as f32);
        Self {
            min,
            max: min + Vec3::ONE,
        }
    }

    /// Returns the center point.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Checks open-interval overlap with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Returns the AABB translated by an offset.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Smallest AABB containing both this box and its translation.
    #[must_use]
    pub fn swept_by(&self, displacement: Vec3) -> Self {
        let moved = self.translated(displacement);
        Self {
            min: self.min.min(moved.min),
            max: self.max.max(moved.max),
        }
    }
}

/// A moving body with box collision.
#[derive(Debug, Clone, Copy)]
pub struct Body {
    /// Center of the collision box
    pub position: Vec3,
    /// Velocity in blocks per second
    pub velocity: Vec3,
    /// Half-extents of the collision box
    pub half_extents: Vec3,
    /// Whether the last step ended standing on ground
    pub grounded: bool,
}

impl Body {
    /// Creates a body at rest.
    #[must_use]
    pub fn new(position: Vec3, half_extents: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            half_extents,
            grounded: false,
        }
    }

    /// Current collision box.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.position, self.half_extents)
    }

    /// World Y of the bottom face.
    #[must_use]
    pub fn feet_y(&self) -> f32 {
        self.position.y - self.half_extents.y
    }
}

/// Collects the solid-cell boxes intersecting a region.
fn solid_boxes_in<V: BlockVolume>(volume: &V, region: &Aabb) -> Vec<Aabb> {
    let min_x = region.min.x.floor() as i64;
    let max_x = (region.max.x.ceil() as i64) - 1;
    let min_y = region.min.y.floor() as i64;
    let max_y = (region.max.y.ceil() as i64) - 1;
    let min_z = region.min.z.floor() as i64;
    let max_z = (region.max.z.ceil() as i64) - 1;

    let mut boxes = Vec::new();
    for y in min_y..=max_y {
        for z in min_z..=max_z {
            for x in min_x..=max_x {
                if volume.is_solid(x, y, z) {
                    boxes.push(Aabb::block_cell(x, y, z));
                }
            }
        }
    }
    boxes
}

/// Axis selector for the per-axis clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

fn component(v: Vec3, axis: Axis) -> f32 {
    match axis {
        Axis::X => v.x,
        Axis::Y => v.y,
        Axis::Z => v.z,
    }
}

fn with_component(mut v: Vec3, axis: Axis, value: f32) -> Vec3 {
    match axis {
        Axis::X => v.x = value,
        Axis::Y => v.y = value,
        Axis::Z => v.z = value,
    }
    v
}

/// Clips a single-axis displacement of `aabb` against the candidate boxes.
/// Returns the allowed displacement; a reduced magnitude means a hit.
fn clip_axis(aabb: &Aabb, delta: f32, axis: Axis, boxes: &[Aabb]) -> f32 {
    let mut allowed = delta;
    for other in boxes {
        // Must overlap on the two perpendicular axes for this box to be in
        // the way.
        let blocking = match axis {
            Axis::X => {
                aabb.min.y < other.max.y
                    && aabb.max.y > other.min.y
                    && aabb.min.z < other.max.z
                    && aabb.max.z > other.min.z
            }
            Axis::Y => {
                aabb.min.x < other.max.x
                    && aabb.max.x > other.min.x
                    && aabb.min.z < other.max.z
                    && aabb.max.z > other.min.z
            }
            Axis::Z => {
                aabb.min.x < other.max.x
                    && aabb.max.x > other.min.x
                    && aabb.min.y < other.max.y
                    && aabb.max.y > other.min.y
            }
        };
        if !blocking {
            continue;
        }

        let self_min = component(aabb.min, axis);
        let self_max = component(aabb.max, axis);
        let other_min = component(other.min, axis);
        let other_max = component(other.max, axis);

        if allowed > 0.0 && self_max <= other_min {
            allowed = allowed.min(other_min - self_max);
        } else if allowed < 0.0 && self_min >= other_max {
            allowed = allowed.max(other_max - self_min);
        }
    }
    allowed
}

/// Outcome of one integration step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepResult {
    /// Hit something while moving along X
    pub hit_x: bool,
    /// Hit something while moving along Y
    pub hit_y: bool,
    /// Hit something while moving along Z
    pub hit_z: bool,
}

/// Integrates a body over a (capped) time step, resolving collisions one
/// axis at a time: Y first, then X, then Z.
pub fn step_body<V: BlockVolume>(body: &mut Body, volume: &V, dt: f32) -> StepResult {
    let dt = dt.min(MAX_STEP_SECONDS);
    let displacement = body.velocity * dt;

    // One broad-phase query for the whole step.
    let swept = body.aabb().swept_by(displacement);
    let boxes = solid_boxes_in(volume, &swept);

    let mut result = StepResult::default();
    let mut aabb = body.aabb();

    let moved_down = displacement.y < 0.0;
    for axis in [Axis::Y, Axis::X, Axis::Z] {
        let wanted = component(displacement, axis);
        if wanted == 0.0 {
            continue;
        }
        let allowed = clip_axis(&aabb, wanted, axis, &boxes);
        aabb = aabb.translated(with_component(Vec3::ZERO, axis, allowed));
        if allowed != wanted {
            match axis {
                Axis::X => {
                    result.hit_x = true;
                    body.velocity.x = 0.0;
                }
                Axis::Y => {
                    result.hit_y = true;
                    body.velocity.y = 0.0;
                }
                Axis::Z => {
                    result.hit_z = true;
                    body.velocity.z = 0.0;
                }
            }
        }
    }

    body.position = aabb.center();
    body.grounded = result.hit_y && moved_down;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: f32 = -24.0;

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(1.5));
        let c = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        // Exactly touching faces do not count as overlap.
        let d = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn test_swept_region_covers_travel() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let swept = a.swept_by(Vec3::new(0.0, -3.0, 0.0));
        assert_eq!(swept.min.y, -3.0);
        assert_eq!(swept.max.y, 1.0);
    }

    #[test]
    fn test_fall_rests_on_floor_top() {
        let mut volume = MockVolume::new();
        volume.set_floor(0); // cells y <= 0 solid, so floor top is y = 1
        let mut body = Body::new(Vec3::new(0.5, 10.0, 0.5), Vec3::new(0.4, 0.9, 0.4));

        for _ in 0..200 {
            body.velocity.y += GRAVITY * 0.05;
            step_body(&mut body, &volume, 0.05);
        }

        assert!(body.grounded);
        assert!((body.feet_y() - 1.0).abs() < 1e-4);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn test_concrete_fall_scenario() {
        // Body above a single solid block occupying (0,0,0)-(1,1,1).
        let mut volume = MockVolume::new();
        volume.set_solid(0, 0, 0);
        let mut body = Body::new(Vec3::new(0.5, 10.0, 0.5), Vec3::new(0.3, 0.5, 0.3));
        body.velocity.y = -2.0;

        for _ in 0..400 {
            body.velocity.y += GRAVITY * 0.02;
            step_body(&mut body, &volume, 0.02);
        }

        assert!(body.grounded);
        assert!((body.feet_y() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_wall_zeroes_normal_component_only() {
        let mut volume = MockVolume::new();
        // Wall of cells at x = 2 next to the body's path.
        for y in 0..4 {
            for z in -2..3 {
                volume.set_solid(2, y, z);
            }
        }
        let mut body = Body::new(Vec3::new(0.5, 1.0, 0.5), Vec3::new(0.4, 0.9, 0.4));
        body.velocity = Vec3::new(10.0, 0.0, 3.0);

        for _ in 0..20 {
            step_body(&mut body, &volume, 0.05);
        }

        assert_eq!(body.velocity.x, 0.0);
        assert_eq!(body.velocity.z, 3.0);
        assert!((body.position.x + 0.4 - 2.0).abs() < 1e-4);
        assert!(body.position.z > 0.5);
    }

    #[test]
    fn test_grounded_requires_downward_motion() {
        let mut volume = MockVolume::new();
        volume.set_floor(0);
        let mut body = Body::new(Vec3::new(0.5, 1.9, 0.5), Vec3::new(0.4, 0.9, 0.4));

        // Moving upward into a ceiling is not grounded.
        for y in 3..5 {
            volume.set_solid(0, y, 0);
        }
        body.velocity.y = 5.0;
        let result = step_body(&mut body, &volume, 0.1);
        assert!(result.hit_y);
        assert!(!body.grounded);
    }

    #[test]
    fn test_step_cap_prevents_tunneling() {
        let mut volume = MockVolume::new();
        volume.set_floor(0);
        let mut body = Body::new(Vec3::new(0.5, 5.0, 0.5), Vec3::new(0.4, 0.9, 0.4));
        // A huge dt with a huge velocity would skip the floor if it were
        // integrated raw; the cap plus the swept broad phase stop it.
        body.velocity.y = -500.0;
        step_body(&mut body, &volume, 5.0);
        assert!(body.feet_y() >= 1.0 - 1e-4);
        assert!(body.grounded);
    }

    #[test]
    fn test_no_collision_free_fall() {
        let volume = MockVolume::new();
        let mut body = Body::new(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.4, 0.9, 0.4));
        body.velocity.y = -1.0;
        let result = step_body(&mut body, &volume, 0.1);
        assert!(!result.hit_y);
        assert!(!body.grounded);
        assert!((body.position.y - 9.9).abs() < 1e-5);
    }
}
