//! Physics probes against named layers.
//!
//! The locomotion and AI code never talk to a physics engine directly. They
//! issue sphere, ray, capsule and box queries through [`PhysicsQuery`], and
//! the scene keeps moving bodies registered through [`PhysicsWorld`].
//! [`StaticWorld`] is a small analytic implementation (planes, boxes and
//! body spheres) used by the headless engine and the tests.

use glam::{Quat, Vec3};
use poltergeist_common::{EntityId, Layer, LayerMask};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when building physics geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// Plane normal has zero length
    #[error("plane normal must be non-zero")]
    DegenerateNormal,

    /// Box has inverted corners
    #[error("box min {min:?} exceeds max {max:?}")]
    InvertedBox {
        /// Minimum corner
        min: Vec3,
        /// Maximum corner
        max: Vec3,
    },
}

/// Result type for physics operations.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Result of a raycast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit point
    pub point: Vec3,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
    /// Layer of the surface hit
    pub layer: Layer,
    /// Entity hit, `None` for static geometry
    pub entity: Option<EntityId>,
}

/// One collider reported by an overlap query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapHit {
    /// Entity owning the collider
    pub entity: EntityId,
    /// Layer the collider lives on
    pub layer: Layer,
}

/// Penetration correction for a sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Translation that separates the sphere from everything it touched
    pub push: Vec3,
    /// Averaged contact normal
    pub normal: Vec3,
}

/// Box with an orientation, used as an ability hitbox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    /// World-space center
    pub center: Vec3,
    /// Half size along each local axis
    pub half_extents: Vec3,
    /// Orientation of the local axes
    pub rotation: Quat,
}

impl OrientedBox {
    /// Creates a new oriented box.
    #[must_use]
    pub const fn new(center: Vec3, half_extents: Vec3, rotation: Quat) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// Checks whether a sphere touches the box.
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let local = self.rotation.inverse() * (center - self.center);
        let closest = local.clamp(-self.half_extents, self.half_extents);
        local.distance_squared(closest) <= radius * radius
    }
}

/// Probe interface implemented by the physics backend.
pub trait PhysicsQuery {
    /// Checks whether a sphere overlaps anything on `mask`.
    fn check_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> bool;

    /// Casts a ray and returns the closest hit on `mask`.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit>;

    /// Checks whether the capsule between `a` and `b` overlaps anything on `mask`.
    fn overlap_capsule(&self, a: Vec3, b: Vec3, radius: f32, mask: LayerMask) -> bool;

    /// Returns every body on `mask` touching the box. Static geometry is not reported.
    fn overlap_box(&self, area: &OrientedBox, mask: LayerMask) -> Vec<OverlapHit>;

    /// Computes the push needed to separate a sphere from static geometry on `mask`.
    fn resolve_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Option<Contact>;
}

/// Physics backend that also tracks moving bodies.
pub trait PhysicsWorld: PhysicsQuery {
    /// Inserts or moves the sphere proxy of an entity.
    fn sync_body(&mut self, entity: EntityId, layer: Layer, center: Vec3, radius: f32);

    /// Removes the proxy of an entity.
    fn remove_body(&mut self, entity: EntityId);
}

/// Infinite plane; everything behind it counts as solid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Any point on the plane
    pub point: Vec3,
    /// Unit normal pointing out of the solid side
    pub normal: Vec3,
    /// Layer of the surface
    pub layer: Layer,
}

impl Plane {
    /// Creates a plane, normalizing the normal.
    pub fn new(point: Vec3, normal: Vec3, layer: Layer) -> PhysicsResult<Self> {
        let normal = normal.try_normalize().ok_or(PhysicsError::DegenerateNormal)?;
        Ok(Self {
            point,
            normal,
            layer,
        })
    }

    /// Signed distance of a point from the plane.
    #[must_use]
    pub fn distance(&self, p: Vec3) -> f32 {
        (p - self.point).dot(self.normal)
    }
}

/// Axis-aligned solid box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    /// Layer of the box
    pub layer: Layer,
}

impl Aabb {
    /// Creates a box from its corners.
    pub fn new(min: Vec3, max: Vec3, layer: Layer) -> PhysicsResult<Self> {
        if min.cmpgt(max).any() {
            return Err(PhysicsError::InvertedBox { min, max });
        }
        Ok(Self { min, max, layer })
    }

    /// Creates a box from center and half-extents.
    pub fn from_center(center: Vec3, half_extents: Vec3, layer: Layer) -> PhysicsResult<Self> {
        Self::new(center - half_extents, center + half_extents, layer)
    }

    /// Closest point of the box to `p`.
    #[must_use]
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }

    /// Checks whether a sphere touches the box.
    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        center.distance_squared(self.closest_point(center)) <= radius * radius
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let mut t_enter = 0.0_f32;
        let mut t_exit = max_distance;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() <= f32::EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
            let mut axis_normal = Vec3::ZERO;
            axis_normal[axis] = -d.signum();
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = axis_normal;
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        // Rays starting inside the box do not report it
        if normal == Vec3::ZERO {
            return None;
        }
        Some((t_enter, normal))
    }

    fn push_out(&self, center: Vec3, radius: f32) -> Option<Vec3> {
        let closest = self.closest_point(center);
        let offset = center - closest;
        let distance = offset.length();
        if distance > radius {
            return None;
        }
        if distance > f32::EPSILON {
            return Some(offset / distance * (radius - distance));
        }

        // Center inside the box: leave through the nearest face
        let to_min = center - self.min;
        let to_max = self.max - center;
        let mut best = (to_min.x, Vec3::NEG_X);
        for (depth, dir) in [
            (to_max.x, Vec3::X),
            (to_min.y, Vec3::NEG_Y),
            (to_max.y, Vec3::Y),
            (to_min.z, Vec3::NEG_Z),
            (to_max.z, Vec3::Z),
        ] {
            if depth < best.0 {
                best = (depth, dir);
            }
        }
        Some(best.1 * (best.0 + radius))
    }
}

/// Sphere proxy of a moving entity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BodyProxy {
    entity: EntityId,
    layer: Layer,
    center: Vec3,
    radius: f32,
}

/// Analytic physics world built from planes, boxes and body spheres.
#[derive(Debug, Default, Clone)]
pub struct StaticWorld {
    planes: Vec<Plane>,
    boxes: Vec<Aabb>,
    bodies: Vec<BodyProxy>,
}

/// Number of samples along a capsule axis when testing against boxes.
const CAPSULE_SAMPLES: usize = 16;

impl StaticWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world with a flat ground plane at `height`.
    #[must_use]
    pub fn flat(height: f32) -> Self {
        let mut world = Self::new();
        world.planes.push(Plane {
            point: Vec3::new(0.0, height, 0.0),
            normal: Vec3::Y,
            layer: Layer::Ground,
        });
        world
    }

    /// Adds a plane.
    pub fn add_plane(&mut self, plane: Plane) {
        self.planes.push(plane);
    }

    /// Adds a solid box.
    pub fn add_box(&mut self, aabb: Aabb) {
        self.boxes.push(aabb);
    }

    /// Number of registered body proxies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Center of a registered body.
    #[must_use]
    pub fn body_center(&self, entity: EntityId) -> Option<Vec3> {
        self.bodies
            .iter()
            .find(|b| b.entity == entity)
            .map(|b| b.center)
    }

    fn planes_on(&self, mask: LayerMask) -> impl Iterator<Item = &Plane> {
        self.planes.iter().filter(move |p| mask.contains(p.layer))
    }

    fn boxes_on(&self, mask: LayerMask) -> impl Iterator<Item = &Aabb> {
        self.boxes.iter().filter(move |b| mask.contains(b.layer))
    }

    fn bodies_on(&self, mask: LayerMask) -> impl Iterator<Item = &BodyProxy> {
        self.bodies.iter().filter(move |b| mask.contains(b.layer))
    }
}

/// Closest point on segment `a..b` to `p`.
fn closest_on_segment(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

impl PhysicsQuery for StaticWorld {
    fn check_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> bool {
        self.planes_on(mask).any(|p| p.distance(center) < radius)
            || self.boxes_on(mask).any(|b| b.intersects_sphere(center, radius))
            || self
                .bodies_on(mask)
                .any(|b| b.center.distance(center) < b.radius + radius)
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize()?;
        let mut best: Option<RayHit> = None;
        let mut consider = |hit: RayHit| {
            if best.map_or(true, |b| hit.distance < b.distance) {
                best = Some(hit);
            }
        };

        for plane in self.planes_on(mask) {
            let denom = direction.dot(plane.normal);
            if denom >= -f32::EPSILON {
                continue;
            }
            let t = (plane.point - origin).dot(plane.normal) / denom;
            if (0.0..=max_distance).contains(&t) {
                consider(RayHit {
                    point: origin + direction * t,
                    normal: plane.normal,
                    distance: t,
                    layer: plane.layer,
                    entity: None,
                });
            }
        }

        for aabb in self.boxes_on(mask) {
            if let Some((t, normal)) = aabb.raycast(origin, direction, max_distance) {
                consider(RayHit {
                    point: origin + direction * t,
                    normal,
                    distance: t,
                    layer: aabb.layer,
                    entity: None,
                });
            }
        }

        for body in self.bodies_on(mask) {
            let oc = origin - body.center;
            let b = oc.dot(direction);
            let c = oc.length_squared() - body.radius * body.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let t = -b - disc.sqrt();
            if (0.0..=max_distance).contains(&t) {
                let point = origin + direction * t;
                consider(RayHit {
                    point,
                    normal: (point - body.center).normalize_or_zero(),
                    distance: t,
                    layer: body.layer,
                    entity: Some(body.entity),
                });
            }
        }

        best
    }

    fn overlap_capsule(&self, a: Vec3, b: Vec3, radius: f32, mask: LayerMask) -> bool {
        if self
            .planes_on(mask)
            .any(|p| p.distance(a).min(p.distance(b)) < radius)
        {
            return true;
        }

        let boxes_hit = self.boxes_on(mask).any(|aabb| {
            (0..=CAPSULE_SAMPLES).any(|i| {
                let point = a.lerp(b, i as f32 / CAPSULE_SAMPLES as f32);
                aabb.intersects_sphere(point, radius)
            })
        });
        if boxes_hit {
            return true;
        }

        self.bodies_on(mask).any(|body| {
            closest_on_segment(a, b, body.center).distance(body.center) < radius + body.radius
        })
    }

    fn overlap_box(&self, area: &OrientedBox, mask: LayerMask) -> Vec<OverlapHit> {
        self.bodies_on(mask)
            .filter(|b| area.intersects_sphere(b.center, b.radius))
            .map(|b| OverlapHit {
                entity: b.entity,
                layer: b.layer,
            })
            .collect()
    }

    fn resolve_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Option<Contact> {
        let mut push = Vec3::ZERO;
        let mut normal_sum = Vec3::ZERO;

        for plane in self.planes_on(mask) {
            let distance = plane.distance(center + push);
            if distance < radius {
                push += plane.normal * (radius - distance);
                normal_sum += plane.normal;
            }
        }

        for aabb in self.boxes_on(mask) {
            if let Some(correction) = aabb.push_out(center + push, radius) {
                push += correction;
                normal_sum += correction.normalize_or_zero();
            }
        }

        if normal_sum == Vec3::ZERO {
            None
        } else {
            Some(Contact {
                push,
                normal: normal_sum.normalize_or_zero(),
            })
        }
    }
}

impl PhysicsWorld for StaticWorld {
    fn sync_body(&mut self, entity: EntityId, layer: Layer, center: Vec3, radius: f32) {
        let proxy = BodyProxy {
            entity,
            layer,
            center,
            radius,
        };
        match self.bodies.iter_mut().find(|b| b.entity == entity) {
            Some(existing) => *existing = proxy,
            None => self.bodies.push(proxy),
        }
    }

    fn remove_body(&mut self, entity: EntityId) {
        self.bodies.retain(|b| b.entity != entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Aabb {
        Aabb::new(Vec3::new(1.0, 0.0, -5.0), Vec3::new(2.0, 3.0, 5.0), Layer::Obstacle)
            .expect("valid box")
    }

    #[test]
    fn test_plane_rejects_zero_normal() {
        assert_eq!(
            Plane::new(Vec3::ZERO, Vec3::ZERO, Layer::Ground),
            Err(PhysicsError::DegenerateNormal)
        );
    }

    #[test]
    fn test_box_rejects_inverted_corners() {
        assert!(Aabb::new(Vec3::ONE, Vec3::ZERO, Layer::Obstacle).is_err());
    }

    #[test]
    fn test_check_sphere_against_ground() {
        let world = StaticWorld::flat(0.0);
        assert!(world.check_sphere(Vec3::new(0.0, 0.1, 0.0), 0.28, LayerMask::GROUND));
        assert!(!world.check_sphere(Vec3::new(0.0, 1.0, 0.0), 0.28, LayerMask::GROUND));
        assert!(!world.check_sphere(Vec3::new(0.0, 0.1, 0.0), 0.28, Layer::Enemy.mask()));
    }

    #[test]
    fn test_raycast_hits_closest_surface() {
        let mut world = StaticWorld::flat(0.0);
        world.add_box(
            Aabb::new(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.5, 1.0), Layer::Ground)
                .expect("valid box"),
        );

        let hit = world
            .raycast(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, 5.0, LayerMask::GROUND)
            .expect("hit");
        assert!((hit.distance - 1.5).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Y);
    }

    #[test]
    fn test_raycast_respects_max_distance() {
        let world = StaticWorld::flat(0.0);
        assert!(world
            .raycast(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y, 1.0, LayerMask::GROUND)
            .is_none());
    }

    #[test]
    fn test_raycast_against_slope_reports_normal() {
        let mut world = StaticWorld::new();
        let normal = Vec3::new(0.0, 1.0, 1.0).normalize();
        world.add_plane(Plane::new(Vec3::ZERO, normal, Layer::Ground).expect("plane"));

        let hit = world
            .raycast(Vec3::new(0.0, 1.0, 0.0), -normal, 5.0, LayerMask::GROUND)
            .expect("hit");
        assert!((hit.normal - normal).length() < 1e-5);
        assert!((hit.distance - normal.y).abs() < 1e-5);
    }

    #[test]
    fn test_overlap_capsule_against_box() {
        let mut world = StaticWorld::flat(0.0);
        world.add_box(wall());

        let mask = Layer::Obstacle.mask();
        assert!(world.overlap_capsule(
            Vec3::new(0.9, 0.5, 0.0),
            Vec3::new(0.9, 1.5, 0.0),
            0.3,
            mask
        ));
        assert!(!world.overlap_capsule(
            Vec3::new(-1.0, 0.5, 0.0),
            Vec3::new(-1.0, 1.5, 0.0),
            0.3,
            mask
        ));
    }

    #[test]
    fn test_overlap_box_reports_bodies_only() {
        let mut world = StaticWorld::flat(0.0);
        let player = EntityId::new();
        let enemy = EntityId::new();
        world.sync_body(player, Layer::Player, Vec3::new(0.0, 1.0, 1.0), 0.3);
        world.sync_body(enemy, Layer::Enemy, Vec3::new(0.0, 1.0, 10.0), 0.3);

        let area = OrientedBox::new(Vec3::new(0.0, 1.0, 1.0), Vec3::splat(0.5), Quat::IDENTITY);
        let hits = world.overlap_box(&area, LayerMask::ABILITY_TARGETS | Layer::Ground);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity, player);
    }

    #[test]
    fn test_oriented_box_rotation() {
        let area = OrientedBox::new(
            Vec3::ZERO,
            Vec3::new(2.0, 0.5, 0.2),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        // Long axis now points along Z
        assert!(area.intersects_sphere(Vec3::new(0.0, 0.0, 1.8), 0.1));
        assert!(!area.intersects_sphere(Vec3::new(1.8, 0.0, 0.0), 0.1));
    }

    #[test]
    fn test_resolve_sphere_pushes_out_of_ground_and_wall() {
        let mut world = StaticWorld::flat(0.0);
        world.add_box(wall());

        let contact = world
            .resolve_sphere(Vec3::new(0.8, 0.2, 0.0), 0.5, LayerMask::GROUND)
            .expect("contact");
        let resolved = Vec3::new(0.8, 0.2, 0.0) + contact.push;
        assert!(resolved.y >= 0.5 - 1e-4);
        assert!(resolved.x <= 0.5 + 1e-4);
    }

    #[test]
    fn test_sync_and_remove_body() {
        let mut world = StaticWorld::new();
        let id = EntityId::new();
        world.sync_body(id, Layer::Enemy, Vec3::ZERO, 1.0);
        world.sync_body(id, Layer::Enemy, Vec3::X, 1.0);
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.body_center(id), Some(Vec3::X));

        world.remove_body(id);
        assert_eq!(world.body_count(), 0);
    }
}
