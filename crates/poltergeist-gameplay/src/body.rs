//! Avatar body with its two physical representations.
//!
//! While walking the avatar is a kinematic capsule moved by sweeps; while
//! rolling it is a dynamic sphere around the head point that the fixed tick
//! integrates. [`Representation`] holds exactly one of the two, so a body
//! with both active cannot be built.

use glam::{Quat, Vec3};
use poltergeist_common::LayerMask;
use serde::{Deserialize, Serialize};

use crate::physics::{Contact, PhysicsQuery};

/// Dimensions of the standing capsule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleDims {
    /// Total height
    pub height: f32,
    /// Radius
    pub radius: f32,
    /// Height of the capsule center above the root
    pub center_y: f32,
}

impl Default for CapsuleDims {
    fn default() -> Self {
        Self {
            height: 1.8,
            radius: 0.28,
            center_y: 0.93,
        }
    }
}

impl CapsuleDims {
    /// Centers of the bottom, middle and top spheres of the capsule at `root`.
    #[must_use]
    pub fn sample_centers(&self, root: Vec3) -> [Vec3; 3] {
        let half = (self.height * 0.5 - self.radius).max(0.0);
        let center = root + Vec3::Y * self.center_y;
        [center - Vec3::Y * half, center, center + Vec3::Y * half]
    }
}

/// Moves a kinematic capsule by `displacement`, sliding it out of geometry on `mask`.
///
/// Returns the new root position.
pub fn sweep_capsule(
    world: &dyn PhysicsQuery,
    root: Vec3,
    displacement: Vec3,
    dims: &CapsuleDims,
    mask: LayerMask,
) -> Vec3 {
    let mut target = root + displacement;
    for index in 0..3 {
        let center = dims.sample_centers(target)[index];
        if let Some(Contact { push, .. }) = world.resolve_sphere(center, dims.radius, mask) {
            target += push;
        }
    }
    target
}

/// Collider shape of the dynamic body, interpolated while standing up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColliderShape {
    /// Radius of the collider
    pub radius: f32,
    /// Height of the collider (equal to the diameter for a sphere)
    pub height: f32,
    /// Height of the collider center above the root
    pub center_y: f32,
}

impl ColliderShape {
    /// Sphere collider centered at `center_y`.
    #[must_use]
    pub fn sphere(radius: f32, center_y: f32) -> Self {
        Self {
            radius,
            height: radius * 2.0,
            center_y,
        }
    }

    /// Linear blend from `self` toward `other`.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            radius: self.radius + (other.radius - self.radius) * t,
            height: self.height + (other.height - self.height) * t,
            center_y: self.center_y + (other.center_y - self.center_y) * t,
        }
    }
}

/// Kinematic mover state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicMover {
    /// Velocity actually achieved by the last move
    pub velocity: Vec3,
}

/// Dynamic rigid body state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicBody {
    /// Linear velocity
    pub velocity: Vec3,
    /// Angular velocity in radians per second
    pub angular_velocity: Vec3,
    /// Current collider
    pub collider: ColliderShape,
}

/// The single physical representation of the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Representation {
    /// Capsule moved by kinematic sweeps
    Kinematic(KinematicMover),
    /// Sphere body integrated by the fixed tick
    Dynamic(DynamicBody),
}

/// Position, orientation and physical representation of the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvatarBody {
    position: Vec3,
    rotation: Quat,
    head_height: f32,
    representation: Representation,
}

impl AvatarBody {
    /// Creates a walking body with its root at `position`.
    #[must_use]
    pub fn new(position: Vec3, head_height: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            head_height,
            representation: Representation::Kinematic(KinematicMover::default()),
        }
    }

    /// Root (feet) position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Teleports the root.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Orientation.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Sets the orientation, keeping the root fixed.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    /// Current representation.
    #[must_use]
    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    /// World-space head point.
    #[must_use]
    pub fn head_point(&self) -> Vec3 {
        self.position + self.rotation * (Vec3::Y * self.head_height)
    }

    /// Checks whether the kinematic mover is active.
    #[must_use]
    pub fn is_kinematic(&self) -> bool {
        matches!(self.representation, Representation::Kinematic(_))
    }

    /// Checks whether the dynamic body is active.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self.representation, Representation::Dynamic(_))
    }

    /// Velocity of whichever representation is active.
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        match &self.representation {
            Representation::Kinematic(mover) => mover.velocity,
            Representation::Dynamic(body) => body.velocity,
        }
    }

    /// Dynamic body, if active.
    #[must_use]
    pub fn dynamic(&self) -> Option<&DynamicBody> {
        match &self.representation {
            Representation::Dynamic(body) => Some(body),
            Representation::Kinematic(_) => None,
        }
    }

    /// Mutable dynamic body, if active.
    pub fn dynamic_mut(&mut self) -> Option<&mut DynamicBody> {
        match &mut self.representation {
            Representation::Dynamic(body) => Some(body),
            Representation::Kinematic(_) => None,
        }
    }

    /// Swaps to the dynamic sphere, carrying over the kinematic velocity.
    pub fn make_dynamic(&mut self, collider: ColliderShape) {
        let velocity = self.velocity();
        self.representation = Representation::Dynamic(DynamicBody {
            velocity,
            angular_velocity: Vec3::ZERO,
            collider,
        });
    }

    /// Swaps back to the kinematic mover.
    pub fn make_kinematic(&mut self) {
        self.representation = Representation::Kinematic(KinematicMover::default());
    }

    /// Rotates the body about its head point.
    pub fn rotate_around_head(&mut self, delta: Quat) {
        let head = self.head_point();
        self.rotation = (delta * self.rotation).normalize();
        self.position = head - self.rotation * (Vec3::Y * self.head_height);
    }

    /// Moves the kinematic capsule. Does nothing while the dynamic body is active.
    pub fn move_kinematic(
        &mut self,
        world: &dyn PhysicsQuery,
        displacement: Vec3,
        dims: &CapsuleDims,
        mask: LayerMask,
        dt: f32,
    ) {
        let Representation::Kinematic(mover) = &mut self.representation else {
            return;
        };
        let target = sweep_capsule(world, self.position, displacement, dims, mask);
        mover.velocity = if dt > 0.0 {
            (target - self.position) / dt
        } else {
            Vec3::ZERO
        };
        self.position = target;
    }

    /// Integrates the dynamic sphere for one fixed step.
    ///
    /// Velocity into any touched surface is removed. Returns the contact if
    /// the sphere touched geometry on `mask`.
    pub fn integrate_dynamic(
        &mut self,
        world: &dyn PhysicsQuery,
        dt: f32,
        mask: LayerMask,
    ) -> Option<Contact> {
        let head_offset = self.head_point() - self.position;
        let Representation::Dynamic(body) = &mut self.representation else {
            return None;
        };

        let head = self.position + head_offset + body.velocity * dt;
        let contact = world.resolve_sphere(head, body.collider.radius, mask);
        let head = match contact {
            Some(contact) => {
                let inward = body.velocity.dot(contact.normal).min(0.0);
                body.velocity -= contact.normal * inward;
                head + contact.push
            }
            None => head,
        };
        self.position = head - head_offset;

        // Roll without slipping along the horizontal velocity
        let radius = body.collider.radius.max(f32::EPSILON);
        let planar = Vec3::new(body.velocity.x, 0.0, body.velocity.z);
        body.angular_velocity = Vec3::Y.cross(planar) / radius;
        let spin = body.angular_velocity * dt;
        if spin.length_squared() > f32::EPSILON {
            self.rotate_around_head(Quat::from_scaled_axis(spin));
        }

        contact
    }
}
