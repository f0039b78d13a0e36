//! Vector helpers shared by the locomotion and AI code.
//!
//! Conventions: `+Y` is up, `+Z` is forward, yaw is measured in degrees
//! around `+Y` so that a yaw of 90 faces `+X`.

use glam::{Quat, Vec3};

/// Moves `current` toward `target` by at most `max_delta`.
#[must_use]
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_delta
    }
}

/// Scalar version of [`move_towards`].
#[must_use]
pub fn move_towards_scalar(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Wraps an angle once into `(-360, 360)` and clamps it.
#[must_use]
pub fn clamp_angle(mut angle: f32, min: f32, max: f32) -> f32 {
    if angle < -360.0 {
        angle += 360.0;
    }
    if angle > 360.0 {
        angle -= 360.0;
    }
    angle.clamp(min, max)
}

/// Drops the vertical component.
#[must_use]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Yaw in degrees of a direction (vertical component ignored).
#[must_use]
pub fn yaw_of(direction: Vec3) -> f32 {
    direction.x.atan2(direction.z).to_degrees()
}

/// Upright rotation facing `yaw` degrees.
#[must_use]
pub fn yaw_rotation(yaw: f32) -> Quat {
    Quat::from_rotation_y(yaw.to_radians())
}

/// Forward unit vector for a yaw in degrees.
#[must_use]
pub fn yaw_forward(yaw: f32) -> Vec3 {
    yaw_rotation(yaw) * Vec3::Z
}

/// Upright rotation looking along `direction`, or `None` for a vertical or
/// zero direction.
#[must_use]
pub fn look_rotation(direction: Vec3) -> Option<Quat> {
    let flat = horizontal(direction);
    if flat.length_squared() <= f32::EPSILON {
        None
    } else {
        Some(yaw_rotation(yaw_of(flat)))
    }
}

/// Unsigned angle in degrees between two vectors.
#[must_use]
pub fn angle_between(a: Vec3, b: Vec3) -> f32 {
    if a.length_squared() <= f32::EPSILON || b.length_squared() <= f32::EPSILON {
        return 0.0;
    }
    a.angle_between(b).to_degrees()
}

/// Signed shortest difference `to - from` in degrees, within `[-180, 180]`.
#[must_use]
pub fn delta_angle(from: f32, to: f32) -> f32 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    delta
}
