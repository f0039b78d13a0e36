//! Ground contact, surface normal and slope sampling.

use glam::Vec3;
use poltergeist_common::{math, LayerMask};
use serde::{Deserialize, Serialize};

use crate::physics::PhysicsQuery;

/// Result of one ground sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundContact {
    /// Whether the probe touched ground
    pub grounded: bool,
    /// Surface normal (`Vec3::Y` when unknown)
    pub normal: Vec3,
    /// Slope angle in degrees
    pub slope: f32,
}

impl Default for GroundContact {
    fn default() -> Self {
        Self {
            grounded: true,
            normal: Vec3::Y,
            slope: 0.0,
        }
    }
}

impl GroundContact {
    /// Airborne sample.
    #[must_use]
    pub fn airborne() -> Self {
        Self {
            grounded: false,
            ..Self::default()
        }
    }

    /// Unit vector pointing down the slope, `None` on flat ground.
    #[must_use]
    pub fn downhill(&self) -> Option<Vec3> {
        let along = Vec3::NEG_Y - self.normal * Vec3::NEG_Y.dot(self.normal);
        math::horizontal(along).try_normalize()
    }
}

/// Probe settings for both representations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundProbe {
    /// Walking sphere offset below the root (negative lifts it)
    pub grounded_offset: f32,
    /// Walking sphere radius
    pub grounded_radius: f32,
    /// Rolling sphere offset below the bottom of the head sphere
    pub rolling_grounded_offset: f32,
    /// Rolling sphere radius
    pub rolling_grounded_radius: f32,
    /// Reach of the downward normal ray past the head radius
    pub normal_probe_distance: f32,
    /// Layers counted as ground
    pub ground_layers: LayerMask,
}

impl Default for GroundProbe {
    fn default() -> Self {
        Self {
            grounded_offset: -0.14,
            grounded_radius: 0.28,
            rolling_grounded_offset: -0.14,
            rolling_grounded_radius: 0.28,
            normal_probe_distance: 0.5,
            ground_layers: LayerMask::GROUND,
        }
    }
}

/// Samples ground contact for the avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroundSampler {
    probe: GroundProbe,
}

impl GroundSampler {
    /// Creates a sampler.
    #[must_use]
    pub fn new(probe: GroundProbe) -> Self {
        Self { probe }
    }

    /// Probe settings.
    #[must_use]
    pub fn probe(&self) -> &GroundProbe {
        &self.probe
    }

    /// Walking sample: fixed sphere test below the root.
    pub fn sample_walking(&self, world: &dyn PhysicsQuery, root: Vec3) -> GroundContact {
        let center = root - Vec3::Y * self.probe.grounded_offset;
        let grounded =
            world.check_sphere(center, self.probe.grounded_radius, self.probe.ground_layers);
        GroundContact {
            grounded,
            normal: Vec3::Y,
            slope: 0.0,
        }
    }

    /// Rolling sample: sphere test under the head, then a downward ray from
    /// the head re-cast along the first hit's normal for the true surface
    /// normal.
    pub fn sample_rolling(
        &self,
        world: &dyn PhysicsQuery,
        head: Vec3,
        head_radius: f32,
    ) -> GroundContact {
        let center = head - Vec3::Y * (head_radius + self.probe.rolling_grounded_offset);
        let grounded = world.check_sphere(
            center,
            self.probe.rolling_grounded_radius,
            self.probe.ground_layers,
        );
        if !grounded {
            return GroundContact::airborne();
        }

        let reach = head_radius + self.probe.normal_probe_distance;
        let normal = world
            .raycast(head, Vec3::NEG_Y, reach, self.probe.ground_layers)
            .map(|first| {
                world
                    .raycast(head, -first.normal, reach, self.probe.ground_layers)
                    .map_or(first.normal, |second| second.normal)
            })
            .unwrap_or(Vec3::Y);

        GroundContact {
            grounded,
            normal,
            slope: math::angle_between(normal, Vec3::Y),
        }
    }
}

/// Slope-follow tuning for the bonus velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeTuning {
    /// Multiplier on the ground-plane gravity added to the bonus
    pub slope_gain: f32,
    /// Ceiling of the bonus magnitude
    pub max_bonus_speed: f32,
    /// Linear decay toward zero, units per second
    pub bonus_decay_rate: f32,
    /// Slopes below this angle count as flat
    pub min_slope_angle: f32,
}

impl Default for SlopeTuning {
    fn default() -> Self {
        Self {
            slope_gain: 1.0,
            max_bonus_speed: 8.0,
            bonus_decay_rate: 2.0,
            min_slope_angle: 2.0,
        }
    }
}

impl SlopeTuning {
    /// Vertical pull feeding the bonus: gravity, plus the vertical velocity
    /// while descending.
    #[must_use]
    pub fn vertical_pull(gravity: f32, vertical_velocity: f32) -> f32 {
        gravity + vertical_velocity.min(0.0)
    }

    /// Updates the slope bonus for one tick.
    ///
    /// On a grounded slope the ground-plane component of `vertical_pull`
    /// (see [`SlopeTuning::vertical_pull`]) feeds the bonus, scaled by how
    /// well the downhill direction lines up with `travel`: full straight
    /// downhill, half sideways, nothing uphill. A stationary ball takes the
    /// full amount. Otherwise, while grounded, the bonus decays linearly.
    /// The result never exceeds `max_bonus_speed`.
    #[must_use]
    pub fn update_bonus(
        &self,
        bonus: Vec3,
        contact: &GroundContact,
        vertical_pull: f32,
        travel: Vec3,
        dt: f32,
    ) -> Vec3 {
        let mut fed = false;
        let mut bonus = bonus;

        if contact.grounded && contact.slope >= self.min_slope_angle {
            if let Some(downhill) = contact.downhill() {
                let alignment = math::horizontal(travel)
                    .try_normalize()
                    .map_or(1.0, |dir| dir.dot(downhill));
                let factor = 0.5 * (1.0 + alignment);

                let pull = Vec3::Y * vertical_pull;
                let along = pull - contact.normal * pull.dot(contact.normal);
                let gain = math::horizontal(along) * self.slope_gain * factor * dt;

                if factor > f32::EPSILON && gain.length_squared() > 0.0 {
                    bonus += gain;
                    fed = true;
                }
            }
        }

        if contact.grounded && !fed {
            bonus = math::move_towards(bonus, Vec3::ZERO, self.bonus_decay_rate * dt);
        }

        bonus.clamp_length_max(self.max_bonus_speed.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Plane, StaticWorld};
    use poltergeist_common::Layer;

    fn slope_world(degrees: f32) -> StaticWorld {
        let (s, c) = degrees.to_radians().sin_cos();
        // Surface descends toward +Z
        let normal = Vec3::new(0.0, c, s);
        let mut world = StaticWorld::new();
        world.add_plane(Plane::new(Vec3::ZERO, normal, Layer::Ground).expect("plane"));
        world
    }

    #[test]
    fn test_walking_sample_on_flat_ground() {
        let world = StaticWorld::flat(0.0);
        let sampler = GroundSampler::default();
        assert!(sampler.sample_walking(&world, Vec3::ZERO).grounded);
        assert!(!sampler.sample_walking(&world, Vec3::new(0.0, 1.0, 0.0)).grounded);
    }

    #[test]
    fn test_rolling_sample_reports_slope() {
        let world = slope_world(30.0);
        let sampler = GroundSampler::new(GroundProbe::default());
        let normal = Vec3::new(0.0, 30f32.to_radians().cos(), 30f32.to_radians().sin());
        let head = normal * 0.25;

        let contact = sampler.sample_rolling(&world, head, 0.25);
        assert!(contact.grounded);
        assert!((contact.slope - 30.0).abs() < 0.1);
        assert!((contact.normal - normal).length() < 1e-3);

        let downhill = contact.downhill().expect("sloped");
        assert!(downhill.z > 0.99);
    }

    #[test]
    fn test_rolling_sample_airborne() {
        let world = StaticWorld::flat(0.0);
        let sampler = GroundSampler::default();
        let contact = sampler.sample_rolling(&world, Vec3::new(0.0, 3.0, 0.0), 0.25);
        assert!(!contact.grounded);
        assert_eq!(contact.normal, Vec3::Y);
    }

    fn sloped_contact() -> GroundContact {
        let normal = Vec3::new(0.0, 30f32.to_radians().cos(), 30f32.to_radians().sin());
        GroundContact {
            grounded: true,
            normal,
            slope: 30.0,
        }
    }

    #[test]
    fn test_bonus_downhill_beats_lateral_beats_uphill() {
        let tuning = SlopeTuning::default();
        let contact = sloped_contact();
        let gain = |travel: Vec3| {
            tuning
                .update_bonus(Vec3::ZERO, &contact, -15.0, travel, 0.1)
                .length()
        };

        let downhill = gain(Vec3::Z);
        let lateral = gain(Vec3::X);
        let uphill = gain(Vec3::NEG_Z);
        assert!(downhill > lateral);
        assert!((lateral - downhill * 0.5).abs() < 1e-4);
        assert!(uphill < 1e-6);
    }

    #[test]
    fn test_bonus_decays_on_flat_ground() {
        let tuning = SlopeTuning::default();
        let flat = GroundContact::default();
        let bonus = tuning.update_bonus(Vec3::new(1.0, 0.0, 0.0), &flat, -15.0, Vec3::X, 0.25);
        assert!((bonus.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_bonus_kept_while_airborne() {
        let tuning = SlopeTuning::default();
        let air = GroundContact::airborne();
        let pull = SlopeTuning::vertical_pull(-15.0, -5.0);
        let bonus = tuning.update_bonus(Vec3::new(1.0, 0.0, 0.0), &air, pull, Vec3::X, 0.25);
        assert_eq!(bonus, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_bonus_clamped_to_ceiling() {
        let tuning = SlopeTuning {
            max_bonus_speed: 3.0,
            ..SlopeTuning::default()
        };
        let bonus = tuning.update_bonus(
            Vec3::new(0.0, 0.0, 2.9),
            &sloped_contact(),
            SlopeTuning::vertical_pull(-15.0, -10.0),
            Vec3::Z,
            1.0,
        );
        assert!((bonus.length() - 3.0).abs() < 1e-4);
    }
}
