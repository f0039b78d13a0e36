//! Navigation agents driving autonomous mobile enemies.

use glam::Vec3;
use poltergeist_common::math;

/// Navigation collaborator of a mobile agent.
pub trait PathfindingAgent: Send {
    /// Sets the goal.
    fn set_destination(&mut self, destination: Vec3);

    /// Current goal.
    fn destination(&self) -> Vec3;

    /// Sets the travel speed.
    fn set_speed(&mut self, speed: f32);

    /// Velocity of the last step.
    fn velocity(&self) -> Vec3;

    /// Enables or disables the agent. A disabled agent does not move.
    fn set_enabled(&mut self, enabled: bool);

    /// Whether the agent is steering.
    fn is_enabled(&self) -> bool;

    /// Teleports the agent without pathing.
    fn warp(&mut self, position: Vec3);

    /// Steps toward the destination and returns the new position.
    fn advance(&mut self, dt: f32) -> Vec3;
}

/// Agent walking in a straight line on open ground.
#[derive(Debug, Clone, PartialEq)]
pub struct StraightLineAgent {
    position: Vec3,
    destination: Vec3,
    speed: f32,
    velocity: Vec3,
    enabled: bool,
    /// Distance at which the destination counts as reached
    pub stopping_distance: f32,
}

impl StraightLineAgent {
    /// Creates an enabled agent standing at `position`.
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            destination: position,
            speed: 0.0,
            velocity: Vec3::ZERO,
            enabled: true,
            stopping_distance: 0.01,
        }
    }
}

impl PathfindingAgent for StraightLineAgent {
    fn set_destination(&mut self, destination: Vec3) {
        self.destination = destination;
    }

    fn destination(&self) -> Vec3 {
        self.destination
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(0.0);
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.velocity = Vec3::ZERO;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn warp(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
    }

    fn advance(&mut self, dt: f32) -> Vec3 {
        if !self.enabled || dt <= 0.0 {
            return self.position;
        }

        if self.position.distance(self.destination) <= self.stopping_distance {
            self.velocity = Vec3::ZERO;
            return self.position;
        }

        let next = math::move_towards(self.position, self.destination, self.speed * dt);
        self.velocity = (next - self.position) / dt;
        self.position = next;
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_moves_at_speed() {
        let mut agent = StraightLineAgent::new(Vec3::ZERO);
        agent.set_destination(Vec3::new(10.0, 0.0, 0.0));
        agent.set_speed(4.0);

        let pos = agent.advance(0.5);
        assert!((pos.x - 2.0).abs() < 1e-5);
        assert!((agent.velocity().length() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_agent_stops_at_destination() {
        let mut agent = StraightLineAgent::new(Vec3::ZERO);
        agent.set_destination(Vec3::new(1.0, 0.0, 0.0));
        agent.set_speed(10.0);
        agent.advance(1.0);
        let pos = agent.advance(1.0);
        assert_eq!(pos, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(agent.velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_disabled_agent_does_not_move() {
        let mut agent = StraightLineAgent::new(Vec3::ZERO);
        agent.set_destination(Vec3::new(5.0, 0.0, 0.0));
        agent.set_speed(1.0);
        agent.set_enabled(false);
        assert_eq!(agent.advance(1.0), Vec3::ZERO);

        agent.warp(Vec3::new(2.0, 0.0, 0.0));
        agent.set_enabled(true);
        assert!((agent.advance(1.0).x - 3.0).abs() < 1e-5);
    }
}
