//! Frame timing.
//!
//! Provides capped delta time, the fixed timestep accumulator for physics
//! and optional frame pacing against the wall clock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Where frame deltas come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Measured wall-clock time, slept to the frame budget
    Realtime,
    /// Every frame lasts exactly one budget
    Simulated,
}

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameTiming {
    /// Target frames per second
    target_fps: u32,
    /// Time budget per frame
    frame_budget: Duration,
    /// Time of last frame start
    last_frame: Instant,
    /// Accumulator for fixed timestep
    accumulator: f32,
    /// Fixed timestep delta (for physics)
    fixed_dt: f32,
    /// Maximum delta time to prevent spiral of death
    max_dt: f32,
    clock: Clock,
    /// Simulated seconds so far
    elapsed: f32,
    /// Recent frame times for averaging
    frame_times: VecDeque<f32>,
    /// Maximum samples for averaging
    max_samples: usize,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(60, Clock::Simulated)
    }
}

impl FrameTiming {
    /// Create a new frame timing manager.
    #[must_use]
    pub fn new(target_fps: u32, clock: Clock) -> Self {
        let target_fps = target_fps.max(1);
        Self {
            target_fps,
            frame_budget: Duration::from_secs_f64(1.0 / f64::from(target_fps)),
            last_frame: Instant::now(),
            accumulator: 0.0,
            fixed_dt: 1.0 / 50.0,
            max_dt: 0.25,
            clock,
            elapsed: 0.0,
            frame_times: VecDeque::with_capacity(120),
            max_samples: 120,
        }
    }

    /// Set the fixed timestep for physics updates.
    pub fn set_fixed_dt(&mut self, dt: f32) {
        self.fixed_dt = dt.max(0.001); // Minimum 1ms
    }

    /// Get the fixed timestep value.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Simulated seconds handed out so far.
    #[must_use]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Delta time of the frame starting now, capped at `max_dt`.
    pub fn delta_time(&mut self) -> f32 {
        let dt = match self.clock {
            Clock::Realtime => {
                let now = Instant::now();
                let dt = (now - self.last_frame).as_secs_f32();
                self.last_frame = now;
                dt
            }
            Clock::Simulated => self.frame_budget.as_secs_f32(),
        };
        let clamped_dt = dt.min(self.max_dt);

        self.frame_times.push_back(clamped_dt);
        if self.frame_times.len() > self.max_samples {
            self.frame_times.pop_front();
        }
        self.elapsed += clamped_dt;

        clamped_dt
    }

    /// Accumulate time for fixed timestep updates.
    /// Returns the number of fixed updates that should be performed.
    pub fn accumulate(&mut self, dt: f32) -> u32 {
        self.accumulator += dt;
        let mut count = 0;

        // Limit to prevent spiral of death
        let max_updates = 10;
        while self.accumulator >= self.fixed_dt && count < max_updates {
            self.accumulator -= self.fixed_dt;
            count += 1;
        }

        // If we're still behind, reset accumulator
        if self.accumulator > self.fixed_dt * 2.0 {
            self.accumulator = 0.0;
        }

        count
    }

    /// Sleep for the remainder of the frame budget on the realtime clock.
    pub fn sleep_remainder(&self) {
        if self.clock == Clock::Simulated {
            return;
        }

        let elapsed = self.last_frame.elapsed();
        if elapsed < self.frame_budget {
            std::thread::sleep(self.frame_budget - elapsed);
        }
    }

    /// Get the current FPS (averaged over recent frames).
    #[must_use]
    pub fn current_fps(&self) -> f32 {
        if self.frame_times.is_empty() {
            return 0.0;
        }

        let avg_frame_time: f32 =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;

        if avg_frame_time > 0.0 {
            1.0 / avg_frame_time
        } else {
            0.0
        }
    }

    /// Get the target FPS.
    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timing_creation() {
        let timing = FrameTiming::new(60, Clock::Simulated);
        assert_eq!(timing.target_fps(), 60);
        assert!((timing.fixed_dt() - 1.0 / 50.0).abs() < 0.001);
    }

    #[test]
    fn test_simulated_delta_is_budget() {
        let mut timing = FrameTiming::new(50, Clock::Simulated);
        for _ in 0..50 {
            let dt = timing.delta_time();
            assert!((dt - 0.02).abs() < 1e-6);
        }
        assert!((timing.elapsed() - 1.0).abs() < 1e-3);
        assert!((timing.current_fps() - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_realtime_delta_is_capped() {
        let mut timing = FrameTiming::new(60, Clock::Realtime);

        std::thread::sleep(Duration::from_millis(300));
        let dt = timing.delta_time();

        assert!(dt <= timing.max_dt);
    }

    #[test]
    fn test_fixed_timestep() {
        let mut timing = FrameTiming::new(60, Clock::Simulated);
        timing.set_fixed_dt(1.0 / 60.0);

        // Simulate 32ms frame (should trigger ~2 fixed updates)
        let updates = timing.accumulate(0.032);
        assert!(updates == 1 || updates == 2);
    }

    #[test]
    fn test_accumulate_spiral_prevention() {
        let mut timing = FrameTiming::new(60, Clock::Simulated);
        timing.set_fixed_dt(1.0 / 60.0);

        let updates = timing.accumulate(1.0);

        assert!(updates <= 10);
    }
}
