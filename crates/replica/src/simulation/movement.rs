use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::InputBits;

/// One fixed step of avatar movement. The server sequencer and the client
/// predictor must share one implementation: it has to be a pure function of
/// its arguments so replays land on the same position bit for bit.
pub trait Simulation {
    fn step_fixed(&self, position: Vec2, input: InputBits, dt: f32) -> Vec2;
}

impl<S: Simulation + ?Sized> Simulation for &S {
    fn step_fixed(&self, position: Vec2, input: InputBits, dt: f32) -> Vec2 {
        (**self).step_fixed(position, input, dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarMovement {
    pub speed: f32,
    pub sprint_multiplier: f32,
}

impl Default for PlanarMovement {
    fn default() -> Self {
        Self {
            speed: 6.0,
            sprint_multiplier: 1.75,
        }
    }
}

impl Simulation for PlanarMovement {
    fn step_fixed(&self, position: Vec2, input: InputBits, dt: f32) -> Vec2 {
        let mut speed = self.speed;
        if input.contains(InputBits::SPRINT) {
            speed *= self.sprint_multiplier;
        }
        position + input.direction() * speed * dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_input_does_not_move() {
        let movement = PlanarMovement::default();
        let start = Vec2::new(3.0, 4.0);
        assert_eq!(movement.step_fixed(start, InputBits::ACTION, 1.0 / 60.0), start);
    }

    #[test]
    fn sprint_scales_speed() {
        let movement = PlanarMovement {
            speed: 2.0,
            sprint_multiplier: 2.0,
        };
        let walked = movement.step_fixed(Vec2::ZERO, InputBits::RIGHT, 0.5);
        let sprinted = movement.step_fixed(Vec2::ZERO, InputBits::RIGHT | InputBits::SPRINT, 0.5);
        assert_eq!(walked, Vec2::new(1.0, 0.0));
        assert_eq!(sprinted, Vec2::new(2.0, 0.0));
    }
}
