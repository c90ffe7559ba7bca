use glam::Vec2;

use crate::config::PredictionConfig;
use crate::simulation::{CommandRing, InputBits, PlayerCommand, Simulation};

/// Client-side prediction for the locally controlled avatar.
#[derive(Debug)]
pub struct Predictor<S> {
    simulation: S,
    config: PredictionConfig,
    dt: f32,
    commands: CommandRing,
    next_id: u32,
    open: bool,
    position: Vec2,      // Logical position after the last fixed step
    prev_position: Vec2, // Logical position before it
    visual_position: Vec2,
    position_error: Vec2,
    last_executed: Option<u32>,
    evicted: u64,
}

impl<S: Simulation> Predictor<S> {
    pub fn new(simulation: S, config: PredictionConfig, tick_rate: u32, start: Vec2) -> Self {
        Self {
            simulation,
            dt: 1.0 / tick_rate.max(1) as f32,
            commands: CommandRing::new(config.command_capacity),
            config,
            next_id: 1,
            open: false,
            position: start,
            prev_position: start,
            visual_position: start,
            position_error: Vec2::ZERO,
            last_executed: None,
            evicted: 0,
        }
    }

    /// Records one fixed step of local input and applies it immediately.
    /// Returns a command the full ring had to evict.
    pub fn sample(&mut self, input: InputBits) -> Option<PlayerCommand> {
        let extended = match self.commands.back_mut() {
            Some(command)
                if self.open && command.input == input && command.fixed_update_count < u8::MAX =>
            {
                command.fixed_update_count += 1;
                true
            }
            _ => false,
        };

        let mut evicted = None;
        if !extended {
            let mut command = PlayerCommand::new(self.next_id, input, 1);
            command.position_at_start = self.position;
            self.next_id += 1;
            self.open = true;
            evicted = self.commands.push(command);
            if let Some(lost) = &evicted {
                self.evicted += 1;
                log::warn!("Command ring full, evicted unacknowledged command {}", lost.id);
            }
        }

        self.prev_position = self.position;
        self.position = self.simulation.step_fixed(self.position, input, self.dt);
        evicted
    }

    /// Closes the open command and returns every unacknowledged command for
    /// redundant sending.
    pub fn take_outgoing(&mut self) -> Vec<PlayerCommand> {
        self.open = false;
        self.commands.iter().copied().collect()
    }

    /// Rewinds to the server's anchor and replays everything it has not
    /// executed yet. Returns false for acks that are not newer than the last one.
    pub fn reconcile(&mut self, anchor: Vec2, last_executed: Option<u32>) -> bool {
        if last_executed.is_none() || last_executed <= self.last_executed {
            return false;
        }
        self.last_executed = last_executed;
        if let Some(executed) = last_executed {
            self.commands.discard_through(executed);
        }

        let mut replayed = anchor;
        for command in self.commands.iter() {
            for _ in 0..command.fixed_update_count {
                replayed = self.simulation.step_fixed(replayed, command.input, self.dt);
            }
        }

        let correction = replayed - self.position;
        let magnitude = correction.length();
        if magnitude < self.config.error_threshold {
            return true;
        }

        self.position += correction;
        self.prev_position += correction;
        if magnitude > self.config.snap_threshold {
            self.position_error = Vec2::ZERO;
        } else {
            // Keep the rendered position where it was and let the error decay.
            self.position_error -= correction;
        }
        true
    }

    pub fn update(&mut self, dt: f32) {
        let decay = (-self.config.error_correction_speed * dt).exp();
        self.position_error *= decay;
    }

    pub fn update_visuals(&mut self, alpha: f32) {
        let interpolated = self.prev_position.lerp(self.position, alpha);
        self.visual_position = interpolated + self.position_error;
    }

    pub fn predicted_position(&self) -> Vec2 {
        self.position
    }

    pub fn visual_position(&self) -> Vec2 {
        self.visual_position
    }

    pub fn position_error(&self) -> Vec2 {
        self.position_error
    }

    pub fn pending(&self) -> &CommandRing {
        &self.commands
    }

    pub fn last_executed(&self) -> Option<u32> {
        self.last_executed
    }

    /// Commands lost to ring overflow before the server acknowledged them.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn reset(&mut self, position: Vec2) {
        self.commands.clear();
        self.open = false;
        self.position = position;
        self.prev_position = position;
        self.visual_position = position;
        self.position_error = Vec2::ZERO;
        self.last_executed = None;
    }
}
