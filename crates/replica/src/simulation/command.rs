use std::collections::VecDeque;

use glam::Vec2;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputBits: u8 {
        const UP = 1 << 0;
        const DOWN = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const SPRINT = 1 << 4;
        const ACTION = 1 << 5;
    }
}

impl InputBits {
    /// Unit-length movement direction, or zero when opposing keys cancel.
    pub fn direction(self) -> Vec2 {
        let mut direction = Vec2::ZERO;
        if self.contains(Self::UP) {
            direction.y += 1.0;
        }
        if self.contains(Self::DOWN) {
            direction.y -= 1.0;
        }
        if self.contains(Self::LEFT) {
            direction.x -= 1.0;
        }
        if self.contains(Self::RIGHT) {
            direction.x += 1.0;
        }
        direction.normalize_or_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
}

/// One held input spanning `fixed_update_count` fixed steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerCommand {
    pub id: u32,
    pub input: InputBits,
    pub fixed_update_count: u8,
    pub status: CommandStatus,
    pub position_at_start: Vec2,
    pub fixed_update_start_id: Option<u64>,
}

impl PlayerCommand {
    pub fn new(id: u32, input: InputBits, fixed_update_count: u8) -> Self {
        Self {
            id,
            input,
            fixed_update_count,
            status: CommandStatus::NotStarted,
            position_at_start: Vec2::ZERO,
            fixed_update_start_id: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == CommandStatus::Complete
    }
}

/// Bounded, id-ordered command queue. Pushing onto a full ring evicts the
/// oldest command and hands it back.
#[derive(Debug, Clone)]
pub struct CommandRing {
    commands: VecDeque<PlayerCommand>,
    capacity: usize,
}

impl CommandRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            commands: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, command: PlayerCommand) -> Option<PlayerCommand> {
        let evicted = if self.commands.len() >= self.capacity {
            self.commands.pop_front()
        } else {
            None
        };
        self.commands.push_back(command);
        evicted
    }

    pub fn front(&self) -> Option<&PlayerCommand> {
        self.commands.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut PlayerCommand> {
        self.commands.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<PlayerCommand> {
        self.commands.pop_front()
    }

    pub fn back(&self) -> Option<&PlayerCommand> {
        self.commands.back()
    }

    pub fn back_mut(&mut self) -> Option<&mut PlayerCommand> {
        self.commands.back_mut()
    }

    pub fn last_id(&self) -> Option<u32> {
        self.commands.back().map(|command| command.id)
    }

    /// Drops every command with an id at or below `id`.
    pub fn discard_through(&mut self, id: u32) -> usize {
        let before = self.commands.len();
        self.commands.retain(|command| command.id > id);
        before - self.commands.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerCommand> {
        self.commands.iter()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_when_full() {
        let mut ring = CommandRing::new(128);
        for id in 1..=128 {
            assert!(ring.push(PlayerCommand::new(id, InputBits::UP, 1)).is_none());
        }

        let evicted = ring.push(PlayerCommand::new(129, InputBits::UP, 1));
        assert_eq!(evicted.map(|command| command.id), Some(1));
        assert_eq!(ring.len(), 128);
        assert_eq!(ring.front().map(|command| command.id), Some(2));
        assert_eq!(ring.last_id(), Some(129));
    }

    #[test]
    fn discard_through_keeps_newer() {
        let mut ring = CommandRing::new(8);
        for id in 1..=5 {
            ring.push(PlayerCommand::new(id, InputBits::empty(), 2));
        }
        assert_eq!(ring.discard_through(3), 3);
        let ids: Vec<u32> = ring.iter().map(|command| command.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn opposing_inputs_cancel() {
        assert_eq!((InputBits::LEFT | InputBits::RIGHT).direction(), Vec2::ZERO);
        let diagonal = (InputBits::UP | InputBits::RIGHT).direction();
        assert!((diagonal.length() - 1.0).abs() < 1e-6);
    }
}
