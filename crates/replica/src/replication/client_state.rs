use std::collections::{BTreeSet, VecDeque};

use crate::identity::NetId;
use crate::net::ClientId;
use crate::simulation::{CommandRing, InputBits, PlayerCommand};

/// Server-side bookkeeping for one connected client.
#[derive(Debug)]
pub struct ClientState {
    client_id: ClientId,
    last_server_sequence: Option<u32>,
    last_received_snapshot_id: Option<u32>,
    last_client_sequence: Option<u32>,
    last_server_executed: Option<u32>,
    client_clock: f64,
    commands: CommandRing,
    update_steps: VecDeque<InputBits>,
    announced: BTreeSet<NetId>,
    wasted_ticks: u64,
}

impl ClientState {
    pub fn new(client_id: ClientId, command_capacity: usize) -> Self {
        Self {
            client_id,
            last_server_sequence: None,
            last_received_snapshot_id: None,
            last_client_sequence: None,
            last_server_executed: None,
            client_clock: 0.0,
            commands: CommandRing::new(command_capacity),
            update_steps: VecDeque::new(),
            announced: BTreeSet::new(),
            wasted_ticks: 0,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Newest snapshot id sent to this client.
    pub fn last_server_sequence(&self) -> Option<u32> {
        self.last_server_sequence
    }

    /// Newest snapshot the client reported as fully received.
    pub fn last_received_snapshot_id(&self) -> Option<u32> {
        self.last_received_snapshot_id
    }

    pub fn last_server_executed(&self) -> Option<u32> {
        self.last_server_executed
    }

    pub fn client_clock(&self) -> f64 {
        self.client_clock
    }

    pub fn commands(&self) -> &CommandRing {
        &self.commands
    }

    pub(crate) fn commands_mut(&mut self) -> &mut CommandRing {
        &mut self.commands
    }

    /// Single steps asked for by update requests. They carry no command id and
    /// only run on ticks where no command is ready.
    pub fn update_steps(&self) -> &VecDeque<InputBits> {
        &self.update_steps
    }

    /// Returns the oldest step when the queue is already at command capacity.
    pub(crate) fn queue_update_step(&mut self, input: InputBits) -> Option<InputBits> {
        let evicted = if self.update_steps.len() >= self.commands.capacity() {
            self.update_steps.pop_front()
        } else {
            None
        };
        self.update_steps.push_back(input);
        evicted
    }

    pub(crate) fn take_update_step(&mut self) -> Option<InputBits> {
        self.update_steps.pop_front()
    }

    pub fn announced(&self) -> &BTreeSet<NetId> {
        &self.announced
    }

    pub fn wasted_ticks(&self) -> u64 {
        self.wasted_ticks
    }

    pub(crate) fn announced_mut(&mut self) -> &mut BTreeSet<NetId> {
        &mut self.announced
    }

    pub(crate) fn record_sent(&mut self, snapshot_id: u32) {
        self.last_server_sequence = Some(snapshot_id);
    }

    /// Applies the ack carried by a command packet. Packets older than the
    /// newest one seen are ignored so a reordered ack cannot move backwards.
    pub(crate) fn acknowledge(
        &mut self,
        sequence: u32,
        ack: Option<u32>,
        client_clock: f64,
    ) -> bool {
        if self.last_client_sequence.is_some_and(|last| sequence <= last) {
            return false;
        }
        self.last_client_sequence = Some(sequence);
        self.client_clock = client_clock;
        self.last_received_snapshot_id = match ack {
            Some(ack) => Some(self.last_received_snapshot_id.map_or(ack, |last| last.max(ack))),
            None => None,
        };
        true
    }

    pub(crate) fn reset_baseline(&mut self) {
        self.last_received_snapshot_id = None;
    }

    /// Newest command id the server already holds or has executed.
    pub fn newest_command_id(&self) -> Option<u32> {
        self.commands.last_id().max(self.last_server_executed)
    }

    /// Queues a command the server has not seen yet. Returns whatever the
    /// bounded ring evicted to make room.
    pub(crate) fn accept_command(&mut self, command: PlayerCommand) -> Option<PlayerCommand> {
        if self.newest_command_id().is_some_and(|newest| command.id <= newest) {
            return None;
        }
        if command.fixed_update_count == 0 {
            log::warn!(
                "Client {} sent command {} spanning zero steps",
                self.client_id,
                command.id
            );
            return None;
        }
        self.commands.push(PlayerCommand::new(
            command.id,
            command.input,
            command.fixed_update_count,
        ))
    }

    pub(crate) fn mark_executed(&mut self, command_id: u32) {
        self.last_server_executed = Some(
            self.last_server_executed
                .map_or(command_id, |last| last.max(command_id)),
        );
    }

    pub(crate) fn record_wasted_tick(&mut self) {
        self.wasted_ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reordered_packets_do_not_regress_ack() {
        let mut client = ClientState::new(1, 8);
        assert!(client.acknowledge(5, Some(20), 1.0));
        assert!(!client.acknowledge(4, Some(10), 0.9));
        assert_eq!(client.last_received_snapshot_id(), Some(20));
        assert!(client.acknowledge(6, None, 1.1));
        assert_eq!(client.last_received_snapshot_id(), None);
    }

    #[test]
    fn redundant_commands_are_queued_once() {
        let mut client = ClientState::new(1, 8);
        for _ in 0..3 {
            client.accept_command(PlayerCommand::new(1, InputBits::UP, 4));
            client.accept_command(PlayerCommand::new(2, InputBits::LEFT, 2));
        }
        assert_eq!(client.commands().len(), 2);

        client.accept_command(PlayerCommand::new(3, InputBits::LEFT, 0));
        assert_eq!(client.newest_command_id(), Some(2));
    }

    #[test]
    fn executed_id_never_decreases() {
        let mut client = ClientState::new(1, 8);
        client.mark_executed(7);
        client.mark_executed(3);
        assert_eq!(client.last_server_executed(), Some(7));
        assert!(client.accept_command(PlayerCommand::new(6, InputBits::UP, 1)).is_none());
        assert!(client.commands().is_empty());
    }

    #[test]
    fn update_steps_stay_out_of_the_command_ids() {
        let mut client = ClientState::new(1, 2);
        client.accept_command(PlayerCommand::new(4, InputBits::UP, 1));
        assert_eq!(client.queue_update_step(InputBits::LEFT), None);
        assert_eq!(client.queue_update_step(InputBits::RIGHT), None);
        assert_eq!(client.queue_update_step(InputBits::DOWN), Some(InputBits::LEFT));

        assert_eq!(client.newest_command_id(), Some(4));
        assert!(client.accept_command(PlayerCommand::new(5, InputBits::UP, 1)).is_none());
        assert_eq!(client.commands().len(), 2);
        assert_eq!(client.take_update_step(), Some(InputBits::RIGHT));
    }
}
