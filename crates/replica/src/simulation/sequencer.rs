use super::{CommandStatus, InputBits, Simulation};
use crate::error::ReplicationError;
use crate::replication::{Role, ServerReplication};

/// Runs queued client commands against the fixed-step simulation, one step
/// per client per tick, in client id order.
#[derive(Debug)]
pub struct ServerCommandSequencer<S> {
    simulation: S,
    fixed_update_id: u64,
    wasted_ticks: u64,
}

impl<S: Simulation> ServerCommandSequencer<S> {
    pub fn new(simulation: S) -> Self {
        Self {
            simulation,
            fixed_update_id: 0,
            wasted_ticks: 0,
        }
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn fixed_update_id(&self) -> u64 {
        self.fixed_update_id
    }

    /// Ticks on which some client had no command to run.
    pub fn wasted_ticks(&self) -> u64 {
        self.wasted_ticks
    }

    pub fn tick(
        &mut self,
        replication: &mut ServerReplication,
        dt: f32,
    ) -> Result<(), ReplicationError> {
        let fixed_update_id = self.fixed_update_id;
        self.fixed_update_id += 1;

        let (registry, clients) = replication.split_mut();
        for client in clients.values_mut() {
            let Some(avatar) = registry.avatar_of(client.client_id()) else {
                continue;
            };
            let identity = registry.get_mut(avatar)?;
            let Some(position) = identity.position() else {
                continue;
            };

            let runnable = client
                .commands()
                .front()
                .is_some_and(|command| !command.is_complete());
            if !runnable {
                if let Some(input) = client.take_update_step() {
                    let next = self.simulation.step_fixed(position, input, dt);
                    identity.set_position(Role::Server, next)?;
                    continue;
                }
                client.record_wasted_tick();
                self.wasted_ticks += 1;
                log::trace!("Client {} starved on tick {}", client.client_id(), fixed_update_id);
                let idle = self.simulation.step_fixed(position, InputBits::empty(), dt);
                identity.set_position(Role::Server, idle)?;
                continue;
            }
            let Some(command) = client.commands_mut().front_mut() else {
                continue;
            };

            if command.status == CommandStatus::NotStarted {
                command.status = CommandStatus::InProgress;
                command.fixed_update_start_id = Some(fixed_update_id);
                command.position_at_start = position;
            }
            let next = self.simulation.step_fixed(position, command.input, dt);
            command.fixed_update_count = command.fixed_update_count.saturating_sub(1);
            let finished = (command.fixed_update_count == 0).then_some(command.id);
            if finished.is_some() {
                command.status = CommandStatus::Complete;
            }
            identity.set_position(Role::Server, next)?;

            if let Some(command_id) = finished {
                client.commands_mut().pop_front();
                client.mark_executed(command_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::config::ReplicationConfig;
    use crate::identity::{EntityTypeId, NetIdentity};
    use crate::simulation::{PlanarMovement, PlayerCommand};
    use crate::sync::SyncVar;

    const DT: f32 = 0.25;

    fn server_with_avatars(clients: &[u32]) -> ServerReplication {
        let mut server = ServerReplication::new(ReplicationConfig::default());
        for &client_id in clients {
            server.connect_client(client_id);
            server
                .register(
                    NetIdentity::new(EntityTypeId::of("player"))
                        .with_position(SyncVar::new(Vec2::ZERO))
                        .owned_by(client_id),
                )
                .unwrap();
        }
        server
    }

    fn queue(server: &mut ServerReplication, client_id: u32, command: PlayerCommand) {
        let (_, clients) = server.split_mut();
        clients.get_mut(&client_id).unwrap().accept_command(command);
    }

    fn avatar_position(server: &ServerReplication, client_id: u32) -> Vec2 {
        let registry = server.registry();
        registry
            .avatar_of(client_id)
            .and_then(|net_id| registry.find_by_net_id(net_id))
            .and_then(NetIdentity::position)
            .unwrap()
    }

    #[test]
    fn command_runs_for_its_step_count() {
        let movement = PlanarMovement {
            speed: 4.0,
            sprint_multiplier: 1.0,
        };
        let mut sequencer = ServerCommandSequencer::new(movement);
        let mut server = server_with_avatars(&[1]);
        queue(&mut server, 1, PlayerCommand::new(1, InputBits::RIGHT, 3));

        sequencer.tick(&mut server, DT).unwrap();
        let client = server.client(1).unwrap();
        let front = client.commands().front().unwrap();
        assert_eq!(front.status, CommandStatus::InProgress);
        assert_eq!(front.fixed_update_start_id, Some(0));
        assert_eq!(front.position_at_start, Vec2::ZERO);
        assert_eq!(client.last_server_executed(), None);

        sequencer.tick(&mut server, DT).unwrap();
        sequencer.tick(&mut server, DT).unwrap();
        let client = server.client(1).unwrap();
        assert_eq!(client.last_server_executed(), Some(1));
        assert!(client.commands().is_empty());
        assert_eq!(avatar_position(&server, 1), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn starved_client_does_not_block_others() {
        let mut sequencer = ServerCommandSequencer::new(PlanarMovement::default());
        let mut server = server_with_avatars(&[1, 2]);
        queue(&mut server, 2, PlayerCommand::new(1, InputBits::UP, 2));

        sequencer.tick(&mut server, DT).unwrap();
        sequencer.tick(&mut server, DT).unwrap();

        assert_eq!(sequencer.wasted_ticks(), 2);
        assert_eq!(server.client(1).map(|client| client.wasted_ticks()), Some(2));
        assert_eq!(server.client(2).and_then(|client| client.last_server_executed()), Some(1));
        assert_eq!(avatar_position(&server, 1), Vec2::ZERO);
        assert!(avatar_position(&server, 2).y > 0.0);
    }

    #[test]
    fn update_steps_fill_idle_ticks_without_executing_ids() {
        let movement = PlanarMovement {
            speed: 4.0,
            sprint_multiplier: 1.0,
        };
        let mut sequencer = ServerCommandSequencer::new(movement);
        let mut server = server_with_avatars(&[1]);
        queue(&mut server, 1, PlayerCommand::new(1, InputBits::RIGHT, 1));
        let (_, clients) = server.split_mut();
        clients.get_mut(&1).unwrap().queue_update_step(InputBits::UP);

        sequencer.tick(&mut server, DT).unwrap();
        sequencer.tick(&mut server, DT).unwrap();
        sequencer.tick(&mut server, DT).unwrap();

        let client = server.client(1).unwrap();
        assert_eq!(client.last_server_executed(), Some(1));
        assert!(client.update_steps().is_empty());
        assert_eq!(client.wasted_ticks(), 1);
        assert_eq!(avatar_position(&server, 1), Vec2::new(1.0, 1.0));
    }
}
