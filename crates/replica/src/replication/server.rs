use std::collections::BTreeMap;

use glam::Vec2;

use super::{
    ClientState, EntityUpdate, Role, ServerPhase, WorldHistory, WorldState, write_entity_update,
};
use crate::codec::{BitReader, BitWriter};
use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::identity::{IdentityRegistry, MAX_FIELDS_PER_ENTITY, NetId, NetIdentity};
use crate::net::{
    ClientCommands, ClientId, DestroyEntity, Message, PlayerPosition, SnapshotHeader,
    SpawnEntity, Transport, UpdateRequest, UpdateResponse,
};
use crate::simulation::{CommandStatus, FixedTimestep, InputBits};
use crate::stats::ReplicationStats;

const MAX_SNAPSHOT_PARTS: usize = u8::MAX as usize;

/// Authoritative side of replication: owns the entity registry, snapshots
/// it at the send cadence and serves every connected client.
#[derive(Debug)]
pub struct ServerReplication {
    config: ReplicationConfig,
    registry: IdentityRegistry,
    clients: BTreeMap<ClientId, ClientState>,
    history: WorldHistory,
    phase: ServerPhase,
    send_timer: FixedTimestep,
    next_snapshot_id: u32,
    stats: ReplicationStats,
}

impl ServerReplication {
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            registry: IdentityRegistry::new(Role::Server),
            clients: BTreeMap::new(),
            history: WorldHistory::new(config.snapshot_capacity),
            phase: ServerPhase::Idle,
            send_timer: FixedTimestep::new(config.send_rate),
            next_snapshot_id: 1,
            stats: ReplicationStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.registry
    }

    pub fn history(&self) -> &WorldHistory {
        &self.history
    }

    /// Id of the newest snapshot taken, if any.
    pub fn current_snapshot_id(&self) -> Option<u32> {
        self.history.latest().map(|state| state.snapshot_id)
    }

    pub fn client(&self, client_id: ClientId) -> Option<&ClientState> {
        self.clients.get(&client_id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientState> {
        self.clients.values()
    }

    pub(crate) fn split_mut(
        &mut self,
    ) -> (&mut IdentityRegistry, &mut BTreeMap<ClientId, ClientState>) {
        (&mut self.registry, &mut self.clients)
    }

    pub fn connect_client(&mut self, client_id: ClientId) {
        self.clients
            .entry(client_id)
            .or_insert_with(|| ClientState::new(client_id, self.config.command_capacity));
        log::info!("Client {} joined replication", client_id);
    }

    /// Forgets the client's state; its queued commands are discarded.
    pub fn disconnect_client(&mut self, client_id: ClientId) -> Option<ClientState> {
        let state = self.clients.remove(&client_id)?;
        log::info!(
            "Client {} left replication with {} queued commands",
            client_id,
            state.commands().len()
        );
        Some(state)
    }

    pub fn register(&mut self, identity: NetIdentity) -> Result<NetId, ReplicationError> {
        let horizon = self.reuse_horizon();
        let net_id = self.registry.register(identity, horizon)?;
        log::debug!("Registered entity {}", net_id);
        Ok(net_id)
    }

    pub fn unregister(&mut self, net_id: NetId) -> Result<NetIdentity, ReplicationError> {
        let identity = self
            .registry
            .unregister(net_id, self.next_snapshot_id)
            .ok_or(ReplicationError::UnknownNetId(net_id))?;
        log::debug!("Unregistered entity {}", net_id);
        Ok(identity)
    }

    /// Oldest snapshot id any retained world state or client baseline refers to.
    fn reuse_horizon(&self) -> Option<u32> {
        self.history
            .oldest_id()
            .into_iter()
            .chain(
                self.clients
                    .values()
                    .filter_map(ClientState::last_received_snapshot_id),
            )
            .min()
    }

    pub fn receive(&mut self, transport: &mut impl Transport) {
        while let Some((peer, payload)) = transport.try_receive() {
            self.stats.messages_received += 1;
            self.stats.bytes_received += payload.len() as u64;
            if let Err(err) = self.handle_packet(peer, &payload, transport) {
                self.stats.messages_dropped += 1;
                log::warn!("Dropped packet from client {}: {}", peer, err);
            }
        }
    }

    fn handle_packet(
        &mut self,
        client_id: ClientId,
        payload: &[u8],
        transport: &mut impl Transport,
    ) -> Result<(), ReplicationError> {
        if !self.clients.contains_key(&client_id) {
            return Err(ReplicationError::UnknownClient(client_id));
        }
        let message = Message::read(&mut BitReader::new(payload))?;
        match message {
            Message::Commands(commands) => {
                self.handle_commands(client_id, commands);
                Ok(())
            }
            Message::UpdateRequest(request) => {
                self.handle_update_request(client_id, request, transport);
                Ok(())
            }
            other => Err(ReplicationError::UnexpectedMessage(other.kind())),
        }
    }

    fn handle_commands(&mut self, client_id: ClientId, packet: ClientCommands) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        if !client.acknowledge(packet.sequence, packet.ack, packet.client_clock) {
            log::trace!("Client {} sent stale packet {}", client_id, packet.sequence);
        }
        for command in packet.commands {
            if let Some(evicted) = client.accept_command(command) {
                self.stats.commands_evicted += 1;
                log::warn!(
                    "Client {} command ring full, evicted command {}",
                    client_id,
                    evicted.id
                );
            }
        }
    }

    fn handle_update_request(
        &mut self,
        client_id: ClientId,
        request: UpdateRequest,
        transport: &mut impl Transport,
    ) {
        let input = InputBits::from_bits_truncate(request.input_bits as u8);
        // An empty request only polls positions.
        if let Some(client) = self
            .clients
            .get_mut(&client_id)
            .filter(|_| !input.is_empty())
        {
            if client.queue_update_step(input).is_some() {
                self.stats.commands_evicted += 1;
                log::warn!("Client {} update step queue full, evicted oldest step", client_id);
            }
        }

        let players = self
            .registry
            .iter()
            .filter(|identity| identity.owner().is_some())
            .filter_map(|identity| {
                Some(PlayerPosition {
                    net_id: identity.net_id()?,
                    position: identity.position()?,
                })
            })
            .collect();
        let response = Message::UpdateResponse(UpdateResponse {
            kind: request.kind,
            players,
        });
        let bytes = response.to_bytes();
        self.stats.bytes_sent += bytes.len() as u64;
        transport.send_unreliable(client_id, bytes);
    }

    /// Advances the send cadence; returns the snapshot id if one was taken.
    pub fn update(
        &mut self,
        dt: f32,
        sim_time: f64,
        transport: &mut impl Transport,
    ) -> Option<u32> {
        self.send_timer.accumulate(dt);
        let mut due = false;
        while self.send_timer.consume_tick() {
            due = true;
        }
        due.then(|| self.snapshot_and_send(sim_time, transport))
    }

    /// Takes a snapshot immediately and sends it to every client.
    pub fn snapshot_and_send(&mut self, sim_time: f64, transport: &mut impl Transport) -> u32 {
        let snapshot_id = self.next_snapshot_id;

        self.phase = ServerPhase::Collecting;
        for identity in self.registry.iter_mut() {
            for field in identity.fields_mut() {
                field.add_current_value_to_snapshots(snapshot_id, sim_time);
            }
        }

        self.phase = ServerPhase::Snapshotting;
        self.next_snapshot_id = self.next_snapshot_id.wrapping_add(1);
        self.history.push(WorldState {
            snapshot_id,
            entities: self.registry.ids().collect(),
        });

        self.phase = ServerPhase::Sending;
        let client_ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for client_id in client_ids {
            self.send_to_client(client_id, snapshot_id, sim_time, transport);
        }

        self.phase = ServerPhase::Idle;
        snapshot_id
    }

    fn send_to_client(
        &mut self,
        client_id: ClientId,
        snapshot_id: u32,
        sim_time: f64,
        transport: &mut impl Transport,
    ) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        let Some(current) = self.history.latest() else {
            return;
        };

        let mut baseline = client.last_received_snapshot_id();
        let base_state = match baseline {
            Some(acked) => {
                let state = self.history.get(acked);
                if state.is_none() {
                    log::warn!(
                        "Client {} acknowledged snapshot {} which is no longer retained, resyncing",
                        client_id,
                        acked
                    );
                    self.stats.resyncs += 1;
                    client.reset_baseline();
                    baseline = None;
                }
                state
            }
            None => None,
        };

        let spawned: Vec<NetId> = current
            .entities
            .difference(client.announced())
            .copied()
            .collect();
        for net_id in spawned {
            let Some(identity) = self.registry.find_by_net_id(net_id) else {
                continue;
            };
            let spawn = Message::Spawn(SpawnEntity {
                net_id,
                entity_type: identity.entity_type(),
                position: identity.position().unwrap_or(Vec2::ZERO),
                owner: identity.owner(),
            });
            let bytes = spawn.to_bytes();
            self.stats.bytes_sent += bytes.len() as u64;
            self.stats.spawns_sent += 1;
            transport.send_reliable(client_id, bytes);
            client.announced_mut().insert(net_id);
        }

        let destroyed: Vec<NetId> = client
            .announced()
            .difference(&current.entities)
            .copied()
            .collect();
        for net_id in destroyed {
            let bytes = Message::Destroy(DestroyEntity { net_id }).to_bytes();
            self.stats.bytes_sent += bytes.len() as u64;
            self.stats.destroys_sent += 1;
            transport.send_reliable(client_id, bytes);
            client.announced_mut().remove(&net_id);
        }

        let updates: Vec<EntityUpdate> = current
            .entities
            .iter()
            .filter_map(|&net_id| {
                let identity = self.registry.find_by_net_id(net_id)?;
                let full = base_state.is_none_or(|state| !state.entities.contains(&net_id));
                let from = if full { None } else { baseline };
                let fields: Vec<u8> = identity
                    .fields()
                    .iter()
                    .enumerate()
                    .take(MAX_FIELDS_PER_ENTITY)
                    .filter(|(_, field)| full || field.current_value_changed_from_sequence(from))
                    .map(|(index, _)| index as u8)
                    .collect();
                (!fields.is_empty()).then_some(EntityUpdate {
                    net_id,
                    full,
                    fields,
                })
            })
            .collect();

        let avatar = self
            .registry
            .avatar_of(client_id)
            .and_then(|net_id| self.registry.find_by_net_id(net_id))
            .and_then(NetIdentity::position);
        let anchor = match client.commands().front() {
            Some(command) if command.status == CommandStatus::InProgress => {
                Some(command.position_at_start)
            }
            _ => avatar,
        };

        let chunks: Vec<&[EntityUpdate]> = if updates.is_empty() {
            vec![updates.as_slice()]
        } else {
            updates.chunks(self.config.entities_per_message()).collect()
        };
        if chunks.len() > MAX_SNAPSHOT_PARTS {
            let dropped: usize = chunks[MAX_SNAPSHOT_PARTS..]
                .iter()
                .map(|chunk| chunk.len())
                .sum();
            self.stats.entities_dropped += dropped as u64;
            log::warn!(
                "Snapshot {} for client {} needs {} parts, dropping {} entities past part {}",
                snapshot_id,
                client_id,
                chunks.len(),
                dropped,
                MAX_SNAPSHOT_PARTS
            );
        }
        let part_count = chunks.len().min(MAX_SNAPSHOT_PARTS) as u8;
        for (part, chunk) in chunks.into_iter().take(part_count as usize).enumerate() {
            let mut writer = BitWriter::with_capacity(64);
            Message::Snapshot(SnapshotHeader {
                snapshot_id,
                baseline,
                last_executed: client.last_server_executed(),
                sim_time,
                anchor,
                part: part as u8,
                part_count,
                entity_count: chunk.len() as u8,
            })
            .write(&mut writer);
            for update in chunk {
                if let Some(identity) = self.registry.find_by_net_id(update.net_id) {
                    write_entity_update(&mut writer, identity, update, baseline, snapshot_id);
                }
            }
            let bytes = writer.to_bytes();
            self.stats.bytes_sent += bytes.len() as u64;
            self.stats.snapshots_sent += 1;
            transport.send_unreliable(client_id, bytes);
        }
        client.record_sent(snapshot_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityTypeId;
    use crate::net::{LinkConditions, LoopbackServer, SERVER_PEER};
    use crate::sync::SyncVar;

    fn player(owner: ClientId) -> NetIdentity {
        NetIdentity::new(EntityTypeId::of("player"))
            .with_position(SyncVar::new(Vec2::new(1.0, 2.0)))
            .with_field(SyncVar::new(100i32))
            .owned_by(owner)
    }

    fn drain(transport: &mut impl Transport) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some((_, payload)) = transport.try_receive() {
            messages.push(Message::read(&mut BitReader::new(&payload)).unwrap());
        }
        messages
    }

    #[test]
    fn first_snapshot_spawns_then_sends_full_state() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        let net_id = server.register(player(client.client_id())).unwrap();

        let snapshot_id = server.snapshot_and_send(0.0, &mut network);
        let messages = drain(&mut client);

        assert_eq!(snapshot_id, 1);
        assert!(matches!(
            messages.first(),
            Some(Message::Spawn(SpawnEntity { net_id: id, owner: Some(1), .. })) if *id == net_id
        ));
        let Some(Message::Snapshot(header)) = messages.get(1) else {
            panic!("expected a snapshot after the spawn, got {:?}", messages);
        };
        assert_eq!(header.baseline, None);
        assert_eq!(header.entity_count, 1);
        assert_eq!(header.anchor, Some(Vec2::new(1.0, 2.0)));
        assert_eq!(server.phase(), ServerPhase::Idle);
    }

    #[test]
    fn unchanged_world_still_sends_an_empty_part() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        server.register(player(1)).unwrap();

        server.snapshot_and_send(0.0, &mut network);
        drain(&mut client);
        let ack = Message::Commands(ClientCommands {
            ack: Some(1),
            sequence: 1,
            client_clock: 0.0,
            commands: Vec::new(),
        });
        client.send_unreliable(SERVER_PEER, ack.to_bytes());
        server.receive(&mut network);

        server.snapshot_and_send(0.05, &mut network);
        let messages = drain(&mut client);
        assert_eq!(messages.len(), 1);
        let Some(Message::Snapshot(header)) = messages.first() else {
            panic!("expected a snapshot, got {:?}", messages);
        };
        assert_eq!(header.baseline, Some(1));
        assert_eq!(header.entity_count, 0);
    }

    #[test]
    fn large_worlds_are_split_into_parts() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        for _ in 0..120 {
            server
                .register(NetIdentity::new(EntityTypeId::of("crate")).with_field(SyncVar::new(0u8)))
                .unwrap();
        }

        server.snapshot_and_send(0.0, &mut network);
        let headers: Vec<SnapshotHeader> = drain(&mut client)
            .into_iter()
            .filter_map(|message| match message {
                Message::Snapshot(header) => Some(header),
                _ => None,
            })
            .collect();
        let counts: Vec<u8> = headers.iter().map(|header| header.entity_count).collect();
        assert_eq!(counts, vec![50, 50, 20]);
        assert!(headers.iter().all(|header| header.part_count == 3));
    }

    #[test]
    fn parts_beyond_a_byte_are_dropped_and_counted() {
        let config = ReplicationConfig {
            max_entities_per_message: 1,
            ..ReplicationConfig::default()
        };
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(config);
        server.connect_client(client.client_id());
        for _ in 0..MAX_SNAPSHOT_PARTS + 2 {
            server
                .register(NetIdentity::new(EntityTypeId::of("crate")).with_field(SyncVar::new(0u8)))
                .unwrap();
        }

        server.snapshot_and_send(0.0, &mut network);
        let headers: Vec<SnapshotHeader> = drain(&mut client)
            .into_iter()
            .filter_map(|message| match message {
                Message::Snapshot(header) => Some(header),
                _ => None,
            })
            .collect();
        assert_eq!(headers.len(), MAX_SNAPSHOT_PARTS);
        assert!(headers.iter().all(|header| header.part_count == u8::MAX));
        assert_eq!(server.stats().entities_dropped, 2);
    }

    #[test]
    fn expired_ack_forces_resync() {
        let config = ReplicationConfig {
            snapshot_capacity: 4,
            ..ReplicationConfig::default()
        };
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(config);
        server.connect_client(client.client_id());
        server.register(player(1)).unwrap();

        server.snapshot_and_send(0.0, &mut network);
        let ack = Message::Commands(ClientCommands {
            ack: Some(1),
            sequence: 1,
            client_clock: 0.0,
            commands: Vec::new(),
        });
        client.send_unreliable(SERVER_PEER, ack.to_bytes());
        server.receive(&mut network);
        for step in 1..=5 {
            server.snapshot_and_send(step as f64 * 0.05, &mut network);
        }

        assert_eq!(server.stats().resyncs, 1);
        assert_eq!(server.client(1).and_then(ClientState::last_received_snapshot_id), None);
    }

    #[test]
    fn destroyed_entities_are_announced_once() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        let net_id = server.register(player(1)).unwrap();
        server.snapshot_and_send(0.0, &mut network);
        server.unregister(net_id).unwrap();
        server.snapshot_and_send(0.05, &mut network);
        server.snapshot_and_send(0.1, &mut network);

        let destroys = drain(&mut client)
            .into_iter()
            .filter(|message| matches!(message, Message::Destroy(_)))
            .count();
        assert_eq!(destroys, 1);
        assert_eq!(server.stats().destroys_sent, 1);
    }

    #[test]
    fn update_request_queues_step_and_answers() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        let net_id = server.register(player(1)).unwrap();

        let request = Message::UpdateRequest(UpdateRequest {
            kind: 2,
            input_bits: InputBits::RIGHT.bits() as u32,
        });
        client.send_unreliable(SERVER_PEER, request.to_bytes());
        server.receive(&mut network);

        let state = server.client(1).unwrap();
        assert_eq!(state.update_steps().len(), 1);
        assert!(state.commands().is_empty());
        assert_eq!(state.newest_command_id(), None);
        assert_eq!(
            drain(&mut client),
            vec![Message::UpdateResponse(UpdateResponse {
                kind: 2,
                players: vec![PlayerPosition {
                    net_id,
                    position: Vec2::new(1.0, 2.0),
                }],
            })]
        );
    }

    #[test]
    fn empty_update_request_only_polls() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        server.connect_client(client.client_id());
        server.register(player(1)).unwrap();

        let request = Message::UpdateRequest(UpdateRequest {
            kind: 0,
            input_bits: 0,
        });
        client.send_unreliable(SERVER_PEER, request.to_bytes());
        server.receive(&mut network);

        assert_eq!(server.client(1).map(|state| state.update_steps().len()), Some(0));
        assert_eq!(drain(&mut client).len(), 1);
    }

    #[test]
    fn packets_from_unknown_clients_are_dropped() {
        let mut network = LoopbackServer::new(LinkConditions::default());
        let mut client = network.connect();
        let mut server = ServerReplication::new(ReplicationConfig::default());
        client.send_unreliable(SERVER_PEER, vec![4]);
        server.receive(&mut network);
        assert_eq!(server.stats().messages_dropped, 1);
    }
}
