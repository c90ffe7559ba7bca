use std::collections::BTreeSet;

use glam::Vec2;

use super::{DecodedEntity, Role, read_entity_update};
use crate::codec::BitReader;
use crate::config::ReplicationConfig;
use crate::error::{ErrorClass, ReplicationError};
use crate::identity::{EntityTypeId, IdentityRegistry, NetId, Prototypes};
use crate::net::{
    ClientCommands, ClientId, MAX_COMMANDS_PER_PACKET, Message, PlayerPosition, SERVER_PEER,
    SnapshotHeader, SpawnEntity, Transport, UpdateRequest,
};
use crate::simulation::{InputBits, PlayerCommand};
use crate::stats::ReplicationStats;
use crate::sync::Interpolation;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Spawned {
        net_id: NetId,
        entity_type: EntityTypeId,
        owner: Option<ClientId>,
    },
    Destroyed {
        net_id: NetId,
    },
    /// First part of a newer snapshot arrived; carries what the predictor needs.
    Correction {
        snapshot_id: u32,
        last_executed: Option<u32>,
        anchor: Option<Vec2>,
    },
    SnapshotComplete {
        snapshot_id: u32,
    },
    Positions(Vec<PlayerPosition>),
}

#[derive(Debug)]
struct PartialSnapshot {
    snapshot_id: u32,
    part_count: u8,
    received: BTreeSet<u8>,
    baseline: Option<u32>,
    carried: BTreeSet<(NetId, u8)>,
}

/// Receiving side of replication: rebuilds entities from spawn messages and
/// applies snapshot parts against its own field history.
#[derive(Debug)]
pub struct ClientReplication {
    client_id: ClientId,
    config: ReplicationConfig,
    prototypes: Prototypes,
    registry: IdentityRegistry,
    destroyed: BTreeSet<NetId>,
    partial: Option<PartialSnapshot>,
    last_received_snapshot_id: Option<u32>,
    last_executed: Option<u32>,
    latest_sim_time: f64,
    needs_resync: bool,
    sequence: u32,
    stats: ReplicationStats,
}

impl ClientReplication {
    pub fn new(client_id: ClientId, config: ReplicationConfig, prototypes: Prototypes) -> Self {
        Self {
            client_id,
            config,
            prototypes,
            registry: IdentityRegistry::new(Role::Client),
            destroyed: BTreeSet::new(),
            partial: None,
            last_received_snapshot_id: None,
            last_executed: None,
            latest_sim_time: 0.0,
            needs_resync: false,
            sequence: 0,
            stats: ReplicationStats::default(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    /// Newest snapshot received in full, reported back as the ack.
    pub fn last_received_snapshot_id(&self) -> Option<u32> {
        self.last_received_snapshot_id
    }

    pub fn last_executed(&self) -> Option<u32> {
        self.last_executed
    }

    pub fn latest_sim_time(&self) -> f64 {
        self.latest_sim_time
    }

    pub fn is_destroyed(&self, net_id: NetId) -> bool {
        self.destroyed.contains(&net_id)
    }

    /// The entity this client owns, once its spawn has arrived.
    pub fn avatar(&self) -> Option<NetId> {
        self.registry.avatar_of(self.client_id)
    }

    fn ack(&self) -> Option<u32> {
        if self.needs_resync {
            None
        } else {
            self.last_received_snapshot_id
        }
    }

    pub fn receive(&mut self, transport: &mut impl Transport) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Some((peer, payload)) = transport.try_receive() {
            if peer != SERVER_PEER {
                log::debug!("Ignoring packet from peer {}", peer);
                continue;
            }
            self.stats.messages_received += 1;
            self.stats.bytes_received += payload.len() as u64;
            if let Err(err) = self.handle_packet(&payload, &mut events) {
                self.stats.messages_dropped += 1;
                if err.class() == ErrorClass::Desync {
                    self.needs_resync = true;
                    self.stats.resyncs += 1;
                }
                log::warn!("Dropped server packet: {}", err);
            }
        }
        events
    }

    fn handle_packet(
        &mut self,
        payload: &[u8],
        events: &mut Vec<ClientEvent>,
    ) -> Result<(), ReplicationError> {
        let mut reader = BitReader::new(payload);
        match Message::read(&mut reader)? {
            Message::Spawn(spawn) => self.apply_spawn(spawn, events),
            Message::Destroy(destroy) => {
                self.apply_destroy(destroy.net_id, events);
                Ok(())
            }
            Message::Snapshot(header) => self.apply_snapshot(header, &mut reader, events),
            Message::UpdateResponse(response) => {
                for player in &response.players {
                    if let Some(identity) = self.registry.find_by_net_id_mut(player.net_id) {
                        identity.apply_remote_position(player.position);
                    }
                }
                events.push(ClientEvent::Positions(response.players));
                Ok(())
            }
            other => Err(ReplicationError::UnexpectedMessage(other.kind())),
        }
    }

    fn apply_spawn(
        &mut self,
        spawn: SpawnEntity,
        events: &mut Vec<ClientEvent>,
    ) -> Result<(), ReplicationError> {
        if self.destroyed.remove(&spawn.net_id) {
            self.registry.unregister(spawn.net_id, 0);
        }
        if self.registry.contains(spawn.net_id) {
            log::debug!("Ignoring duplicate spawn of {}", spawn.net_id);
            return Ok(());
        }

        let mut identity = self
            .prototypes
            .instantiate(spawn.entity_type, spawn.position)?;
        identity.set_owner(spawn.owner);
        identity.apply_remote_position(spawn.position);
        self.registry.register_with_id(identity, spawn.net_id)?;
        log::debug!("Spawned {} of type {}", spawn.net_id, spawn.entity_type);
        events.push(ClientEvent::Spawned {
            net_id: spawn.net_id,
            entity_type: spawn.entity_type,
            owner: spawn.owner,
        });
        Ok(())
    }

    fn apply_destroy(&mut self, net_id: NetId, events: &mut Vec<ClientEvent>) {
        if !self.registry.contains(net_id) {
            log::debug!("Ignoring destroy of unknown entity {}", net_id);
            return;
        }
        if self.destroyed.insert(net_id) {
            events.push(ClientEvent::Destroyed { net_id });
        }
    }

    /// Unregisters every entity marked by a destroy message.
    pub fn remove_destroyed(&mut self) -> Vec<NetId> {
        let released_at = self.last_received_snapshot_id.unwrap_or(0);
        let removed: Vec<NetId> = std::mem::take(&mut self.destroyed).into_iter().collect();
        for &net_id in &removed {
            self.registry.unregister(net_id, released_at);
        }
        removed
    }

    fn apply_snapshot(
        &mut self,
        header: SnapshotHeader,
        reader: &mut BitReader,
        events: &mut Vec<ClientEvent>,
    ) -> Result<(), ReplicationError> {
        let newest_seen = self
            .partial
            .as_ref()
            .map(|partial| partial.snapshot_id)
            .max(self.last_received_snapshot_id);
        let continues_partial = self.partial.as_ref().is_some_and(|partial| {
            partial.snapshot_id == header.snapshot_id && !partial.received.contains(&header.part)
        });
        if !continues_partial && newest_seen.is_some_and(|newest| header.snapshot_id <= newest) {
            self.stats.stale_snapshots += 1;
            log::trace!("Ignoring stale snapshot {}", header.snapshot_id);
            return Ok(());
        }

        let mut decoded: Vec<DecodedEntity> = Vec::with_capacity(header.entity_count as usize);
        for _ in 0..header.entity_count {
            decoded.push(read_entity_update(reader, &self.registry, header.baseline)?);
        }

        if !continues_partial {
            self.partial = Some(PartialSnapshot {
                snapshot_id: header.snapshot_id,
                part_count: header.part_count,
                received: BTreeSet::new(),
                baseline: header.baseline,
                carried: BTreeSet::new(),
            });
            self.latest_sim_time = header.sim_time;
            if header.last_executed > self.last_executed {
                self.last_executed = header.last_executed;
            }
            events.push(ClientEvent::Correction {
                snapshot_id: header.snapshot_id,
                last_executed: header.last_executed,
                anchor: header.anchor,
            });
        }

        let mut carried = Vec::new();
        for entity in decoded {
            let Some(identity) = self.registry.find_by_net_id_mut(entity.net_id) else {
                continue;
            };
            for (index, value) in entity.values {
                if let Some(field) = identity.field_mut(index as usize) {
                    field.insert_received(header.snapshot_id, header.sim_time, value);
                    carried.push((entity.net_id, index));
                }
            }
        }

        let complete = match self.partial.as_mut() {
            Some(partial) => {
                partial.carried.extend(carried);
                partial.received.insert(header.part);
                partial.received.len() >= partial.part_count as usize
            }
            None => false,
        };
        if complete {
            self.complete_snapshot(header.snapshot_id, header.sim_time);
            events.push(ClientEvent::SnapshotComplete {
                snapshot_id: header.snapshot_id,
            });
        }
        Ok(())
    }

    fn complete_snapshot(&mut self, snapshot_id: u32, sim_time: f64) {
        let Some(partial) = self.partial.take() else {
            return;
        };
        match partial.baseline {
            // Fields left out held their baseline value; record it under this id
            // so the next delta can use it as a baseline.
            Some(baseline) => {
                for identity in self.registry.iter_mut() {
                    let Some(net_id) = identity.net_id() else {
                        continue;
                    };
                    for (index, field) in identity.fields_mut().iter_mut().enumerate() {
                        if !partial.carried.contains(&(net_id, index as u8)) {
                            field.carry_forward(baseline, snapshot_id, sim_time);
                        }
                    }
                }
            }
            None => {
                if self.needs_resync {
                    log::info!("Resynchronised at snapshot {}", snapshot_id);
                    self.needs_resync = false;
                }
            }
        }
        self.last_received_snapshot_id = Some(snapshot_id);
        self.stats.snapshots_applied += 1;
    }

    /// Moves interpolated fields to the configured delay behind the newest snapshot.
    pub fn interpolate(&mut self) {
        let render_time = self.latest_sim_time - self.config.interpolation_delay;
        self.interpolate_at(render_time);
    }

    pub fn interpolate_at(&mut self, render_time: f64) {
        for identity in self.registry.iter_mut() {
            for field in identity.fields_mut() {
                if field.interpolation() == Interpolation::Linear {
                    field.set_current_value_to_value_at_time(render_time);
                }
            }
        }
    }

    /// Sends every unacknowledged command together with the current ack.
    pub fn send_commands(
        &mut self,
        commands: &[PlayerCommand],
        client_clock: f64,
        transport: &mut impl Transport,
    ) {
        self.sequence = self.sequence.wrapping_add(1);
        let skip = commands.len().saturating_sub(MAX_COMMANDS_PER_PACKET);
        let message = Message::Commands(ClientCommands {
            ack: self.ack(),
            sequence: self.sequence,
            client_clock,
            commands: commands[skip..].to_vec(),
        });
        let bytes = message.to_bytes();
        self.stats.bytes_sent += bytes.len() as u64;
        transport.send_unreliable(SERVER_PEER, bytes);
    }

    pub fn send_update_request(
        &mut self,
        kind: u8,
        input: InputBits,
        transport: &mut impl Transport,
    ) {
        let bytes = Message::UpdateRequest(UpdateRequest {
            kind,
            input_bits: u32::from(input.bits()),
        })
        .to_bytes();
        self.stats.bytes_sent += bytes.len() as u64;
        transport.send_unreliable(SERVER_PEER, bytes);
    }
}
