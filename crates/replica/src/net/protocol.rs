use glam::Vec2;

use super::{ClientId, MAX_ENTITIES_PER_SNAPSHOT};
use crate::codec::{BitReader, BitWriter};
use crate::error::ReplicationError;
use crate::identity::{EntityTypeId, NetId};
use crate::simulation::{InputBits, PlayerCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    SpawnEntity = 1,
    DestroyEntity = 2,
    EntitySnapshot = 3,
    ClientCommands = 4,
    UpdateRequest = 5,
    UpdateResponse = 6,
}

impl TryFrom<u8> for MessageKind {
    type Error = ReplicationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::SpawnEntity,
            2 => Self::DestroyEntity,
            3 => Self::EntitySnapshot,
            4 => Self::ClientCommands,
            5 => Self::UpdateRequest,
            6 => Self::UpdateResponse,
            other => return Err(ReplicationError::UnknownMessageKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnEntity {
    pub net_id: NetId,
    pub entity_type: EntityTypeId,
    pub position: Vec2,
    pub owner: Option<ClientId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyEntity {
    pub net_id: NetId,
}

/// Header of one `EntitySnapshot` part. The entity records follow it in
/// the same buffer and are decoded against the receiver's field layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotHeader {
    pub snapshot_id: u32,
    pub baseline: Option<u32>,
    pub last_executed: Option<u32>,
    pub sim_time: f64,
    /// Authoritative start position for reconciling the receiver's avatar.
    pub anchor: Option<Vec2>,
    pub part: u8,
    pub part_count: u8,
    pub entity_count: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientCommands {
    /// Last fully received snapshot; `None` asks for a full resync.
    pub ack: Option<u32>,
    pub sequence: u32,
    pub client_clock: f64,
    pub commands: Vec<PlayerCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub kind: u8,
    pub input_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub net_id: NetId,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResponse {
    pub kind: u8,
    pub players: Vec<PlayerPosition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Spawn(SpawnEntity),
    Destroy(DestroyEntity),
    Snapshot(SnapshotHeader),
    Commands(ClientCommands),
    UpdateRequest(UpdateRequest),
    UpdateResponse(UpdateResponse),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Spawn(_) => MessageKind::SpawnEntity,
            Self::Destroy(_) => MessageKind::DestroyEntity,
            Self::Snapshot(_) => MessageKind::EntitySnapshot,
            Self::Commands(_) => MessageKind::ClientCommands,
            Self::UpdateRequest(_) => MessageKind::UpdateRequest,
            Self::UpdateResponse(_) => MessageKind::UpdateResponse,
        }
    }

    pub fn write(&self, writer: &mut BitWriter) {
        writer.write_u8(self.kind() as u8);
        match self {
            Self::Spawn(spawn) => {
                writer.write_u16(spawn.net_id.id());
                writer.write_u32(spawn.entity_type.0);
                writer.write_f32(spawn.position.x);
                writer.write_f32(spawn.position.y);
                write_optional_u32(writer, spawn.owner);
            }
            Self::Destroy(destroy) => writer.write_u16(destroy.net_id.id()),
            Self::Snapshot(header) => {
                writer.write_u32(header.snapshot_id);
                write_optional_u32(writer, header.baseline);
                write_optional_u32(writer, header.last_executed);
                writer.write_f64(header.sim_time);
                writer.write_bit(header.anchor.is_some());
                if let Some(anchor) = header.anchor {
                    writer.write_f32(anchor.x);
                    writer.write_f32(anchor.y);
                }
                writer.write_u8(header.part);
                writer.write_u8(header.part_count);
                writer.write_u8(header.entity_count);
            }
            Self::Commands(commands) => {
                write_optional_u32(writer, commands.ack);
                writer.write_u32(commands.sequence);
                writer.write_f64(commands.client_clock);
                writer.write_u8(commands.commands.len() as u8);
                for command in &commands.commands {
                    writer.write_varint(command.id);
                    writer.write_u8(command.input.bits());
                    writer.write_u8(command.fixed_update_count);
                }
            }
            Self::UpdateRequest(request) => {
                writer.write_u8(request.kind);
                writer.write_u32(request.input_bits);
            }
            Self::UpdateResponse(response) => {
                writer.write_u8(response.kind);
                writer.write_i32(response.players.len() as i32);
                for player in &response.players {
                    writer.write_u16(player.net_id.id());
                    writer.write_f32(player.position.x);
                    writer.write_f32(player.position.y);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        self.write(&mut writer);
        writer.to_bytes()
    }

    pub fn read(reader: &mut BitReader) -> Result<Self, ReplicationError> {
        let kind = MessageKind::try_from(reader.read_u8()?)?;
        Ok(match kind {
            MessageKind::SpawnEntity => Self::Spawn(SpawnEntity {
                net_id: NetId(reader.read_u16()?),
                entity_type: EntityTypeId(reader.read_u32()?),
                position: Vec2::new(reader.read_f32()?, reader.read_f32()?),
                owner: read_optional_u32(reader)?,
            }),
            MessageKind::DestroyEntity => Self::Destroy(DestroyEntity {
                net_id: NetId(reader.read_u16()?),
            }),
            MessageKind::EntitySnapshot => {
                let snapshot_id = reader.read_u32()?;
                let baseline = read_optional_u32(reader)?;
                let last_executed = read_optional_u32(reader)?;
                let sim_time = reader.read_f64()?;
                let anchor = if reader.read_bit()? {
                    Some(Vec2::new(reader.read_f32()?, reader.read_f32()?))
                } else {
                    None
                };
                let part = reader.read_u8()?;
                let part_count = reader.read_u8()?;
                let entity_count = reader.read_u8()?;
                if entity_count as usize > MAX_ENTITIES_PER_SNAPSHOT {
                    return Err(ReplicationError::EntityCapExceeded(entity_count as usize));
                }
                if part_count == 0 || part >= part_count {
                    return Err(ReplicationError::MalformedSnapshotPart { part, part_count });
                }
                Self::Snapshot(SnapshotHeader {
                    snapshot_id,
                    baseline,
                    last_executed,
                    sim_time,
                    anchor,
                    part,
                    part_count,
                    entity_count,
                })
            }
            MessageKind::ClientCommands => {
                let ack = read_optional_u32(reader)?;
                let sequence = reader.read_u32()?;
                let client_clock = reader.read_f64()?;
                let count = reader.read_u8()?;
                let mut commands = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let id = reader.read_varint()?;
                    let input = InputBits::from_bits_truncate(reader.read_u8()?);
                    let fixed_update_count = reader.read_u8()?;
                    commands.push(PlayerCommand::new(id, input, fixed_update_count));
                }
                Self::Commands(ClientCommands {
                    ack,
                    sequence,
                    client_clock,
                    commands,
                })
            }
            MessageKind::UpdateRequest => Self::UpdateRequest(UpdateRequest {
                kind: reader.read_u8()?,
                input_bits: reader.read_u32()?,
            }),
            MessageKind::UpdateResponse => {
                let kind = reader.read_u8()?;
                let count = reader.read_i32()?;
                // Every record is at least 80 bits, so a count the buffer cannot hold is corrupt.
                if count < 0 || count as usize > reader.remaining_bits() / 80 {
                    return Err(ReplicationError::MalformedPlayerCount(count));
                }
                let mut players = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    players.push(PlayerPosition {
                        net_id: NetId(reader.read_u16()?),
                        position: Vec2::new(reader.read_f32()?, reader.read_f32()?),
                    });
                }
                Self::UpdateResponse(UpdateResponse { kind, players })
            }
        })
    }
}

fn write_optional_u32(writer: &mut BitWriter, value: Option<u32>) {
    writer.write_bit(value.is_some());
    if let Some(value) = value {
        writer.write_u32(value);
    }
}

fn read_optional_u32(reader: &mut BitReader) -> Result<Option<u32>, ReplicationError> {
    if reader.read_bit()? {
        Ok(Some(reader.read_u32()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: &Message) -> Message {
        let bytes = message.to_bytes();
        Message::read(&mut BitReader::new(&bytes)).unwrap()
    }

    #[test]
    fn snapshot_header_with_anchor() {
        let header = Message::Snapshot(SnapshotHeader {
            snapshot_id: 42,
            baseline: Some(40),
            last_executed: None,
            sim_time: 1.75,
            anchor: Some(Vec2::new(3.0, -2.5)),
            part: 1,
            part_count: 2,
            entity_count: 50,
        });
        assert_eq!(roundtrip(&header), header);
    }

    #[test]
    fn commands_carry_input_and_length() {
        let message = Message::Commands(ClientCommands {
            ack: None,
            sequence: 9,
            client_clock: 0.5,
            commands: vec![
                PlayerCommand::new(1, InputBits::UP | InputBits::SPRINT, 12),
                PlayerCommand::new(2, InputBits::empty(), 255),
            ],
        });
        assert_eq!(roundtrip(&message), message);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            Message::read(&mut BitReader::new(&[0x7f])),
            Err(ReplicationError::UnknownMessageKind(0x7f))
        ));
    }

    #[test]
    fn entity_cap_is_enforced_on_read() {
        let mut header = SnapshotHeader {
            snapshot_id: 1,
            baseline: None,
            last_executed: None,
            sim_time: 0.0,
            anchor: None,
            part: 0,
            part_count: 1,
            entity_count: 0,
        };
        header.entity_count = 51;
        let bytes = Message::Snapshot(header).to_bytes();
        assert!(matches!(
            Message::read(&mut BitReader::new(&bytes)),
            Err(ReplicationError::EntityCapExceeded(51))
        ));
    }

    #[test]
    fn truncated_spawn_is_a_codec_error() {
        let bytes = Message::Spawn(SpawnEntity {
            net_id: NetId(3),
            entity_type: EntityTypeId::of("player"),
            position: Vec2::ONE,
            owner: Some(2),
        })
        .to_bytes();
        let err = Message::read(&mut BitReader::new(&bytes[..bytes.len() - 2])).unwrap_err();
        assert!(matches!(err, ReplicationError::Codec(_)));
    }

    #[test]
    fn update_response_rejects_negative_count() {
        let mut writer = BitWriter::new();
        writer.write_u8(MessageKind::UpdateResponse as u8);
        writer.write_u8(0);
        writer.write_i32(-4);
        let bytes = writer.to_bytes();
        assert!(matches!(
            Message::read(&mut BitReader::new(&bytes)),
            Err(ReplicationError::MalformedPlayerCount(-4))
        ));
    }
}
