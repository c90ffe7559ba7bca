mod client;
mod client_state;
mod server;
mod world;

pub use client::{ClientEvent, ClientReplication};
pub use client_state::ClientState;
pub use server::ServerReplication;
pub use world::{WorldDiff, WorldHistory, WorldState};

use crate::codec::{BitReader, BitWriter};
use crate::error::ReplicationError;
use crate::identity::{IdentityRegistry, NetId, NetIdentity};
use crate::sync::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPhase {
    #[default]
    Idle,
    Collecting,
    Snapshotting,
    Sending,
}

/// Field indices of one entity that go into a snapshot part.
#[derive(Debug)]
struct EntityUpdate {
    net_id: NetId,
    full: bool,
    fields: Vec<u8>,
}

fn write_entity_update(
    writer: &mut BitWriter,
    identity: &NetIdentity,
    update: &EntityUpdate,
    baseline: Option<u32>,
    snapshot_id: u32,
) {
    let from = if update.full { None } else { baseline };
    writer.write_u16(update.net_id.id());
    writer.write_bit(update.full);
    writer.write_u8(update.fields.len() as u8);
    for &index in &update.fields {
        writer.write_u8(index);
        if let Some(field) = identity.field(index as usize) {
            field.write_value_deltaed_from_snapshot(from, snapshot_id, writer);
        }
    }
}

/// A decoded entity record, not yet committed to any field history.
#[derive(Debug)]
struct DecodedEntity {
    net_id: NetId,
    values: Vec<(u8, FieldValue)>,
}

fn read_entity_update(
    reader: &mut BitReader,
    registry: &IdentityRegistry,
    baseline: Option<u32>,
) -> Result<DecodedEntity, ReplicationError> {
    let net_id = NetId(reader.read_u16()?);
    let full = reader.read_bit()?;
    let field_count = reader.read_u8()?;
    let identity = registry
        .find_by_net_id(net_id)
        .ok_or(ReplicationError::UnknownSnapshotEntity(net_id))?;

    let from = if full { None } else { baseline };
    let mut values = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let index = reader.read_u8()?;
        let field = identity
            .field(index as usize)
            .ok_or(ReplicationError::UnknownFieldIndex { net_id, index })?;
        values.push((index, field.decode_value_deltaed(from, reader)?));
    }
    Ok(DecodedEntity { net_id, values })
}
