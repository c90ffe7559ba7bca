use crate::codec::CodecError;
use crate::identity::{EntityTypeId, MAX_FIELDS_PER_ENTITY, NetId};
use crate::net::{ClientId, MAX_ENTITIES_PER_SNAPSHOT, MessageKind};
use crate::sync::DeltaMode;

/// How a failure should be handled by the embedding game loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input: drop the message and carry on.
    ProtocolCorruption,
    /// Missing history: schedule a full resync for the affected client.
    Desync,
    /// A logic error in the owning game code.
    Invariant,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u8),
    #[error("{0:?} message is not valid in this direction")]
    UnexpectedMessage(MessageKind),
    #[error("snapshot carries {0} entities, limit is {max}", max = MAX_ENTITIES_PER_SNAPSHOT)]
    EntityCapExceeded(usize),
    #[error("snapshot part {part} of {part_count} is out of range")]
    MalformedSnapshotPart { part: u8, part_count: u8 },
    #[error("update response claims {0} players")]
    MalformedPlayerCount(i32),
    #[error("snapshot references unknown entity {0}")]
    UnknownSnapshotEntity(NetId),
    #[error("entity {net_id} has no field with index {index}")]
    UnknownFieldIndex { net_id: NetId, index: u8 },
    #[error("field {index} of entity {net_id} received a value of the wrong type")]
    FieldTypeMismatch { net_id: NetId, index: u8 },
    #[error("no prototype registered for entity type {0}")]
    UnknownEntityType(EntityTypeId),
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
    #[error("baseline snapshot {snapshot_id} is not in the local history")]
    BaselineMissing { snapshot_id: u32 },
    #[error("snapshot {snapshot_id} has aged out of the history")]
    SnapshotExpired { snapshot_id: u32 },
    #[error("no entity registered with net id {0}")]
    UnknownNetId(NetId),
    #[error("net id {0} is already registered")]
    DuplicateNetId(NetId),
    #[error("entity declares {0} fields, limit is {max}", max = MAX_FIELDS_PER_ENTITY)]
    TooManyFields(usize),
    #[error("net id space exhausted")]
    NetIdExhausted,
    #[error("sync var written on a non-server instance")]
    NotAuthoritative,
    #[error("delta mode {0:?} is not supported by this value type")]
    UnsupportedDeltaMode(DeltaMode),
}

impl ReplicationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Codec(_)
            | Self::UnknownMessageKind(_)
            | Self::UnexpectedMessage(_)
            | Self::EntityCapExceeded(_)
            | Self::MalformedSnapshotPart { .. }
            | Self::MalformedPlayerCount(_)
            | Self::UnknownSnapshotEntity(_)
            | Self::UnknownFieldIndex { .. }
            | Self::FieldTypeMismatch { .. }
            | Self::UnknownEntityType(_)
            | Self::UnknownClient(_) => ErrorClass::ProtocolCorruption,
            Self::BaselineMissing { .. } | Self::SnapshotExpired { .. } => ErrorClass::Desync,
            Self::UnknownNetId(_)
            | Self::DuplicateNetId(_)
            | Self::TooManyFields(_)
            | Self::NetIdExhausted
            | Self::NotAuthoritative
            | Self::UnsupportedDeltaMode(_) => ErrorClass::Invariant,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() != ErrorClass::Invariant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_cap_message_names_the_limit() {
        let err = ReplicationError::EntityCapExceeded(51);
        assert_eq!(err.to_string(), "snapshot carries 51 entities, limit is 50");
        assert_eq!(err.class(), ErrorClass::ProtocolCorruption);
    }

    #[test]
    fn codec_errors_convert() {
        let err: ReplicationError = CodecError::VarIntOverflow.into();
        assert!(matches!(err, ReplicationError::Codec(CodecError::VarIntOverflow)));
        assert!(err.is_recoverable());
    }
}
