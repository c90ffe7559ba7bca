mod prototype;
mod registry;

pub use prototype::Prototypes;
pub use registry::{IdentityRegistry, MAX_FIELDS_PER_ENTITY};

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;
use glam::Vec2;

use crate::error::ReplicationError;
use crate::net::ClientId;
use crate::replication::Role;
use crate::sync::{SyncField, SyncValue, SyncVar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub u16);

impl NetId {
    pub fn id(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hashed entity type name, stable across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityTypeId(pub u32);

impl EntityTypeId {
    pub fn of(name: &str) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(name.as_bytes());
        let hash = hasher.finish();
        Self((hash ^ (hash >> 32)) as u32)
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct NetIdentity {
    net_id: Option<NetId>,
    entity_type: EntityTypeId,
    owner: Option<ClientId>,
    fields: Vec<SyncField>,
    position_field: Option<usize>,
}

impl NetIdentity {
    pub fn new(entity_type: EntityTypeId) -> Self {
        Self {
            net_id: None,
            entity_type,
            owner: None,
            fields: Vec::new(),
            position_field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<SyncField>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Adds the field that spawn messages, prediction and update responses treat as position.
    pub fn with_position(mut self, position: SyncVar<Vec2>) -> Self {
        self.position_field = Some(self.fields.len());
        self.fields.push(position.into());
        self
    }

    pub fn owned_by(mut self, client_id: ClientId) -> Self {
        self.owner = Some(client_id);
        self
    }

    pub fn net_id(&self) -> Option<NetId> {
        self.net_id
    }

    pub(crate) fn assign(&mut self, net_id: NetId) {
        self.net_id = Some(net_id);
    }

    pub fn entity_type(&self) -> EntityTypeId {
        self.entity_type
    }

    pub fn owner(&self) -> Option<ClientId> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: Option<ClientId>) {
        self.owner = owner;
    }

    pub fn fields(&self) -> &[SyncField] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [SyncField] {
        &mut self.fields
    }

    pub fn field(&self, index: usize) -> Option<&SyncField> {
        self.fields.get(index)
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut SyncField> {
        self.fields.get_mut(index)
    }

    pub fn sync_var<T: SyncValue>(&self, index: usize) -> Option<&SyncVar<T>> {
        self.fields.get(index).and_then(SyncField::as_var)
    }

    pub fn sync_var_mut<T: SyncValue>(&mut self, index: usize) -> Option<&mut SyncVar<T>> {
        self.fields.get_mut(index).and_then(SyncField::as_var_mut)
    }

    pub fn position_field(&self) -> Option<usize> {
        self.position_field
    }

    pub fn position(&self) -> Option<Vec2> {
        self.position_field
            .and_then(|index| self.sync_var::<Vec2>(index))
            .map(SyncVar::value)
    }

    pub fn set_position(&mut self, role: Role, position: Vec2) -> Result<(), ReplicationError> {
        let Some(index) = self.position_field else {
            return Ok(());
        };
        match self.sync_var_mut::<Vec2>(index) {
            Some(var) => var.set_value(role, position),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_remote_position(&mut self, position: Vec2) {
        if let Some(var) = self
            .position_field
            .and_then(|index| self.fields.get_mut(index))
            .and_then(SyncField::as_var_mut::<Vec2>)
        {
            var.apply_remote(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_is_stable() {
        assert_eq!(EntityTypeId::of("player"), EntityTypeId::of("player"));
        assert_ne!(EntityTypeId::of("player"), EntityTypeId::of("crate"));
    }

    #[test]
    fn field_order_is_declaration_order() {
        let identity = NetIdentity::new(EntityTypeId::of("player"))
            .with_field(SyncVar::new(100i32))
            .with_position(SyncVar::new(Vec2::new(1.0, 2.0)))
            .with_field(SyncVar::new(false));

        assert_eq!(identity.fields().len(), 3);
        assert_eq!(identity.position_field(), Some(1));
        assert_eq!(identity.position(), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(identity.sync_var::<i32>(0).map(SyncVar::value), Some(100));
        assert!(identity.sync_var::<bool>(1).is_none());
        assert!(identity.net_id().is_none());
    }

    #[test]
    fn position_write_requires_server() {
        let mut identity = NetIdentity::new(EntityTypeId::of("player"))
            .with_position(SyncVar::new(Vec2::ZERO));
        assert!(identity.set_position(Role::Client, Vec2::ONE).is_err());
        identity.set_position(Role::Server, Vec2::ONE).unwrap();
        assert_eq!(identity.position(), Some(Vec2::ONE));
    }
}
