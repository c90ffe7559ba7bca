use std::collections::{BTreeMap, VecDeque};

use super::{NetId, NetIdentity};
use crate::error::ReplicationError;
use crate::net::ClientId;
use crate::replication::Role;

const ID_SPACE: u32 = u16::MAX as u32 + 1;

/// Field indexes and counts travel as a single byte.
pub const MAX_FIELDS_PER_ENTITY: usize = u8::MAX as usize;

#[derive(Debug)]
pub struct IdentityRegistry {
    role: Role,
    entries: BTreeMap<NetId, NetIdentity>,
    next_id: u32,
    /// Freed ids with the snapshot id current at release; drawn from once the
    /// u16 space runs out.
    released: VecDeque<(NetId, u32)>,
}

impl IdentityRegistry {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            entries: BTreeMap::new(),
            next_id: 0,
            released: VecDeque::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Server-side registration. `reuse_horizon` is the oldest snapshot id that
    /// may still be referenced; released ids are only recycled behind it.
    pub fn register(
        &mut self,
        mut identity: NetIdentity,
        reuse_horizon: Option<u32>,
    ) -> Result<NetId, ReplicationError> {
        if self.role != Role::Server {
            return Err(ReplicationError::NotAuthoritative);
        }
        check_field_count(&identity)?;
        let net_id = self.allocate(reuse_horizon)?;
        identity.assign(net_id);
        self.entries.insert(net_id, identity);
        Ok(net_id)
    }

    /// Client-side registration with the id carried by a spawn message.
    pub fn register_with_id(
        &mut self,
        mut identity: NetIdentity,
        net_id: NetId,
    ) -> Result<(), ReplicationError> {
        if self.entries.contains_key(&net_id) {
            return Err(ReplicationError::DuplicateNetId(net_id));
        }
        check_field_count(&identity)?;
        identity.assign(net_id);
        self.entries.insert(net_id, identity);
        Ok(())
    }

    pub fn unregister(&mut self, net_id: NetId, released_at: u32) -> Option<NetIdentity> {
        let identity = self.entries.remove(&net_id)?;
        if self.role == Role::Server {
            self.released.push_back((net_id, released_at));
        }
        Some(identity)
    }

    pub fn find_by_net_id(&self, net_id: NetId) -> Option<&NetIdentity> {
        self.entries.get(&net_id)
    }

    pub fn find_by_net_id_mut(&mut self, net_id: NetId) -> Option<&mut NetIdentity> {
        self.entries.get_mut(&net_id)
    }

    pub fn get(&self, net_id: NetId) -> Result<&NetIdentity, ReplicationError> {
        self.find_by_net_id(net_id)
            .ok_or(ReplicationError::UnknownNetId(net_id))
    }

    pub fn get_mut(&mut self, net_id: NetId) -> Result<&mut NetIdentity, ReplicationError> {
        self.find_by_net_id_mut(net_id)
            .ok_or(ReplicationError::UnknownNetId(net_id))
    }

    pub fn contains(&self, net_id: NetId) -> bool {
        self.entries.contains_key(&net_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NetId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetIdentity> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NetIdentity> {
        self.entries.values_mut()
    }

    /// The first entity owned by `client_id` that has a position field.
    pub fn avatar_of(&self, client_id: ClientId) -> Option<NetId> {
        self.entries
            .iter()
            .find(|(_, identity)| {
                identity.owner() == Some(client_id) && identity.position_field().is_some()
            })
            .map(|(&net_id, _)| net_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn allocate(&mut self, reuse_horizon: Option<u32>) -> Result<NetId, ReplicationError> {
        if self.next_id < ID_SPACE {
            let net_id = NetId(self.next_id as u16);
            self.next_id += 1;
            return Ok(net_id);
        }

        let reusable = self
            .released
            .front()
            .is_some_and(|&(_, released_at)| reuse_horizon.is_none_or(|h| h >= released_at));
        if !reusable {
            return Err(ReplicationError::NetIdExhausted);
        }
        self.released
            .pop_front()
            .map(|(net_id, _)| net_id)
            .ok_or(ReplicationError::NetIdExhausted)
    }
}

fn check_field_count(identity: &NetIdentity) -> Result<(), ReplicationError> {
    let count = identity.fields().len();
    if count > MAX_FIELDS_PER_ENTITY {
        return Err(ReplicationError::TooManyFields(count));
    }
    Ok(())
}
