use fnv::FnvHashMap;
use glam::Vec2;

use super::{EntityTypeId, NetIdentity};
use crate::error::ReplicationError;

pub type PrototypeFn = fn(Vec2) -> NetIdentity;

/// Constructors both sides share so a spawn message can rebuild the same field layout.
#[derive(Debug, Default, Clone)]
pub struct Prototypes {
    constructors: FnvHashMap<EntityTypeId, PrototypeFn>,
}

impl Prototypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, constructor: PrototypeFn) -> EntityTypeId {
        let entity_type = EntityTypeId::of(name);
        if self.constructors.insert(entity_type, constructor).is_some() {
            log::warn!("Prototype '{}' ({}) registered twice", name, entity_type);
        }
        entity_type
    }

    pub fn contains(&self, entity_type: EntityTypeId) -> bool {
        self.constructors.contains_key(&entity_type)
    }

    pub fn instantiate(
        &self,
        entity_type: EntityTypeId,
        position: Vec2,
    ) -> Result<NetIdentity, ReplicationError> {
        let constructor = self
            .constructors
            .get(&entity_type)
            .ok_or(ReplicationError::UnknownEntityType(entity_type))?;
        Ok(constructor(position))
    }
}
