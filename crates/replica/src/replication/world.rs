use std::collections::{BTreeSet, VecDeque};

use crate::identity::NetId;

/// The set of entities registered when a snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldState {
    pub snapshot_id: u32,
    pub entities: BTreeSet<NetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldDiff {
    pub added: Vec<NetId>,
    pub removed: Vec<NetId>,
}

impl WorldDiff {
    pub fn between(from: &BTreeSet<NetId>, to: &BTreeSet<NetId>) -> Self {
        Self {
            added: to.difference(from).copied().collect(),
            removed: from.difference(to).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug)]
pub struct WorldHistory {
    states: VecDeque<WorldState>,
    capacity: usize,
}

impl WorldHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, state: WorldState) {
        if self.states.len() >= self.capacity {
            self.states.pop_front();
        }
        self.states.push_back(state);
    }

    pub fn get(&self, snapshot_id: u32) -> Option<&WorldState> {
        self.states
            .binary_search_by_key(&snapshot_id, |state| state.snapshot_id)
            .ok()
            .and_then(|index| self.states.get(index))
    }

    pub fn oldest_id(&self) -> Option<u32> {
        self.states.front().map(|state| state.snapshot_id)
    }

    pub fn latest(&self) -> Option<&WorldState> {
        self.states.back()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
