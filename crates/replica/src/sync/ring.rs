use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot<T> {
    pub value: T,
    pub sim_time: f64,
    pub snapshot_id: u32,
}

/// Bounded history ordered by both `sim_time` and `snapshot_id`.
#[derive(Debug, Clone)]
pub struct SnapshotRing<T> {
    snapshots: VecDeque<Snapshot<T>>,
    capacity: usize,
}

impl<T: Copy> SnapshotRing<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns false when the snapshot does not advance both time and id.
    pub fn push(&mut self, snapshot: Snapshot<T>) -> bool {
        if let Some(latest) = self.snapshots.back() {
            if snapshot.sim_time <= latest.sim_time || snapshot.snapshot_id <= latest.snapshot_id {
                return false;
            }
        }
        if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        true
    }

    pub fn get(&self, snapshot_id: u32) -> Option<&Snapshot<T>> {
        self.snapshots
            .binary_search_by_key(&snapshot_id, |s| s.snapshot_id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// The pair of snapshots surrounding `time`, or a single clamped snapshot
    /// when `time` falls outside the retained window.
    pub fn bracket(&self, time: f64) -> Option<(&Snapshot<T>, Option<&Snapshot<T>>)> {
        let first = self.snapshots.front()?;
        if time <= first.sim_time {
            return Some((first, None));
        }
        let after = self.snapshots.partition_point(|s| s.sim_time <= time);
        if after >= self.snapshots.len() {
            return self.snapshots.back().map(|last| (last, None));
        }
        Some((&self.snapshots[after - 1], Some(&self.snapshots[after])))
    }

    pub fn oldest(&self) -> Option<&Snapshot<T>> {
        self.snapshots.front()
    }

    pub fn latest(&self) -> Option<&Snapshot<T>> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot<T>> {
        self.snapshots.iter()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
