mod field;
mod ring;
mod value;

pub use field::{FieldValue, SyncField};
pub use ring::{Snapshot, SnapshotRing};
pub use value::{
    OFFSET_BITS, OFFSET_MAX, OFFSET_MIN, OFFSET_SENTINEL, SyncValue, pack_offset, unpack_offset,
};

use serde::{Deserialize, Serialize};

use crate::codec::{BitReader, BitWriter};
use crate::error::ReplicationError;
use crate::replication::Role;

pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    None,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeltaMode {
    #[default]
    Full,
    /// 2-D vectors only: 9-bit per-snapshot integer offsets with a full-value fallback.
    SmallIntegerOffset,
}

/// Send-cadence hint for the owning game code; never enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateFrequency {
    #[default]
    Frequent,
    Infrequent,
}

#[derive(Debug, Clone)]
pub struct SyncVar<T: SyncValue> {
    value: T,
    changed: bool,
    snapshots: SnapshotRing<T>,
    interpolation: Interpolation,
    delta_mode: DeltaMode,
    frequency: UpdateFrequency,
}

impl<T: SyncValue> Default for SyncVar<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: SyncValue> SyncVar<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            changed: false,
            snapshots: SnapshotRing::new(DEFAULT_SNAPSHOT_CAPACITY),
            interpolation: Interpolation::None,
            delta_mode: DeltaMode::Full,
            frequency: UpdateFrequency::Frequent,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.snapshots = SnapshotRing::new(capacity);
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_delta_mode(mut self, delta_mode: DeltaMode) -> Result<Self, ReplicationError> {
        if delta_mode == DeltaMode::SmallIntegerOffset && !T::SUPPORTS_OFFSET {
            return Err(ReplicationError::UnsupportedDeltaMode(delta_mode));
        }
        self.delta_mode = delta_mode;
        Ok(self)
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn delta_mode(&self) -> DeltaMode {
        self.delta_mode
    }

    pub fn frequency(&self) -> UpdateFrequency {
        self.frequency
    }

    pub fn snapshots(&self) -> &SnapshotRing<T> {
        &self.snapshots
    }

    pub fn set_value(&mut self, role: Role, value: T) -> Result<(), ReplicationError> {
        if role != Role::Server {
            return Err(ReplicationError::NotAuthoritative);
        }
        self.value = value;
        Ok(())
    }

    /// Client-side assignment of a value that arrived from the server.
    pub(crate) fn apply_remote(&mut self, value: T) {
        self.changed = self.value != value;
        self.value = value;
    }

    pub fn add_current_value_to_snapshots(&mut self, snapshot_id: u32, sim_time: f64) -> bool {
        self.snapshots.push(Snapshot {
            value: self.value,
            sim_time,
            snapshot_id,
        })
    }

    pub fn try_value_at_snapshot(&self, snapshot_id: u32) -> Option<T> {
        self.snapshots.get(snapshot_id).map(|s| s.value)
    }

    /// True when there is no snapshot for `snapshot_id` to compare against.
    pub fn current_value_changed_from_sequence(&self, snapshot_id: Option<u32>) -> bool {
        match snapshot_id.and_then(|id| self.try_value_at_snapshot(id)) {
            Some(previous) => previous != self.value,
            None => true,
        }
    }

    pub fn write_value_deltaed_from_snapshot(
        &self,
        from: Option<u32>,
        to: u32,
        writer: &mut BitWriter,
    ) {
        let target = self.try_value_at_snapshot(to).unwrap_or(self.value);
        match self.delta_mode {
            DeltaMode::Full => target.write_full(writer),
            DeltaMode::SmallIntegerOffset => {
                let baseline = from.and_then(|id| self.try_value_at_snapshot(id));
                T::write_offset(baseline.as_ref(), &target, writer);
            }
        }
    }

    /// Decodes without touching the history; see [`Self::insert_received`].
    pub fn decode_value_deltaed(
        &self,
        from: Option<u32>,
        reader: &mut BitReader,
    ) -> Result<T, ReplicationError> {
        match self.delta_mode {
            DeltaMode::Full => Ok(T::read_full(reader)?),
            DeltaMode::SmallIntegerOffset => {
                let baseline = from.and_then(|id| self.try_value_at_snapshot(id));
                T::read_offset(baseline.as_ref(), reader)?.ok_or(
                    ReplicationError::BaselineMissing {
                        snapshot_id: from.unwrap_or(u32::MAX),
                    },
                )
            }
        }
    }

    pub fn insert_received(&mut self, snapshot_id: u32, sim_time: f64, value: T) -> bool {
        let inserted = self.snapshots.push(Snapshot {
            value,
            sim_time,
            snapshot_id,
        });
        if inserted && self.interpolation == Interpolation::None {
            self.apply_remote(value);
        }
        inserted
    }

    /// Records the value held at `baseline` under `snapshot_id`, for a
    /// snapshot that left this field out because it matched the baseline.
    pub fn carry_forward(&mut self, baseline: u32, snapshot_id: u32, sim_time: f64) -> bool {
        if self.snapshots.get(snapshot_id).is_some() {
            return false;
        }
        let Some(value) = self.try_value_at_snapshot(baseline) else {
            return false;
        };
        self.insert_received(snapshot_id, sim_time, value)
    }

    pub fn read_value_deltaed_from_sequence(
        &mut self,
        from: Option<u32>,
        to: u32,
        sim_time: f64,
        reader: &mut BitReader,
    ) -> Result<T, ReplicationError> {
        let value = self.decode_value_deltaed(from, reader)?;
        self.insert_received(to, sim_time, value);
        Ok(value)
    }

    pub fn value_at_time(&self, time: f64) -> T {
        let Some((earlier, later)) = self.snapshots.bracket(time) else {
            return self.value;
        };
        let Some(later) = later else {
            return earlier.value;
        };
        if self.interpolation == Interpolation::Linear {
            let span = later.sim_time - earlier.sim_time;
            let t = ((time - earlier.sim_time) / span) as f32;
            if let Some(blended) = earlier.value.lerp(&later.value, t) {
                return blended;
            }
        }
        earlier.value
    }

    pub fn set_current_value_to_value_at_time(&mut self, time: f64) -> bool {
        let value = self.value_at_time(time);
        self.apply_remote(value);
        self.changed
    }
}
