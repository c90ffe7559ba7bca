use glam::Vec2;

use super::{Interpolation, SyncValue, SyncVar, UpdateFrequency};
use crate::codec::{BitReader, BitWriter};
use crate::error::ReplicationError;

/// One replicated field of an entity. The position of a field in its
/// entity's field list is its wire index.
#[derive(Debug, Clone)]
pub enum SyncField {
    Float(SyncVar<f32>),
    Int(SyncVar<i32>),
    Byte(SyncVar<u8>),
    Flag(SyncVar<bool>),
    Vector(SyncVar<Vec2>),
}

/// A decoded value not yet committed to its field's history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f32),
    Int(i32),
    Byte(u8),
    Flag(bool),
    Vector(Vec2),
}

macro_rules! each_field {
    ($field:expr, $var:ident => $body:expr) => {
        match $field {
            SyncField::Float($var) => $body,
            SyncField::Int($var) => $body,
            SyncField::Byte($var) => $body,
            SyncField::Flag($var) => $body,
            SyncField::Vector($var) => $body,
        }
    };
}

impl<T: SyncValue> From<SyncVar<T>> for SyncField {
    fn from(var: SyncVar<T>) -> Self {
        T::into_field(var)
    }
}

impl SyncField {
    pub fn as_var<T: SyncValue>(&self) -> Option<&SyncVar<T>> {
        T::from_field(self)
    }

    pub fn as_var_mut<T: SyncValue>(&mut self) -> Option<&mut SyncVar<T>> {
        T::from_field_mut(self)
    }

    pub fn interpolation(&self) -> Interpolation {
        each_field!(self, var => var.interpolation())
    }

    pub fn frequency(&self) -> UpdateFrequency {
        each_field!(self, var => var.frequency())
    }

    pub fn add_current_value_to_snapshots(&mut self, snapshot_id: u32, sim_time: f64) -> bool {
        each_field!(self, var => var.add_current_value_to_snapshots(snapshot_id, sim_time))
    }

    pub fn current_value_changed_from_sequence(&self, snapshot_id: Option<u32>) -> bool {
        each_field!(self, var => var.current_value_changed_from_sequence(snapshot_id))
    }

    pub fn write_value_deltaed_from_snapshot(
        &self,
        from: Option<u32>,
        to: u32,
        writer: &mut BitWriter,
    ) {
        each_field!(self, var => var.write_value_deltaed_from_snapshot(from, to, writer))
    }

    pub fn decode_value_deltaed(
        &self,
        from: Option<u32>,
        reader: &mut BitReader,
    ) -> Result<FieldValue, ReplicationError> {
        Ok(match self {
            SyncField::Float(var) => FieldValue::Float(var.decode_value_deltaed(from, reader)?),
            SyncField::Int(var) => FieldValue::Int(var.decode_value_deltaed(from, reader)?),
            SyncField::Byte(var) => FieldValue::Byte(var.decode_value_deltaed(from, reader)?),
            SyncField::Flag(var) => FieldValue::Flag(var.decode_value_deltaed(from, reader)?),
            SyncField::Vector(var) => FieldValue::Vector(var.decode_value_deltaed(from, reader)?),
        })
    }

    /// Returns false if the value's variant does not match this field.
    pub fn insert_received(&mut self, snapshot_id: u32, sim_time: f64, value: FieldValue) -> bool {
        match (self, value) {
            (SyncField::Float(var), FieldValue::Float(v)) => {
                var.insert_received(snapshot_id, sim_time, v);
            }
            (SyncField::Int(var), FieldValue::Int(v)) => {
                var.insert_received(snapshot_id, sim_time, v);
            }
            (SyncField::Byte(var), FieldValue::Byte(v)) => {
                var.insert_received(snapshot_id, sim_time, v);
            }
            (SyncField::Flag(var), FieldValue::Flag(v)) => {
                var.insert_received(snapshot_id, sim_time, v);
            }
            (SyncField::Vector(var), FieldValue::Vector(v)) => {
                var.insert_received(snapshot_id, sim_time, v);
            }
            _ => return false,
        }
        true
    }

    pub fn carry_forward(&mut self, baseline: u32, snapshot_id: u32, sim_time: f64) -> bool {
        each_field!(self, var => var.carry_forward(baseline, snapshot_id, sim_time))
    }

    pub fn set_current_value_to_value_at_time(&mut self, time: f64) -> bool {
        each_field!(self, var => var.set_current_value_to_value_at_time(time))
    }

    pub fn snapshot_count(&self) -> usize {
        each_field!(self, var => var.snapshots().len())
    }
}
