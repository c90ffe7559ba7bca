use std::fmt;

use glam::Vec2;

use super::{SyncField, SyncVar};
use crate::codec::{BitReader, BitWriter, CodecError};

pub const OFFSET_BITS: u8 = 9;
pub const OFFSET_SENTINEL: u32 = 511;
pub const OFFSET_MIN: i32 = -11;
pub const OFFSET_MAX: i32 = 10;
const OFFSET_SPAN: i32 = 22;

/// A type a [`SyncVar`] can replicate.
pub trait SyncValue: Copy + PartialEq + Default + fmt::Debug + 'static {
    const SUPPORTS_OFFSET: bool = false;

    fn write_full(&self, writer: &mut BitWriter);

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError>;

    fn lerp(&self, _other: &Self, _t: f32) -> Option<Self> {
        None
    }

    fn write_offset(_baseline: Option<&Self>, target: &Self, writer: &mut BitWriter) {
        target.write_full(writer);
    }

    /// `Ok(None)` means the encoding referenced a baseline the caller does not have.
    fn read_offset(
        _baseline: Option<&Self>,
        reader: &mut BitReader,
    ) -> Result<Option<Self>, CodecError> {
        Self::read_full(reader).map(Some)
    }

    fn into_field(var: SyncVar<Self>) -> SyncField;

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>>;

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>>;
}

impl SyncValue for f32 {
    fn write_full(&self, writer: &mut BitWriter) {
        writer.write_f32(*self);
    }

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError> {
        reader.read_f32()
    }

    fn lerp(&self, other: &Self, t: f32) -> Option<Self> {
        Some(self + (other - self) * t)
    }

    fn into_field(var: SyncVar<Self>) -> SyncField {
        SyncField::Float(var)
    }

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>> {
        match field {
            SyncField::Float(var) => Some(var),
            _ => None,
        }
    }

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>> {
        match field {
            SyncField::Float(var) => Some(var),
            _ => None,
        }
    }
}

impl SyncValue for i32 {
    fn write_full(&self, writer: &mut BitWriter) {
        writer.write_i32(*self);
    }

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError> {
        reader.read_i32()
    }

    fn into_field(var: SyncVar<Self>) -> SyncField {
        SyncField::Int(var)
    }

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>> {
        match field {
            SyncField::Int(var) => Some(var),
            _ => None,
        }
    }

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>> {
        match field {
            SyncField::Int(var) => Some(var),
            _ => None,
        }
    }
}

impl SyncValue for u8 {
    fn write_full(&self, writer: &mut BitWriter) {
        writer.write_u8(*self);
    }

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError> {
        reader.read_u8()
    }

    fn into_field(var: SyncVar<Self>) -> SyncField {
        SyncField::Byte(var)
    }

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>> {
        match field {
            SyncField::Byte(var) => Some(var),
            _ => None,
        }
    }

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>> {
        match field {
            SyncField::Byte(var) => Some(var),
            _ => None,
        }
    }
}

impl SyncValue for bool {
    fn write_full(&self, writer: &mut BitWriter) {
        writer.write_bit(*self);
    }

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError> {
        reader.read_bit()
    }

    fn into_field(var: SyncVar<Self>) -> SyncField {
        SyncField::Flag(var)
    }

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>> {
        match field {
            SyncField::Flag(var) => Some(var),
            _ => None,
        }
    }

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>> {
        match field {
            SyncField::Flag(var) => Some(var),
            _ => None,
        }
    }
}

impl SyncValue for Vec2 {
    const SUPPORTS_OFFSET: bool = true;

    fn write_full(&self, writer: &mut BitWriter) {
        writer.write_f32(self.x);
        writer.write_f32(self.y);
    }

    fn read_full(reader: &mut BitReader) -> Result<Self, CodecError> {
        Ok(Vec2::new(reader.read_f32()?, reader.read_f32()?))
    }

    fn lerp(&self, other: &Self, t: f32) -> Option<Self> {
        Some(Vec2::lerp(*self, *other, t))
    }

    fn write_offset(baseline: Option<&Self>, target: &Self, writer: &mut BitWriter) {
        let packed = baseline.and_then(|base| {
            let dx = round_axis(target.x) - round_axis(base.x);
            let dy = round_axis(target.y) - round_axis(base.y);
            pack_offset(dx, dy)
        });

        match packed {
            Some(encoded) => writer.write_bits(encoded, OFFSET_BITS),
            None => {
                writer.write_bits(OFFSET_SENTINEL, OFFSET_BITS);
                writer.write_i16(clamp_axis(target.x));
                writer.write_i16(clamp_axis(target.y));
            }
        }
    }

    fn read_offset(
        baseline: Option<&Self>,
        reader: &mut BitReader,
    ) -> Result<Option<Self>, CodecError> {
        let encoded = reader.read_bits(OFFSET_BITS)?;
        if encoded == OFFSET_SENTINEL {
            let x = reader.read_i16()?;
            let y = reader.read_i16()?;
            return Ok(Some(Vec2::new(x as f32, y as f32)));
        }

        let Some(base) = baseline else {
            return Ok(None);
        };
        let (dx, dy) = unpack_offset(encoded);
        Ok(Some(Vec2::new(
            (round_axis(base.x) + dx) as f32,
            (round_axis(base.y) + dy) as f32,
        )))
    }

    fn into_field(var: SyncVar<Self>) -> SyncField {
        SyncField::Vector(var)
    }

    fn from_field(field: &SyncField) -> Option<&SyncVar<Self>> {
        match field {
            SyncField::Vector(var) => Some(var),
            _ => None,
        }
    }

    fn from_field_mut(field: &mut SyncField) -> Option<&mut SyncVar<Self>> {
        match field {
            SyncField::Vector(var) => Some(var),
            _ => None,
        }
    }
}

/// Packs a per-axis offset as `(dx + 11) * 22 + (dy + 11)`; `None` outside `[-11, 10]`.
pub fn pack_offset(dx: i32, dy: i32) -> Option<u32> {
    let in_range = |d: i32| (OFFSET_MIN..=OFFSET_MAX).contains(&d);
    if !in_range(dx) || !in_range(dy) {
        return None;
    }
    Some(((dx - OFFSET_MIN) * OFFSET_SPAN + (dy - OFFSET_MIN)) as u32)
}

pub fn unpack_offset(encoded: u32) -> (i32, i32) {
    let encoded = encoded as i32;
    (
        encoded / OFFSET_SPAN + OFFSET_MIN,
        encoded % OFFSET_SPAN + OFFSET_MIN,
    )
}

fn round_axis(value: f32) -> i32 {
    value.round() as i32
}

fn clamp_axis(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(baseline: Option<Vec2>, target: Vec2) -> Vec<u8> {
        let mut writer = BitWriter::new();
        Vec2::write_offset(baseline.as_ref(), &target, &mut writer);
        writer.to_bytes()
    }

    #[test]
    fn packs_two_one_offset() {
        assert_eq!(pack_offset(2, 1), Some(13 * 22 + 12));
        assert_eq!(unpack_offset(13 * 22 + 12), (2, 1));
    }

    #[test]
    fn packing_never_collides_with_sentinel() {
        let mut seen = std::collections::HashSet::new();
        for dx in OFFSET_MIN..=OFFSET_MAX {
            for dy in OFFSET_MIN..=OFFSET_MAX {
                let encoded = pack_offset(dx, dy).unwrap();
                assert!(encoded < OFFSET_SENTINEL);
                assert!(seen.insert(encoded));
            }
        }
        assert_eq!(seen.len(), 484);
        assert_eq!(pack_offset(11, 0), None);
        assert_eq!(pack_offset(0, -12), None);
    }

    #[test]
    fn offset_path_uses_nine_bits() {
        let bytes = encode(Some(Vec2::new(10.0, 10.0)), Vec2::new(12.0, 11.0));
        assert_eq!(bytes.len(), 2);

        let mut reader = BitReader::new(&bytes);
        let decoded = Vec2::read_offset(Some(&Vec2::new(10.0, 10.0)), &mut reader).unwrap();
        assert_eq!(decoded, Some(Vec2::new(12.0, 11.0)));
        assert_eq!(reader.position(), 9);
    }

    #[test]
    fn missing_baseline_forces_sentinel() {
        let bytes = encode(None, Vec2::new(3.0, 4.0));
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(OFFSET_BITS).unwrap(), OFFSET_SENTINEL);

        let mut reader = BitReader::new(&bytes);
        let decoded = Vec2::read_offset(None, &mut reader).unwrap();
        assert_eq!(decoded, Some(Vec2::new(3.0, 4.0)));
    }

    #[test]
    fn offset_without_local_baseline_reports_missing() {
        let bytes = encode(Some(Vec2::ZERO), Vec2::new(1.0, 1.0));
        let mut reader = BitReader::new(&bytes);
        assert_eq!(Vec2::read_offset(None, &mut reader).unwrap(), None);
    }

    #[test]
    fn sub_unit_precision_is_discarded() {
        let bytes = encode(Some(Vec2::new(0.4, 0.0)), Vec2::new(2.3, -1.6));
        let mut reader = BitReader::new(&bytes);
        let decoded = Vec2::read_offset(Some(&Vec2::ZERO), &mut reader).unwrap();
        assert_eq!(decoded, Some(Vec2::new(2.0, -2.0)));
    }

    #[test]
    fn scalar_types_have_no_interpolation_for_ints() {
        assert_eq!(SyncValue::lerp(&3i32, &5, 0.5), None);
        assert_eq!(SyncValue::lerp(&2.0f32, &4.0, 0.25), Some(2.5));
    }
}
