use super::CodecError;

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position)
    }

    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        self.ensure(1)?;
        Ok(self.take_bit())
    }

    pub fn read_bits(&mut self, bits: u8) -> Result<u32, CodecError> {
        debug_assert!(bits <= 32);
        self.ensure(bits)?;
        let mut value = 0u32;
        for i in 0..bits {
            if self.take_bit() {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.read_bits(32)
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(self.read_bits(16)? as u16 as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_bits(32)? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        let low = self.read_bits(32)? as u64;
        let high = self.read_bits(32)? as u64;
        Ok(f64::from_bits(low | (high << 32)))
    }

    pub fn read_varint(&mut self) -> Result<u32, CodecError> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            if shift >= 32 {
                return Err(CodecError::VarIntOverflow);
            }
            let more = self.read_bit()?;
            let group = self.read_bits(7)?;
            // The fifth group holds only the top four bits of a u32.
            if shift == 28 && group > 0x0F {
                return Err(CodecError::VarIntOverflow);
            }
            value |= group << shift;
            shift += 7;
            if !more {
                return Ok(value);
            }
        }
    }

    fn ensure(&self, bits: u8) -> Result<(), CodecError> {
        if self.remaining_bits() < bits as usize {
            return Err(CodecError::UnexpectedEnd {
                position: self.position,
                requested: bits,
            });
        }
        Ok(())
    }

    fn take_bit(&mut self) -> bool {
        let byte = self.data[self.position / 8];
        let bit = (byte >> (self.position % 8)) & 1 != 0;
        self.position += 1;
        bit
    }
}
