#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    pub fn bits_written(&self) -> usize {
        self.bit_len
    }

    pub fn bytes_written(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.buffer.push(0);
        }
        if bit {
            if let Some(last) = self.buffer.last_mut() {
                *last |= 1 << offset;
            }
        }
        self.bit_len += 1;
    }

    /// Writes the low `bits` bits of `value`, least significant first.
    pub fn write_bits(&mut self, value: u32, bits: u8) {
        debug_assert!(bits <= 32);
        for i in 0..bits {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bits(value as u32, 16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bits(value as u16 as u32, 16);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bits(value as u32, 32);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    pub fn write_f64(&mut self, value: f64) {
        let bits = value.to_bits();
        self.write_bits(bits as u32, 32);
        self.write_bits((bits >> 32) as u32, 32);
    }

    /// 7-bit groups, each preceded by a continuation bit.
    pub fn write_varint(&mut self, mut value: u32) {
        loop {
            let more = value >= 0x80;
            self.write_bit(more);
            self.write_bits(value & 0x7F, 7);
            value >>= 7;
            if !more {
                break;
            }
        }
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}
