use crate::error::DecodeError;
use crate::field::class::ByteOrder;

/// Bit-granular read cursor over a packet buffer.
///
/// Little-endian data uses LSB-first bit numbering within a byte,
/// big-endian data MSB-first, matching the usual CTF bitfield packing.
/// Multi-byte values are reassembled according to the byte order; the
/// packing never reorders bits within a byte.
#[derive(Clone, Debug)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position_bits(&self) -> u64 {
        self.pos
    }

    pub fn total_bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    pub fn remaining_bits(&self) -> u64 {
        self.total_bits().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.total_bits()
    }

    fn truncated(&self, needed: u64) -> DecodeError {
        DecodeError::Truncated {
            offset: self.pos,
            needed,
            available: self.remaining_bits(),
        }
    }

    /// Move the cursor to an absolute bit position, e.g. to skip packet
    /// padding. The end of the buffer is a valid position.
    pub fn seek_to(&mut self, position_bits: u64) -> Result<(), DecodeError> {
        if position_bits > self.total_bits() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: position_bits.saturating_sub(self.pos),
                available: self.remaining_bits(),
            });
        }
        self.pos = position_bits;
        Ok(())
    }

    /// Pad the position forward to the next multiple of `alignment_bits`.
    pub fn align_to(&mut self, alignment_bits: u8) -> Result<(), DecodeError> {
        let align = u64::from(alignment_bits.max(1));
        let aligned = self.pos.div_ceil(align) * align;
        self.seek_to(aligned)
    }

    fn bit_at(&self, pos: u64, order: ByteOrder) -> u8 {
        let byte = self.data[(pos / 8) as usize];
        let within = (pos % 8) as u8;
        match order {
            ByteOrder::Little => (byte >> within) & 1,
            ByteOrder::Big => (byte >> (7 - within)) & 1,
        }
    }

    /// Read `count` bits (1..=64) and reassemble them per `order`.
    pub fn read_bits(&mut self, count: u8, order: ByteOrder) -> Result<u64, DecodeError> {
        let count_bits = u64::from(count);
        if self.remaining_bits() < count_bits {
            return Err(self.truncated(count_bits));
        }
        let mut value = 0u64;
        match order {
            ByteOrder::Little => {
                for i in 0..count {
                    let bit = self.bit_at(self.pos + u64::from(i), order);
                    value |= u64::from(bit) << i;
                }
            }
            ByteOrder::Big => {
                for i in 0..count {
                    let bit = self.bit_at(self.pos + u64::from(i), order);
                    value = (value << 1) | u64::from(bit);
                }
            }
        }
        self.pos += count_bits;
        Ok(value)
    }

    /// Read bytes up to and including a NUL terminator; the terminator is
    /// consumed but not returned. The cursor must be byte aligned.
    pub fn read_null_terminated_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        debug_assert_eq!(self.pos % 8, 0);
        let start = (self.pos / 8) as usize;
        let nul = self.data[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| self.truncated(self.remaining_bits() + 8))?;
        let bytes = self.data[start..start + nul].to_vec();
        self.pos += (nul as u64 + 1) * 8;
        Ok(bytes)
    }
}

/// Bit-granular append-only writer, the encoding mirror of [`BitCursor`].
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    pos: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_bits(&self) -> u64 {
        self.pos
    }

    fn ensure_capacity(&mut self, end_bits: u64) {
        let bytes_needed = end_bits.div_ceil(8) as usize;
        if self.buf.len() < bytes_needed {
            self.buf.resize(bytes_needed, 0);
        }
    }

    /// Zero-pad forward to the next multiple of `alignment_bits`.
    pub fn align_to(&mut self, alignment_bits: u8) {
        let align = u64::from(alignment_bits.max(1));
        self.pos = self.pos.div_ceil(align) * align;
        self.ensure_capacity(self.pos);
    }

    /// Zero-pad forward to an absolute bit position (packet padding).
    pub fn pad_to(&mut self, position_bits: u64) {
        if position_bits > self.pos {
            self.pos = position_bits;
            self.ensure_capacity(self.pos);
        }
    }

    fn set_bit(&mut self, pos: u64, bit: u8, order: ByteOrder) {
        let byte = (pos / 8) as usize;
        let within = (pos % 8) as u8;
        let mask = match order {
            ByteOrder::Little => 1u8 << within,
            ByteOrder::Big => 1u8 << (7 - within),
        };
        if bit != 0 {
            self.buf[byte] |= mask;
        } else {
            self.buf[byte] &= !mask;
        }
    }

    /// Write the low `count` bits of `value` per `order`.
    pub fn write_bits(&mut self, value: u64, count: u8, order: ByteOrder) {
        self.ensure_capacity(self.pos + u64::from(count));
        match order {
            ByteOrder::Little => {
                for i in 0..count {
                    let bit = ((value >> i) & 1) as u8;
                    self.set_bit(self.pos + u64::from(i), bit, order);
                }
            }
            ByteOrder::Big => {
                for i in 0..count {
                    let bit = ((value >> (count - 1 - i)) & 1) as u8;
                    self.set_bit(self.pos + u64::from(i), bit, order);
                }
            }
        }
        self.pos += u64::from(count);
    }

    /// Write raw bytes; the writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.pos % 8, 0);
        self.ensure_capacity(self.pos + bytes.len() as u64 * 8);
        let start = (self.pos / 8) as usize;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len() as u64 * 8;
    }

    /// Finish, padding the trailing partial byte with zero bits.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn aligned_multi_byte_little_endian() {
        let data = [0x34, 0x12];
        let mut cur = BitCursor::new(&data);
        assert_eq!(cur.read_bits(16, ByteOrder::Little).unwrap(), 0x1234);
        assert!(cur.is_exhausted());
    }

    #[test]
    fn aligned_multi_byte_big_endian() {
        let data = [0x12, 0x34];
        let mut cur = BitCursor::new(&data);
        assert_eq!(cur.read_bits(16, ByteOrder::Big).unwrap(), 0x1234);
    }

    #[test]
    fn sub_byte_fields_pack_lsb_first_in_little_endian() {
        // 3-bit value 0b101, then 5-bit value 0b11011, LSB-first packing
        let byte = 0b101 | (0b11011 << 3);
        let data = [byte];
        let mut cur = BitCursor::new(&data);
        assert_eq!(cur.read_bits(3, ByteOrder::Little).unwrap(), 0b101);
        assert_eq!(cur.read_bits(5, ByteOrder::Little).unwrap(), 0b11011);
    }

    #[test]
    fn sub_byte_fields_pack_msb_first_in_big_endian() {
        let byte = (0b101 << 5) | 0b11011;
        let data = [byte];
        let mut cur = BitCursor::new(&data);
        assert_eq!(cur.read_bits(3, ByteOrder::Big).unwrap(), 0b101);
        assert_eq!(cur.read_bits(5, ByteOrder::Big).unwrap(), 0b11011);
    }

    #[test]
    fn truncation_is_detected() {
        let data = [0xff];
        let mut cur = BitCursor::new(&data);
        cur.read_bits(4, ByteOrder::Little).unwrap();
        assert!(matches!(
            cur.read_bits(8, ByteOrder::Little),
            Err(DecodeError::Truncated {
                offset: 4,
                needed: 8,
                available: 4,
            })
        ));
    }

    #[test]
    fn alignment_pads_forward() {
        let data = [0xff, 0x02];
        let mut cur = BitCursor::new(&data);
        cur.read_bits(3, ByteOrder::Little).unwrap();
        cur.align_to(8).unwrap();
        assert_eq!(cur.position_bits(), 8);
        assert_eq!(cur.read_bits(8, ByteOrder::Little).unwrap(), 0x02);
    }

    #[test]
    fn writer_reader_round_trip_odd_widths() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut w = BitWriter::new();
            w.write_bits(0b1, 1, order);
            w.write_bits(0x5a5, 12, order);
            w.align_to(8);
            w.write_bits(0xdead_beef, 32, order);
            w.write_bits(0x3f, 7, order);
            let bytes = w.into_bytes();

            let mut cur = BitCursor::new(&bytes);
            assert_eq!(cur.read_bits(1, order).unwrap(), 0b1);
            assert_eq!(cur.read_bits(12, order).unwrap(), 0x5a5);
            cur.align_to(8).unwrap();
            assert_eq!(cur.read_bits(32, order).unwrap(), 0xdead_beef);
            assert_eq!(cur.read_bits(7, order).unwrap(), 0x3f);
        }
    }

    #[test]
    fn null_terminated_bytes() {
        let data = [b'h', b'i', 0, 0xaa];
        let mut cur = BitCursor::new(&data);
        assert_eq!(cur.read_null_terminated_bytes().unwrap(), b"hi".to_vec());
        assert_eq!(cur.position_bits(), 24);
    }

    #[test]
    fn missing_terminator_is_truncation() {
        let data = [b'h', b'i'];
        let mut cur = BitCursor::new(&data);
        assert!(matches!(
            cur.read_null_terminated_bytes(),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
