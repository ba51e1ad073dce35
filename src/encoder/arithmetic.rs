//! VP8 boolean entropy coder.
//!
//! Keeps `range - 1` in an 8-bit register and buffers output bytes of 0xff
//! until the next non-0xff byte tells whether a carry rippled through them.

use alloc::format;
use alloc::vec::Vec;

use byteorder_lite::{ByteOrder, LittleEndian};

use whereat::at;

use super::api::{EncodeError, EncodeResult};

/// Number of little-endian `u32` words in a serialized [`PartitionState`].
pub const PARTITION_STATE_WORDS: usize = 8;

/// Coder registers at the end of a partition.
///
/// Serialized as eight little-endian words: range, value, nb_bits, pos,
/// run, max_pos, error, reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionState {
    /// Range minus one, in `[0, 254]`.
    pub range: u32,
    /// Pending low bits not yet shifted out.
    pub value: u32,
    /// Number of pending bits, `-8` on a fresh coder.
    pub nb_bits: i32,
    /// Bytes written to the output.
    pub pos: u32,
    /// Number of buffered 0xff bytes awaiting carry resolution.
    pub run: u32,
    /// Capacity bound the partition was sized for.
    pub max_pos: u32,
    /// Output could not grow.
    pub error: bool,
}

impl Default for PartitionState {
    fn default() -> Self {
        Self {
            range: 255 - 1,
            value: 0,
            nb_bits: -8,
            pos: 0,
            run: 0,
            max_pos: 0,
            error: false,
        }
    }
}

impl PartitionState {
    /// The state as eight little-endian words.
    pub fn to_le_bytes(&self) -> [u8; PARTITION_STATE_WORDS * 4] {
        let words = [
            self.range,
            self.value,
            self.nb_bits as u32,
            self.pos,
            self.run,
            self.max_pos,
            u32::from(self.error),
            0,
        ];
        let mut out = [0u8; PARTITION_STATE_WORDS * 4];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            LittleEndian::write_u32(chunk, word);
        }
        out
    }

    /// Parses the record written by [`to_le_bytes`](Self::to_le_bytes).
    pub fn from_le_bytes(bytes: &[u8]) -> EncodeResult<Self> {
        if bytes.len() < PARTITION_STATE_WORDS * 4 {
            return Err(at(EncodeError::InvalidPartitionState(format!(
                "record is {} bytes, expected {}",
                bytes.len(),
                PARTITION_STATE_WORDS * 4
            ))));
        }
        let word = |i: usize| LittleEndian::read_u32(&bytes[i * 4..i * 4 + 4]);
        Ok(Self {
            range: word(0),
            value: word(1),
            nb_bits: word(2) as i32,
            pos: word(3),
            run: word(4),
            max_pos: word(5),
            error: word(6) != 0,
        })
    }
}

/// Boolean encoder producing one VP8 partition.
#[derive(Debug, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// range - 1
    range: u32,
    value: u32,
    /// number of outstanding 0xff bytes
    run: u32,
    /// number of pending bits
    nb_bits: i32,
    max_pos: usize,
    error: bool,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BitWriter {
    /// New coder, reserving room for `expected_size` output bytes.
    pub fn new(expected_size: usize) -> Self {
        let mut buf = Vec::new();
        let error = buf.try_reserve(expected_size).is_err();
        Self {
            buf,
            range: 255 - 1,
            value: 0,
            run: 0,
            nb_bits: -8,
            max_pos: expected_size,
            error,
        }
    }

    /// Continue a partition from a saved state and the bytes written so far.
    pub fn resume(state: PartitionState, bytes: Vec<u8>) -> EncodeResult<Self> {
        if bytes.len() != state.pos as usize {
            return Err(at(EncodeError::InvalidPartitionState(format!(
                "state position {} does not match {} buffered bytes",
                state.pos,
                bytes.len()
            ))));
        }
        if state.range > 254 || !(-8..=0).contains(&state.nb_bits) {
            return Err(at(EncodeError::InvalidPartitionState(format!(
                "registers out of range: range={} nb_bits={}",
                state.range, state.nb_bits
            ))));
        }
        if state.error {
            return Err(at(EncodeError::InvalidPartitionState(
                "partition was marked as failed".into(),
            )));
        }
        Ok(Self {
            buf: bytes,
            range: state.range,
            value: state.value,
            run: state.run,
            nb_bits: state.nb_bits,
            max_pos: state.max_pos as usize,
            error: false,
        })
    }

    fn flush(&mut self) {
        let s = 8 + self.nb_bits;
        let bits = self.value >> s;
        self.value -= bits << s;
        self.nb_bits -= 8;
        if (bits & 0xff) != 0xff {
            if self.buf.try_reserve(self.run as usize + 1).is_err() {
                self.error = true;
                return;
            }
            if bits & 0x100 != 0 {
                // carry into the last written byte, the 0xff run becomes 0x00
                if let Some(last) = self.buf.last_mut() {
                    *last = last.wrapping_add(1);
                }
            }
            if self.run > 0 {
                let fill = if bits & 0x100 != 0 { 0x00 } else { 0xff };
                self.buf
                    .extend(core::iter::repeat(fill).take(self.run as usize));
                self.run = 0;
            }
            self.buf.push((bits & 0xff) as u8);
        } else {
            self.run += 1;
        }
    }

    #[inline]
    fn renormalize(&mut self) {
        if self.range < 127 {
            let real = (self.range + 1) as u8;
            let shift = real.leading_zeros();
            self.range = ((self.range + 1) << shift) - 1;
            self.value <<= shift;
            self.nb_bits += shift as i32;
            if self.nb_bits > 0 {
                self.flush();
            }
        }
    }

    /// Code `bit` where `prob` is the probability of a 0, out of 256.
    #[inline]
    pub fn put_bit(&mut self, bit: bool, prob: u8) -> bool {
        let split = (self.range * u32::from(prob)) >> 8;
        if bit {
            self.value += split + 1;
            self.range -= split + 1;
        } else {
            self.range = split;
        }
        self.renormalize();
        bit
    }

    /// Code `bit` with probability one half.
    #[inline]
    pub fn put_bit_uniform(&mut self, bit: bool) -> bool {
        let split = self.range >> 1;
        if bit {
            self.value += split + 1;
            self.range -= split + 1;
        } else {
            self.range = split;
        }
        self.renormalize();
        bit
    }

    /// Code the low `nb_bits` of `value`, most significant first.
    pub fn put_bits(&mut self, value: u32, nb_bits: u32) {
        debug_assert!(nb_bits <= 32);
        for i in (0..nb_bits).rev() {
            self.put_bit_uniform(value & (1 << i) != 0);
        }
    }

    /// Code a presence flag, then magnitude and sign of a non-zero `value`.
    pub fn put_signed_bits(&mut self, value: i32, nb_bits: u32) {
        if !self.put_bit_uniform(value != 0) {
            return;
        }
        if value < 0 {
            self.put_bits((value.unsigned_abs() << 1) | 1, nb_bits + 1);
        } else {
            self.put_bits((value as u32) << 1, nb_bits + 1);
        }
    }

    /// Bits produced so far, pending ones included.
    pub fn bit_pos(&self) -> u64 {
        let whole = (self.buf.len() as i64 + i64::from(self.run)) * 8 + 8;
        (whole + i64::from(self.nb_bits)) as u64
    }

    /// Bytes written to the output so far.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Output written so far, without pending bits.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// True if the output could not grow.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Snapshot of the registers.
    pub fn state(&self) -> PartitionState {
        PartitionState {
            range: self.range,
            value: self.value,
            nb_bits: self.nb_bits,
            pos: self.buf.len() as u32,
            run: self.run,
            max_pos: self.max_pos.max(self.buf.len()) as u32,
            error: self.error,
        }
    }

    /// Pad and flush the pending bits, returning the partition bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.put_bits(0, (9 - self.nb_bits) as u32);
        self.nb_bits = 0;
        self.flush();
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vp8_bit_reader::VP8BitReader;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn fresh_writer_state() {
        let bw = BitWriter::new(64);
        let state = bw.state();
        assert_eq!(state.range, 254);
        assert_eq!(state.nb_bits, -8);
        assert_eq!(state.pos, 0);
        assert_eq!(bw.bit_pos(), 0);
    }

    #[test]
    fn literals_decode_back() {
        let mut bw = BitWriter::new(0);
        bw.put_bits(0x5a, 8);
        bw.put_bits(3, 2);
        bw.put_signed_bits(-5, 4);
        bw.put_signed_bits(0, 4);
        bw.put_signed_bits(6, 4);
        let bytes = bw.finish();

        let mut br = VP8BitReader::new(&bytes);
        assert_eq!(br.get_value(8), 0x5a);
        assert_eq!(br.get_value(2), 3);
        assert_eq!(br.get_optional_signed(4), -5);
        assert_eq!(br.get_optional_signed(4), 0);
        assert_eq!(br.get_optional_signed(4), 6);
    }

    #[test]
    fn skewed_probabilities_decode_back() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut bw = BitWriter::new(0);
        let mut coded = Vec::new();
        for _ in 0..20_000 {
            let prob: u8 = match rng.gen_range(0..4) {
                0 => 1,
                1 => 255,
                _ => rng.gen(),
            };
            let bit = rng.gen_bool(f64::from(255 - prob) / 256.0);
            bw.put_bit(bit, prob);
            coded.push((bit, prob));
        }
        assert!(!bw.has_error());
        let bytes = bw.finish();
        let mut br = VP8BitReader::new(&bytes);
        for (i, &(bit, prob)) in coded.iter().enumerate() {
            assert_eq!(br.get_bit(prob) != 0, bit, "bit {i}");
        }
    }

    #[test]
    fn bit_pos_tracks_output() {
        let mut bw = BitWriter::new(0);
        for _ in 0..1000 {
            bw.put_bit_uniform(true);
        }
        let pos = bw.bit_pos();
        assert!((1000..1000 + 16).contains(&pos), "pos={pos}");
    }

    #[test]
    fn resume_continues_identically() {
        let mut rng = StdRng::seed_from_u64(99);
        let bits: Vec<(bool, u8)> = (0..5000).map(|_| (rng.gen(), rng.gen())).collect();

        let mut whole = BitWriter::new(0);
        let mut head = BitWriter::new(0);
        for (i, &(bit, prob)) in bits.iter().enumerate() {
            whole.put_bit(bit, prob);
            if i < 2500 {
                head.put_bit(bit, prob);
            }
        }

        let record = head.state().to_le_bytes();
        let state = PartitionState::from_le_bytes(&record).unwrap();
        assert_eq!(state, head.state());
        let mut tail = BitWriter::resume(state, head.buffer().to_vec()).unwrap();
        for &(bit, prob) in &bits[2500..] {
            tail.put_bit(bit, prob);
        }
        assert_eq!(tail.finish(), whole.finish());
    }

    #[test]
    fn resume_rejects_mismatched_bytes() {
        let mut bw = BitWriter::new(0);
        bw.put_bits(0xabcd, 16);
        let state = bw.state();
        let err = BitWriter::resume(state, Vec::new()).unwrap_err();
        assert!(matches!(err.error(), EncodeError::InvalidPartitionState(_)));
        assert!(PartitionState::from_le_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn state_record_layout() {
        let state = PartitionState {
            range: 200,
            value: 0x1234,
            nb_bits: -3,
            pos: 17,
            run: 2,
            max_pos: 4096,
            error: false,
        };
        let bytes = state.to_le_bytes();
        assert_eq!(&bytes[0..4], &[200, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xfd, 0xff, 0xff, 0xff]);
        assert_eq!(&bytes[28..32], &[0, 0, 0, 0]);
    }
}
