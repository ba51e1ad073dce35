// VP8 boolean decoder, libwebp VP8GetBitAlt style.
//
// - stores range-1 (127..=254 between calls)
// - refills 7 bytes at a time on 64-bit targets, 3 otherwise
// - pads with zero bits once the input is exhausted

use crate::decoder::DecodeError;

/// BITS can be any multiple of 8 from 8 to 56 (inclusive).
#[cfg(target_pointer_width = "64")]
const BITS: i32 = 56;
#[cfg(not(target_pointer_width = "64"))]
const BITS: i32 = 24;

/// Number of bytes to read at once (BITS / 8)
const BYTES_PER_LOAD: usize = (BITS / 8) as usize;

/// Boolean decoder over a borrowed partition.
#[derive(Debug, Clone)]
pub struct VP8BitReader<'a> {
    value: u64,
    /// Current range minus 1. In [127, 254] interval.
    range: u32,
    /// Number of valid bits left
    bits: i32,
    buf: &'a [u8],
    eof: bool,
}

impl<'a> VP8BitReader<'a> {
    /// Create a new bit reader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        let mut br = Self {
            value: 0,
            range: 255 - 1,
            bits: -8,
            buf: data,
            eof: false,
        };
        br.load_new_bytes();
        br
    }

    #[cold]
    fn load_final_bytes(&mut self) {
        if let Some((&first, rest)) = self.buf.split_first() {
            self.bits += 8;
            self.value = u64::from(first) | (self.value << 8);
            self.buf = rest;
        } else if !self.eof {
            self.value <<= 8;
            self.bits += 8;
            self.eof = true;
        } else {
            self.bits = 0; // keep shifts in range once past the end
        }
    }

    #[inline(always)]
    fn load_new_bytes(&mut self) {
        if self.buf.len() >= BYTES_PER_LOAD {
            let (head, rest) = self.buf.split_at(BYTES_PER_LOAD);
            let bits = head
                .iter()
                .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
            self.value = bits | (self.value << BITS);
            self.bits += BITS;
            self.buf = rest;
        } else {
            self.load_final_bytes();
        }
    }

    /// Read a bit whose probability of being 0 is `prob / 256`.
    #[inline(always)]
    pub fn get_bit(&mut self, prob: u8) -> i32 {
        let mut range = self.range;
        if self.bits < 0 {
            self.load_new_bytes();
        }

        let pos = self.bits;
        let split = (range * u32::from(prob)) >> 8;
        let value = (self.value >> pos) as u32;
        let bit = i32::from(value > split);

        if bit != 0 {
            range -= split;
            self.value -= (u64::from(split) + 1) << pos;
        } else {
            range = split + 1;
        }

        let shift = 7 ^ (31 ^ range.leading_zeros() as i32);
        range <<= shift;
        self.bits -= shift;
        self.range = range - 1;

        bit
    }

    /// Read a bit with probability one half.
    #[inline(always)]
    pub fn get_flag(&mut self) -> bool {
        self.get_bit(0x80) != 0
    }

    /// Read `n` bits as an unsigned value, most significant first.
    #[inline]
    pub fn get_value(&mut self, n: u8) -> u32 {
        let mut v = 0u32;
        for i in (0..n).rev() {
            v |= (self.get_bit(0x80) as u32) << i;
        }
        v
    }

    /// Read an optional signed value (flag, magnitude, sign).
    #[inline]
    pub fn get_optional_signed(&mut self, n: u8) -> i32 {
        if !self.get_flag() {
            return 0;
        }
        let magnitude = self.get_value(n) as i32;
        if self.get_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// True once the reader has consumed zero padding past the input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Fails if more bits were read than the input holds.
    pub fn check(&self) -> Result<(), DecodeError> {
        if self.eof && self.bits < 0 {
            Err(DecodeError::BitStreamError)
        } else {
            Ok(())
        }
    }
}
