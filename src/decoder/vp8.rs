//! Reading token partitions back into coefficient levels.
//!
//! Mirrors libwebp's `GetCoeffs`: the probability row is looked up through
//! the band of the next position, and a zero level keeps the reader on
//! node 1 of the following position.

use alloc::format;
use alloc::string::ToString;

use crate::common::macroblock::{block_order, BlockLevels, MacroblockLevels, NonZeroContext};
use crate::common::types::{TokenProbTables, COEFF_PROBS, COEFF_UPDATE_PROBS, NUM_PROBAS};
use crate::encoder::tables::{CAT_PROBAS, VP8_ENC_BANDS};
use crate::encoder::Limits;
use crate::vp8_bit_reader::VP8BitReader;

use super::DecodeError;

/// Read the coefficient probability updates and the skip probability of a
/// frame header.
pub fn read_token_probas(
    reader: &mut VP8BitReader<'_>,
) -> Result<(TokenProbTables, Option<u8>), DecodeError> {
    let mut probas = COEFF_PROBS;
    for (t, types) in COEFF_UPDATE_PROBS.iter().enumerate() {
        for (b, bands) in types.iter().enumerate() {
            for (c, ctxs) in bands.iter().enumerate() {
                for (p, &update_proba) in ctxs.iter().enumerate() {
                    if reader.get_bit(update_proba) != 0 {
                        probas[t][b][c][p] = reader.get_value(8) as u8;
                    }
                }
            }
        }
    }
    let skip_proba = reader.get_flag().then(|| reader.get_value(8) as u8);
    reader.check()?;
    Ok((probas, skip_proba))
}

#[inline]
fn large_value(reader: &mut VP8BitReader<'_>, p: &[u8; NUM_PROBAS]) -> i16 {
    if reader.get_bit(p[3]) == 0 {
        if reader.get_bit(p[4]) == 0 {
            2
        } else {
            3 + reader.get_bit(p[5]) as i16
        }
    } else if reader.get_bit(p[6]) == 0 {
        if reader.get_bit(p[7]) == 0 {
            5 + reader.get_bit(159) as i16
        } else {
            7 + 2 * reader.get_bit(165) as i16 + reader.get_bit(145) as i16
        }
    } else {
        let bit1 = reader.get_bit(p[8]) as usize;
        let bit0 = reader.get_bit(p[9 + bit1]) as usize;
        let cat = 2 * bit1 + bit0;
        let extra = CAT_PROBAS[cat]
            .iter()
            .fold(0i16, |v, &prob| v + v + reader.get_bit(prob) as i16);
        3 + (8 << cat) + extra
    }
}

/// Read one block into `out` (scan order, positions before `first` left
/// untouched).
///
/// Returns the position after the last coded level, so the block holds a
/// non-zero level exactly when the result exceeds `first`.
pub fn read_coefficients(
    reader: &mut VP8BitReader<'_>,
    probas: &TokenProbTables,
    coeff_type: usize,
    ctx: usize,
    first: usize,
    out: &mut BlockLevels,
) -> usize {
    let bands = &probas[coeff_type];
    let row = |n: usize, ctx: usize| &bands[VP8_ENC_BANDS[n] as usize][ctx];

    let mut n = first;
    let mut p = row(n, ctx);
    while n < 16 {
        if reader.get_bit(p[0]) == 0 {
            return n;
        }
        while reader.get_bit(p[1]) == 0 {
            n += 1;
            if n == 16 {
                return 16;
            }
            p = row(n, 0);
        }
        let (v, next_ctx) = if reader.get_bit(p[2]) == 0 {
            (1, 1)
        } else {
            (large_value(reader, p), 2)
        };
        out[n] = if reader.get_flag() { -v } else { v };
        n += 1;
        p = row(n, next_ctx);
    }
    16
}

/// Reads the macroblocks of a token partition in raster order.
pub struct PartitionDecoder<'a> {
    reader: VP8BitReader<'a>,
    probas: TokenProbTables,
    nz: NonZeroContext,
    mb_width: usize,
    num_macroblocks: usize,
    mb_index: usize,
}

impl<'a> PartitionDecoder<'a> {
    /// Decoder over `data` for a frame of `mb_width` x `mb_height`
    /// macroblocks coded with `probas`, under the default [`Limits`].
    pub fn new(
        data: &'a [u8],
        probas: &TokenProbTables,
        mb_width: usize,
        mb_height: usize,
    ) -> Result<Self, DecodeError> {
        Self::with_limits(data, probas, mb_width, mb_height, &Limits::default())
    }

    /// Like [`new`](Self::new) with explicit grid limits.
    pub fn with_limits(
        data: &'a [u8],
        probas: &TokenProbTables,
        mb_width: usize,
        mb_height: usize,
        limits: &Limits,
    ) -> Result<Self, DecodeError> {
        let too_large =
            || DecodeError::InvalidParameter(format!("frame {mb_width}x{mb_height} too large"));
        let (w, h) = match (u32::try_from(mb_width), u32::try_from(mb_height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Err(too_large()),
        };
        limits
            .check_dimensions(w, h)
            .map_err(|e| DecodeError::InvalidParameter(e.error().to_string()))?;
        let num_macroblocks = mb_width.checked_mul(mb_height).ok_or_else(too_large)?;
        let nz = NonZeroContext::try_new(mb_width).ok_or_else(too_large)?;
        Ok(Self {
            reader: VP8BitReader::new(data),
            probas: *probas,
            nz,
            mb_width,
            num_macroblocks,
            mb_index: 0,
        })
    }

    /// Read the next macroblock. `skipped` macroblocks consume no data and
    /// come back all zero.
    pub fn read_macroblock(
        &mut self,
        is_i16: bool,
        skipped: bool,
    ) -> Result<MacroblockLevels, DecodeError> {
        if self.mb_index >= self.num_macroblocks {
            return Err(DecodeError::MacroblockOverflow(self.num_macroblocks));
        }
        let mbx = self.mb_index % self.mb_width;
        if mbx == 0 {
            self.nz.start_row();
        }
        self.mb_index += 1;

        let mut levels = if is_i16 {
            MacroblockLevels::empty_i16()
        } else {
            MacroblockLevels::empty_i4()
        };
        if skipped {
            self.nz.skip(mbx, is_i16);
            return Ok(levels);
        }

        for (coeff_type, top, left, index) in block_order(is_i16) {
            let ctx = self.nz.context(mbx, top, left);
            let first = coeff_type.first_coeff();
            let Some(block) = levels.block_mut(index) else {
                continue;
            };
            let end = read_coefficients(
                &mut self.reader,
                &self.probas,
                coeff_type.index(),
                ctx,
                first,
                block,
            );
            self.nz.set(mbx, top, left, end > first);
        }

        if self.reader.is_eof() {
            return Err(DecodeError::BitStreamError);
        }
        Ok(levels)
    }
}
