//! Coefficient token recording.
//!
//! Walks the VP8 coefficient token tree for one block and hands every binary
//! decision to a [`TokenSink`]. Decisions on tree nodes are addressed by
//! probability slot; category extra bits and signs carry fixed probabilities.
//! Follows libwebp's `VP8RecordCoeffTokens` (token_enc.c).

use crate::common::macroblock::{BlockLevels, MacroblockLevels, NonZeroContext};
use crate::common::types::token_id;
use crate::encoder::tables::{CAT_PROBAS, MAX_LEVEL, VP8_ENC_BANDS};
use crate::encoder::token_buffer::TokenSink;

/// Position of the last non-zero level at or after `first`, or -1.
#[inline]
pub fn find_last(coeffs: &BlockLevels, first: usize) -> i32 {
    coeffs[first..]
        .iter()
        .rposition(|&c| c != 0)
        .map_or(-1, |i| (i + first) as i32)
}

/// Record the tokens of one block.
///
/// `ctx` is the neighbour context (0..=2), `coeff_type` the table type
/// (0..=3), `first` the first coded position and `last` the result of
/// [`find_last`]. Levels above [`MAX_LEVEL`] in magnitude are coded as
/// `MAX_LEVEL`.
///
/// Returns true if the block holds a non-zero level.
pub fn record_coeff_tokens<S: TokenSink + ?Sized>(
    sink: &mut S,
    ctx: usize,
    coeff_type: usize,
    first: usize,
    last: i32,
    coeffs: &BlockLevels,
) -> bool {
    debug_assert!(ctx < 3 && coeff_type < 4 && first < 16);

    let mut n = first;
    let mut base_id = token_id(coeff_type, VP8_ENC_BANDS[n] as usize, ctx);

    if !sink.add_token(last >= 0, base_id) {
        return false;
    }

    while n < 16 {
        let c = coeffs[n];
        n += 1;
        let sign = c < 0;
        let v = u32::from(c.unsigned_abs()).min(MAX_LEVEL);

        let band = VP8_ENC_BANDS[n] as usize;
        if !sink.add_token(v != 0, base_id + 1) {
            base_id = token_id(coeff_type, band, 0);
            continue;
        }

        if !sink.add_token(v > 1, base_id + 2) {
            base_id = token_id(coeff_type, band, 1);
        } else {
            record_magnitude(sink, v, base_id);
            base_id = token_id(coeff_type, band, 2);
        }

        sink.add_constant_token(sign, 128);

        if n == 16 || !sink.add_token(n as i32 <= last, base_id) {
            return true;
        }
    }
    true
}

/// Nodes 3..=10 and category extra bits for `v > 1`.
#[inline]
fn record_magnitude<S: TokenSink + ?Sized>(sink: &mut S, v: u32, base_id: u16) {
    if !sink.add_token(v > 4, base_id + 3) {
        if sink.add_token(v != 2, base_id + 4) {
            sink.add_token(v == 4, base_id + 5);
        }
        return;
    }

    if !sink.add_token(v > 10, base_id + 6) {
        if !sink.add_token(v > 6, base_id + 7) {
            sink.add_constant_token(v == 6, 159);
        } else {
            sink.add_constant_token(v >= 9, 165);
            sink.add_constant_token(v & 1 == 0, 145);
        }
        return;
    }

    let residue = v - 3;
    let cat = if residue < (8 << 1) {
        sink.add_token(false, base_id + 8);
        sink.add_token(false, base_id + 9);
        0
    } else if residue < (8 << 2) {
        sink.add_token(false, base_id + 8);
        sink.add_token(true, base_id + 9);
        1
    } else if residue < (8 << 3) {
        sink.add_token(true, base_id + 8);
        sink.add_token(false, base_id + 10);
        2
    } else {
        sink.add_token(true, base_id + 8);
        sink.add_token(true, base_id + 10);
        3
    };

    let extra = residue - (8 << cat);
    let probas = CAT_PROBAS[cat];
    let top = probas.len() - 1;
    for (i, &p) in probas.iter().enumerate() {
        sink.add_constant_token(extra & (1 << (top - i)) != 0, p);
    }
}

/// Record every block of a macroblock in bitstream order, updating the
/// non-zero context at column `mbx`. Returns the number of blocks holding a
/// non-zero level.
pub fn record_macroblock_tokens<S: TokenSink + ?Sized>(
    sink: &mut S,
    levels: &MacroblockLevels,
    nz: &mut NonZeroContext,
    mbx: usize,
) -> usize {
    let mut non_zero = 0;
    levels.for_each_block(|coeff_type, top, left, coeffs| {
        let first = coeff_type.first_coeff();
        let t = coeff_type.index();
        nz.update(mbx, top, left, |ctx| {
            let last = find_last(coeffs, first);
            let has_nz = record_coeff_tokens(sink, ctx, t, first, last, coeffs);
            non_zero += usize::from(has_nz);
            has_nz
        });
    });
    non_zero
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    use crate::common::types::split_slot;

    /// Records `(bit, node or fixed proba, dynamic)` triples.
    #[derive(Default)]
    struct Trace(Vec<(bool, u16, bool)>);

    impl TokenSink for Trace {
        fn add_token(&mut self, bit: bool, slot: u16) -> bool {
            self.0.push((bit, slot, true));
            bit
        }

        fn add_constant_token(&mut self, bit: bool, proba: u8) {
            self.0.push((bit, u16::from(proba), false));
        }
    }

    fn trace(ctx: usize, t: usize, first: usize, coeffs: &BlockLevels) -> Vec<(bool, u16, bool)> {
        let mut sink = Trace::default();
        record_coeff_tokens(&mut sink, ctx, t, first, find_last(coeffs, first), coeffs);
        sink.0
    }

    fn lone(v: i16) -> Vec<(bool, u16, bool)> {
        let mut c = [0i16; 16];
        c[0] = v;
        trace(0, 3, 0, &c)
    }

    #[test]
    fn find_last_respects_first() {
        let mut c = [0i16; 16];
        assert_eq!(find_last(&c, 0), -1);
        c[0] = 4;
        assert_eq!(find_last(&c, 0), 0);
        assert_eq!(find_last(&c, 1), -1);
        c[15] = -1;
        assert_eq!(find_last(&c, 1), 15);
    }

    #[test]
    fn empty_block_is_one_token() {
        let t = trace(1, 2, 0, &[0; 16]);
        assert_eq!(t, [(false, token_id(2, 0, 1), true)]);
    }

    /// `(magnitude, tree nodes after node 2, fixed-probability extra bits)`
    /// for a representative of every magnitude bucket.
    #[rustfmt::skip]
    const BUCKETS: &[(u16, &[(bool, u16)], &[(bool, u8)])] = &[
        (1, &[], &[]),
        (2, &[(false, 3), (false, 4)], &[]),
        (3, &[(false, 3), (true, 4), (false, 5)], &[]),
        (4, &[(false, 3), (true, 4), (true, 5)], &[]),
        (5, &[(true, 3), (false, 6), (false, 7)], &[(false, 159)]),
        (6, &[(true, 3), (false, 6), (false, 7)], &[(true, 159)]),
        (7, &[(true, 3), (false, 6), (true, 7)], &[(false, 165), (false, 145)]),
        (8, &[(true, 3), (false, 6), (true, 7)], &[(false, 165), (true, 145)]),
        (9, &[(true, 3), (false, 6), (true, 7)], &[(true, 165), (false, 145)]),
        (10, &[(true, 3), (false, 6), (true, 7)], &[(true, 165), (true, 145)]),
        (11, &[(true, 3), (true, 6), (false, 8), (false, 9)], &[(false, 173), (false, 148), (false, 140)]),
        (18, &[(true, 3), (true, 6), (false, 8), (false, 9)], &[(true, 173), (true, 148), (true, 140)]),
        (19, &[(true, 3), (true, 6), (false, 8), (true, 9)], &[(false, 176), (false, 155), (false, 140), (false, 135)]),
        (34, &[(true, 3), (true, 6), (false, 8), (true, 9)], &[(true, 176), (true, 155), (true, 140), (true, 135)]),
        (35, &[(true, 3), (true, 6), (true, 8), (false, 10)], &[(false, 180), (false, 157), (false, 141), (false, 134), (false, 130)]),
        (66, &[(true, 3), (true, 6), (true, 8), (false, 10)], &[(true, 180), (true, 157), (true, 141), (true, 134), (true, 130)]),
        (67, &[(true, 3), (true, 6), (true, 8), (true, 10)], &[(false, 254), (false, 254), (false, 243), (false, 230), (false, 196), (false, 177), (false, 153), (false, 140), (false, 133), (false, 130), (false, 129)]),
        (2048, &[(true, 3), (true, 6), (true, 8), (true, 10)], &[(true, 254), (true, 254), (true, 243), (true, 230), (false, 196), (true, 177), (true, 153), (true, 140), (true, 133), (false, 130), (true, 129)]),
        (2114, &[(true, 3), (true, 6), (true, 8), (true, 10)], &[(true, 254), (true, 254), (true, 243), (true, 230), (true, 196), (true, 177), (true, 153), (true, 140), (true, 133), (true, 130), (true, 129)]),
    ];

    #[test]
    fn every_magnitude_bucket_full_trace() {
        let base = token_id(3, 0, 0);
        for &(magnitude, tree, extra) in BUCKETS {
            for negative in [false, true] {
                let v = if negative {
                    -(magnitude as i16)
                } else {
                    magnitude as i16
                };
                let mut want = vec![
                    (true, base, true),
                    (true, base + 1, true),
                    (magnitude > 1, base + 2, true),
                ];
                want.extend(tree.iter().map(|&(bit, node)| (bit, base + node, true)));
                want.extend(extra.iter().map(|&(bit, p)| (bit, u16::from(p), false)));
                want.push((negative, 128, false));
                // end of block at position 1, context from the level's size
                let ctx = if magnitude == 1 { 1 } else { 2 };
                want.push((false, token_id(3, 1, ctx), true));
                assert_eq!(lone(v), want, "level {v}");
            }
        }
    }

    #[test]
    fn levels_beyond_max_are_clamped() {
        let max = MAX_LEVEL as i16;
        for v in [max + 1, 3000, i16::MAX] {
            assert_eq!(lone(v), lone(max), "level {v}");
            assert_eq!(lone(-v), lone(-max), "level {}", -v);
        }
        assert_eq!(lone(i16::MIN), lone(-max));
    }

    #[test]
    fn first_token_opens_block_whenever_last_is_set() {
        // an i16 AC block handed last = 0: the block opens and every coded
        // position reads as zero
        let mut c = [0i16; 16];
        c[0] = 5;
        let mut sink = Trace::default();
        assert!(record_coeff_tokens(&mut sink, 0, 0, 1, 0, &c));
        let mut want = vec![(true, token_id(0, 1, 0), true)];
        for n in 1..16 {
            want.push((false, token_id(0, VP8_ENC_BANDS[n] as usize, 0) + 1, true));
        }
        assert_eq!(sink.0, want);

        let mut sink = Trace::default();
        assert!(!record_coeff_tokens(&mut sink, 2, 0, 1, -1, &c));
        assert_eq!(sink.0, [(false, token_id(0, 1, 2), true)]);
    }

    #[test]
    fn contexts_follow_previous_level() {
        // [5, -2, 0, 1, 0...] as an i4 block, ctx 0
        let mut c = [0i16; 16];
        c[0] = 5;
        c[1] = -2;
        c[3] = 1;
        let t = trace(0, 3, 0, &c);
        let slots: Vec<_> = t
            .iter()
            .filter(|x| x.2)
            .map(|x| split_slot(x.1))
            .collect();
        // first position: band 0, ctx 0
        assert_eq!(slots[0], (3, 0, 0, 0));
        // after 5: band 1, ctx 2
        assert!(slots.contains(&(3, 1, 2, 0)));
        // after -2: band 2, ctx 2; the zero moves to band 3, ctx 0
        assert!(slots.contains(&(3, 2, 2, 1)));
        assert!(slots.contains(&(3, 3, 0, 1)));
        // after 1 at position 3: end of block on band 6, ctx 1
        assert_eq!(*slots.last().unwrap_or(&(0, 0, 0, 0)), (3, 6, 1, 0));
        assert_eq!(t.last().map(|x| x.0), Some(false));
    }

    #[test]
    fn last_position_has_no_end_token() {
        let mut c = [0i16; 16];
        c[15] = 1;
        let t = trace(0, 3, 0, &c);
        // ends on the sign
        assert_eq!(t.last(), Some(&(false, 128, false)));
    }

    #[test]
    fn macroblock_counts_non_zero_blocks() {
        let mut mb = MacroblockLevels::empty_i16();
        if let crate::common::macroblock::LumaLevels::I16 { dc, .. } = &mut mb.luma {
            dc[0] = 3;
        }
        mb.chroma[5][2] = -1;
        let mut nz = NonZeroContext::new(1);
        let mut sink = Trace::default();
        assert_eq!(record_macroblock_tokens(&mut sink, &mb, &mut nz, 0), 2);
        assert_eq!(nz.top(0)[8], 1);
        assert_eq!(nz.top(0)[6..8], [0, 1]);
    }
}
