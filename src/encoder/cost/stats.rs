//! Token statistics for adaptive probabilities.
//!
//! Every dynamic token bit is tallied at its probability slot during the
//! recording pass. Once all macroblocks are recorded, [`finalize_token_probas`]
//! decides for each slot whether signalling a new probability pays for itself.

#![allow(clippy::needless_range_loop)]

use super::{branch_cost, calc_token_proba, vp8_bit_cost};
use crate::common::types::{
    split_slot, TokenProbTables, COEFF_PROBS, COEFF_UPDATE_PROBS, NUM_BANDS, NUM_CTX, NUM_PROBAS,
    NUM_SLOTS, NUM_TYPES,
};
use crate::encoder::token_buffer::{Token, TokenBuffer, TokenSink};

/// Largest value either half of a packed tally can hold.
const MAX_COUNT: u32 = 0xffff;

/// Cost of sending a new probability as an 8-bit literal.
const LITERAL_COST: u64 = 8 * 256;

/// Token statistics for computing optimal probabilities.
///
/// One packed word per slot: upper 16 bits = total count, lower 16 bits =
/// count of 1s.
#[derive(Clone, PartialEq, Eq)]
pub struct ProbaStats {
    stats: [u32; NUM_SLOTS],
}

impl Default for ProbaStats {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ProbaStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let used = self.stats.iter().filter(|&&s| s != 0).count();
        f.debug_struct("ProbaStats")
            .field("used_slots", &used)
            .finish()
    }
}

impl ProbaStats {
    /// Create new empty statistics
    pub fn new() -> Self {
        Self {
            stats: [0; NUM_SLOTS],
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&mut self) {
        self.stats = [0; NUM_SLOTS];
    }

    /// Record one bit at a flat slot and return it.
    ///
    /// When the total is saturated both halves are halved, with the incoming
    /// bit folded into the rounding of the 1-count. A run of ones through
    /// saturation leaves the 1-count one above the total; the 1-count field
    /// itself saturates at 0xffff.
    #[inline]
    pub fn record(&mut self, slot: u16, bit: bool) -> bool {
        let entry = &mut self.stats[slot as usize];
        let nb = *entry & 0xffff;
        let total = *entry >> 16;
        let b = u32::from(bit);
        let (nb, total) = if total == MAX_COUNT {
            ((nb + 1 + 2 * b) >> 1, (total + 1) >> 1)
        } else {
            ((nb + b).min(MAX_COUNT), total + 1)
        };
        *entry = (total << 16) | nb;
        bit
    }

    /// `(count of 1s, total)` at a flat slot.
    #[inline]
    pub fn counts(&self, slot: u16) -> (u32, u32) {
        let s = self.stats[slot as usize];
        (s & 0xffff, s >> 16)
    }

    /// `(count of 1s, total)` at `[type][band][ctx][node]`.
    #[inline]
    pub fn counts_at(&self, t: usize, b: usize, c: usize, p: usize) -> (u32, u32) {
        debug_assert!(t < NUM_TYPES && b < NUM_BANDS && c < NUM_CTX && p < NUM_PROBAS);
        let s = self.stats[p + NUM_PROBAS * (c + NUM_CTX * (b + NUM_BANDS * t))];
        (s & 0xffff, s >> 16)
    }

    /// Overwrite the tally at a flat slot. `nb` is clamped to `total`.
    pub fn set_counts(&mut self, slot: u16, nb: u16, total: u16) {
        let nb = nb.min(total);
        self.stats[slot as usize] = (u32::from(total) << 16) | u32::from(nb);
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.stats.iter().all(|&s| s == 0)
    }

    /// Tally every dynamic token of a recorded buffer (count-then-emit).
    pub fn record_tokens(&mut self, tokens: &TokenBuffer) {
        for token in tokens.iter() {
            if let Token::Dynamic { bit, slot } = token {
                self.record(slot, bit);
            }
        }
    }

    /// Fold the tallies of another shard into this one.
    ///
    /// Counts are summed wide, then halved together until the total fits
    /// 16 bits again.
    pub fn merge(&mut self, other: &ProbaStats) {
        for (dst, &src) in self.stats.iter_mut().zip(other.stats.iter()) {
            let mut nb = (*dst & 0xffff) + (src & 0xffff);
            let mut total = (*dst >> 16) + (src >> 16);
            while total > MAX_COUNT {
                total = (total + 1) >> 1;
                nb = (nb + 1) >> 1;
            }
            *dst = (total << 16) | nb.min(MAX_COUNT);
        }
    }

    /// Run the probability finalizer over these tallies.
    pub fn finalize(&self) -> FinalizedProbas {
        finalize_token_probas(self)
    }
}

impl TokenSink for ProbaStats {
    #[inline]
    fn add_token(&mut self, bit: bool, slot: u16) -> bool {
        self.record(slot, bit)
    }

    #[inline]
    fn add_constant_token(&mut self, _bit: bool, _proba: u8) {}
}

/// Outcome of [`finalize_token_probas`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedProbas {
    /// Probabilities to emit the frame's tokens with.
    pub probas: TokenProbTables,
    /// At least one adopted probability differs from [`COEFF_PROBS`].
    pub dirty: bool,
    /// Modeled cost of the update flags and literals, in 1/256 bits.
    pub header_cost: u64,
    /// Number of slots whose final probability differs from the default.
    pub updated_slots: usize,
}

impl FinalizedProbas {
    /// Default table, nothing updated.
    pub fn unchanged() -> Self {
        Self {
            probas: COEFF_PROBS,
            dirty: false,
            header_cost: 0,
            updated_slots: 0,
        }
    }
}

/// Decide, for each of the 1056 slots, between the default probability and
/// the one fitted to the tallies.
///
/// The new value is adopted only when its branch cost plus the update flag
/// and the 8-bit literal is strictly cheaper than keeping the default.
pub fn finalize_token_probas(stats: &ProbaStats) -> FinalizedProbas {
    let mut probas = COEFF_PROBS;
    let mut dirty = false;
    let mut header_cost = 0u64;
    let mut updated_slots = 0usize;

    for slot in 0..NUM_SLOTS {
        let (t, b, c, p) = split_slot(slot as u16);
        let (nb, total) = stats.counts(slot as u16);
        let update_proba = COEFF_UPDATE_PROBS[t][b][c][p];
        let old_p = COEFF_PROBS[t][b][c][p];
        let new_p = calc_token_proba(nb, total);

        let old_cost =
            branch_cost(nb, total, old_p) + u64::from(vp8_bit_cost(false, update_proba));
        let new_cost = branch_cost(nb, total, new_p)
            + u64::from(vp8_bit_cost(true, update_proba))
            + LITERAL_COST;
        let use_new_p = old_cost > new_cost;

        header_cost += u64::from(vp8_bit_cost(use_new_p, update_proba));
        if use_new_p {
            probas[t][b][c][p] = new_p;
            header_cost += LITERAL_COST;
            if new_p != old_p {
                dirty = true;
                updated_slots += 1;
            }
        }
    }

    log::debug!(
        "finalized token probabilities: dirty={dirty} updated={updated_slots} header_cost={header_cost}"
    );

    FinalizedProbas {
        probas,
        dirty,
        header_cost,
        updated_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::token_id;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Straightforward model of the tally rule with separate fields.
    fn reference_tally(bits: impl IntoIterator<Item = bool>) -> (u32, u32) {
        let (mut nb, mut total) = (0u32, 0u32);
        for bit in bits {
            let b = u32::from(bit);
            if total == 0xffff {
                total = (total + 1) >> 1;
                nb = (nb + 1 + 2 * b) >> 1;
            } else {
                total += 1;
                nb = (nb + b).min(0xffff);
            }
        }
        (nb, total)
    }

    #[test]
    fn record_counts_ones_and_total() {
        let mut stats = ProbaStats::new();
        let slot = token_id(2, 3, 1) + 4;
        assert!(stats.record(slot, true));
        assert!(!stats.record(slot, false));
        stats.record(slot, true);
        assert_eq!(stats.counts(slot), (2, 3));
        assert_eq!(stats.counts_at(2, 3, 1, 4), (2, 3));
        assert_eq!(stats.counts(slot + 1), (0, 0));
    }

    #[test]
    fn halving_at_saturation() {
        let mut stats = ProbaStats::new();
        stats.set_counts(0, 1000, 0xffff);
        stats.record(0, false);
        assert_eq!(stats.counts(0), (500, 0x8000));

        stats.set_counts(0, 1000, 0xffff);
        stats.record(0, true);
        assert_eq!(stats.counts(0), (501, 0x8000));

        stats.set_counts(0, 1001, 0xfffe);
        stats.record(0, true);
        assert_eq!(stats.counts(0), (1002, 0xffff));
    }

    #[test]
    fn overflow_halving_closed_form_zero_bits() {
        let mut stats = ProbaStats::new();
        let n: u32 = (1 << 16) + 12_345;
        for _ in 0..n {
            stats.record(7, false);
        }
        let expected_total = 0x8000 + (n - 0x1_0000) % 0x8000;
        assert_eq!(stats.counts(7), (0, expected_total));
    }

    #[test]
    fn overflow_halving_closed_form_one_bits() {
        let mut stats = ProbaStats::new();
        let k = 777u32;
        for _ in 0..(1u32 << 16) + k {
            stats.record(3, true);
        }
        let total = 0x8000 + k;
        assert_eq!(stats.counts(3), (total + 1, total));
    }

    #[test]
    fn saturated_one_rounds_past_total() {
        let mut stats = ProbaStats::new();
        stats.set_counts(0, 0xffff, 0xffff);
        stats.record(0, true);
        assert_eq!(stats.counts(0), (0x8001, 0x8000));

        stats.set_counts(1, 0xffff, 0xffff);
        stats.record(1, false);
        assert_eq!(stats.counts(1), (0x8000, 0x8000));

        stats.set_counts(2, 0x1234, 0xffff);
        stats.record(2, true);
        assert_eq!(stats.counts(2), ((0x1234 + 3) >> 1, 0x8000));
    }

    #[test]
    fn ones_cycle_through_repeated_saturation() {
        let mut stats = ProbaStats::new();
        // two full halving cycles of ones
        for _ in 0..(1u32 << 16) + 0x8000 {
            stats.record(9, true);
        }
        assert_eq!(stats.counts(9), (0x8001, 0x8000));
        let result = stats.finalize();
        let (t, b, c, p) = split_slot(9);
        assert!(result.probas[t][b][c][p] <= COEFF_PROBS[t][b][c][p]);
    }

    #[test]
    fn overflow_halving_matches_reference() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let bits: alloc::vec::Vec<bool> = (0..200_000).map(|_| rng.gen_bool(0.3)).collect();
        let mut stats = ProbaStats::new();
        for &bit in &bits {
            stats.record(11, bit);
        }
        assert_eq!(stats.counts(11), reference_tally(bits.iter().copied()));
    }

    #[test]
    fn zero_tallies_keep_defaults() {
        let result = finalize_token_probas(&ProbaStats::new());
        assert_eq!(result.probas, COEFF_PROBS);
        assert!(!result.dirty);
        assert_eq!(result.updated_slots, 0);
    }

    #[test]
    fn always_one_moves_probability_to_zero() {
        let mut stats = ProbaStats::new();
        // type 3, band 0, ctx 0, node 0 has default 202 and update proba 248
        let slot = token_id(3, 0, 0);
        stats.set_counts(slot, 5000, 5000);
        let result = stats.finalize();
        assert_eq!(result.probas[3][0][0][0], 0);
        assert!(result.dirty);
        assert_eq!(result.updated_slots, 1);
        assert!(result.header_cost >= LITERAL_COST);
    }

    #[test]
    fn adopted_probability_never_costs_more() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut stats = ProbaStats::new();
        for slot in 0..NUM_SLOTS as u16 {
            let total: u16 = rng.gen_range(0..4000);
            let nb: u16 = if total == 0 { 0 } else { rng.gen_range(0..=total) };
            stats.set_counts(slot, nb, total);
        }
        let result = stats.finalize();
        for slot in 0..NUM_SLOTS as u16 {
            let (t, b, c, p) = split_slot(slot);
            let (nb, total) = stats.counts(slot);
            let chosen = result.probas[t][b][c][p];
            let old_p = COEFF_PROBS[t][b][c][p];
            if chosen != old_p {
                let upd = COEFF_UPDATE_PROBS[t][b][c][p];
                let old_cost = branch_cost(nb, total, old_p) + u64::from(vp8_bit_cost(false, upd));
                let new_cost = branch_cost(nb, total, chosen)
                    + u64::from(vp8_bit_cost(true, upd))
                    + LITERAL_COST;
                assert!(old_cost >= new_cost, "slot {slot}");
                assert_eq!(chosen, calc_token_proba(nb, total));
            }
        }
    }

    #[test]
    fn merge_sums_and_rescales() {
        let mut a = ProbaStats::new();
        let mut b = ProbaStats::new();
        a.set_counts(5, 10, 20);
        b.set_counts(5, 1, 4);
        b.set_counts(6, 0xf000, 0xf000);
        a.set_counts(6, 0x1000, 0x2000);
        a.merge(&b);
        assert_eq!(a.counts(5), (11, 24));
        let (nb, total) = a.counts(6);
        assert!(total <= 0xffff);
        assert!(nb <= total);
        assert_eq!(total, (0xf000 + 0x2000 + 1) >> 1);
    }

    #[test]
    fn reset_clears() {
        let mut stats = ProbaStats::new();
        stats.record(100, true);
        assert!(!stats.is_empty());
        stats.reset();
        assert!(stats.is_empty());
    }
}
