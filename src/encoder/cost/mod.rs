//! Bit-cost model for probability adaptation.
//!
//! Costs are fixed point, in 1/256 bit units, looked up from
//! [`VP8_ENTROPY_COST`].
//!
//! ## Module organization
//!
//! - [`stats`]: per-slot tallies and the per-frame probability finalizer

pub mod stats;

pub use stats::{finalize_token_probas, FinalizedProbas, ProbaStats};

use super::tables::VP8_ENTROPY_COST;

/// Cost of coding `bit` with probability `prob` (probability of a 0).
#[inline]
pub fn vp8_bit_cost(bit: bool, prob: u8) -> u16 {
    if bit {
        VP8_ENTROPY_COST[255 - prob as usize]
    } else {
        VP8_ENTROPY_COST[prob as usize]
    }
}

/// Cost of coding `nb` ones and `total - nb` zeros with probability `proba`.
#[inline]
pub fn branch_cost(nb: u32, total: u32, proba: u8) -> u64 {
    let cost_1 = u64::from(vp8_bit_cost(true, proba));
    let cost_0 = u64::from(vp8_bit_cost(false, proba));
    u64::from(nb) * cost_1 + u64::from(total.saturating_sub(nb)) * cost_0
}

/// Probability of a 0 that best fits `nb` ones out of `total` bits.
///
/// Returns 255 when no 1 was seen.
#[inline]
pub fn calc_token_proba(nb: u32, total: u32) -> u8 {
    // a saturated run of ones leaves nb one above total
    debug_assert!(nb <= total + 1);
    if nb == 0 {
        255
    } else {
        255u32.saturating_sub(nb * 255 / total) as u8
    }
}

/// Converts a cost in 1/256 bits to whole bytes, rounding up.
#[inline]
pub fn cost_to_bytes(cost: u64) -> u64 {
    (cost + 2047) >> 11
}
