//! Frame header syntax owned by the token layer: coefficient probability
//! updates and the macroblock skip probability.

use crate::common::types::{TokenProbTables, COEFF_PROBS, COEFF_UPDATE_PROBS};
use crate::encoder::arithmetic::BitWriter;

/// Skip probabilities at or above this value are not worth signalling.
pub const SKIP_PROBA_THRESHOLD: u8 = 250;

/// Probability that a macroblock is *not* skipped, in 1/255 units.
#[inline]
pub fn calc_skip_proba(nb_skipped: u64, total: u64) -> u8 {
    if total == 0 {
        255
    } else {
        ((total - nb_skipped.min(total)) * 255 / total) as u8
    }
}

/// Skip probability to signal, or `None` when skipping is too rare to pay
/// for the flag on every macroblock.
pub fn finalize_skip_proba(nb_skipped: u64, total: u64) -> Option<u8> {
    let proba = calc_skip_proba(nb_skipped, total);
    (proba < SKIP_PROBA_THRESHOLD).then_some(proba)
}

/// Write the coefficient probability update section followed by the skip
/// probability flag.
///
/// Each of the 1056 slots costs one flag coded with its update probability;
/// slots that differ from the decoder defaults also carry an 8-bit value.
pub fn write_token_probas(writer: &mut BitWriter, probas: &TokenProbTables, skip_proba: Option<u8>) {
    for (t, types) in COEFF_UPDATE_PROBS.iter().enumerate() {
        for (b, bands) in types.iter().enumerate() {
            for (c, ctxs) in bands.iter().enumerate() {
                for (p, &update_proba) in ctxs.iter().enumerate() {
                    let new_p = probas[t][b][c][p];
                    let update = new_p != COEFF_PROBS[t][b][c][p];
                    writer.put_bit(update, update_proba);
                    if update {
                        writer.put_bits(u32::from(new_p), 8);
                    }
                }
            }
        }
    }
    match skip_proba {
        Some(proba) => {
            writer.put_bit_uniform(true);
            writer.put_bits(u32::from(proba), 8);
        }
        None => {
            writer.put_bit_uniform(false);
        }
    }
}
