//! Histogram code-length estimation.

use matree_core::ANS_TAB_SIZE;

/// Estimate the Shannon code length, in bits, of a histogram coded by the
/// downstream entropy coder. Probabilities are floored at `1 / ANS_TAB_SIZE`
/// (the coder cannot represent anything rarer), and a symbol holding all the
/// mass codes for free.
///
/// The reduction is a single stable left-to-right sum, so the result does
/// not depend on any vectorization width.
pub fn estimate_bits(counts: &[i32]) -> f32 {
    let total: i64 = counts.iter().map(|&c| c as i64).sum();
    if total == 0 {
        return 0.0;
    }
    let inv_total = 1.0f32 / total as f32;
    let min_prob = 1.0f32 / ANS_TAB_SIZE as f32;
    let mut bits = 0.0f32;
    for &count in counts {
        if count <= 0 || count as i64 == total {
            continue;
        }
        let prob = (count as f32 * inv_total).max(min_prob);
        bits -= count as f32 * prob.log2();
    }
    bits
}
