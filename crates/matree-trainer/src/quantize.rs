//! Property quantization: threshold selection and bucket mapping.
//!
//! Splits in the tree are of the form `property > threshold`, so a property
//! with many distinct values is reduced to a short sorted threshold list and
//! a dense lookup from clamped raw values to bucket indices. Everything not
//! strictly above a threshold clusters with the values below it.

/// Samples are clamped to `[-SAMPLE_RANGE, SAMPLE_RANGE]` before histogram
/// quantization.
pub const SAMPLE_RANGE: i32 = 512;

/// Pick at most `num_chunks - 1` thresholds that cut `histogram` into chunks
/// of roughly equal mass. The returned values are histogram indices.
pub fn quantize_histogram(histogram: &[u32], num_chunks: usize) -> Vec<i32> {
    if histogram.is_empty() || num_chunks == 0 {
        return Vec::new();
    }
    let sum: u64 = histogram.iter().map(|&c| c as u64).sum();
    if sum == 0 {
        return Vec::new();
    }
    let chunks = num_chunks as u64;
    let mut thresholds = Vec::new();
    let mut cumsum = 0u64;
    let mut threshold = 1u64;
    for (i, &count) in histogram.iter().enumerate() {
        cumsum += count as u64;
        if cumsum * chunks >= threshold * sum {
            thresholds.push(i as i32);
            while cumsum * chunks >= threshold * sum {
                threshold += 1;
            }
        }
    }
    // The final entry collects the whole histogram and is not a threshold.
    thresholds.pop();
    thresholds
}

/// Quantile thresholds over raw integer samples, clamped to
/// `[-SAMPLE_RANGE, SAMPLE_RANGE]`.
pub fn quantize_samples(samples: &[i32], num_chunks: usize) -> Vec<i32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let min = samples
        .iter()
        .copied()
        .min()
        .unwrap_or(0)
        .clamp(-SAMPLE_RANGE, SAMPLE_RANGE);
    let mut counts = vec![0u32; (2 * SAMPLE_RANGE + 1) as usize];
    for &s in samples {
        let offset = (s.clamp(-SAMPLE_RANGE, SAMPLE_RANGE) - min) as usize;
        counts[offset] += 1;
    }
    let mut thresholds = quantize_histogram(&counts, num_chunks);
    for v in &mut thresholds {
        *v += min;
    }
    thresholds
}

/// Build the dense bucket lookup for a sorted threshold list: `to[i]` is the
/// number of thresholds strictly below `i - bias`, i.e. the bucket of raw
/// value `i - bias`. A split on bucket `v` is then exactly the predicate
/// `raw > thresholds[v]`.
pub fn quant_map(thresholds: &[i32], num_pegs: usize, bias: i32) -> Vec<u16> {
    let mut to = vec![0u16; num_pegs];
    let mut mapped = 0usize;
    for (i, slot) in to.iter_mut().enumerate() {
        while mapped < thresholds.len() && (i as i32 - bias) > thresholds[mapped] {
            mapped += 1;
        }
        debug_assert!(mapped <= u16::MAX as usize);
        *slot = mapped as u16;
    }
    to
}
