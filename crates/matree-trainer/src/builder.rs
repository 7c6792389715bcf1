//! Tree construction driver.

use crate::errors::TrainerError;
use crate::props::{MultiplierInfo, StaticPropRange};
use crate::samples::TreeSamples;
use crate::split::find_best_split;
use matree_core::Tree;

/// Build the decision tree minimizing the estimated code length of the
/// samples in `samples`.
///
/// `threshold` is the minimum bit saving a split must buy (larger values
/// give smaller, faster-to-decode trees); `fast_decode_multiplier` (>= 1.0)
/// is the slack under which decode-friendly splits are preferred over
/// strictly cheaper ones. `multiplier_info` boxes force static splits so no
/// leaf straddles a multiplier boundary.
///
/// Rows of `samples` are reordered in place; nothing is added or removed.
pub fn compute_best_tree(
    samples: &mut TreeSamples,
    threshold: f32,
    multiplier_info: &[MultiplierInfo],
    static_prop_range: StaticPropRange,
    fast_decode_multiplier: f32,
) -> Result<Tree, TrainerError> {
    let num_properties = samples.num_properties();
    if num_properties >= 64 {
        return Err(TrainerError::TooManyProperties(num_properties));
    }
    if samples.num_distinct_samples() > u32::MAX as usize {
        return Err(TrainerError::SampleOverflow(samples.num_distinct_samples()));
    }
    let mut tree = Tree::single_leaf(samples.predictor_from_index(0));
    find_best_split(
        samples,
        threshold,
        multiplier_info,
        static_prop_range,
        fast_decode_multiplier,
        &mut tree,
    );
    tracing::info!(
        nodes = tree.len(),
        distinct_samples = samples.num_distinct_samples(),
        "tree construction finished"
    );
    Ok(tree)
}
