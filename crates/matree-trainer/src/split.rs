//! Split search: the greedy core of tree construction.
//!
//! For each node popped off the work stack, the searcher either stamps or
//! forces a split from the multiplier boxes, or scans every configured
//! property for the (threshold, left predictor, right predictor) triple
//! minimizing the estimated code length of the two sides. Candidates are
//! ranked so that constant static splits beat ordinary static splits, which
//! beat splits that keep the weighted predictor out of the tree.

use crate::entropy::estimate_bits;
use crate::props::{MultiplierInfo, StaticPropRange, NUM_STATIC_PROPERTIES, WP_PROP};
use crate::samples::TreeSamples;
use matree_core::{Predictor, Tree, TreeNode};

/// How a multiplier box relates to the static range a subtree still covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intersection {
    /// Disjoint; the box does not constrain this subtree.
    None,
    /// The box cuts through the range; a forced split is required.
    Partial { axis: usize, val: u32 },
    /// The range lies fully inside the box.
    Inside,
}

/// Classify `needle` (the current static range) against `haystack` (a
/// multiplier box). For partial overlaps, reports the strictly interior
/// boundary as an inclusive upper bound for the left side of the split.
fn box_intersects(needle: &StaticPropRange, haystack: &StaticPropRange) -> Intersection {
    let mut partial = None;
    for i in 0..NUM_STATIC_PROPERTIES {
        if haystack[i][0] >= needle[i][1] || haystack[i][1] <= needle[i][0] {
            return Intersection::None;
        }
        if haystack[i][0] <= needle[i][0] && haystack[i][1] >= needle[i][1] {
            continue;
        }
        let val = if haystack[i][0] > needle[i][0] && haystack[i][0] < needle[i][1] {
            haystack[i][0] - 1
        } else {
            debug_assert!(haystack[i][1] > needle[i][0] && haystack[i][1] < needle[i][1]);
            haystack[i][1] - 1
        };
        partial = Some((i, val));
    }
    match partial {
        Some((axis, val)) => Intersection::Partial { axis, val },
        None => Intersection::Inside,
    }
}

/// Reorder rows of `[begin, end)` in place so that rows with
/// `property(prop) <= val` form the prefix `[begin, pos)`. `pos` must be
/// the number of such rows plus `begin`.
pub(crate) fn split_tree_samples(
    samples: &mut TreeSamples,
    begin: usize,
    pos: usize,
    end: usize,
    prop: usize,
    val: u32,
) {
    let mut begin_pos = begin;
    let mut end_pos = pos;
    loop {
        while begin_pos < pos && samples.property(prop, begin_pos) <= val {
            begin_pos += 1;
        }
        while end_pos < end && samples.property(prop, end_pos) > val {
            end_pos += 1;
        }
        if begin_pos < pos && end_pos < end {
            samples.swap(begin_pos, end_pos);
        }
        begin_pos += 1;
        end_pos += 1;
        if begin_pos >= pos || end_pos >= end {
            break;
        }
    }
}

#[derive(Debug, Clone)]
struct SplitInfo {
    prop: usize,
    val: u32,
    pos: usize,
    lcost: f32,
    rcost: f32,
    lpred: Predictor,
    rpred: Predictor,
}

impl Default for SplitInfo {
    fn default() -> Self {
        SplitInfo {
            prop: 0,
            val: 0,
            pos: 0,
            lcost: f32::MAX,
            rcost: f32::MAX,
            lpred: Predictor::Zero,
            rpred: Predictor::Zero,
        }
    }
}

impl SplitInfo {
    fn cost(&self) -> f32 {
        self.lcost + self.rcost
    }
}

#[derive(Debug, Clone, Copy)]
struct CostInfo {
    cost: f32,
    extra_cost: f32,
    pred: Predictor,
}

impl Default for CostInfo {
    fn default() -> Self {
        CostInfo {
            cost: f32::MAX,
            extra_cost: 0.0,
            pred: Predictor::Zero,
        }
    }
}

impl CostInfo {
    fn total(&self) -> f32 {
        self.cost + self.extra_cost
    }
}

struct NodeInfo {
    pos: usize,
    begin: usize,
    end: usize,
    used_properties: u64,
    static_prop_range: StaticPropRange,
}

/// Histogram slices are padded to a common stride.
fn padded(symbols: usize) -> usize {
    symbols.div_ceil(8) * 8
}

/// Grow `tree[pos]` into an internal node with two fresh leaves. The left
/// child covers `property <= splitval`, the right child strictly greater.
pub(crate) fn make_split_node(
    tree: &mut Tree,
    pos: usize,
    property: i32,
    splitval: i32,
    lpred: Predictor,
    loff: i64,
    rpred: Predictor,
    roff: i64,
) {
    let lchild = tree.len() as u32;
    tree.nodes[pos].property = property;
    tree.nodes[pos].splitval = splitval;
    tree.nodes[pos].lchild = lchild;
    tree.nodes[pos].rchild = lchild + 1;
    let mut left = TreeNode::leaf(lpred);
    left.predictor_offset = loff;
    tree.nodes.push(left);
    let mut right = TreeNode::leaf(rpred);
    right.predictor_offset = roff;
    tree.nodes.push(right);
}

/// Recursively partition the sample range of every stacked node, growing
/// `tree` until no split pays for itself.
pub(crate) fn find_best_split(
    samples: &mut TreeSamples,
    threshold: f32,
    mul_info: &[MultiplierInfo],
    initial_static_prop_range: StaticPropRange,
    fast_decode_multiplier: f32,
    tree: &mut Tree,
) {
    let num_predictors = samples.num_predictors();
    let num_properties = samples.num_properties();

    let mut stack = vec![NodeInfo {
        pos: 0,
        begin: 0,
        end: samples.num_distinct_samples(),
        used_properties: 0,
        static_prop_range: initial_static_prop_range,
    }];

    while let Some(node) = stack.pop() {
        let NodeInfo {
            pos,
            begin,
            end,
            mut used_properties,
            static_prop_range,
        } = node;
        if begin == end {
            continue;
        }

        let mut max_symbols = 0usize;
        for pred in 0..num_predictors {
            for row in begin..end {
                max_symbols = max_symbols.max(samples.token(pred, row) as usize + 1);
            }
        }
        let max_symbols = padded(max_symbols);

        let mut counts = vec![0i32; max_symbols * num_predictors];
        let mut tot_extra_bits = vec![0u64; num_predictors];
        for pred in 0..num_predictors {
            let mut extra_bits = 0u64;
            for row in begin..end {
                let rt = samples.residual_token(pred, row);
                let count = samples.count(row);
                counts[pred * max_symbols + rt.tok as usize] += count as i32;
                extra_bits += rt.nbits as u64 * count as u64;
            }
            tot_extra_bits[pred] = extra_bits;
        }

        let base_bits = {
            let pred = samples.predictor_index(tree.nodes[pos].predictor);
            estimate_bits(&counts[pred * max_symbols..(pred + 1) * max_symbols])
                + tot_extra_bits[pred] as f32
        };

        // Multiplier boxes cut halfway through the current static ranges;
        // this happens before the greedy search to keep the tree small.
        let mut forced_split: Option<SplitInfo> = None;
        for info in mul_info {
            match box_intersects(&static_prop_range, &info.range) {
                Intersection::None => continue,
                Intersection::Inside => {
                    tree.nodes[pos].multiplier = info.multiplier;
                    break;
                }
                Intersection::Partial { axis, val } => {
                    let mut forced = SplitInfo {
                        prop: axis,
                        val: samples.quantize_static_property(axis, val as i32),
                        lcost: base_bits / 2.0 - threshold,
                        rcost: base_bits / 2.0 - threshold,
                        lpred: tree.nodes[pos].predictor,
                        rpred: tree.nodes[pos].predictor,
                        ..SplitInfo::default()
                    };
                    debug_assert_eq!(forced.prop as u32, samples.property_from_index(forced.prop));
                    forced.pos = begin
                        + (begin..end)
                            .filter(|&row| samples.property(forced.prop, row) <= forced.val)
                            .count();
                    forced_split = Some(forced);
                    break;
                }
            }
        }

        let best = match forced_split {
            Some(forced) => forced,
            None => {
                let mut best_split_static_constant = SplitInfo::default();
                let mut best_split_static = SplitInfo::default();
                let mut best_split_nonstatic = SplitInfo::default();
                let mut best_split_nowp = SplitInfo::default();

                // Scratch shared across properties, grown but never shrunk.
                let mut prop_value_used_count: Vec<u32> = Vec::new();
                let mut count_increase: Vec<i32> = Vec::new();
                let mut extra_bits_increase: Vec<u64> = Vec::new();
                let mut costs_l: Vec<CostInfo> = Vec::new();
                let mut costs_r: Vec<CostInfo> = Vec::new();
                let mut counts_above = vec![0i32; max_symbols];
                let mut counts_below = vec![0i32; max_symbols];

                // A noisy estimate (low threshold) should not flip
                // predictors back and forth.
                let change_pred_penalty = 800.0 / (100.0 + threshold);
                if base_bits > threshold {
                    for prop in 0..num_properties {
                        costs_l.clear();
                        costs_r.clear();
                        let prop_size = samples.num_property_values(prop);
                        if extra_bits_increase.len() < prop_size {
                            count_increase.resize(prop_size * max_symbols, 0);
                            extra_bits_increase.resize(prop_size, 0);
                        }
                        prop_value_used_count.clear();
                        prop_value_used_count.resize(prop_size, 0);

                        let mut first_used = prop_size;
                        let mut last_used = 0usize;
                        for row in begin..end {
                            let bucket = samples.property(prop, row) as usize;
                            prop_value_used_count[bucket] += 1;
                            last_used = last_used.max(bucket);
                            first_used = first_used.min(bucket);
                        }
                        costs_l.resize(last_used - first_used, CostInfo::default());
                        costs_r.resize(last_used - first_used, CostInfo::default());

                        for pred in 0..num_predictors {
                            for row in begin..end {
                                let bucket = samples.property(prop, row) as usize;
                                let count = samples.count(row);
                                let rt = samples.residual_token(pred, row);
                                count_increase[bucket * max_symbols + rt.tok as usize] +=
                                    count as i32;
                                extra_bits_increase[bucket] += rt.nbits as u64 * count as u64;
                            }
                            counts_above.copy_from_slice(
                                &counts[pred * max_symbols..(pred + 1) * max_symbols],
                            );
                            counts_below.fill(0);
                            let mut extra_bits_below = 0u64;
                            let this_pred = samples.predictor_from_index(pred);
                            let mut penalty = 0.0f32;
                            if this_pred != tree.nodes[pos].predictor
                                && tree.nodes[pos].predictor != Predictor::Weighted
                            {
                                penalty = change_pred_penalty;
                            }
                            // All else equal, disfavor the slow weighted
                            // predictor and favor the trivial zero one.
                            if this_pred == Predictor::Weighted {
                                penalty += 1e-8;
                            }
                            if this_pred == Predictor::Zero {
                                penalty -= 1e-8;
                            }
                            // The last used bucket stays above: neither side
                            // of a candidate split may be empty.
                            for bucket in first_used..last_used {
                                if prop_value_used_count[bucket] == 0 {
                                    continue;
                                }
                                extra_bits_below += extra_bits_increase[bucket];
                                extra_bits_increase[bucket] = 0;
                                for sym in 0..max_symbols {
                                    let inc = count_increase[bucket * max_symbols + sym];
                                    counts_above[sym] -= inc;
                                    counts_below[sym] += inc;
                                    count_increase[bucket * max_symbols + sym] = 0;
                                }
                                debug_assert!(extra_bits_below <= tot_extra_bits[pred]);
                                let rcost = estimate_bits(&counts_above)
                                    + (tot_extra_bits[pred] - extra_bits_below) as f32;
                                let lcost = estimate_bits(&counts_below) + extra_bits_below as f32;
                                let slot = bucket - first_used;
                                if rcost + penalty < costs_r[slot].total() {
                                    costs_r[slot] = CostInfo {
                                        cost: rcost,
                                        extra_cost: penalty,
                                        pred: this_pred,
                                    };
                                }
                                if lcost + penalty < costs_l[slot].total() {
                                    costs_l[slot] = CostInfo {
                                        cost: lcost,
                                        extra_cost: penalty,
                                        pred: this_pred,
                                    };
                                }
                            }
                        }

                        // Pick the best split along this property, routing
                        // it into the candidate slot it belongs to.
                        let mut split = begin;
                        for bucket in first_used..last_used {
                            if prop_value_used_count[bucket] == 0 {
                                continue;
                            }
                            split += prop_value_used_count[bucket] as usize;
                            let slot = bucket - first_used;
                            let lcost = costs_l[slot].cost;
                            let rcost = costs_r[slot].cost;
                            // Would this split introduce the weighted
                            // predictor or its property for the first time?
                            let adds_wp = (samples.property_from_index(prop) == WP_PROP
                                && used_properties & (1u64 << prop) == 0)
                                || ((costs_l[slot].pred == Predictor::Weighted
                                    || costs_r[slot].pred == Predictor::Weighted)
                                    && tree.nodes[pos].predictor != Predictor::Weighted);
                            let zero_entropy_side = rcost == 0.0 || lcost == 0.0;
                            let best_ref = if (samples.property_from_index(prop) as usize)
                                < NUM_STATIC_PROPERTIES
                            {
                                if zero_entropy_side {
                                    &mut best_split_static_constant
                                } else {
                                    &mut best_split_static
                                }
                            } else if adds_wp {
                                &mut best_split_nonstatic
                            } else {
                                &mut best_split_nowp
                            };
                            if lcost + rcost < best_ref.cost() {
                                *best_ref = SplitInfo {
                                    prop,
                                    val: bucket as u32,
                                    pos: split,
                                    lcost,
                                    rcost,
                                    lpred: costs_l[slot].pred,
                                    rpred: costs_r[slot].pred,
                                };
                            }
                        }
                        // The walk stops short of the last used bucket, so
                        // its accumulated increments are still pending;
                        // clear them before the next property reuses the
                        // scratch.
                        extra_bits_increase[last_used] = 0;
                        for sym in 0..max_symbols {
                            count_increase[last_used * max_symbols + sym] = 0;
                        }
                    }
                }

                let mut best = best_split_nonstatic;
                // Prefer not introducing the weighted predictor when that is
                // no more than fast_decode_multiplier times as expensive.
                if best_split_nowp.cost() + threshold < base_bits
                    && best_split_nowp.cost() <= fast_decode_multiplier * best.cost()
                {
                    best = best_split_nowp;
                }
                // Prefer static splits under the same slack.
                if best_split_static.cost() + threshold < base_bits
                    && best_split_static.cost() <= fast_decode_multiplier * best.cost()
                {
                    best = best_split_static;
                }
                // Constant static leaves always win when they pay for
                // themselves.
                if best_split_static_constant.cost() + threshold < base_bits {
                    best = best_split_static_constant;
                }
                best
            }
        };

        if best.cost() + threshold < base_bits {
            let property = samples.property_from_index(best.prop);
            let dequant = samples.unquantize_property(best.prop, best.val);
            tracing::debug!(
                pos,
                property,
                splitval = dequant,
                cost = best.cost(),
                base_bits,
                "committing split"
            );
            make_split_node(
                tree, pos, property as i32, dequant, best.lpred, 0, best.rpred, 0,
            );
            split_tree_samples(samples, begin, best.pos, end, best.prop, best.val);
            if property as usize >= NUM_STATIC_PROPERTIES {
                used_properties |= 1 << best.prop;
            }
            let lchild = tree.nodes[pos].lchild as usize;
            let rchild = tree.nodes[pos].rchild as usize;
            // The split is strict on the right: the left subtree keeps
            // values up to and including the threshold.
            let mut lrange = static_prop_range;
            if (property as usize) < NUM_STATIC_PROPERTIES {
                debug_assert!((dequant + 1) as u32 <= lrange[property as usize][1]);
                lrange[property as usize][1] = (dequant + 1) as u32;
            }
            stack.push(NodeInfo {
                pos: lchild,
                begin,
                end: best.pos,
                used_properties,
                static_prop_range: lrange,
            });
            let mut rrange = static_prop_range;
            if (property as usize) < NUM_STATIC_PROPERTIES {
                debug_assert!(rrange[property as usize][0] <= (dequant + 1) as u32);
                rrange[property as usize][0] = (dequant + 1) as u32;
            }
            stack.push(NodeInfo {
                pos: rchild,
                begin: best.pos,
                end,
                used_properties,
                static_prop_range: rrange,
            });
        }
    }
}
