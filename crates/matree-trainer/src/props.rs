//! Property identifiers and static-property geometry.
//!
//! Properties 0 and 1 (channel and group id) are static: constant over a
//! spatial region, which lets the decoder skip whole subtrees. The weighted
//! predictor's error property is special because using it forces the decoder
//! to run the slow predictor everywhere.

use serde::{Deserialize, Serialize};

/// Number of static properties (channel id, group id).
pub const NUM_STATIC_PROPERTIES: usize = 2;

/// First property id referring to previously decoded channels.
pub const NUM_NONREF_PROPERTIES: u32 = 16;

/// Property id carrying the weighted-predictor error estimate.
pub const WP_PROP: u32 = 15;

/// Property id carrying the local gradient.
pub const GRADIENT_PROP: u32 = 9;

/// Raw property values are clamped to `[-PROPERTY_RANGE, PROPERTY_RANGE - 1]`
/// before bucket lookup.
pub const PROPERTY_RANGE: i32 = 511;

/// Half-open `[lo, hi)` interval per static-property axis.
pub type StaticPropRange = [[u32; 2]; NUM_STATIC_PROPERTIES];

/// The full static-property space.
pub fn full_static_range() -> StaticPropRange {
    [[0, u32::MAX]; NUM_STATIC_PROPERTIES]
}

/// Forces every leaf whose static range falls inside `range` to carry
/// `multiplier`; the learner must split the static space along the box
/// boundaries so that no leaf straddles one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierInfo {
    pub range: StaticPropRange,
    pub multiplier: u32,
}
