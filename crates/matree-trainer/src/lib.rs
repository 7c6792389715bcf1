//! Deterministic meta-adaptive decision tree learner.
//!
//! Ingests per-pixel training samples tagged with context properties and
//! candidate residual tokenizations, and greedily grows a decision tree so
//! that within each leaf a single predictor yields low-entropy tokens. The
//! finished tree is serialized by `matree-core` for the entropy coder.

pub mod builder;
pub mod collect;
pub mod dataset;
pub mod entropy;
pub mod errors;
pub mod props;
pub mod quantize;
pub mod rng;
pub mod samples;
pub mod split;

use anyhow::{Context, Result};
use matree_core::{Predictor, Tree};
use std::path::Path;

pub use builder::compute_best_tree;
pub use collect::{collect_pixel_samples, Channel, CollectOptions};
pub use dataset::Dataset;
pub use errors::TrainerError;
pub use props::{
    full_static_range, MultiplierInfo, StaticPropRange, GRADIENT_PROP, NUM_NONREF_PROPERTIES,
    NUM_STATIC_PROPERTIES, PROPERTY_RANGE, WP_PROP,
};
pub use samples::{TreeMode, TreeSamples};

/// Offline training parameters.
#[derive(Debug, Clone)]
pub struct TrainParams {
    /// Predictor configuration; `Best` and `Variable` select several real
    /// predictors, each read from its own `pred_<name>` dataset column.
    pub predictor: Predictor,
    /// Minimum bit saving a split must buy.
    pub threshold: f32,
    /// Slack factor under which decode-friendly splits win.
    pub fast_decode_multiplier: f32,
    /// Bucket budget per property.
    pub max_property_values: usize,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            predictor: Predictor::Gradient,
            threshold: 96.0,
            fast_decode_multiplier: 1.0,
            max_property_values: 32,
        }
    }
}

/// Train a tree directly from a CSV dataset with the provided parameters.
pub fn train_tree_from_csv(path: &Path, params: &TrainParams) -> Result<Tree> {
    let dataset = Dataset::from_csv(path).context("failed to load dataset")?;
    train_tree(&dataset, params)
}

/// Train a tree from an in-memory dataset.
pub fn train_tree(dataset: &Dataset, params: &TrainParams) -> Result<Tree> {
    let mut samples = TreeSamples::new();
    samples.set_predictor(params.predictor, TreeMode::Default)?;
    samples.set_properties(&[0, 1, 2, 3], TreeMode::Default)?;

    // Every configured predictor reads its own prediction column; a tree
    // that compares predictors is meaningless without per-predictor values.
    let mut columns = Vec::with_capacity(samples.num_predictors());
    for i in 0..samples.num_predictors() {
        let predictor = samples.predictor_from_index(i);
        let column = dataset.predictions_for(predictor).with_context(|| {
            format!(
                "dataset is missing prediction column 'pred_{}'",
                predictor.name()
            )
        })?;
        columns.push((predictor.index(), column));
    }

    let mut pixel_samples = dataset.pixel_samples();
    let mut diff_samples = dataset.diff_samples();
    samples.pre_quantize_properties(
        &full_static_range(),
        &[],
        &dataset.group_pixel_count(),
        &dataset.channel_pixel_count(),
        &mut pixel_samples,
        &mut diff_samples,
        params.max_property_values,
    );

    samples.prepare_for_samples(dataset.len());
    for row in 0..dataset.len() {
        let mut predictions = [0i64; 16];
        for &(slot, column) in &columns {
            predictions[slot] = column[row];
        }
        samples.add_sample(dataset.pixels[row], &dataset.properties[row], &predictions);
    }
    tracing::info!(
        rows = dataset.len(),
        distinct = samples.num_distinct_samples(),
        "dataset ingested"
    );

    let tree = compute_best_tree(
        &mut samples,
        params.threshold,
        &[],
        full_static_range(),
        params.fast_decode_multiplier,
    )?;
    Ok(tree)
}
