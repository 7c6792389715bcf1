//! Count-weighted, deduplicated training-sample store.
//!
//! Columns are parallel: one residual-token column per configured predictor,
//! one bucket column per configured property, and a saturating `u16` count
//! per row. Equal rows are merged at insertion through a two-position hash
//! table; rows whose count saturates leave the table and further equals
//! start a fresh row. During tree construction rows are only ever swapped,
//! never removed.

use crate::errors::TrainerError;
use crate::props::{
    MultiplierInfo, StaticPropRange, GRADIENT_PROP, NUM_NONREF_PROPERTIES, NUM_STATIC_PROPERTIES,
    PROPERTY_RANGE, WP_PROP,
};
use crate::quantize::{quant_map, quantize_histogram, quantize_samples};
use matree_core::{pack_signed, HybridUintConfig, Predictor, ResidualToken};

/// Which predictors and properties the learner is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeMode {
    #[default]
    Default,
    /// Never use the weighted predictor or its error property.
    NoWP,
    /// Only the weighted predictor and its error property.
    WPOnly,
    /// Only the gradient property.
    GradientOnly,
}

const DEDUP_ENTRY_UNUSED: u32 = u32::MAX;

/// The training-sample table consumed by tree construction.
#[derive(Debug, Default)]
pub struct TreeSamples {
    /// Predictors for which residuals are retained; parallel to `residuals`.
    predictors: Vec<Predictor>,
    residuals: Vec<Vec<ResidualToken>>,

    /// Property ids configured via `set_properties`; static ids first.
    props_to_use: Vec<u32>,
    num_static_props: usize,
    static_props: [Vec<u16>; NUM_STATIC_PROPERTIES],
    props: Vec<Vec<u8>>,

    /// Sorted threshold list per configured property.
    compact_properties: Vec<Vec<i32>>,
    /// Raw-value-to-bucket lookups, biased by `PROPERTY_RANGE`.
    property_mapping: Vec<Vec<u16>>,
    static_property_mapping: [Vec<u16>; NUM_STATIC_PROPERTIES],

    sample_counts: Vec<u16>,
    num_samples: usize,
    dedup_table: Vec<u32>,
}

impl TreeSamples {
    pub fn new() -> TreeSamples {
        TreeSamples::default()
    }

    /// Configure the retained predictors. `Variable` retains every real
    /// predictor (weighted and gradient first), `Best` just those two.
    pub fn set_predictor(
        &mut self,
        predictor: Predictor,
        mode: TreeMode,
    ) -> Result<(), TrainerError> {
        if mode == TreeMode::WPOnly {
            self.predictors = vec![Predictor::Weighted];
            self.residuals = vec![Vec::new()];
            return Ok(());
        }
        if mode == TreeMode::NoWP && predictor == Predictor::Weighted {
            return Err(TrainerError::InvalidPredictorConfig(
                "weighted predictor requested in NoWP mode".into(),
            ));
        }
        if predictor == Predictor::Variable {
            self.predictors = Predictor::ALL
                .iter()
                .copied()
                .filter(|p| !p.is_synthetic())
                .collect();
            // Try the usually-best predictors first.
            self.predictors.swap(0, Predictor::Weighted.index());
            self.predictors.swap(1, Predictor::Gradient.index());
        } else if predictor == Predictor::Best {
            self.predictors = vec![Predictor::Weighted, Predictor::Gradient];
        } else {
            self.predictors = vec![predictor];
        }
        if mode == TreeMode::NoWP {
            self.predictors.retain(|&p| p != Predictor::Weighted);
        }
        self.residuals = vec![Vec::new(); self.predictors.len()];
        Ok(())
    }

    /// Configure the property columns. Static properties must sit at the
    /// index equal to their id.
    pub fn set_properties(
        &mut self,
        properties: &[u32],
        mode: TreeMode,
    ) -> Result<(), TrainerError> {
        self.props_to_use = match mode {
            TreeMode::WPOnly => vec![WP_PROP],
            TreeMode::GradientOnly => vec![GRADIENT_PROP],
            TreeMode::NoWP => properties.iter().copied().filter(|&p| p != WP_PROP).collect(),
            TreeMode::Default => properties.to_vec(),
        };
        if self.props_to_use.is_empty() {
            return Err(TrainerError::EmptyPropertySet);
        }
        self.num_static_props = 0;
        for (i, &prop) in self.props_to_use.iter().enumerate() {
            if (prop as usize) < NUM_STATIC_PROPERTIES {
                debug_assert_eq!(i, prop as usize);
                self.num_static_props += 1;
            }
        }
        self.props = vec![Vec::new(); self.props_to_use.len() - self.num_static_props];
        Ok(())
    }

    pub fn num_distinct_samples(&self) -> usize {
        self.sample_counts.len()
    }

    /// Total ingested samples, including merged duplicates.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_properties(&self) -> usize {
        self.props_to_use.len()
    }

    pub fn num_predictors(&self) -> usize {
        self.predictors.len()
    }

    pub fn property_from_index(&self, prop: usize) -> u32 {
        self.props_to_use[prop]
    }

    pub fn predictor_from_index(&self, pred: usize) -> Predictor {
        self.predictors[pred]
    }

    /// Position of `predictor` among the retained predictors.
    pub fn predictor_index(&self, predictor: Predictor) -> usize {
        let pos = self.predictors.iter().position(|&p| p == predictor);
        debug_assert!(pos.is_some(), "predictor {predictor:?} not retained");
        pos.unwrap_or(0)
    }

    /// Bucket of row `row` under configured property `prop`.
    pub fn property(&self, prop: usize, row: usize) -> u32 {
        if prop < self.num_static_props {
            self.static_props[prop][row] as u32
        } else {
            self.props[prop - self.num_static_props][row] as u32
        }
    }

    pub fn residual_token(&self, pred: usize, row: usize) -> ResidualToken {
        self.residuals[pred][row]
    }

    pub fn token(&self, pred: usize, row: usize) -> u32 {
        self.residuals[pred][row].tok as u32
    }

    pub fn count(&self, row: usize) -> u32 {
        self.sample_counts[row] as u32
    }

    /// Buckets a configured property can take: thresholds plus one.
    pub fn num_property_values(&self, prop: usize) -> usize {
        self.compact_properties[prop].len() + 1
    }

    /// Raw-space threshold corresponding to bucket `val` of property `prop`;
    /// the split predicate `bucket > val` is exactly `raw > threshold`.
    pub fn unquantize_property(&self, prop: usize, val: u32) -> i32 {
        self.compact_properties[prop][val as usize]
    }

    pub fn quantize_static_property(&self, axis: usize, value: i32) -> u32 {
        let v = value.clamp(-PROPERTY_RANGE, PROPERTY_RANGE - 1);
        self.static_property_mapping[axis][(v + PROPERTY_RANGE) as usize] as u32
    }

    fn quantize_property(&self, prop: usize, value: i32) -> u32 {
        let v = value.clamp(-PROPERTY_RANGE, PROPERTY_RANGE - 1);
        self.property_mapping[prop - self.num_static_props][(v + PROPERTY_RANGE) as usize] as u32
    }

    /// Build threshold lists and bucket lookups for every configured
    /// property. Multiplier-box boundaries override the data-driven
    /// quantiles on the static axes so forced splits always land on an
    /// existing threshold.
    #[allow(clippy::too_many_arguments)]
    pub fn pre_quantize_properties(
        &mut self,
        range: &StaticPropRange,
        multiplier_info: &[MultiplierInfo],
        group_pixel_count: &[u32],
        channel_pixel_count: &[u32],
        pixel_samples: &mut Vec<i32>,
        diff_samples: &mut Vec<i32>,
        max_property_values: usize,
    ) {
        let max_property_values = max_property_values.min(256);

        let mut channel_thresholds = Vec::new();
        let mut group_thresholds = Vec::new();
        for info in multiplier_info {
            if info.range[0][0] != range[0][0] {
                channel_thresholds.push(info.range[0][0] as i32 - 1);
            }
            if info.range[0][1] != range[0][1] {
                channel_thresholds.push(info.range[0][1] as i32 - 1);
            }
            if info.range[1][0] != range[1][0] {
                group_thresholds.push(info.range[1][0] as i32 - 1);
            }
            if info.range[1][1] != range[1][1] {
                group_thresholds.push(info.range[1][1] as i32 - 1);
            }
        }
        channel_thresholds.sort_unstable();
        channel_thresholds.dedup();
        group_thresholds.sort_unstable();
        group_thresholds.dedup();

        // Thresholds shared between properties quantizing the same samples.
        let mut pixel_thresholds: Option<Vec<i32>> = None;
        let mut abs_pixel_thresholds: Option<Vec<i32>> = None;
        let mut diff_thresholds: Option<Vec<i32>> = None;
        let mut abs_diff_thresholds: Option<Vec<i32>> = None;

        self.compact_properties = vec![Vec::new(); self.props_to_use.len()];
        self.property_mapping =
            vec![Vec::new(); self.props_to_use.len() - self.num_static_props];

        for i in 0..self.props_to_use.len() {
            let p = self.props_to_use[i];
            let thresholds = if p == 0 {
                if channel_thresholds.is_empty() {
                    quantize_histogram(channel_pixel_count, max_property_values)
                } else {
                    channel_thresholds.clone()
                }
            } else if p == 1 {
                if group_thresholds.is_empty() {
                    quantize_histogram(group_pixel_count, max_property_values)
                } else {
                    group_thresholds.clone()
                }
            } else if p == 2 || p == 3 {
                (1..max_property_values)
                    .map(|k| (k * 256 / max_property_values) as i32 - 1)
                    .collect()
            } else if p == 6
                || p == 7
                || p == 8
                || (p >= NUM_NONREF_PROPERTIES && (p - NUM_NONREF_PROPERTIES) % 4 == 1)
            {
                pixel_thresholds
                    .get_or_insert_with(|| quantize_samples(pixel_samples, max_property_values))
                    .clone()
            } else if p == 4 || p == 5 || (p >= NUM_NONREF_PROPERTIES && (p - NUM_NONREF_PROPERTIES) % 4 == 0) {
                match &abs_pixel_thresholds {
                    Some(t) => t.clone(),
                    None => {
                        // Non-abs thresholds first: they reuse the samples
                        // before these are folded to absolute values.
                        pixel_thresholds.get_or_insert_with(|| {
                            quantize_samples(pixel_samples, max_property_values)
                        });
                        for v in pixel_samples.iter_mut() {
                            *v = v.abs();
                        }
                        let t = quantize_samples(pixel_samples, max_property_values);
                        abs_pixel_thresholds = Some(t.clone());
                        t
                    }
                }
            } else if p >= NUM_NONREF_PROPERTIES && (p - NUM_NONREF_PROPERTIES) % 4 == 2 {
                match &abs_diff_thresholds {
                    Some(t) => t.clone(),
                    None => {
                        diff_thresholds.get_or_insert_with(|| {
                            quantize_samples(diff_samples, max_property_values)
                        });
                        for v in diff_samples.iter_mut() {
                            *v = v.abs();
                        }
                        let t = quantize_samples(diff_samples, max_property_values);
                        abs_diff_thresholds = Some(t.clone());
                        t
                    }
                }
            } else if p == WP_PROP {
                wp_thresholds(max_property_values)
            } else {
                diff_thresholds
                    .get_or_insert_with(|| quantize_samples(diff_samples, max_property_values))
                    .clone()
            };
            let mapping = quant_map(
                &thresholds,
                (PROPERTY_RANGE * 2 + 1) as usize,
                PROPERTY_RANGE,
            );
            if i < self.num_static_props {
                self.static_property_mapping[i] = mapping;
            } else {
                self.property_mapping[i - self.num_static_props] = mapping;
            }
            self.compact_properties[i] = thresholds;
        }
    }

    /// Reserve room for `extra` samples and size the dedup table to the
    /// next power of two above 1.5x the projected total.
    pub fn prepare_for_samples(&mut self, extra: usize) {
        for residual in &mut self.residuals {
            residual.reserve(extra);
        }
        for static_prop in self.static_props.iter_mut().take(self.num_static_props) {
            static_prop.reserve(extra);
        }
        for prop in &mut self.props {
            prop.reserve(extra);
        }
        let total = self.sample_counts.len() + extra;
        if total == 0 {
            return;
        }
        self.init_table(ceil_log2(total * 3 / 2));
    }

    fn init_table(&mut self, log_size: u32) {
        let size = 1usize << log_size;
        if self.dedup_table.len() == size {
            return;
        }
        tracing::debug!(size, "rebuilding sample dedup table");
        self.dedup_table = vec![DEDUP_ENTRY_UNUSED; size];
        for row in 0..self.sample_counts.len() {
            if self.sample_counts[row] != u16::MAX {
                self.add_to_table(row);
            }
        }
    }

    /// Tokenize, quantize and append one sample, merging it into an equal
    /// existing row when there is one. `properties` is indexed by property
    /// id; `predictions` by predictor id.
    pub fn add_sample(&mut self, pixel: i64, properties: &[i32], predictions: &[i64]) {
        for (i, &predictor) in self.predictors.iter().enumerate() {
            let residual = pixel - predictions[predictor.index()];
            let (tok, nbits, _bits) = HybridUintConfig::RESIDUAL.encode(pack_signed(residual));
            debug_assert!(tok < 256);
            debug_assert!(nbits < 256);
            self.residuals[i].push(ResidualToken {
                tok: tok as u8,
                nbits: nbits as u8,
            });
        }
        for i in 0..self.num_static_props {
            let bucket = self.quantize_static_property(i, properties[i]);
            self.static_props[i].push(bucket as u16);
        }
        for i in self.num_static_props..self.props_to_use.len() {
            let raw = properties[self.props_to_use[i] as usize];
            let bucket = self.quantize_property(i, raw);
            debug_assert!(bucket < 256);
            self.props[i - self.num_static_props].push(bucket as u8);
        }
        self.sample_counts.push(1);
        self.num_samples += 1;
        if self.add_to_table_and_merge(self.sample_counts.len() - 1) {
            for residual in &mut self.residuals {
                residual.pop();
            }
            for static_prop in self.static_props.iter_mut().take(self.num_static_props) {
                static_prop.pop();
            }
            for prop in &mut self.props {
                prop.pop();
            }
            self.sample_counts.pop();
        }
    }

    /// Exchange rows `a` and `b` in every column.
    pub fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for residual in &mut self.residuals {
            residual.swap(a, b);
        }
        for static_prop in self.static_props.iter_mut().take(self.num_static_props) {
            static_prop.swap(a, b);
        }
        for prop in &mut self.props {
            prop.swap(a, b);
        }
        self.sample_counts.swap(a, b);
    }

    /// Try to merge row `row` into an equal existing row; returns true when
    /// merged (the caller then discards the appended row).
    fn add_to_table_and_merge(&mut self, row: usize) -> bool {
        if self.dedup_table.is_empty() {
            // Callers normally size the table via prepare_for_samples.
            self.init_table(10);
        }
        let pos1 = self.hash1(row);
        let pos2 = self.hash2(row);
        for pos in [pos1, pos2] {
            let entry = self.dedup_table[pos];
            if entry != DEDUP_ENTRY_UNUSED && self.is_same_sample(row, entry as usize) {
                debug_assert_eq!(self.sample_counts[row], 1);
                self.sample_counts[entry as usize] += 1;
                // Saturated rows leave the table; further equal samples
                // become independent rows.
                if self.sample_counts[entry as usize] == u16::MAX {
                    self.dedup_table[pos] = DEDUP_ENTRY_UNUSED;
                }
                return true;
            }
        }
        self.add_to_table(row);
        false
    }

    fn add_to_table(&mut self, row: usize) {
        let pos1 = self.hash1(row);
        let pos2 = self.hash2(row);
        if self.dedup_table[pos1] == DEDUP_ENTRY_UNUSED {
            self.dedup_table[pos1] = row as u32;
        } else if self.dedup_table[pos2] == DEDUP_ENTRY_UNUSED {
            self.dedup_table[pos2] = row as u32;
        }
    }

    fn hash1(&self, row: usize) -> usize {
        const K: u64 = 0x1e35a7bd;
        let mut h = K;
        for residual in &self.residuals {
            h = h.wrapping_mul(K).wrapping_add(residual[row].tok as u64);
            h = h.wrapping_mul(K).wrapping_add(residual[row].nbits as u64);
        }
        for static_prop in self.static_props.iter().take(self.num_static_props) {
            h = h.wrapping_mul(K).wrapping_add(static_prop[row] as u64);
        }
        for prop in &self.props {
            h = h.wrapping_mul(K).wrapping_add(prop[row] as u64);
        }
        ((h >> 16) & (self.dedup_table.len() as u64 - 1)) as usize
    }

    fn hash2(&self, row: usize) -> usize {
        const K: u64 = 0x1e35a7bd1e35a7bd;
        let mut h = K;
        for static_prop in self.static_props.iter().take(self.num_static_props) {
            h = h.wrapping_mul(K) ^ static_prop[row] as u64;
        }
        for prop in &self.props {
            h = h.wrapping_mul(K) ^ prop[row] as u64;
        }
        for residual in &self.residuals {
            h = h.wrapping_mul(K) ^ residual[row].tok as u64;
            h = h.wrapping_mul(K) ^ residual[row].nbits as u64;
        }
        ((h >> 16) & (self.dedup_table.len() as u64 - 1)) as usize
    }

    fn is_same_sample(&self, a: usize, b: usize) -> bool {
        for residual in &self.residuals {
            if residual[a] != residual[b] {
                return false;
            }
        }
        for static_prop in self.static_props.iter().take(self.num_static_props) {
            if static_prop[a] != static_prop[b] {
                return false;
            }
        }
        for prop in &self.props {
            if prop[a] != prop[b] {
                return false;
            }
        }
        true
    }
}

/// Hardcoded dyadic thresholds for the weighted-predictor error property;
/// resolution grows with the configured bucket budget.
fn wp_thresholds(max_property_values: usize) -> Vec<i32> {
    if max_property_values < 32 {
        return vec![-127, -63, -31, -15, -7, -3, -1, 0, 1, 3, 7, 15, 31, 63, 127];
    }
    if max_property_values < 64 {
        return vec![
            -255, -191, -127, -95, -63, -47, -31, -23, -15, -11, -7, -5, -3, -1, 0, 1, 3, 5, 7,
            11, 15, 23, 31, 47, 63, 95, 127, 191, 255,
        ];
    }
    vec![
        -255, -223, -191, -159, -127, -111, -95, -79, -63, -55, -47, -39, -31, -27, -23, -19,
        -15, -13, -11, -9, -7, -6, -5, -4, -3, -2, -1, 0, 1, 2, 3, 4, 5, 6, 7, 9, 11, 13, 15,
        19, 23, 27, 31, 39, 47, 55, 63, 79, 95, 111, 127, 159, 191, 223, 255,
    ]
}

fn ceil_log2(x: usize) -> u32 {
    usize::BITS - x.saturating_sub(1).leading_zeros()
}
