//! CSV dataset loading for the offline trainer.
//!
//! Rows carry the static and coordinate properties, the original pixel and
//! one `pred_<predictor>` column per predictor whose residuals the tree may
//! use, all as plain integers. Blank lines and `#` comments are skipped;
//! the header must name every required column.

use anyhow::{Context, Result};
use matree_core::Predictor;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Property columns, in property-id order (channel, group, y, x).
pub static PROPERTY_COLUMNS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["channel", "group", "y", "x"]);

/// Required fixed columns; prediction columns are discovered by their
/// `pred_` prefix.
pub static DATASET_COLUMNS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["channel", "group", "y", "x", "pixel"]);

/// Header prefix of prediction columns, followed by a predictor name.
pub const PREDICTION_PREFIX: &str = "pred_";

/// One training row per pixel.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Property values indexed by property id, one array per row.
    pub properties: Vec<[i32; 4]>,
    pub pixels: Vec<i64>,
    /// Prediction columns parsed from `pred_<predictor>` headers, in
    /// header order.
    pub predictions: Vec<(Predictor, Vec<i64>)>,
}

impl Dataset {
    /// Load a dataset from a deterministic CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("failed to read dataset file")?;

        let mut lines = content.lines().enumerate();
        let mut header: Option<Vec<String>> = None;
        for (_, raw_line) in lines.by_ref() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            header = Some(line.split(',').map(|part| part.trim().to_string()).collect());
            break;
        }
        let header = header.context("dataset is missing a header row")?;
        let mut header_map = HashMap::new();
        for (idx, name) in header.iter().enumerate() {
            header_map.insert(name.as_str(), idx);
        }
        for col in DATASET_COLUMNS.iter() {
            if !header_map.contains_key(col) {
                anyhow::bail!("missing required column '{col}' in dataset header");
            }
        }
        let mut prediction_columns: Vec<(Predictor, usize)> = Vec::new();
        for (idx, name) in header.iter().enumerate() {
            let Some(suffix) = name.strip_prefix(PREDICTION_PREFIX) else {
                continue;
            };
            let predictor: Predictor = suffix
                .parse()
                .map_err(|err| anyhow::anyhow!("column '{name}': {err}"))?;
            if predictor.is_synthetic() {
                anyhow::bail!(
                    "column '{name}' names a synthetic predictor; predictions must come \
                     from real predictors"
                );
            }
            if prediction_columns.iter().any(|&(p, _)| p == predictor) {
                anyhow::bail!("duplicate prediction column '{name}'");
            }
            prediction_columns.push((predictor, idx));
        }
        if prediction_columns.is_empty() {
            anyhow::bail!("dataset needs at least one {PREDICTION_PREFIX}<predictor> column");
        }

        let property_indices: Vec<usize> = PROPERTY_COLUMNS
            .iter()
            .map(|name| header_map[name])
            .collect();
        let pixel_index = header_map["pixel"];

        let mut properties = Vec::new();
        let mut pixels = Vec::new();
        let mut predictions: Vec<(Predictor, Vec<i64>)> = prediction_columns
            .iter()
            .map(|&(p, _)| (p, Vec::new()))
            .collect();
        for (line_idx, raw_line) in lines {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if parts.len() != header.len() {
                anyhow::bail!(
                    "line {}: expected {} columns, found {}",
                    line_idx + 1,
                    header.len(),
                    parts.len()
                );
            }
            let parse = |idx: usize| -> Result<i64> {
                parts[idx].parse::<i64>().with_context(|| {
                    format!(
                        "line {} column {} ('{}') is not an integer",
                        line_idx + 1,
                        idx + 1,
                        parts[idx]
                    )
                })
            };
            let mut row = [0i32; 4];
            for (slot, &idx) in row.iter_mut().zip(&property_indices) {
                *slot = parse(idx)? as i32;
            }
            properties.push(row);
            pixels.push(parse(pixel_index)?);
            for ((_, column), &(_, idx)) in predictions.iter_mut().zip(&prediction_columns) {
                column.push(parse(idx)?);
            }
        }
        if properties.is_empty() {
            anyhow::bail!("dataset is empty");
        }
        Ok(Self {
            properties,
            pixels,
            predictions,
        })
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// The parsed prediction column for `predictor`, if the dataset has one.
    pub fn predictions_for(&self, predictor: Predictor) -> Option<&[i64]> {
        self.predictions
            .iter()
            .find(|&&(p, _)| p == predictor)
            .map(|(_, column)| column.as_slice())
    }

    /// Pixel counts per channel id, for static-property quantization.
    pub fn channel_pixel_count(&self) -> Vec<u32> {
        let mut counts = Vec::new();
        for row in &self.properties {
            let channel = row[0].max(0) as usize;
            if counts.len() <= channel {
                counts.resize(channel + 1, 0);
            }
            counts[channel] += 1;
        }
        counts
    }

    /// Pixel counts per group id.
    pub fn group_pixel_count(&self) -> Vec<u32> {
        let mut counts = Vec::new();
        for row in &self.properties {
            let group = row[1].max(0) as usize;
            if counts.len() <= group {
                counts.resize(group + 1, 0);
            }
            counts[group] += 1;
        }
        counts
    }

    /// Clamped pixel values, for pixel-property quantiles.
    pub fn pixel_samples(&self) -> Vec<i32> {
        self.pixels
            .iter()
            .map(|&p| p.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .collect()
    }

    /// Row-to-row pixel differences, for diff-property quantiles.
    pub fn diff_samples(&self) -> Vec<i32> {
        self.pixels
            .windows(2)
            .map(|w| (w[1] - w[0]).clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "# pixel residual dump")?;
        writeln!(file, "channel,group,y,x,pixel,pred_gradient")?;
        writeln!(file, "0,0,0,0,12,10")?;
        writeln!(file, "0,0,0,1,15,14")?;
        writeln!(file, "1,0,0,0,-3,0")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn load_csv() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = Dataset::from_csv(file.path())?;
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.properties[0], [0, 0, 0, 0]);
        assert_eq!(dataset.properties[2], [1, 0, 0, 0]);
        assert_eq!(dataset.pixels, vec![12, 15, -3]);
        assert_eq!(
            dataset.predictions_for(Predictor::Gradient),
            Some(&[10, 14, 0][..])
        );
        assert_eq!(dataset.predictions_for(Predictor::Weighted), None);
        Ok(())
    }

    #[test]
    fn load_csv_with_multiple_prediction_columns() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_weighted,pred_gradient")?;
        writeln!(file, "0,0,0,0,12,11,10")?;
        writeln!(file, "0,0,0,1,15,16,14")?;
        file.flush()?;
        let dataset = Dataset::from_csv(file.path())?;
        assert_eq!(
            dataset.predictions_for(Predictor::Weighted),
            Some(&[11, 16][..])
        );
        assert_eq!(
            dataset.predictions_for(Predictor::Gradient),
            Some(&[10, 14][..])
        );
        Ok(())
    }

    #[test]
    fn pixel_count_histograms() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = Dataset::from_csv(file.path())?;
        assert_eq!(dataset.channel_pixel_count(), vec![2, 1]);
        assert_eq!(dataset.group_pixel_count(), vec![3]);
        Ok(())
    }

    #[test]
    fn missing_column_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pred_gradient")?;
        writeln!(file, "0,0,0,0,12")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn missing_prediction_columns_are_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel")?;
        writeln!(file, "0,0,0,0,12")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn unknown_prediction_column_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_bogus")?;
        writeln!(file, "0,0,0,0,12,10")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn synthetic_prediction_column_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_best")?;
        writeln!(file, "0,0,0,0,12,10")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn duplicate_prediction_column_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_gradient,pred_gradient")?;
        writeln!(file, "0,0,0,0,12,10,10")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn ragged_row_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_gradient")?;
        writeln!(file, "0,0,0,0,12")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn empty_dataset_is_rejected() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "channel,group,y,x,pixel,pred_gradient")?;
        file.flush()?;
        assert!(Dataset::from_csv(file.path()).is_err());
        Ok(())
    }
}
