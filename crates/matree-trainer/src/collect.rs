//! Pixel-sample collection for property quantization.
//!
//! Before any tree is built, a sparse subset of pixels is gathered to drive
//! the quantile thresholds of the pixel- and diff-valued properties, along
//! with per-channel and per-group pixel counts for the static axes. The
//! subsample walks all channel planes with geometric skips from a seeded
//! LCG, so the same image yields the same thresholds on every platform.

use crate::rng::LcgRng;

/// One channel plane, row-major.
#[derive(Debug, Clone)]
pub struct Channel {
    pub w: usize,
    pub h: usize,
    pub data: Vec<i32>,
}

impl Channel {
    pub fn new(w: usize, h: usize, data: Vec<i32>) -> Channel {
        debug_assert_eq!(data.len(), w * h);
        Channel { w, h, data }
    }

    pub fn row(&self, y: usize) -> &[i32] {
        &self.data[y * self.w..(y + 1) * self.w]
    }
}

/// Sampling configuration.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Fraction of pixels that will eventually become training samples;
    /// quantization samples a tenth of that.
    pub nb_repeats: f32,
    /// Channels larger than this on either side stop collection.
    pub max_channel_size: usize,
    /// Leading meta channels are exempt from the size cutoff.
    pub num_meta_channels: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            nb_repeats: 0.5,
            max_channel_size: 0xFF_FFFF,
            num_meta_channels: 0,
        }
    }
}

/// Accumulate quantization samples and pixel counts for one group of
/// channel planes. `group_pixel_count` and `channel_pixel_count` grow as
/// needed and accumulate across calls.
pub fn collect_pixel_samples(
    channels: &[Channel],
    options: &CollectOptions,
    group_id: u32,
    group_pixel_count: &mut Vec<u32>,
    channel_pixel_count: &mut Vec<u32>,
    pixel_samples: &mut Vec<i32>,
    diff_samples: &mut Vec<i32>,
) {
    if options.nb_repeats == 0.0 {
        return;
    }
    if group_pixel_count.len() <= group_id as usize {
        group_pixel_count.resize(group_id as usize + 1, 0);
    }
    if channel_pixel_count.len() < channels.len() {
        channel_pixel_count.resize(channels.len(), 0);
    }
    let mut rng = LcgRng::new(group_id as i64);
    // Sample roughly 10% of the eventual training-sample count.
    let fraction = (options.nb_repeats as f64 * 0.1).min(0.99);

    let mut channel_ids = Vec::new();
    let mut total_pixels = 0usize;
    for (i, channel) in channels.iter().enumerate() {
        if i >= options.num_meta_channels
            && (channel.w > options.max_channel_size || channel.h > options.max_channel_size)
        {
            break;
        }
        if channel.w <= 1 || channel.h == 0 {
            // Diff samples need a horizontal neighbor.
            continue;
        }
        channel_ids.push(i);
        let pixels = (channel.w * channel.h) as u32;
        group_pixel_count[group_id as usize] += pixels;
        channel_pixel_count[i] += pixels;
        total_pixels += channel.w * channel.h;
    }
    if channel_ids.is_empty() {
        return;
    }
    pixel_samples.reserve((fraction * total_pixels as f64) as usize);
    diff_samples.reserve((fraction * total_pixels as f64) as usize);

    let mut ci = 0usize;
    let mut x = 0usize;
    let mut y = 0usize;
    advance(channels, &channel_ids, &mut ci, &mut x, &mut y, rng.geometric(fraction));
    while ci < channel_ids.len() {
        let channel = &channels[channel_ids[ci]];
        let row = channel.row(y);
        pixel_samples.push(row[x]);
        let xp = if x == 0 { 1 } else { x - 1 };
        // Full-depth pixels can overflow a 32-bit diff; subtract in 64 bits.
        let diff = row[x] as i64 - row[xp] as i64;
        diff_samples.push(diff.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
        let skip = rng.geometric(fraction) + 1;
        advance(channels, &channel_ids, &mut ci, &mut x, &mut y, skip);
    }
}

/// Move the (channel, y, x) cursor forward by `amount` pixels, wrapping
/// rows and channels.
fn advance(
    channels: &[Channel],
    ids: &[usize],
    ci: &mut usize,
    x: &mut usize,
    y: &mut usize,
    amount: usize,
) {
    *x += amount;
    while *ci < ids.len() && *x >= channels[ids[*ci]].w {
        *x -= channels[ids[*ci]].w;
        *y += 1;
        if *y == channels[ids[*ci]].h {
            *ci += 1;
            *y = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_channel(w: usize, h: usize) -> Channel {
        let data = (0..w * h).map(|i| (i % 256) as i32).collect();
        Channel::new(w, h, data)
    }

    #[test]
    fn accumulates_pixel_counts() {
        let channels = vec![gradient_channel(16, 16), gradient_channel(8, 8)];
        let mut group = Vec::new();
        let mut chan = Vec::new();
        let mut px = Vec::new();
        let mut df = Vec::new();
        collect_pixel_samples(
            &channels,
            &CollectOptions::default(),
            0,
            &mut group,
            &mut chan,
            &mut px,
            &mut df,
        );
        assert_eq!(group, vec![256 + 64]);
        assert_eq!(chan, vec![256, 64]);
        assert!(!px.is_empty());
        assert_eq!(px.len(), df.len());
    }

    #[test]
    fn skips_narrow_and_empty_channels() {
        let channels = vec![
            Channel::new(1, 4, vec![0; 4]),
            Channel::new(4, 0, vec![]),
            gradient_channel(4, 4),
        ];
        let mut group = Vec::new();
        let mut chan = Vec::new();
        let mut px = Vec::new();
        let mut df = Vec::new();
        collect_pixel_samples(
            &channels,
            &CollectOptions::default(),
            2,
            &mut group,
            &mut chan,
            &mut px,
            &mut df,
        );
        assert_eq!(group, vec![0, 0, 16]);
        assert_eq!(chan, vec![0, 0, 16]);
    }

    #[test]
    fn oversized_channel_stops_collection() {
        let channels = vec![gradient_channel(64, 2), gradient_channel(4, 4)];
        let options = CollectOptions {
            max_channel_size: 32,
            ..CollectOptions::default()
        };
        let mut group = Vec::new();
        let mut chan = Vec::new();
        let mut px = Vec::new();
        let mut df = Vec::new();
        collect_pixel_samples(&channels, &options, 0, &mut group, &mut chan, &mut px, &mut df);
        assert!(group.iter().all(|&c| c == 0));
    }

    #[test]
    fn collection_is_deterministic() {
        let channels = vec![gradient_channel(32, 32)];
        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut group = Vec::new();
            let mut chan = Vec::new();
            let mut px = Vec::new();
            let mut df = Vec::new();
            collect_pixel_samples(
                &channels,
                &CollectOptions::default(),
                5,
                &mut group,
                &mut chan,
                &mut px,
                &mut df,
            );
            runs.push((px, df));
        }
        assert_eq!(runs[0], runs[1]);
    }

    #[test]
    fn zero_repeats_collects_nothing() {
        let channels = vec![gradient_channel(8, 8)];
        let options = CollectOptions {
            nb_repeats: 0.0,
            ..CollectOptions::default()
        };
        let mut group = Vec::new();
        let mut chan = Vec::new();
        let mut px = Vec::new();
        let mut df = Vec::new();
        collect_pixel_samples(&channels, &options, 0, &mut group, &mut chan, &mut px, &mut df);
        assert!(px.is_empty() && group.is_empty());
    }
}
