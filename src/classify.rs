//! Quantile classification of case counts into color bins.
//!
//! The bins adapt to skewed distributions (few regions with very high counts, many with low
//! counts) because every palette color covers roughly the same number of regions. Thresholds are
//! rounded so that they read well in a legend.

use egui::Color32;

/// A cut point of the color scale. Counts at `threshold` are drawn with `color`, counts between
/// two thresholds are blended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBin {
    /// Lower bound of the bin.
    pub threshold: f64,
    /// Color at the threshold.
    pub color: Color32,
}

/// Classifies `samples` into at most `palette.len()` bins.
///
/// The scale always starts at zero. When the samples carry no spread at all (every sample equal,
/// or everything zero) a single bin at zero is produced, colored with the second palette color.
pub fn classify(samples: &[f64], palette: &[Color32]) -> Vec<ColorBin> {
    if samples.is_empty() || palette.is_empty() {
        return Vec::new();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let min_val = 0.0;
    let max_val = sorted.iter().copied().fold(0.0, f64::max);

    if max_val == min_val || sorted.first() == sorted.last() {
        let color = palette.get(1).or(palette.first()).copied().unwrap_or_default();
        return vec![ColorBin {
            threshold: min_val,
            color,
        }];
    }

    let n = sorted.len();
    let k = palette.len();
    let mut bins: Vec<ColorBin> = Vec::with_capacity(k);
    for (idx, color) in palette.iter().enumerate() {
        let pos = (n - 1) as f64 * (idx as f64 / k as f64);
        let base = pos.floor() as usize;
        let rest = pos - base as f64;
        let value = match sorted.get(base + 1) {
            Some(next) => sorted[base] + rest * (next - sorted[base]),
            None => sorted[base],
        };
        let threshold = round_threshold(value);

        if bins.last().is_some_and(|prev| prev.threshold == threshold) {
            continue;
        }
        bins.push(ColorBin {
            threshold,
            color: *color,
        });
    }
    bins
}

/// Rounds a threshold up for readability: values between 10 and 100 to the next multiple of 10,
/// values above 100 to the next multiple of 100. Values up to 10 (and exactly 100) are kept.
pub fn round_threshold(value: f64) -> f64 {
    if value > 10.0 && value < 100.0 {
        (value / 10.0).ceil() * 10.0
    } else if value > 100.0 {
        (value / 100.0).ceil() * 100.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reds() -> Vec<Color32> {
        crate::config::ChoroplethConfig::default().palette()
    }

    fn thresholds(bins: &[ColorBin]) -> Vec<f64> {
        bins.iter().map(|b| b.threshold).collect()
    }

    fn assert_well_formed(bins: &[ColorBin]) {
        for pair in bins.windows(2) {
            assert!(
                pair[0].threshold < pair[1].threshold,
                "thresholds must strictly increase: {:?}",
                thresholds(bins)
            );
        }
        for bin in bins {
            let t = bin.threshold;
            if t > 10.0 && t < 100.0 {
                assert_eq!(t % 10.0, 0.0, "{} is not a multiple of 10", t);
            } else if t > 100.0 {
                assert_eq!(t % 100.0, 0.0, "{} is not a multiple of 100", t);
            }
        }
    }

    #[test]
    fn empty_samples_yield_no_bins() {
        assert!(classify(&[], &reds()).is_empty());
    }

    #[test]
    fn all_equal_samples_are_degenerate() {
        let palette = reds();
        let bins = classify(&[5.0, 5.0, 5.0], &palette);
        assert_eq!(
            bins,
            vec![ColorBin {
                threshold: 0.0,
                color: palette[1]
            }]
        );
    }

    #[test]
    fn single_sample_is_degenerate() {
        let palette = reds();
        let bins = classify(&[1234.0], &palette);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].threshold, 0.0);
        assert_eq!(bins[0].color, palette[1]);
    }

    #[test]
    fn all_zero_samples_are_degenerate() {
        let bins = classify(&[0.0, 0.0], &reds());
        assert_eq!(thresholds(&bins), vec![0.0]);
    }

    #[test]
    fn degenerate_with_single_color_palette() {
        let bins = classify(&[7.0], &[Color32::RED]);
        assert_eq!(bins[0].color, Color32::RED);
    }

    #[test]
    fn three_provinces_three_colors() {
        let palette = vec![Color32::WHITE, Color32::YELLOW, Color32::RED];
        let bins = classify(&[250.0, 3.0, 47.0], &palette);
        // 3 stays exact, 32.3 rounds to 40, 114.7 rounds to 200.
        assert_eq!(thresholds(&bins), vec![3.0, 40.0, 200.0]);
        let colors: Vec<_> = bins.iter().map(|b| b.color).collect();
        assert_eq!(colors, palette);
    }

    #[test]
    fn rounding_policy() {
        assert_eq!(round_threshold(47.0), 50.0);
        assert_eq!(round_threshold(250.0), 300.0);
        assert_eq!(round_threshold(10.0), 10.0);
        assert_eq!(round_threshold(10.5), 20.0);
        assert_eq!(round_threshold(100.0), 100.0);
        assert_eq!(round_threshold(100.5), 200.0);
        assert_eq!(round_threshold(2.5), 2.5);
        assert_eq!(round_threshold(0.0), 0.0);
    }

    #[test]
    fn one_to_hundred_with_six_colors() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let bins = classify(&samples, &reds());
        assert_eq!(thresholds(&bins), vec![1.0, 20.0, 40.0, 60.0, 70.0, 90.0]);
        assert!(bins.iter().all(|b| b.threshold <= 100.0));
        assert_well_formed(&bins);
    }

    #[test]
    fn few_distinct_values_collapse_bins() {
        let samples = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0];
        let bins = classify(&samples, &reds());
        assert_eq!(thresholds(&bins), vec![1.0]);

        let samples = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 800.0];
        let bins = classify(&samples, &reds());
        assert_eq!(thresholds(&bins), vec![0.0]);
        assert_eq!(bins[0].color, reds()[0]);
    }

    #[test]
    fn order_of_samples_does_not_matter() {
        let palette = reds();
        let a = classify(&[900.0, 2.0, 35.0, 7.0, 120.0, 0.0], &palette);
        let b = classify(&[0.0, 2.0, 7.0, 35.0, 120.0, 900.0], &palette);
        assert_eq!(a, b);
    }

    #[test]
    fn bins_are_well_formed_for_many_sample_sets() {
        // A small linear congruential generator keeps the sample sets deterministic.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            state >> 33
        };

        let palette = reds();
        for _ in 0..500 {
            let len = (next() % 80 + 1) as usize;
            let spread = [5, 50, 500, 50_000][(next() % 4) as usize];
            let samples: Vec<f64> = (0..len).map(|_| (next() % spread) as f64).collect();

            let bins = classify(&samples, &palette);
            assert!(!bins.is_empty());
            assert!(bins.len() <= palette.len());
            assert_well_formed(&bins);
        }
    }
}
