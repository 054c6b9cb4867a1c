use crate::histogram::Histogram;

impl Histogram {
    /// This function returns the number of samples counted in the slot that
    /// `value` maps to.
    pub fn count_at_value(&self, value: u64) -> u64 {
        let index = self.layout.index_for(value).min(self.counts.len() - 1);
        self.counts.get(index)
    }

    /// This function returns the lowest recorded value, at the layout's
    /// resolution, or 0 when the histogram is empty.
    pub fn min(&self) -> u64 {
        if self.total_count == 0 || self.counts.get(0) != 0 {
            return 0;
        }
        self.layout.lowest_equivalent(self.min_value)
    }

    /// This function returns the highest recorded value, at the layout's
    /// resolution, or 0 when the histogram is empty.
    pub fn max(&self) -> u64 {
        if self.max_value == 0 {
            return 0;
        }
        self.layout.highest_equivalent(self.max_value)
    }

    /// Calculate the approximate mean of all recorded samples.
    ///
    /// Each slot contributes at its median equivalent value.
    pub fn mean(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mut total = 0.0;
        for index in self.min_nonzero_index..=self.max_nonzero_index {
            let count = self.counts.get(index);
            if count != 0 {
                let median = self.layout.median_equivalent(self.layout.value_at_index(index));
                total += count as f64 * median as f64;
            }
        }
        total / self.total_count as f64
    }

    /// Calculate the approximate population standard deviation of all
    /// recorded samples.
    pub fn stddev(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let mut geometric_deviation_total = 0.0;
        for index in self.min_nonzero_index..=self.max_nonzero_index {
            let count = self.counts.get(index);
            if count != 0 {
                let median = self.layout.median_equivalent(self.layout.value_at_index(index));
                let deviation = median as f64 - mean;
                geometric_deviation_total += deviation * deviation * count as f64;
            }
        }
        (geometric_deviation_total / self.total_count as f64).sqrt()
    }

    fn target_count_at_percentile(&self, percentile: f64) -> u64 {
        let count = ((percentile / 100.0) * self.total_count as f64).ceil() as u64;
        count.max(1)
    }

    /// This function returns the value at the given percentile (0 to 100).
    ///
    /// The returned value is one that the given percentage of recorded
    /// samples is smaller than or equivalent to. A percentile of 0 returns
    /// the lowest recorded equivalent value; percentiles above 100 are
    /// clamped. An empty histogram reports 0.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let percentile = percentile.min(100.0);
        let target = self.target_count_at_percentile(percentile);
        let mut running = 0u64;
        for index in 0..self.counts.len() {
            running += self.counts.get(index);
            if running >= target {
                let value = self.layout.value_at_index(index);
                return if percentile == 0.0 {
                    self.layout.lowest_equivalent(value)
                } else {
                    self.layout.highest_equivalent(value)
                };
            }
        }
        0
    }

    /// A faster alternative to [Histogram::value_at_percentile] for many
    /// levels at once: one pass over the counts serves the whole list.
    ///
    /// The returned values are in the same order as the requested
    /// percentiles, which may be passed in any order.
    pub fn values_at_percentiles(&self, percentiles: &[f64]) -> Vec<u64> {
        let mut order: Vec<usize> = (0..percentiles.len()).collect();
        order.sort_by(|&a, &b| percentiles[a].total_cmp(&percentiles[b]));

        let mut out = vec![0u64; percentiles.len()];
        let mut running = 0u64;
        let mut index = 0usize;
        for slot in order {
            let percentile = percentiles[slot].min(100.0);
            let target = self.target_count_at_percentile(percentile);
            while running < target && index < self.counts.len() {
                running += self.counts.get(index);
                index += 1;
            }
            if running >= target {
                let value = self.layout.value_at_index(index - 1);
                out[slot] = if percentile == 0.0 {
                    self.layout.lowest_equivalent(value)
                } else {
                    self.layout.highest_equivalent(value)
                };
            }
        }
        out
    }

    /// This function returns the percentage of recorded samples that are
    /// smaller than or equivalent to `value`.
    pub fn percentile_below(&self, value: u64) -> f64 {
        if self.total_count == 0 {
            return 100.0;
        }
        let target_index = self.layout.index_for(value).min(self.counts.len() - 1);
        let below: u64 = (0..=target_index).map(|index| self.counts.get(index)).sum();
        100.0 * below as f64 / self.total_count as f64
    }

    /// This function returns the number of samples recorded between
    /// `low_value` and `high_value` inclusive, at the layout's resolution.
    pub fn count_between(&self, low_value: u64, high_value: u64) -> u64 {
        let low_index = self.layout.index_for(low_value).min(self.counts.len() - 1);
        let high_index = self.layout.index_for(high_value).min(self.counts.len() - 1);
        (low_index..=high_index).map(|index| self.counts.get(index)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HIGHEST: u64 = 3_600_000_000;

    /// 10,000 samples at 1000 and a single outlier at 100,000,000.
    fn loaded_histogram() -> Histogram {
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        h.record_value_n(1_000, 10_000).unwrap();
        h.record_value(100_000_000).unwrap();
        h
    }

    fn check_percentile(h: &Histogram, percentile: f64, expected: f64, variation: f64) {
        let value = h.value_at_percentile(percentile) as f64;
        assert!(
            (value - expected).abs() < expected * variation,
            "percentile {} value {} expected {}",
            percentile,
            value,
            expected
        );
    }

    #[test]
    fn percentiles() {
        let h = loaded_histogram();
        check_percentile(&h, 30.0, 1_000.0, 0.001);
        check_percentile(&h, 99.0, 1_000.0, 0.001);
        check_percentile(&h, 99.99, 1_000.0, 0.001);
        check_percentile(&h, 99.999, 100_000_000.0, 0.001);
        check_percentile(&h, 100.0, 100_000_000.0, 0.001);
        assert_eq!(h.total_count(), 10_001);
        assert!(h.values_are_equivalent(h.min(), 1_000));
        assert!(h.values_are_equivalent(h.max(), 100_000_000));
    }

    #[test]
    fn percentile_zero_is_the_lowest_recorded_value() {
        let h = loaded_histogram();
        assert_eq!(h.value_at_percentile(0.0), h.layout().lowest_equivalent(1_000));
        assert_eq!(
            h.value_at_percentile(100.0),
            h.layout().highest_equivalent(100_000_000)
        );
        assert_eq!(h.value_at_percentile(200.0), h.value_at_percentile(100.0));
    }

    #[test]
    fn batch_percentiles_match_single_queries() {
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        for value in [459876u64, 669187, 711612, 816326, 931423, 1033197] {
            h.record_value(value).unwrap();
        }
        let levels = [99.0, 0.0, 30.0, 50.0, 75.0, 100.0, 83.0];
        let batch = h.values_at_percentiles(&levels);
        for (level, value) in levels.iter().zip(&batch) {
            assert_eq!(*value, h.value_at_percentile(*level), "level {}", level);
        }
    }

    #[test]
    fn empty_histogram_statistics() {
        let h = Histogram::new(HIGHEST, 3).unwrap();
        assert_eq!(h.min(), 0);
        assert_eq!(h.max(), 0);
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.stddev(), 0.0);
        assert_eq!(h.value_at_percentile(50.0), 0);
        assert_eq!(h.percentile_below(1_000), 100.0);
    }

    #[test]
    fn min_is_zero_when_the_first_slot_is_occupied() {
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        h.record_value(0).unwrap();
        h.record_value(5_000).unwrap();
        assert_eq!(h.min(), 0);
    }

    #[test]
    fn mean_and_stddev() {
        // 1000 and 2000 both sit in single-unit slots, so the moments are
        // exact.
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        h.record_value(1_000).unwrap();
        h.record_value(2_000).unwrap();
        assert_relative_eq!(h.mean(), 1_500.0, epsilon = 1e-9);
        assert_relative_eq!(h.stddev(), 500.0, epsilon = 1e-9);

        let loaded = loaded_histogram();
        let approximate_mean = (10_000.0 * 1_000.0 + 100_000_000.0) / 10_001.0;
        assert_relative_eq!(loaded.mean(), approximate_mean, max_relative = 1e-3);
    }

    #[test]
    fn percentile_below_and_count_between() {
        let h = loaded_histogram();
        assert_relative_eq!(
            h.percentile_below(1_000),
            100.0 * 10_000.0 / 10_001.0,
            epsilon = 1e-9
        );
        assert_eq!(h.percentile_below(100_000_000), 100.0);
        assert_eq!(h.count_between(1, 2_000), 10_000);
        assert_eq!(h.count_between(1_000, 100_000_000), 10_001);
        assert_eq!(h.count_between(2_000, 90_000_000), 0);
    }

    #[test]
    fn count_at_value_tracks_equivalence() {
        let h = loaded_histogram();
        assert_eq!(h.count_at_value(1_000), 10_000);
        assert_eq!(h.count_at_value(999), 0);
        assert_eq!(
            h.count_at_value(h.layout().lowest_equivalent(100_000_000)),
            1
        );
    }
}
