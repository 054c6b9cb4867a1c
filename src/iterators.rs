use crate::histogram::Histogram;

/// One step of a histogram iteration.
///
/// Every iterator kind yields the same record shape: the value band the
/// step covers, the counts seen at and up to it, and the percentile the
/// running total corresponds to.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationValue {
    value_iterated_to: u64,
    value_iterated_from: u64,
    count_at_value_iterated_to: u64,
    count_added_in_this_iteration_step: u64,
    total_count_to_this_value: u64,
    total_value_to_this_value: u64,
    percentile: f64,
    percentile_level_iterated_to: f64,
}

impl IterationValue {
    /// The value this step iterated to (inclusive upper edge of the step).
    pub fn value_iterated_to(&self) -> u64 {
        self.value_iterated_to
    }

    /// The value the previous step iterated to.
    pub fn value_iterated_from(&self) -> u64 {
        self.value_iterated_from
    }

    /// The number of samples in the slot at `value_iterated_to`.
    pub fn count_at_value_iterated_to(&self) -> u64 {
        self.count_at_value_iterated_to
    }

    /// The number of samples this step added over the previous one.
    pub fn count_added_in_this_iteration_step(&self) -> u64 {
        self.count_added_in_this_iteration_step
    }

    /// The number of samples at and below `value_iterated_to`.
    pub fn total_count_to_this_value(&self) -> u64 {
        self.total_count_to_this_value
    }

    /// The sum of sample values at and below `value_iterated_to`, each
    /// contributing at its highest equivalent value.
    pub fn total_value_to_this_value(&self) -> u64 {
        self.total_value_to_this_value
    }

    /// The percentile of recorded samples at and below `value_iterated_to`.
    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// The percentile level the step set out to reach; equal to
    /// [IterationValue::percentile] except for the percentile iterator,
    /// which reports its requested tick level here.
    pub fn percentile_level_iterated_to(&self) -> f64 {
        self.percentile_level_iterated_to
    }
}

/// The per-kind portion of the iterator state: the current reporting level
/// and how it advances.
#[derive(Debug)]
enum IterKind {
    AllValues {
        visited: Option<usize>,
    },
    Recorded {
        visited: Option<usize>,
    },
    Linear {
        value_units_per_bucket: u64,
        current_step_highest: u64,
        current_step_lowest_equivalent: u64,
    },
    Logarithmic {
        log_base: f64,
        next_value_reporting_level: f64,
        current_step_highest: u64,
        current_step_lowest_equivalent: u64,
    },
    Percentile {
        ticks_per_half_distance: u32,
        level_to_iterate_to: f64,
        reached_last_recorded_value: bool,
    },
}

/// A pull sequence over a histogram's counts array.
///
/// The iterator walks slots in ascending index order, accumulating running
/// totals, and yields one [IterationValue] each time the kind-specific
/// reporting level is reached. It does not modify the histogram; restart by
/// asking the histogram for a fresh iterator.
#[derive(Debug)]
pub struct HistogramIter<'a> {
    histogram: &'a Histogram,
    kind: IterKind,
    current_index: usize,
    count_at_this_index: u64,
    total_count_to_current_index: u64,
    total_count_to_prev_index: u64,
    total_value_to_current_index: u64,
    prev_value_iterated_to: u64,
    fresh_sub_bucket: bool,
}

impl Histogram {
    fn iter_with(&self, kind: IterKind) -> HistogramIter<'_> {
        HistogramIter {
            histogram: self,
            kind,
            current_index: 0,
            count_at_this_index: 0,
            total_count_to_current_index: 0,
            total_count_to_prev_index: 0,
            total_value_to_current_index: 0,
            prev_value_iterated_to: 0,
            fresh_sub_bucket: true,
        }
    }

    /// Iterate through every slot of the counts array, recorded or not, in
    /// ascending value order.
    pub fn iter_all(&self) -> HistogramIter<'_> {
        self.iter_with(IterKind::AllValues { visited: None })
    }

    /// Iterate through every slot holding at least one sample, in ascending
    /// value order.
    pub fn iter_recorded(&self) -> HistogramIter<'_> {
        self.iter_with(IterKind::Recorded { visited: None })
    }

    /// Iterate through contiguous value bands of `value_units_per_bucket`
    /// starting at 0, aggregating the counts in each band, until the band
    /// containing the highest recorded value has been yielded.
    pub fn iter_linear(&self, value_units_per_bucket: u64) -> HistogramIter<'_> {
        assert!(value_units_per_bucket > 0, "band width must be non-zero");
        let current_step_highest = value_units_per_bucket - 1;
        self.iter_with(IterKind::Linear {
            value_units_per_bucket,
            current_step_highest,
            current_step_lowest_equivalent: self.layout.lowest_equivalent(current_step_highest),
        })
    }

    /// Iterate through geometrically growing value bands, the first covering
    /// `value_units_in_first_bucket` and each subsequent one `log_base`
    /// times wider, until the band containing the highest recorded value has
    /// been yielded.
    pub fn iter_logarithmic(
        &self,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> HistogramIter<'_> {
        assert!(value_units_in_first_bucket > 0, "first band must be non-empty");
        assert!(log_base > 1.0, "log base must exceed 1");
        let current_step_highest = value_units_in_first_bucket - 1;
        self.iter_with(IterKind::Logarithmic {
            log_base,
            next_value_reporting_level: value_units_in_first_bucket as f64,
            current_step_highest,
            current_step_lowest_equivalent: self.layout.lowest_equivalent(current_step_highest),
        })
    }

    /// Iterate through percentile levels, starting at 0% and halving the
    /// distance to 100% every `ticks_per_half_distance` steps, terminating
    /// with a record at 100%.
    pub fn iter_percentiles(&self, ticks_per_half_distance: u32) -> HistogramIter<'_> {
        self.iter_with(IterKind::Percentile {
            ticks_per_half_distance: ticks_per_half_distance.max(1),
            level_to_iterate_to: 0.0,
            reached_last_recorded_value: false,
        })
    }
}

impl<'a> HistogramIter<'a> {
    /// Decide whether another record is due, and arm the final 100% record
    /// for percentile iteration once all counts are consumed.
    fn prepare_next(&mut self) -> bool {
        let total = self.histogram.total_count;
        let below_total = self.total_count_to_current_index < total;
        let next_value_at_index = self
            .histogram
            .layout
            .value_at_index(self.current_index + 1);
        match &mut self.kind {
            IterKind::AllValues { .. } => self.current_index < self.histogram.counts.len(),
            IterKind::Recorded { .. } => below_total,
            IterKind::Linear {
                current_step_highest,
                ..
            } => below_total || current_step_highest.saturating_add(1) < next_value_at_index,
            IterKind::Logarithmic {
                next_value_reporting_level,
                ..
            } => {
                below_total
                    || self
                        .histogram
                        .layout
                        .lowest_equivalent(*next_value_reporting_level as u64)
                        < next_value_at_index
            }
            IterKind::Percentile {
                level_to_iterate_to,
                reached_last_recorded_value,
                ..
            } => {
                if below_total {
                    true
                } else if !*reached_last_recorded_value && total > 0 {
                    *level_to_iterate_to = 100.0;
                    *reached_last_recorded_value = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn reached_iteration_level(&self) -> bool {
        let current_value = self.histogram.layout.value_at_index(self.current_index);
        match &self.kind {
            IterKind::AllValues { visited } => *visited != Some(self.current_index),
            IterKind::Recorded { visited } => {
                self.count_at_this_index != 0 && *visited != Some(self.current_index)
            }
            IterKind::Linear {
                current_step_lowest_equivalent,
                ..
            } => current_value >= *current_step_lowest_equivalent,
            IterKind::Logarithmic {
                current_step_lowest_equivalent,
                ..
            } => current_value >= *current_step_lowest_equivalent,
            IterKind::Percentile {
                level_to_iterate_to,
                ..
            } => self.count_at_this_index != 0 && self.current_percentile() >= *level_to_iterate_to,
        }
    }

    fn value_iterated_to(&self) -> u64 {
        match &self.kind {
            IterKind::AllValues { .. } | IterKind::Recorded { .. } | IterKind::Percentile { .. } => {
                self.histogram
                    .layout
                    .highest_equivalent(self.histogram.layout.value_at_index(self.current_index))
            }
            IterKind::Linear {
                current_step_highest,
                ..
            }
            | IterKind::Logarithmic {
                current_step_highest,
                ..
            } => current_step_highest.saturating_add(1),
        }
    }

    fn increment_iteration_level(&mut self) {
        let layout = &self.histogram.layout;
        match &mut self.kind {
            IterKind::AllValues { visited } | IterKind::Recorded { visited } => {
                *visited = Some(self.current_index)
            }
            IterKind::Linear {
                value_units_per_bucket,
                current_step_highest,
                current_step_lowest_equivalent,
            } => {
                *current_step_highest = current_step_highest.saturating_add(*value_units_per_bucket);
                *current_step_lowest_equivalent = layout.lowest_equivalent(*current_step_highest);
            }
            IterKind::Logarithmic {
                log_base,
                next_value_reporting_level,
                current_step_highest,
                current_step_lowest_equivalent,
            } => {
                *next_value_reporting_level *= *log_base;
                *current_step_highest = (*next_value_reporting_level as u64).saturating_sub(1);
                *current_step_lowest_equivalent = layout.lowest_equivalent(*current_step_highest);
            }
            IterKind::Percentile {
                ticks_per_half_distance,
                level_to_iterate_to,
                ..
            } => {
                if *level_to_iterate_to < 100.0 {
                    // Each time the remaining distance to 100% halves, the
                    // number of ticks per unit of distance doubles.
                    let half_distance_exponent =
                        ((100.0 / (100.0 - *level_to_iterate_to)).log2() as u32) + 1;
                    let total_ticks =
                        (*ticks_per_half_distance as f64) * 2f64.powi(half_distance_exponent as i32);
                    *level_to_iterate_to += 100.0 / total_ticks;
                }
            }
        }
    }

    fn current_percentile(&self) -> f64 {
        if self.histogram.total_count == 0 {
            return 0.0;
        }
        100.0 * self.total_count_to_current_index as f64 / self.histogram.total_count as f64
    }

    fn percentile_level_iterated_to(&self) -> f64 {
        match &self.kind {
            IterKind::Percentile {
                level_to_iterate_to,
                ..
            } => *level_to_iterate_to,
            _ => self.current_percentile(),
        }
    }

    /// The single advance operation: walk slots until the reporting level is
    /// reached, then emit a record, or reach the end of the sequence.
    fn advance(&mut self) -> Option<IterationValue> {
        if !self.prepare_next() {
            return None;
        }
        let layout = self.histogram.layout;
        while self.current_index < self.histogram.counts.len() {
            self.count_at_this_index = self.histogram.counts.get(self.current_index);
            if self.fresh_sub_bucket {
                let highest = layout.highest_equivalent(layout.value_at_index(self.current_index));
                self.total_count_to_current_index += self.count_at_this_index;
                self.total_value_to_current_index = self
                    .total_value_to_current_index
                    .saturating_add(self.count_at_this_index.saturating_mul(highest));
                self.fresh_sub_bucket = false;
            }
            if self.reached_iteration_level() {
                let value_iterated_to = self.value_iterated_to();
                let record = IterationValue {
                    value_iterated_to,
                    value_iterated_from: self.prev_value_iterated_to,
                    count_at_value_iterated_to: self.count_at_this_index,
                    count_added_in_this_iteration_step: self.total_count_to_current_index
                        - self.total_count_to_prev_index,
                    total_count_to_this_value: self.total_count_to_current_index,
                    total_value_to_this_value: self.total_value_to_current_index,
                    percentile: self.current_percentile(),
                    percentile_level_iterated_to: self.percentile_level_iterated_to(),
                };
                self.prev_value_iterated_to = value_iterated_to;
                self.total_count_to_prev_index = self.total_count_to_current_index;
                self.increment_iteration_level();
                return Some(record);
            }
            self.current_index += 1;
            self.fresh_sub_bucket = true;
        }
        None
    }
}

impl<'a> Iterator for HistogramIter<'a> {
    type Item = IterationValue;

    fn next(&mut self) -> Option<IterationValue> {
        self.advance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGHEST: u64 = 3_600_000_000;

    fn loaded_histogram() -> Histogram {
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        h.record_value_n(1_000, 10_000).unwrap();
        h.record_value(100_000_000).unwrap();
        h
    }

    #[test]
    fn all_values_covers_every_slot() {
        let mut h = Histogram::new(1_000, 2).unwrap();
        h.record_value(3).unwrap();
        let records: Vec<_> = h.iter_all().collect();
        assert_eq!(records.len(), h.layout().counts_len());
        let recorded_total: u64 = records
            .iter()
            .map(|r| r.count_added_in_this_iteration_step())
            .sum();
        assert_eq!(recorded_total, 1);
    }

    #[test]
    fn recorded_visits_only_occupied_slots() {
        let h = loaded_histogram();
        let records: Vec<_> = h.iter_recorded().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].count_added_in_this_iteration_step(), 10_000);
        assert_eq!(records[0].count_at_value_iterated_to(), 10_000);
        assert_eq!(records[1].count_added_in_this_iteration_step(), 1);
        assert_eq!(records[1].total_count_to_this_value(), 10_001);
        let summed: u64 = h
            .iter_recorded()
            .map(|r| r.count_added_in_this_iteration_step())
            .sum();
        assert_eq!(summed, h.total_count());
    }

    #[test]
    fn recorded_on_empty_histogram_yields_nothing() {
        let h = Histogram::new(HIGHEST, 3).unwrap();
        assert_eq!(h.iter_recorded().count(), 0);
        assert_eq!(h.iter_percentiles(5).count(), 0);
        assert_eq!(h.iter_linear(1_000).count(), 0);
    }

    fn check_banded_counts(records: &[IterationValue], last_index: usize) {
        assert_eq!(records.len(), last_index + 1);
        for (index, record) in records.iter().enumerate() {
            let expected = match index {
                0 => 10_000,
                i if i == last_index => 1,
                _ => 0,
            };
            assert_eq!(
                record.count_added_in_this_iteration_step(),
                expected,
                "band {}",
                index
            );
        }
    }

    #[test]
    fn linear_bands() {
        let h = loaded_histogram();
        let records: Vec<_> = h.iter_linear(100_000).collect();
        check_banded_counts(&records, 999);
        assert_eq!(records[0].value_iterated_to(), 100_000);
        assert_eq!(records[1].value_iterated_from(), 100_000);
        assert_eq!(records[999].value_iterated_to(), 100_000_000);
    }

    #[test]
    fn logarithmic_bands() {
        let h = loaded_histogram();
        let records: Vec<_> = h.iter_logarithmic(10_000, 2.0).collect();
        check_banded_counts(&records, 14);
        assert_eq!(records[0].value_iterated_to(), 10_000);
        assert_eq!(records[1].value_iterated_to(), 20_000);
        assert_eq!(records[14].value_iterated_to(), 10_000 << 14);
    }

    #[test]
    fn percentile_records_match_direct_queries() {
        let h = loaded_histogram();
        let mut seen_any = false;
        for record in h.iter_percentiles(5) {
            seen_any = true;
            let expected = h
                .layout()
                .highest_equivalent(h.value_at_percentile(record.percentile_level_iterated_to()));
            assert_eq!(record.value_iterated_to(), expected);
        }
        assert!(seen_any);
    }

    #[test]
    fn percentile_levels_are_monotone_and_terminate_at_100() {
        let h = loaded_histogram();
        let records: Vec<_> = h.iter_percentiles(5).collect();
        let mut previous = -1.0;
        for record in &records {
            let level = record.percentile_level_iterated_to();
            assert!(level >= previous);
            assert!((0.0..=100.0).contains(&level));
            assert!(record.percentile() >= 0.0 && record.percentile() <= 100.0);
            previous = level;
        }
        let last = records.last().unwrap();
        assert_eq!(last.percentile_level_iterated_to(), 100.0);
        assert_eq!(last.total_count_to_this_value(), h.total_count());
    }

    #[test]
    fn percentile_tick_resolution_doubles_toward_100() {
        let h = loaded_histogram();
        let levels: Vec<f64> = h
            .iter_percentiles(1)
            .map(|r| r.percentile_level_iterated_to())
            .collect();
        // With one tick per half distance the early levels march in halves
        // of the remaining distance: 0, 50, 75, 87.5, ...
        assert_eq!(levels[0], 0.0);
        assert_eq!(levels[1], 50.0);
        assert_eq!(levels[2], 75.0);
        assert_eq!(levels[3], 87.5);
    }

    #[test]
    fn running_totals_accumulate_values() {
        let mut h = Histogram::new(HIGHEST, 3).unwrap();
        h.record_value(1_000).unwrap();
        h.record_value(2_000).unwrap();
        let records: Vec<_> = h.iter_recorded().collect();
        assert_eq!(records[0].total_value_to_this_value(), 1_000);
        assert_eq!(records[1].total_value_to_this_value(), 3_000);
        assert_eq!(records[1].value_iterated_from(), 1_000);
    }
}
