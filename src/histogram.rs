use crate::counts::Counts;
use crate::layout::ValueLayout;
use crate::Error;

/// A distribution histogram recording positive integer samples across a
/// configurable range with a configurable number of significant digits.
///
/// The [Histogram] is designed to be a fast, fixed-memory data structure for
/// storing high-frequency performance data. Recording is constant time, the
/// memory footprint depends only on the configured range and precision, and
/// several statistical approximations and iterators are provided for
/// analysis.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub(crate) layout: ValueLayout,
    pub(crate) counts: Counts,
    pub(crate) total_count: u64,
    /// Lowest raw sample value recorded so far, `u64::MAX` while empty.
    pub(crate) min_value: u64,
    /// Highest raw sample value recorded so far, 0 while empty.
    pub(crate) max_value: u64,
    /// Tightest witnessed index bounds, `usize::MAX` / 0 while empty.
    pub(crate) min_nonzero_index: usize,
    pub(crate) max_nonzero_index: usize,
    clip_out_of_range: bool,
    start_time_msec: Option<u64>,
    end_time_msec: Option<u64>,
    tag: Option<String>,
}

impl Histogram {
    /// This function creates a new, empty histogram tracking values from 1
    /// to `highest_trackable_value` with 64-bit counters.
    pub fn new(highest_trackable_value: u64, significant_digits: u32) -> Result<Histogram, Error> {
        Histogram::with_bounds(1, highest_trackable_value, significant_digits)
    }

    /// This function creates a new, empty histogram with an explicit lowest
    /// discernible value.
    ///
    /// Raising `lowest_discernible_value` is useful when the value units are
    /// much finer than the required accuracy, e.g. tracking nanoseconds while
    /// only microseconds need to be told apart; the coarser layout shrinks
    /// the counts array accordingly.
    pub fn with_bounds(
        lowest_discernible_value: u64,
        highest_trackable_value: u64,
        significant_digits: u32,
    ) -> Result<Histogram, Error> {
        Histogram::with_word_size(
            lowest_discernible_value,
            highest_trackable_value,
            significant_digits,
            8,
        )
    }

    /// This function creates a new, empty histogram with counters of
    /// `word_size` bytes (2, 4 or 8).
    ///
    /// Narrow counters are intended for aggregation fan-in where per-slot
    /// counts stay small; any record that would exceed the width fails with
    /// [Error::Overflow].
    pub fn with_word_size(
        lowest_discernible_value: u64,
        highest_trackable_value: u64,
        significant_digits: u32,
        word_size: u32,
    ) -> Result<Histogram, Error> {
        let layout = ValueLayout::new(
            lowest_discernible_value,
            highest_trackable_value,
            significant_digits,
        )?;
        let counts = Counts::new(word_size, layout.counts_len)?;
        Ok(Histogram {
            layout,
            counts,
            total_count: 0,
            min_value: u64::MAX,
            max_value: 0,
            min_nonzero_index: usize::MAX,
            max_nonzero_index: 0,
            clip_out_of_range: false,
            start_time_msec: None,
            end_time_msec: None,
            tag: None,
        })
    }

    /// Control whether values above the trackable range are clipped into the
    /// top slot instead of being rejected with [Error::OutOfRange].
    pub fn set_clip_out_of_range(&mut self, enabled: bool) {
        self.clip_out_of_range = enabled;
    }

    fn admitted_value(&self, value: u64) -> Result<u64, Error> {
        if value > self.layout.highest_trackable_value {
            if self.clip_out_of_range {
                Ok(self.layout.highest_trackable_value)
            } else {
                Err(Error::OutOfRange(value))
            }
        } else {
            Ok(value)
        }
    }

    /// This function records one sample of `value`.
    pub fn record_value(&mut self, value: u64) -> Result<(), Error> {
        self.record_value_n(value, 1)
    }

    /// This function records `count` samples of `value`.
    pub fn record_value_n(&mut self, value: u64, count: u64) -> Result<(), Error> {
        let value = self.admitted_value(value)?;
        if count == 0 {
            return Ok(());
        }
        let index = self.layout.index_for(value);
        let new_total = self.total_count.checked_add(count).ok_or(Error::Overflow)?;
        self.counts.inc(index, count)?;
        self.total_count = new_total;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
        self.min_nonzero_index = self.min_nonzero_index.min(index);
        self.max_nonzero_index = self.max_nonzero_index.max(index);
        Ok(())
    }

    /// This function records `value` and compensates for coordinated
    /// omission.
    ///
    /// When the recorded value is larger than the expected interval between
    /// samples, the observer must have been stalled and samples that would
    /// have occurred during the stall went unrecorded. An additional series
    /// of synthetic samples at `value - expected_interval`,
    /// `value - 2 * expected_interval`, ... is recorded to fill the gap.
    pub fn record_corrected_value(
        &mut self,
        value: u64,
        expected_interval: u64,
    ) -> Result<(), Error> {
        self.record_corrected_value_n(value, expected_interval, 1)
    }

    /// As [Histogram::record_corrected_value], with a count per sample.
    pub fn record_corrected_value_n(
        &mut self,
        value: u64,
        expected_interval: u64,
        count: u64,
    ) -> Result<(), Error> {
        self.record_value_n(value, count)?;
        if expected_interval == 0 || value <= expected_interval {
            return Ok(());
        }
        let mut missing = value - expected_interval;
        while missing >= expected_interval {
            self.record_value_n(missing, count)?;
            missing -= expected_interval;
        }
        Ok(())
    }

    /// This function adds all samples of `other` into this histogram.
    ///
    /// Both histograms must have been constructed with the same bounds and
    /// precision. The addition is checked: if any slot of the destination
    /// would overflow its counter width the histogram is left unchanged and
    /// [Error::Overflow] is returned.
    pub fn add(&mut self, other: &Histogram) -> Result<(), Error> {
        if self.layout != other.layout {
            return Err(Error::GeometryMismatch);
        }
        let new_total = self
            .total_count
            .checked_add(other.total_count)
            .ok_or(Error::Overflow)?;
        self.counts.add_from(&other.counts)?;
        self.total_count = new_total;
        self.min_value = self.min_value.min(other.min_value);
        self.max_value = self.max_value.max(other.max_value);
        self.min_nonzero_index = self.min_nonzero_index.min(other.min_nonzero_index);
        self.max_nonzero_index = self.max_nonzero_index.max(other.max_nonzero_index);
        Ok(())
    }

    /// This function removes all samples of `other` from this histogram.
    ///
    /// Fails without mutation unless every slot of this histogram holds at
    /// least as many samples as the corresponding slot of `other`.
    pub fn subtract(&mut self, other: &Histogram) -> Result<(), Error> {
        if self.layout != other.layout {
            return Err(Error::GeometryMismatch);
        }
        self.counts.subtract_from(&other.counts)?;
        self.total_count -= other.total_count;
        self.reestablish_tracked_extrema();
        Ok(())
    }

    /// The raw extrema cannot be narrowed incrementally when samples are
    /// removed; rescan the counts array for the surviving bounds.
    fn reestablish_tracked_extrema(&mut self) {
        self.min_nonzero_index = usize::MAX;
        self.max_nonzero_index = 0;
        self.min_value = u64::MAX;
        self.max_value = 0;
        for index in 0..self.counts.len() {
            if self.counts.get(index) != 0 {
                if self.min_nonzero_index == usize::MAX {
                    self.min_nonzero_index = index;
                    self.min_value = self.layout.value_at_index(index);
                }
                self.max_nonzero_index = index;
            }
        }
        if self.min_nonzero_index != usize::MAX {
            self.max_value = self
                .layout
                .highest_equivalent(self.layout.value_at_index(self.max_nonzero_index));
        }
    }

    /// Widen the tracked bounds after counts were written directly, e.g. by
    /// the wire decoder.
    pub(crate) fn adjust_tracked_extrema(
        &mut self,
        min_nonzero_index: usize,
        max_nonzero_index: usize,
    ) {
        self.min_nonzero_index = self.min_nonzero_index.min(min_nonzero_index);
        self.max_nonzero_index = self.max_nonzero_index.max(max_nonzero_index);
        self.min_value = self
            .min_value
            .min(self.layout.value_at_index(min_nonzero_index));
        self.max_value = self.max_value.max(
            self.layout
                .highest_equivalent(self.layout.value_at_index(max_nonzero_index)),
        );
    }

    /// This function empties the histogram of all recorded samples and
    /// interval metadata.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.total_count = 0;
        self.min_value = u64::MAX;
        self.max_value = 0;
        self.min_nonzero_index = usize::MAX;
        self.max_nonzero_index = 0;
        self.start_time_msec = None;
        self.end_time_msec = None;
        self.tag = None;
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// The layout the histogram was constructed with.
    pub fn layout(&self) -> &ValueLayout {
        &self.layout
    }

    pub fn word_size(&self) -> u32 {
        self.counts.word_size()
    }

    /// Two values are equivalent when the histogram counts them in the same
    /// slot.
    pub fn values_are_equivalent(&self, a: u64, b: u64) -> bool {
        self.layout.values_are_equivalent(a, b)
    }

    /// Start of the recorded interval in milliseconds since the epoch,
    /// passed through for log writers.
    pub fn start_time_stamp(&self) -> Option<u64> {
        self.start_time_msec
    }

    pub fn set_start_time_stamp(&mut self, msec: u64) {
        self.start_time_msec = Some(msec);
    }

    pub fn end_time_stamp(&self) -> Option<u64> {
        self.end_time_msec
    }

    pub fn set_end_time_stamp(&mut self, msec: u64) {
        self.end_time_msec = Some(msec);
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = Some(tag.into());
    }
}

impl PartialEq for Histogram {
    /// Histograms are equal when they share a layout and hold the same
    /// samples, regardless of counter width.
    fn eq(&self, other: &Self) -> bool {
        if self.layout != other.layout
            || self.total_count != other.total_count
            || self.min() != other.min()
            || self.max() != other.max()
        {
            return false;
        }
        (0..self.counts.len()).all(|index| self.counts.get(index) == other.counts.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGHEST: u64 = 3_600_000_000;

    fn usec_histogram() -> Histogram {
        Histogram::new(HIGHEST, 3).unwrap()
    }

    #[test]
    fn record_single_value() {
        let mut h = usec_histogram();
        h.record_value(4).unwrap();
        assert_eq!(h.count_at_value(4), 1);
        assert_eq!(h.total_count(), 1);
        assert!(!h.is_empty());
    }

    #[test]
    fn record_batch() {
        let mut h = usec_histogram();
        let samples = [
            459876u64, 669187, 711612, 816326, 931423, 1033197, 1131895, 2477317, 3964974,
            12718782,
        ];
        for value in samples {
            h.record_value(value).unwrap();
        }
        assert_eq!(h.total_count(), 10);
        assert!(h.values_are_equivalent(h.min(), 459876));
        assert!(h.values_are_equivalent(h.max(), 12718782));
        assert_eq!(h.max(), h.layout().highest_equivalent(12718782));
        assert_eq!(
            h.value_at_percentile(30.0),
            h.layout().highest_equivalent(711612)
        );
        assert_eq!(
            h.value_at_percentile(99.0),
            h.layout().highest_equivalent(12718782)
        );
    }

    #[test]
    fn corrected_record_backfills_the_stall() {
        let mut h = usec_histogram();
        h.record_corrected_value(10_000, 1_000).unwrap();
        assert_eq!(h.total_count(), 10);
        for value in (1_000..=10_000).step_by(1_000) {
            assert_eq!(h.count_at_value(value), 1, "value {}", value);
        }
        assert!(h.values_are_equivalent(h.min(), 1_000));
        assert!(h.values_are_equivalent(h.max(), 10_000));
    }

    #[test]
    fn corrected_record_below_interval_is_plain() {
        let mut h = usec_histogram();
        h.record_corrected_value(500, 1_000).unwrap();
        assert_eq!(h.total_count(), 1);
        h.record_corrected_value(1_000, 0).unwrap();
        assert_eq!(h.total_count(), 2);
    }

    #[test]
    fn add_merges_counts_and_extrema() {
        let mut left = usec_histogram();
        let mut right = usec_histogram();
        left.record_value_n(1_000, 3).unwrap();
        right.record_value_n(1_000, 5).unwrap();
        right.record_value(2_000_000).unwrap();
        left.add(&right).unwrap();
        assert_eq!(left.count_at_value(1_000), 8);
        assert_eq!(left.total_count(), 9);
        assert!(left.values_are_equivalent(left.max(), 2_000_000));
    }

    #[test]
    fn add_requires_matching_geometry() {
        let mut left = usec_histogram();
        let right = Histogram::new(HIGHEST, 2).unwrap();
        assert!(matches!(left.add(&right), Err(Error::GeometryMismatch)));
        let right = Histogram::new(HIGHEST / 2, 3).unwrap();
        assert!(matches!(left.add(&right), Err(Error::GeometryMismatch)));
    }

    #[test]
    fn add_is_commutative() {
        let mut left = usec_histogram();
        let mut right = usec_histogram();
        for (value, count) in [(1_000, 3), (250_000, 7), (HIGHEST, 1)] {
            left.record_value_n(value, count).unwrap();
        }
        for (value, count) in [(99, 12), (250_000, 2)] {
            right.record_value_n(value, count).unwrap();
        }
        let mut forward = left.clone();
        forward.add(&right).unwrap();
        let mut backward = right.clone();
        backward.add(&left).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn subtract_reverses_add() {
        let mut total = usec_histogram();
        let mut interval = usec_histogram();
        total.record_value_n(5_000, 10).unwrap();
        total.record_value(77_000).unwrap();
        interval.record_value_n(5_000, 4).unwrap();
        interval.record_value(77_000).unwrap();

        let mut combined = total.clone();
        combined.add(&interval).unwrap();
        combined.subtract(&interval).unwrap();
        assert_eq!(combined, total);

        let mut over = usec_histogram();
        over.record_value_n(5_000, 100).unwrap();
        assert!(total.subtract(&over).is_err());
        assert_eq!(total.count_at_value(5_000), 10);
    }

    #[test]
    fn subtract_reestablishes_extrema() {
        let mut h = usec_histogram();
        let mut spike = usec_histogram();
        h.record_value(1_000).unwrap();
        h.record_value(90_000_000).unwrap();
        spike.record_value(90_000_000).unwrap();
        h.subtract(&spike).unwrap();
        assert!(h.values_are_equivalent(h.max(), 1_000));
        assert!(h.values_are_equivalent(h.min(), 1_000));
    }

    #[test]
    fn counter_width_overflow_is_reported() {
        let mut h = Histogram::with_word_size(1, HIGHEST, 3, 2).unwrap();
        h.record_value_n(5, 65_535).unwrap();
        assert!(matches!(h.record_value(5), Err(Error::Overflow)));
        assert_eq!(h.count_at_value(5), 65_535);
        assert_eq!(h.total_count(), 65_535);
    }

    #[test]
    fn out_of_range_policy() {
        let mut h = usec_histogram();
        h.record_value(h.layout().lowest_discernible_value()).unwrap();
        h.record_value(HIGHEST).unwrap();
        assert!(matches!(
            h.record_value(HIGHEST + 1),
            Err(Error::OutOfRange(_))
        ));
        assert_eq!(h.total_count(), 2);

        h.set_clip_out_of_range(true);
        h.record_value(HIGHEST + 1).unwrap();
        assert_eq!(h.total_count(), 3);
        assert_eq!(h.count_at_value(HIGHEST), 2);
        assert_eq!(h.max(), h.layout().highest_equivalent(HIGHEST));
    }

    #[test]
    fn equivalent_values_share_a_slot() {
        let mut by_pair = usec_histogram();
        by_pair.record_value(10_000).unwrap();
        by_pair.record_value(10_007).unwrap();
        let mut by_double = usec_histogram();
        by_double.record_value_n(10_000, 2).unwrap();
        assert_eq!(by_pair, by_double);
    }

    #[test]
    fn reset_restores_pristine_state() {
        let mut h = usec_histogram();
        h.record_value_n(1_000, 42).unwrap();
        h.set_tag("interval-7");
        h.set_start_time_stamp(1_700_000_000_000);
        h.reset();
        assert_eq!(h.total_count(), 0);
        assert_eq!(h.min(), 0);
        assert_eq!(h.max(), 0);
        assert_eq!(h.value_at_percentile(99.99), 0);
        assert_eq!(h.tag(), None);
        assert_eq!(h.start_time_stamp(), None);
        assert_eq!(h, usec_histogram());
    }

    #[test]
    fn zero_count_record_is_a_no_op() {
        let mut h = usec_histogram();
        h.record_value_n(1_000, 0).unwrap();
        assert_eq!(h.total_count(), 0);
        assert_eq!(h, usec_histogram());
    }

    #[test]
    fn interval_metadata_passes_through() {
        let mut h = usec_histogram();
        h.set_start_time_stamp(1_700_000_000_000);
        h.set_end_time_stamp(1_700_000_060_000);
        h.set_tag("checkout");
        assert_eq!(h.start_time_stamp(), Some(1_700_000_000_000));
        assert_eq!(h.end_time_stamp(), Some(1_700_000_060_000));
        assert_eq!(h.tag(), Some("checkout"));
    }
}
