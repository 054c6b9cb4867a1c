use crate::Error;

/// A [ValueLayout] describes the two-level discretization of a positive
/// integer value range.
///
/// The layout divides the trackable range into `bucket_count` buckets, each
/// holding `sub_bucket_count` sub-buckets. Bucket `k` covers values in
/// multiples of `2^(k + unit_magnitude)`; each successive bucket doubles the
/// value step of the previous one, so only the upper half of its sub-buckets
/// is ever used (the lower half is already covered, at finer resolution, by
/// the buckets before it). Bucket 0 is the exception and uses all of its
/// sub-buckets.
///
/// The resulting mapping guarantees a relative error of at most
/// `10^-significant_digits` for every value between
/// `lowest_discernible_value` and `highest_trackable_value`, and every value
/// in that range maps to a slot in a dense array of `counts_len` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueLayout {
    pub(crate) lowest_discernible_value: u64,
    pub(crate) highest_trackable_value: u64,
    pub(crate) significant_digits: u32,
    pub(crate) unit_magnitude: u32,
    pub(crate) sub_bucket_half_count_magnitude: u32,
    pub(crate) sub_bucket_count: usize,
    pub(crate) sub_bucket_half_count: usize,
    pub(crate) sub_bucket_mask: u64,
    pub(crate) bucket_count: usize,
    pub(crate) counts_len: usize,
    /// 64 minus the bits used by the largest value in bucket 0, precomputed
    /// for the bucket index fast path.
    pub(crate) leading_zero_count_base: u32,
}

impl ValueLayout {
    /// This function derives a complete layout from the three configuration
    /// values.
    ///
    /// `lowest_discernible_value` must be at least 1,
    /// `highest_trackable_value` at least twice that, and
    /// `significant_digits` between 0 and 5.
    pub fn new(
        lowest_discernible_value: u64,
        highest_trackable_value: u64,
        significant_digits: u32,
    ) -> Result<ValueLayout, Error> {
        if lowest_discernible_value < 1 {
            return Err(Error::InvalidConfig(
                "lowest discernible value must be >= 1".to_string(),
            ));
        }
        if highest_trackable_value < lowest_discernible_value.saturating_mul(2) {
            return Err(Error::InvalidConfig(
                "highest trackable value must be >= 2 * lowest discernible value".to_string(),
            ));
        }
        if significant_digits > 5 {
            return Err(Error::InvalidConfig(
                "significant digits must be between 0 and 5".to_string(),
            ));
        }

        let unit_magnitude = 63 - lowest_discernible_value.leading_zeros();

        // Maintaining d significant decimal digits requires single unit
        // resolution up to 2 * 10^d, rounded up to a power of two so that
        // sub-bucket indexing stays a pure shift.
        let largest_single_unit_resolution = 2 * 10u64.pow(significant_digits);
        let sub_bucket_count_magnitude = 64 - (largest_single_unit_resolution - 1).leading_zeros();
        let sub_bucket_half_count_magnitude = sub_bucket_count_magnitude.max(1) - 1;
        if unit_magnitude + sub_bucket_half_count_magnitude + 1 > 63 {
            return Err(Error::InvalidConfig(
                "cannot maintain this precision at this magnitude".to_string(),
            ));
        }
        let sub_bucket_count = 1usize << (sub_bucket_half_count_magnitude + 1);
        let sub_bucket_half_count = sub_bucket_count / 2;
        let sub_bucket_mask = (sub_bucket_count as u64 - 1) << unit_magnitude;

        let bucket_count =
            Self::buckets_to_cover(highest_trackable_value, sub_bucket_count, unit_magnitude);
        let counts_len = (bucket_count + 1) * sub_bucket_half_count;

        Ok(ValueLayout {
            lowest_discernible_value,
            highest_trackable_value,
            significant_digits,
            unit_magnitude,
            sub_bucket_half_count_magnitude,
            sub_bucket_count,
            sub_bucket_half_count,
            sub_bucket_mask,
            bucket_count,
            counts_len,
            leading_zero_count_base: 64 - unit_magnitude - sub_bucket_half_count_magnitude - 1,
        })
    }

    /// Bucket `k` can express values up to `sub_bucket_count << (k +
    /// unit_magnitude)`; count how many buckets are needed before that
    /// exceeds `value`.
    fn buckets_to_cover(value: u64, sub_bucket_count: usize, unit_magnitude: u32) -> usize {
        let mut smallest_untrackable = (sub_bucket_count as u64) << unit_magnitude;
        let mut buckets_needed = 1;
        while smallest_untrackable <= value {
            if smallest_untrackable > u64::MAX / 2 {
                return buckets_needed + 1;
            }
            smallest_untrackable <<= 1;
            buckets_needed += 1;
        }
        buckets_needed
    }

    fn bucket_index(&self, value: u64) -> usize {
        // The mask maps values below the sub-bucket range onto bucket 0.
        (self.leading_zero_count_base - (value | self.sub_bucket_mask).leading_zeros()) as usize
    }

    fn sub_bucket_index(&self, value: u64, bucket_index: usize) -> usize {
        (value >> (bucket_index as u32 + self.unit_magnitude)) as usize
    }

    fn value_from_location(&self, bucket_index: usize, sub_bucket_index: usize) -> u64 {
        (sub_bucket_index as u64) << (bucket_index as u32 + self.unit_magnitude)
    }

    /// This function maps a value to its slot in the counts array.
    pub fn index_for(&self, value: u64) -> usize {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        // The first usable slot of bucket k sits at (k + 1) * half_count;
        // bucket 0 additionally uses the half_count slots below it.
        let bucket_base_index = (bucket_index + 1) << self.sub_bucket_half_count_magnitude;
        bucket_base_index - self.sub_bucket_half_count + sub_bucket_index
    }

    /// This function is the inverse of [ValueLayout::index_for] on canonical
    /// representatives: it returns the lowest value that maps to `index`.
    pub fn value_at_index(&self, index: usize) -> u64 {
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as isize - 1;
        let mut sub_bucket_index =
            (index & (self.sub_bucket_half_count - 1)) + self.sub_bucket_half_count;
        if bucket_index < 0 {
            sub_bucket_index -= self.sub_bucket_half_count;
            bucket_index = 0;
        }
        self.value_from_location(bucket_index as usize, sub_bucket_index)
    }

    /// This function returns the lowest value that is equivalent to `value`,
    /// meaning that samples at either value are counted in the same slot.
    pub fn lowest_equivalent(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        self.value_from_location(bucket_index, sub_bucket_index)
    }

    /// This function returns the size of the range of values equivalent to
    /// `value`.
    pub fn equivalent_range(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        let adjusted_bucket = if sub_bucket_index >= self.sub_bucket_count {
            bucket_index + 1
        } else {
            bucket_index
        };
        1u64 << (self.unit_magnitude + adjusted_bucket as u32)
    }

    /// This function returns the first value past the range equivalent to
    /// `value`.
    pub fn next_non_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.equivalent_range(value))
    }

    /// This function returns the highest value that is equivalent to `value`.
    pub fn highest_equivalent(&self, value: u64) -> u64 {
        self.next_non_equivalent(value) - 1
    }

    /// This function returns a value in the middle (rounded up) of the range
    /// of values equivalent to `value`.
    pub fn median_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.equivalent_range(value) >> 1)
    }

    /// Two values are equivalent when they map to the same slot.
    pub fn values_are_equivalent(&self, a: u64, b: u64) -> bool {
        self.lowest_equivalent(a) == self.lowest_equivalent(b)
    }

    pub fn lowest_discernible_value(&self) -> u64 {
        self.lowest_discernible_value
    }

    pub fn highest_trackable_value(&self) -> u64 {
        self.highest_trackable_value
    }

    pub fn significant_digits(&self) -> u32 {
        self.significant_digits
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn sub_bucket_count(&self) -> usize {
        self.sub_bucket_count
    }

    pub fn counts_len(&self) -> usize {
        self.counts_len
    }
}
