use crate::Error;

/// Dispatch a method body over the three counter widths, binding the inner
/// vector to the given identifier.
macro_rules! with_slots {
    ($self:expr, $slots:ident => $body:expr) => {
        match $self {
            Counts::U16($slots) => $body,
            Counts::U32($slots) => $body,
            Counts::U64($slots) => $body,
        }
    };
}

/// The dense per-index counter storage, at one of the three supported
/// counter widths.
///
/// 64-bit counters are the default. The narrower widths trade headroom for
/// memory, which pays off in aggregation fan-in where every interval
/// histogram carries only a few samples per slot. Any operation that would
/// exceed the counter width fails with [Error::Overflow] and leaves the
/// store untouched.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Counts {
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl Counts {
    pub(crate) fn new(word_size: u32, len: usize) -> Result<Counts, Error> {
        match word_size {
            2 => Ok(Counts::U16(vec![0; len])),
            4 => Ok(Counts::U32(vec![0; len])),
            8 => Ok(Counts::U64(vec![0; len])),
            _ => Err(Error::InvalidConfig(
                "word size must be 2, 4 or 8 bytes".to_string(),
            )),
        }
    }

    pub(crate) fn word_size(&self) -> u32 {
        match self {
            Counts::U16(_) => 2,
            Counts::U32(_) => 4,
            Counts::U64(_) => 8,
        }
    }

    pub(crate) fn len(&self) -> usize {
        with_slots!(self, slots => slots.len())
    }

    pub(crate) fn get(&self, index: usize) -> u64 {
        with_slots!(self, slots => slots[index] as u64)
    }

    /// The largest count a single slot can hold at this width.
    pub(crate) fn max_count(&self) -> u64 {
        match self {
            Counts::U16(_) => u16::MAX as u64,
            Counts::U32(_) => u32::MAX as u64,
            Counts::U64(_) => u64::MAX,
        }
    }

    pub(crate) fn set(&mut self, index: usize, value: u64) -> Result<(), Error> {
        if value > self.max_count() {
            return Err(Error::DecodeValueOverflow);
        }
        match self {
            Counts::U16(slots) => slots[index] = value as u16,
            Counts::U32(slots) => slots[index] = value as u32,
            Counts::U64(slots) => slots[index] = value,
        }
        Ok(())
    }

    /// This function adds `count` to the slot at `index`, failing without
    /// mutation when the sum would not fit the counter width.
    pub(crate) fn inc(&mut self, index: usize, count: u64) -> Result<(), Error> {
        let sum = self
            .get(index)
            .checked_add(count)
            .filter(|sum| *sum <= self.max_count())
            .ok_or(Error::Overflow)?;
        match self {
            Counts::U16(slots) => slots[index] = sum as u16,
            Counts::U32(slots) => slots[index] = sum as u32,
            Counts::U64(slots) => slots[index] = sum,
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        with_slots!(self, slots => slots.iter_mut().for_each(|slot| *slot = 0))
    }

    /// This function adds every slot of `other` into `self`. The addition is
    /// checked in a first pass so that an overflow on any slot leaves the
    /// whole store unchanged.
    pub(crate) fn add_from(&mut self, other: &Counts) -> Result<(), Error> {
        debug_assert_eq!(self.len(), other.len());
        let limit = self.max_count();
        for index in 0..other.len() {
            let count = other.get(index);
            if count != 0 && self.get(index).checked_add(count).filter(|sum| *sum <= limit).is_none() {
                return Err(Error::Overflow);
            }
        }
        for index in 0..other.len() {
            let count = other.get(index);
            if count != 0 {
                self.inc(index, count)?;
            }
        }
        Ok(())
    }

    /// This function removes every slot of `other` from `self`, failing
    /// without mutation when any slot of `self` holds fewer samples than the
    /// corresponding slot of `other`.
    pub(crate) fn subtract_from(&mut self, other: &Counts) -> Result<(), Error> {
        debug_assert_eq!(self.len(), other.len());
        for index in 0..other.len() {
            let count = other.get(index);
            if count != 0 && self.get(index) < count {
                return Err(Error::InvalidArgument(
                    "subtrahend holds more samples than the histogram".to_string(),
                ));
            }
        }
        for index in 0..other.len() {
            let count = other.get(index);
            if count != 0 {
                let remaining = self.get(index) - count;
                self.set(index, remaining)?;
            }
        }
        Ok(())
    }
}
