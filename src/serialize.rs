use std::io::Write;

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

use crate::histogram::Histogram;
use crate::layout::ValueLayout;
use crate::Error;

/// Cookie identifying the V2 encoding. The low nibble pair carries the
/// word-size class; V2 uses a single dense varint encoding regardless of the
/// in-memory counter width, marked as class 1.
const V2_ENCODING_COOKIE_BASE: u32 = 0x1c84_9303;
const V2_WORD_SIZE_CLASS: u32 = 0x10;
const FRAME_HEADER_SIZE: usize = 40;
const MAX_VARINT_BYTES: usize = 9;

fn encoding_cookie() -> u32 {
    V2_ENCODING_COOKIE_BASE | V2_WORD_SIZE_CLASS
}

fn cookie_base(cookie: u32) -> u32 {
    cookie & !0xf0
}

/// Append `value` as a ZigZag LEB128 varint: the sign is folded into the
/// low bit, then base-128 little-endian groups follow with a continuation
/// bit. At most 9 bytes; the 9th byte, when present, is a full byte.
fn zig_zag_encode(buffer: &mut Vec<u8>, value: i64) {
    let mut remaining = ((value << 1) ^ (value >> 63)) as u64;
    let mut written = 0;
    loop {
        if remaining < 0x80 || written == MAX_VARINT_BYTES - 1 {
            buffer.push(remaining as u8);
            return;
        }
        buffer.push((remaining as u8 & 0x7f) | 0x80);
        remaining >>= 7;
        written += 1;
    }
}

/// Read one ZigZag LEB128 varint starting at `position`, advancing it past
/// the consumed bytes.
fn zig_zag_decode(buffer: &[u8], position: &mut usize) -> Result<i64, Error> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *buffer
            .get(*position)
            .ok_or_else(|| Error::DecodeTruncated("varint ends mid-stream".to_string()))?;
        *position += 1;
        if shift == 56 {
            result |= (byte as u64) << 56;
            break;
        }
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(((result >> 1) as i64) ^ -((result & 1) as i64))
}

struct Frame<'a> {
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_digits: u32,
    payload: &'a [u8],
}

fn read_frame(bytes: &[u8]) -> Result<Frame<'_>, Error> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(Error::DecodeTruncated(format!(
            "frame header needs {} bytes, got {}",
            FRAME_HEADER_SIZE,
            bytes.len()
        )));
    }
    let mut header = &bytes[..FRAME_HEADER_SIZE];
    let cookie = header.read_u32::<NetworkEndian>()?;
    if cookie_base(cookie) != V2_ENCODING_COOKIE_BASE {
        return Err(Error::InvalidArgument(format!(
            "unrecognized encoding cookie {:#010x}",
            cookie
        )));
    }
    let payload_len = header.read_u32::<NetworkEndian>()? as usize;
    let normalizing_index_offset = header.read_u32::<NetworkEndian>()?;
    if normalizing_index_offset != 0 {
        return Err(Error::InvalidArgument(
            "non-zero normalizing index offset is not supported".to_string(),
        ));
    }
    let significant_digits = header.read_u32::<NetworkEndian>()?;
    let lowest_discernible_value = header.read_u64::<NetworkEndian>()?;
    let highest_trackable_value = header.read_u64::<NetworkEndian>()?;
    // The conversion ratio is a placeholder fixed at 1.0; peers carry it for
    // double histograms, which this crate does not model.
    let _conversion_ratio = header.read_f64::<NetworkEndian>()?;

    let body = &bytes[FRAME_HEADER_SIZE..];
    if body.len() < payload_len {
        return Err(Error::DecodeTruncated(format!(
            "payload is {} bytes, header promises {}",
            body.len(),
            payload_len
        )));
    }
    Ok(Frame {
        lowest_discernible_value,
        highest_trackable_value,
        significant_digits,
        payload: &body[..payload_len],
    })
}

impl Histogram {
    /// This function encodes the histogram into the V2 interchange format: a
    /// fixed header followed by a run-length-compressed ZigZag LEB128 counts
    /// stream.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + 64);
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// As [Histogram::encode], writing into an [std::io::Write] sink.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let payload = self.encode_counts()?;
        writer.write_u32::<NetworkEndian>(encoding_cookie())?;
        writer.write_u32::<NetworkEndian>(payload.len() as u32)?;
        writer.write_u32::<NetworkEndian>(0)?;
        writer.write_u32::<NetworkEndian>(self.layout.significant_digits)?;
        writer.write_u64::<NetworkEndian>(self.layout.lowest_discernible_value)?;
        writer.write_u64::<NetworkEndian>(self.layout.highest_trackable_value)?;
        writer.write_f64::<NetworkEndian>(1.0)?;
        writer.write_all(&payload)?;
        Ok(())
    }

    /// Walk the counts up to the highest occupied slot, collapsing every run
    /// of `k` zero slots into a single `-k` varint and emitting occupied
    /// slots verbatim.
    fn encode_counts(&self) -> Result<Vec<u8>, Error> {
        let counts_limit = if self.total_count > 0 {
            self.max_nonzero_index + 1
        } else {
            0
        };
        let mut payload = Vec::new();
        let mut index = 0;
        while index < counts_limit {
            let count = self.counts.get(index);
            index += 1;
            if count == 0 {
                let mut zeros = 1i64;
                while index < counts_limit && self.counts.get(index) == 0 {
                    zeros += 1;
                    index += 1;
                }
                zig_zag_encode(&mut payload, -zeros);
            } else if count > i64::MAX as u64 {
                return Err(Error::Overflow);
            } else {
                zig_zag_encode(&mut payload, count as i64);
            }
        }
        Ok(payload)
    }

    /// This function decodes a V2 frame into a new histogram with 64-bit
    /// counters.
    pub fn decode(bytes: &[u8]) -> Result<Histogram, Error> {
        Histogram::decode_with_word_size(bytes, 8)
    }

    /// As [Histogram::decode], choosing the counter width of the decoded
    /// histogram. Counts that do not fit the requested width fail with
    /// [Error::DecodeValueOverflow].
    pub fn decode_with_word_size(bytes: &[u8], word_size: u32) -> Result<Histogram, Error> {
        let frame = read_frame(bytes)?;
        let mut histogram = Histogram::with_word_size(
            frame.lowest_discernible_value,
            frame.highest_trackable_value,
            frame.significant_digits,
            word_size,
        )?;
        histogram.decode_counts(frame.payload)?;
        Ok(histogram)
    }

    /// This function decodes a V2 frame and adds its samples to this
    /// histogram.
    ///
    /// The frame must describe the same bounds and precision; on any error
    /// the histogram is left unchanged.
    pub fn decode_and_add(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let frame = read_frame(bytes)?;
        let layout = ValueLayout::new(
            frame.lowest_discernible_value,
            frame.highest_trackable_value,
            frame.significant_digits,
        )?;
        if layout != self.layout {
            return Err(Error::GeometryMismatch);
        }
        let mut decoded = Histogram::with_word_size(
            frame.lowest_discernible_value,
            frame.highest_trackable_value,
            frame.significant_digits,
            8,
        )?;
        decoded.decode_counts(frame.payload)?;
        self.add(&decoded)
    }

    /// Replay a varint counts stream into this (pre-zeroed) histogram:
    /// a negative varint `-k` skips `k` zero slots, a non-negative varint
    /// writes one slot.
    fn decode_counts(&mut self, payload: &[u8]) -> Result<(), Error> {
        let counts_len = self.counts.len();
        let mut position = 0;
        let mut index = 0usize;
        let mut total_added = 0u64;
        let mut min_nonzero_index = usize::MAX;
        let mut max_nonzero_index = 0usize;
        while position < payload.len() {
            if index >= counts_len {
                return Err(Error::DecodeValueOverflow);
            }
            let value = zig_zag_decode(payload, &mut position)?;
            if value < 0 {
                let zeros = value.unsigned_abs();
                if zeros > (counts_len - index) as u64 {
                    return Err(Error::DecodeValueOverflow);
                }
                index += zeros as usize;
            } else {
                if value > 0 {
                    let count = value as u64;
                    self.counts.set(index, count)?;
                    total_added = total_added.checked_add(count).ok_or(Error::Overflow)?;
                    max_nonzero_index = index;
                    if min_nonzero_index == usize::MAX {
                        min_nonzero_index = index;
                    }
                }
                index += 1;
            }
        }
        if min_nonzero_index != usize::MAX {
            self.adjust_tracked_extrema(min_nonzero_index, max_nonzero_index);
        }
        self.total_count = self
            .total_count
            .checked_add(total_added)
            .ok_or(Error::Overflow)?;
        Ok(())
    }
}
