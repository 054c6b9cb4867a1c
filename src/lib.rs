//! An implementation of the High Dynamic Range (HDR) histogram data structure
//! and its V2 wire encoding.
//!
//! Use this crate for high-volume measurement recording across many orders of
//! magnitude with a fixed memory footprint, constant-time recording, and a
//! bounded relative error chosen at construction time.
//!
//! # Examples
//!
//! ```
//! use hdrhist::Histogram;
//!
//! // Track values from 1 to one hour in microseconds, 3 significant digits.
//! let mut latencies = Histogram::new(3_600_000_000, 3).unwrap();
//!
//! latencies.record_value(459_876).unwrap();
//! latencies.record_value(711_612).unwrap();
//!
//! println!("median: {}", latencies.value_at_percentile(50.0));
//! println!("worst:  {}", latencies.max());
//! ```
//!
//! Histograms with identical bounds and precision can be added together, and
//! round-tripped through the compact V2 binary encoding for aggregation
//! across processes:
//!
//! ```ignore
//! let bytes = interval.encode()?;
//! total.decode_and_add(&bytes)?;
//! ```
mod layout;
mod counts;
mod histogram;
mod analysis;
mod iterators;
mod serialize;
mod report;
use thiserror;

pub use histogram::Histogram;
pub use iterators::{HistogramIter, IterationValue};
pub use layout::ValueLayout;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("value {} outside trackable range", .0)]
    OutOfRange(u64),
    #[error("counter overflow")]
    Overflow,
    #[error("truncated encoding: {}", .0)]
    DecodeTruncated(String),
    #[error("decoded payload overflows the histogram")]
    DecodeValueOverflow,
    #[error("histogram geometry mismatch")]
    GeometryMismatch,
    #[error("invalid configuration: {}", .0)]
    InvalidConfig(String),
    #[error("invalid argument: {}", .0)]
    InvalidArgument(String),
    #[error("serialization error")]
    WriteError(#[from] std::io::Error),
}
