//! Time and size based collation of metric observations.
//!
//! Data flow:
//! producer -> [`SourceHandle::push`] -> per-source feeder (normalizes)
//! -> shared gauge/counter channel -> [`CollationLoop`] -> [`Batch`]
//! -> transport.

pub mod client;
pub mod collation;
mod feeder;
pub mod types;

pub use client::{ClientBuilder, CollatedClient, SourceHandle};
pub use collation::{
    CollationLoop, CollationSnapshot, CollationStats, FlushErrorHandler, FlushReason,
};
pub use types::{Batch, Measurement, MetricKind, Observation};
