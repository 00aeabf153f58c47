//! Delivery of collated batches.
//!
//! The collation loop only needs "send this batch, tell me if it worked".
//! [`HttpTransport`] posts to a Librato-style metrics API,
//! [`StdoutTransport`] prints batches for dry runs.

pub mod http;
pub mod stdout;

pub use http::{Annotation, HttpTransport, Link};
pub use stdout::StdoutTransport;

use crate::collator::Batch;
use crate::core::Result;
use async_trait::async_trait;

/// Something that can deliver a batch.
///
/// Called from the collation loop with every non-empty batch. Errors are
/// logged and counted by the caller; implementations should not retry
/// on their own unless they bound the time spent doing it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch
    async fn send(&self, batch: &Batch) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str {
        "transport"
    }
}
