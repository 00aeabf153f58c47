//! The flush scheduler.
//!
//! Drains the shared gauge and counter channels into one [`Batch`] and
//! hands it to the transport when:
//! - the flush timer fires and the batch is non-empty,
//! - the combined count reaches `max_batch_size` (the timer restarts), or
//! - both channels are closed and drained (final flush, then exit).

use crate::channel::AdaptiveChannel;
use crate::collator::types::{Batch, MetricKind, Observation};
use crate::core::{CollationConfig, CollatorError};
use crate::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Callback told about every failed flush
pub type FlushErrorHandler = Arc<dyn Fn(&CollatorError, &Batch) + Send + Sync>;

/// What caused a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Flush interval elapsed
    Timer,
    /// Batch reached the size threshold
    Threshold,
    /// Both input channels closed
    Shutdown,
}

impl FlushReason {
    fn as_str(self) -> &'static str {
        match self {
            FlushReason::Timer => "timer",
            FlushReason::Threshold => "threshold",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// Flush counters, updated by the loop and readable from anywhere.
#[derive(Debug, Default)]
pub struct CollationStats {
    timer_flushes: AtomicU64,
    threshold_flushes: AtomicU64,
    shutdown_flushes: AtomicU64,
    failed_flushes: AtomicU64,
    observations_sent: AtomicU64,
    observations_dropped: AtomicU64,
}

/// Point-in-time copy of [`CollationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollationSnapshot {
    /// Flushes triggered by the timer
    pub timer_flushes: u64,
    /// Flushes triggered by the size threshold
    pub threshold_flushes: u64,
    /// Final flushes on shutdown (0 or 1)
    pub shutdown_flushes: u64,
    /// Flushes the transport rejected
    pub failed_flushes: u64,
    /// Observations in successful flushes
    pub observations_sent: u64,
    /// Observations in failed flushes
    pub observations_dropped: u64,
}

impl CollationSnapshot {
    /// Total flush attempts
    pub fn total_flushes(&self) -> u64 {
        self.timer_flushes + self.threshold_flushes + self.shutdown_flushes
    }
}

impl CollationStats {
    /// Read all counters
    pub fn snapshot(&self) -> CollationSnapshot {
        CollationSnapshot {
            timer_flushes: self.timer_flushes.load(Ordering::Relaxed),
            threshold_flushes: self.threshold_flushes.load(Ordering::Relaxed),
            shutdown_flushes: self.shutdown_flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            observations_sent: self.observations_sent.load(Ordering::Relaxed),
            observations_dropped: self.observations_dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, reason: FlushReason, size: usize, ok: bool) {
        let counter = match reason {
            FlushReason::Timer => &self.timer_flushes,
            FlushReason::Threshold => &self.threshold_flushes,
            FlushReason::Shutdown => &self.shutdown_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if ok {
            self.observations_sent.fetch_add(size as u64, Ordering::Relaxed);
        } else {
            self.failed_flushes.fetch_add(1, Ordering::Relaxed);
            self.observations_dropped.fetch_add(size as u64, Ordering::Relaxed);
        }
    }
}

/// Owns the two shared channels and drives flushes.
pub struct CollationLoop {
    gauges: AdaptiveChannel<Observation>,
    counters: AdaptiveChannel<Observation>,
    transport: Arc<dyn Transport>,
    flush_interval: Duration,
    max_batch_size: usize,
    stats: Arc<CollationStats>,
    on_error: Option<FlushErrorHandler>,
}

impl CollationLoop {
    /// Create a loop over the given channels
    pub fn new(
        gauges: AdaptiveChannel<Observation>,
        counters: AdaptiveChannel<Observation>,
        transport: Arc<dyn Transport>,
        config: &CollationConfig,
    ) -> Self {
        Self {
            gauges,
            counters,
            transport,
            flush_interval: config.flush_interval,
            max_batch_size: config.max_batch_size.max(1),
            stats: Arc::new(CollationStats::default()),
            on_error: None,
        }
    }

    /// Report failed flushes to `handler` as well as the log
    pub fn with_error_handler(mut self, handler: FlushErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Shared handle to the flush counters
    pub fn stats(&self) -> Arc<CollationStats> {
        Arc::clone(&self.stats)
    }

    /// Run until both channels are closed and drained, then flush what is
    /// left exactly once.
    pub async fn run(self) {
        let Self {
            mut gauges,
            mut counters,
            transport,
            flush_interval,
            max_batch_size,
            stats,
            on_error,
        } = self;

        let flusher = Flusher {
            transport,
            stats,
            on_error,
        };

        // First tick one full interval from now, not immediately
        let mut ticker = time::interval_at(Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut batch = Batch::default();
        let mut gauges_open = true;
        let mut counters_open = true;

        debug!(
            interval = ?flush_interval,
            max_batch_size,
            transport = flusher.transport.name(),
            "collation loop started"
        );

        while gauges_open || counters_open {
            tokio::select! {
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        flusher.flush(&mut batch, FlushReason::Timer).await;
                    }
                    continue;
                }
                item = gauges.pop(), if gauges_open => match item {
                    Some(observation) => batch.push(MetricKind::Gauge, observation),
                    None => {
                        trace!("gauge channel drained");
                        gauges_open = false;
                    }
                },
                item = counters.pop(), if counters_open => match item {
                    Some(observation) => batch.push(MetricKind::Counter, observation),
                    None => {
                        trace!("counter channel drained");
                        counters_open = false;
                    }
                },
            }

            if batch.len() >= max_batch_size {
                flusher.flush(&mut batch, FlushReason::Threshold).await;
                ticker.reset();
            }
        }

        if !batch.is_empty() {
            flusher.flush(&mut batch, FlushReason::Shutdown).await;
        }

        debug!(stats = ?flusher.stats.snapshot(), "collation loop finished");
    }
}

struct Flusher {
    transport: Arc<dyn Transport>,
    stats: Arc<CollationStats>,
    on_error: Option<FlushErrorHandler>,
}

impl Flusher {
    /// Send the batch and leave an empty one in its place, whatever the
    /// outcome. Failed batches are not retried.
    async fn flush(&self, batch: &mut Batch, reason: FlushReason) {
        let outgoing = std::mem::take(batch);
        let size = outgoing.len();

        match self.transport.send(&outgoing).await {
            Ok(()) => {
                self.stats.record(reason, size, true);
                debug!(
                    reason = reason.as_str(),
                    gauges = outgoing.gauges.len(),
                    counters = outgoing.counters.len(),
                    "batch flushed"
                );
            },
            Err(e) => {
                self.stats.record(reason, size, false);
                warn!(
                    reason = reason.as_str(),
                    observations = size,
                    category = e.category(),
                    error = %e,
                    "flush failed, batch discarded"
                );
                if let Some(handler) = &self.on_error {
                    handler(&e, &outgoing);
                }
            },
        }
    }
}
