//! Per-source worker: turns raw measurements into observations.

use crate::channel::{AdaptiveChannel, ChannelSender};
use crate::collator::types::{Measurement, MetricKind, Observation};
use std::sync::Arc;
use tracing::{trace, warn};

/// Drains one source's channel into the shared channel for its kind.
pub(crate) struct Feeder {
    name: Arc<str>,
    kind: MetricKind,
    source: Option<Arc<str>>,
    input: AdaptiveChannel<Measurement>,
    collate: ChannelSender<Observation>,
}

impl Feeder {
    pub(crate) fn new(
        name: Arc<str>,
        kind: MetricKind,
        source: Option<Arc<str>>,
        input: AdaptiveChannel<Measurement>,
        collate: ChannelSender<Observation>,
    ) -> Self {
        Self {
            name,
            kind,
            source,
            input,
            collate,
        }
    }

    /// Runs until the source channel is closed and empty.
    pub(crate) async fn run(mut self) {
        let mut forwarded = 0u64;

        while let Some(measurement) = self.input.pop().await {
            let observation = Observation::normalize(
                &self.name,
                measurement,
                self.source.as_deref(),
                chrono::Utc::now().timestamp(),
            );

            if self.collate.push(observation).is_err() {
                // Shared channels close only after every feeder has exited
                warn!(
                    name = %self.name,
                    kind = %self.kind,
                    "collation channel closed early, dropping observation"
                );
                continue;
            }
            forwarded += 1;
        }

        trace!(name = %self.name, kind = %self.kind, forwarded, "feeder finished");
    }
}
