//! The public face of the collator.
//!
//! [`CollatedClient`] hands out one push handle per named gauge or
//! counter and drives the collation loop in the background. Shutdown is
//! cooperative: [`close`](CollatedClient::close) stops intake and drains
//! every stage in order, [`wait`](CollatedClient::wait) returns after the
//! final flush.

use crate::channel::{AdaptiveChannel, ChannelSender};
use crate::collator::collation::{
    CollationLoop, CollationSnapshot, CollationStats, FlushErrorHandler,
};
use crate::collator::feeder::Feeder;
use crate::collator::types::{Batch, Measurement, MetricKind, Observation};
use crate::core::{CollationConfig, CollatorError, Result};
use crate::transport::Transport;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Push side of one metric source.
///
/// Cloning is cheap; every clone feeds the same source.
#[derive(Clone)]
pub struct SourceHandle {
    name: Arc<str>,
    kind: MetricKind,
    sender: ChannelSender<Measurement>,
}

impl SourceHandle {
    /// Queue a measurement. Never waits for the network or the flush loop.
    ///
    /// Fails with [`CollatorError::ChannelClosed`] after the client closed.
    pub fn push(&self, measurement: impl Into<Measurement>) -> Result<()> {
        self.sender.push(measurement.into())
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric kind of this source
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// True once the client has closed this source
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

struct FeederEntry {
    sender: ChannelSender<Measurement>,
    task: JoinHandle<()>,
}

struct Registry {
    closed: bool,
    feeders: Vec<FeederEntry>,
    /// Taken by the first close, fires once feeders and shared channels drained
    drained: Option<watch::Sender<bool>>,
}

/// Metrics client that collates observations by time and size.
///
/// Call [`close`](Self::close) (or [`shutdown`](Self::shutdown)) to flush
/// what is buffered. Dropping the client starts the same drain in the
/// background but nothing waits for the final flush.
pub struct CollatedClient {
    runtime: Handle,
    config: CollationConfig,
    source_label: Option<Arc<str>>,
    gauges: DashMap<String, SourceHandle>,
    counters: DashMap<String, SourceHandle>,
    collate_gauges: ChannelSender<Observation>,
    collate_counters: ChannelSender<Observation>,
    registry: Mutex<Registry>,
    stats: Arc<CollationStats>,
    drained: watch::Receiver<bool>,
    finished: watch::Receiver<bool>,
}

impl CollatedClient {
    /// Start a client with the given settings on the current runtime
    pub fn new(config: CollationConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        ClientBuilder::new(transport).config(config).build()
    }

    /// Builder for less common options
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Handle for the gauge called `name`, creating it on first use
    pub fn get_gauge(&self, name: &str) -> Result<SourceHandle> {
        self.get_source(MetricKind::Gauge, name)
    }

    /// Handle for the counter called `name`, creating it on first use
    pub fn get_counter(&self, name: &str) -> Result<SourceHandle> {
        self.get_source(MetricKind::Counter, name)
    }

    /// Handle for a source of either kind, creating it on first use.
    ///
    /// Fails with [`CollatorError::ClientClosed`] for new sources once
    /// [`close`](Self::close) has started.
    pub fn get_source(&self, kind: MetricKind, name: &str) -> Result<SourceHandle> {
        let sources = match kind {
            MetricKind::Gauge => &self.gauges,
            MetricKind::Counter => &self.counters,
        };

        if let Some(handle) = sources.get(name) {
            return Ok(handle.clone());
        }

        let entry = sources
            .entry(name.to_string())
            .or_try_insert_with(|| self.spawn_source(kind, name))?;
        Ok(entry.clone())
    }

    fn spawn_source(&self, kind: MetricKind, name: &str) -> Result<SourceHandle> {
        let mut registry = self.registry.lock();
        if registry.closed {
            return Err(CollatorError::ClientClosed);
        }

        let channel = AdaptiveChannel::new_in(self.config.source_buffer, &self.runtime)?;
        let sender = channel.sender();
        let name: Arc<str> = Arc::from(name);
        let collate = match kind {
            MetricKind::Gauge => self.collate_gauges.clone(),
            MetricKind::Counter => self.collate_counters.clone(),
        };

        let feeder = Feeder::new(
            Arc::clone(&name),
            kind,
            self.source_label.clone(),
            channel,
            collate,
        );
        let task = self.runtime.spawn(feeder.run());

        registry.feeders.push(FeederEntry {
            sender: sender.clone(),
            task,
        });
        debug!(name = %name, kind = %kind, "source created");

        Ok(SourceHandle { name, kind, sender })
    }

    /// Stop accepting measurements and drain every stage.
    ///
    /// Closes each source and waits for its feeder, then closes the two
    /// shared channels so the collation loop can make its final flush.
    /// Safe to call more than once and from several tasks at once: the
    /// drain runs once, every caller returns after it has finished.
    pub async fn close(&self) {
        self.begin_close();

        let mut drained = self.drained.clone();
        let _ = drained.wait_for(|done| *done).await;
    }

    /// Shut off intake and hand the drain to a runtime task, so it
    /// completes even if the caller's future is dropped.
    fn begin_close(&self) {
        let (feeders, drained) = {
            let mut registry = self.registry.lock();
            if registry.closed {
                return;
            }
            registry.closed = true;
            (std::mem::take(&mut registry.feeders), registry.drained.take())
        };

        debug!(sources = feeders.len(), "closing collated client");

        for entry in &feeders {
            entry.sender.close();
        }

        self.runtime.spawn(drain(
            feeders,
            self.collate_gauges.clone(),
            self.collate_counters.clone(),
            drained,
        ));
    }

    /// Wait until the final flush has completed.
    ///
    /// Returns only after [`close`](Self::close).
    pub async fn wait(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Close and wait in one call
    pub async fn shutdown(&self) {
        self.close().await;
        self.wait().await;
    }

    /// Current flush counters
    pub fn stats(&self) -> CollationSnapshot {
        self.stats.snapshot()
    }

    /// Number of sources created so far
    pub fn source_count(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }
}

impl Drop for CollatedClient {
    fn drop(&mut self) {
        self.begin_close();
    }
}

/// Feeders first, then the shared channels. Closing the shared channels
/// any earlier would drop observations a feeder still holds.
async fn drain(
    feeders: Vec<FeederEntry>,
    collate_gauges: ChannelSender<Observation>,
    collate_counters: ChannelSender<Observation>,
    drained: Option<watch::Sender<bool>>,
) {
    for entry in feeders {
        entry.sender.wait().await;
        if let Err(e) = entry.task.await {
            warn!(error = %e, "feeder task failed");
        }
    }

    collate_gauges.close();
    collate_counters.close();
    collate_gauges.wait().await;
    collate_counters.wait().await;

    if let Some(drained) = drained {
        let _ = drained.send(true);
    }
}

/// Options for [`CollatedClient`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    config: CollationConfig,
    runtime: Option<Handle>,
    on_error: Option<FlushErrorHandler>,
}

impl ClientBuilder {
    /// Start from default settings
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: CollationConfig::default(),
            runtime: None,
            on_error: None,
        }
    }

    /// Use these collation settings
    pub fn config(mut self, config: CollationConfig) -> Self {
        self.config = config;
        self
    }

    /// Run workers on `handle` instead of the current runtime
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Be told about every failed flush
    pub fn on_flush_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CollatorError, &Batch) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Validate settings and start the collation loop
    pub fn build(self) -> Result<CollatedClient> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| CollatorError::NoRuntime(e.to_string()))?,
        };

        let gauges = AdaptiveChannel::new_in(self.config.collate_buffer, &runtime)?;
        let counters = AdaptiveChannel::new_in(self.config.collate_buffer, &runtime)?;
        let collate_gauges = gauges.sender();
        let collate_counters = counters.sender();

        let mut collation = CollationLoop::new(gauges, counters, self.transport, &self.config);
        if let Some(handler) = self.on_error {
            collation = collation.with_error_handler(handler);
        }
        let stats = collation.stats();

        let (finished_tx, finished) = watch::channel(false);
        runtime.spawn(async move {
            collation.run().await;
            let _ = finished_tx.send(true);
        });

        let source_label = self.config.source_label().map(Arc::from);
        let (drained_tx, drained) = watch::channel(false);

        Ok(CollatedClient {
            runtime,
            config: self.config,
            source_label,
            gauges: DashMap::new(),
            counters: DashMap::new(),
            collate_gauges,
            collate_counters,
            registry: Mutex::new(Registry {
                closed: false,
                feeders: Vec::new(),
                drained: Some(drained_tx),
            }),
            stats,
            drained,
            finished,
        })
    }
}
