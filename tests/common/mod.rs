//! Common test utilities and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use collator_lib::collator::{Batch, Observation};
use collator_lib::core::{CollationConfig, CollatorError, Result};
use collator_lib::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Transport that keeps every batch it is given.
#[derive(Default)]
pub struct RecordingTransport {
    batches: Mutex<Vec<Batch>>,
    /// Number of leading sends that fail
    fail_first: usize,
    attempts: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` sends, then succeed
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    /// Batches that were accepted
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// All accepted gauges with the given name, in delivery order
    pub fn gauges_named(&self, name: &str) -> Vec<Observation> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.gauges.iter())
            .filter(|o| o.name == name)
            .cloned()
            .collect()
    }

    /// All accepted counters with the given name, in delivery order
    pub fn counters_named(&self, name: &str) -> Vec<Observation> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.counters.iter())
            .filter(|o| o.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, batch: &Batch) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(CollatorError::HttpStatus {
                status: 413,
                body: "Request Entity Too Large".to_string(),
            });
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Collation settings with small buffers so overflow paths get exercised
pub fn collation_config(interval: Duration, max_batch_size: usize) -> CollationConfig {
    CollationConfig {
        flush_interval: interval,
        max_batch_size,
        source: None,
        source_buffer: 4,
        collate_buffer: 8,
    }
}
