//! Collator - time and size collated metrics client.
//!
//! Collator accepts an unbounded stream of gauge and counter measurements
//! from any number of producers and delivers them as a few consolidated
//! requests instead of one request per measurement.
//!
//! # Features
//!
//! - **Non-blocking pushes**: producers never wait on the network or on
//!   each other; bursts are absorbed by growable ring buffers
//! - **Time or size flushing**: a batch goes out when the flush interval
//!   elapses or when it reaches `max_batch_size`, whichever comes first
//! - **Clean shutdown**: `close` drains every stage and the last batch is
//!   flushed exactly once
//!
//! # Architecture
//!
//! - `channel`: growable ring buffer and the adaptive channel built on it
//! - `collator`: per-source feeders, the collation loop and the client
//! - `transport`: batch delivery (HTTP, stdout)
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use collator_lib::collator::CollatedClient;
//! use collator_lib::core::Config;
//! use collator_lib::transport::HttpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
//!     let client = CollatedClient::new(config.collation, transport)?;
//!
//!     client.get_gauge("queue.depth")?.push(17)?;
//!     client.get_counter("jobs.done")?.push(1)?;
//!
//!     client.close().await;
//!     client.wait().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod channel;
pub mod cli;
pub mod collator;
pub mod core;
pub mod transport;

// Re-export core types for convenience
pub use crate::collator::{CollatedClient, SourceHandle};
pub use crate::core::{CollatorError, Config, Result};
