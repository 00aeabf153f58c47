//! Prints each batch as one JSON line.

use crate::collator::Batch;
use crate::core::Result;
use crate::transport::Transport;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Writes batches to standard output instead of the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutTransport;

impl StdoutTransport {
    /// Create a stdout transport
    pub fn new() -> Self {
        Self
    }

    fn encode(batch: &Batch) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(&self, batch: &Batch) -> Result<()> {
        let line = Self::encode(batch)?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&line).await?;
        stdout.flush().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
