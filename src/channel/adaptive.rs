//! Non-blocking channel backed by a growable ring buffer.
//!
//! Pushes go to an unbounded input port and never wait. A background
//! worker moves items to a bounded output port read by a single consumer;
//! whenever the output side is busy the worker parks new items in a
//! [`GrowableRingBuffer`] instead of applying back-pressure.
//!
//! Closing only disables further pushes. Everything already pushed is
//! still delivered, in order, before [`AdaptiveChannel::pop`] reports the
//! end of the stream.

use crate::channel::ring_buffer::GrowableRingBuffer;
use crate::core::{CollatorError, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Producer side of an [`AdaptiveChannel`].
///
/// Cheap to clone. All clones share one close switch, so closing any of
/// them closes the channel for every producer.
pub struct ChannelSender<T> {
    input: Arc<RwLock<Option<mpsc::UnboundedSender<T>>>>,
    done: watch::Receiver<bool>,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            done: self.done.clone(),
        }
    }
}

impl<T> ChannelSender<T> {
    /// Push an item without blocking.
    ///
    /// Fails with [`CollatorError::ChannelClosed`] once the channel has been
    /// closed; the item is handed back to nobody and dropped.
    pub fn push(&self, item: T) -> Result<()> {
        match self.input.read().as_ref() {
            Some(tx) => tx.send(item).map_err(|_| CollatorError::ChannelClosed),
            None => Err(CollatorError::ChannelClosed),
        }
    }

    /// Disallow further pushes. Idempotent.
    pub fn close(&self) {
        self.input.write().take();
    }

    /// True once [`close`](Self::close) has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.input.read().is_none()
    }

    /// Wait until the worker has drained its buffer and exited.
    ///
    /// Only returns after the channel is closed.
    pub async fn wait(&self) {
        wait_done(self.done.clone()).await;
    }

    /// True once the worker has exited
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }
}

/// Growable channel with a non-blocking push side and a single reader.
pub struct AdaptiveChannel<T> {
    sender: ChannelSender<T>,
    output: mpsc::Receiver<T>,
}

impl<T: Send + 'static> AdaptiveChannel<T> {
    /// Create a channel on the current Tokio runtime.
    pub fn new(min_capacity: usize) -> Result<Self> {
        let handle =
            Handle::try_current().map_err(|e| CollatorError::NoRuntime(e.to_string()))?;
        Self::new_in(min_capacity, &handle)
    }

    /// Create a channel whose worker runs on `handle`.
    ///
    /// `min_capacity` bounds the output port and is the smallest size the
    /// overflow buffer shrinks to. It must be a non-zero power of two.
    pub fn new_in(min_capacity: usize, handle: &Handle) -> Result<Self> {
        let buffer = GrowableRingBuffer::new(min_capacity)?;
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::channel(min_capacity);
        let (done_tx, done_rx) = watch::channel(false);

        handle.spawn(Bridge::new(in_rx, out_tx, buffer).run(done_tx));

        Ok(Self {
            sender: ChannelSender {
                input: Arc::new(RwLock::new(Some(in_tx))),
                done: done_rx,
            },
            output: out_rx,
        })
    }
}

impl<T> AdaptiveChannel<T> {
    /// A producer handle for this channel
    pub fn sender(&self) -> ChannelSender<T> {
        self.sender.clone()
    }

    /// Push an item without blocking.
    pub fn push(&self, item: T) -> Result<()> {
        self.sender.push(item)
    }

    /// Wait for the next item. `None` means the channel was closed and
    /// every pushed item has already been returned.
    ///
    /// Cancel safe, so it can sit in a `tokio::select!` branch.
    pub async fn pop(&mut self) -> Option<T> {
        self.output.recv().await
    }

    /// Take the next item if one is ready right now
    pub fn try_pop(&mut self) -> Option<T> {
        self.output.try_recv().ok()
    }

    /// Disallow further pushes. Idempotent.
    pub fn close(&self) {
        self.sender.close();
    }

    /// Wait until the worker has drained its buffer and exited.
    pub async fn wait(&self) {
        self.sender.wait().await;
    }
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // A dropped sender means the worker is gone too
    let _ = done.wait_for(|finished| *finished).await;
}

/// The worker that owns the overflow buffer.
struct Bridge<T> {
    input: mpsc::UnboundedReceiver<T>,
    output: mpsc::Sender<T>,
    buffer: GrowableRingBuffer<T>,
}

impl<T: Send + 'static> Bridge<T> {
    fn new(
        input: mpsc::UnboundedReceiver<T>,
        output: mpsc::Sender<T>,
        buffer: GrowableRingBuffer<T>,
    ) -> Self {
        Self {
            input,
            output,
            buffer,
        }
    }

    async fn run(mut self, done: watch::Sender<bool>) {
        // Item waiting for room on the output port. While it is set the
        // output side counts as busy and new input goes to the buffer.
        let mut pending: Option<T> = None;
        let mut input_open = true;

        loop {
            tokio::select! {
                item = self.input.recv(), if input_open => match item {
                    Some(item) => {
                        if pending.is_none() {
                            pending = Some(item);
                        } else {
                            self.buffer.push(item);
                        }
                    }
                    None => {
                        input_open = false;
                        if pending.is_none() {
                            break;
                        }
                    }
                },
                permit = self.output.reserve(), if pending.is_some() => match permit {
                    Ok(permit) => {
                        if let Some(item) = pending.take() {
                            permit.send(item);
                        }
                        pending = self.buffer.pop();
                        if pending.is_none() && !input_open {
                            break;
                        }
                    }
                    Err(_) => {
                        // Reader dropped, nothing left to deliver to
                        trace!(buffered = self.buffer.len(), "adaptive channel reader gone");
                        break;
                    }
                },
            }
        }

        // Dropping the output sender ends the reader's stream
        drop(self.output);
        let _ = done.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_push_pop_in_order() {
        let mut channel = AdaptiveChannel::new(4).unwrap();
        for i in 0..3 {
            channel.push(i).unwrap();
        }

        for i in 0..3 {
            assert_eq!(channel.pop().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_rejects_bad_capacity() {
        assert!(matches!(
            AdaptiveChannel::<u32>::new(6),
            Err(CollatorError::InvalidCapacity(6))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            AdaptiveChannel::<u32>::new(4),
            Err(CollatorError::NoRuntime(_))
        ));
    }

    #[tokio::test]
    async fn test_push_after_close_is_rejected() {
        let channel = AdaptiveChannel::new(2).unwrap();
        channel.push(1).unwrap();
        channel.close();

        assert!(channel.sender().is_closed());
        assert!(matches!(channel.push(2), Err(CollatorError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_close_without_reader_keeps_buffered_items() {
        let mut channel = AdaptiveChannel::new(2).unwrap();
        for i in 0..10 {
            channel.push(i).unwrap();
        }
        channel.close();

        let mut drained = Vec::new();
        while let Some(item) = channel.pop().await {
            drained.push(item);
        }
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert_eq!(channel.pop().await, None);
    }

    #[tokio::test]
    async fn test_burst_larger_than_output_is_absorbed() {
        let mut channel = AdaptiveChannel::new(4).unwrap();
        let sender = channel.sender();

        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..10_000u32 {
                sender.push(i).unwrap();
            }
            sender.close();
        });

        let mut expected = 0u32;
        while let Some(item) = channel.pop().await {
            assert_eq!(item, expected);
            expected += 1;
        }
        producer.await.unwrap();
        assert_eq!(expected, 10_000);
    }

    #[tokio::test]
    async fn test_wait_returns_after_drain() {
        let mut channel = AdaptiveChannel::new(2).unwrap();
        for i in 0..5 {
            channel.push(i).unwrap();
        }
        channel.close();

        let sender = channel.sender();
        let waiter = tokio::spawn(async move { sender.wait().await });

        let mut count = 0;
        while channel.pop().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 5);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should finish once drained")
            .unwrap();
        assert!(channel.sender().is_finished());
    }

    #[tokio::test]
    async fn test_wait_on_empty_closed_channel() {
        let channel = AdaptiveChannel::<u32>::new(2).unwrap();
        channel.close();

        tokio::time::timeout(Duration::from_secs(1), channel.wait())
            .await
            .expect("empty channel should finish immediately");
    }

    #[tokio::test]
    async fn test_wait_when_reader_dropped() {
        let channel = AdaptiveChannel::new(2).unwrap();
        let sender = channel.sender();
        for i in 0..10 {
            sender.push(i).unwrap();
        }
        sender.close();
        drop(channel);

        tokio::time::timeout(Duration::from_secs(1), sender.wait())
            .await
            .expect("worker should exit when the reader is gone");
    }

    #[tokio::test]
    async fn test_try_pop() {
        let mut channel = AdaptiveChannel::new(2).unwrap();
        assert_eq!(channel.try_pop(), None);

        channel.push(7).unwrap();
        channel.close();
        channel.wait().await;
        assert_eq!(channel.try_pop(), Some(7));
        assert_eq!(channel.try_pop(), None);
    }
}
