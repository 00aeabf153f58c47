//! Buffering primitives.
//!
//! - [`GrowableRingBuffer`]: single-owner FIFO that doubles and halves
//! - [`AdaptiveChannel`]: non-blocking push, single reader, bridged by a
//!   worker that parks overflow in a ring buffer

pub mod adaptive;
pub mod ring_buffer;

pub use adaptive::{AdaptiveChannel, ChannelSender};
pub use ring_buffer::GrowableRingBuffer;
