//! Growable FIFO ring buffer.
//!
//! The backing array is always a power of two so positions wrap with a
//! bitwise AND. It doubles when full and halves once usage drops to 25%,
//! never going below the minimum capacity it was created with.

use crate::core::{CollatorError, Result};

/// FIFO queue over a power-of-two ring that grows and shrinks with usage.
#[derive(Debug)]
pub struct GrowableRingBuffer<T> {
    items: Vec<Option<T>>,
    /// Position of the oldest item
    start: usize,
    /// Position the next item is written to
    end: usize,
    count: usize,
    min_capacity: usize,
}

impl<T> GrowableRingBuffer<T> {
    /// Create an empty buffer. `min_capacity` must be a non-zero power of two.
    pub fn new(min_capacity: usize) -> Result<Self> {
        if !min_capacity.is_power_of_two() {
            return Err(CollatorError::InvalidCapacity(min_capacity));
        }

        let mut items = Vec::with_capacity(min_capacity);
        items.resize_with(min_capacity, || None);

        Ok(Self {
            items,
            start: 0,
            end: 0,
            count: 0,
            min_capacity,
        })
    }

    /// Append an item, growing the ring first if it is full.
    pub fn push(&mut self, item: T) {
        if self.count == self.items.len() {
            self.resize();
        }

        self.items[self.end] = Some(item);
        // (x + 1) & (len - 1) wraps to 0 past the last slot
        self.end = (self.end + 1) & self.mask();
        self.count += 1;
    }

    /// Remove and return the oldest item, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }

        let item = self.items[self.start].take();
        self.start = (self.start + 1) & self.mask();
        self.count -= 1;

        // Shrink at 25% usage unless already at the minimum size
        if self.count << 2 == self.items.len() && self.items.len() > self.min_capacity {
            self.resize();
        }

        item
    }

    /// Oldest item without removing it
    pub fn peek(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        self.items[self.start].as_ref()
    }

    /// Get current number of items in buffer
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Size of the backing array
    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Capacity the buffer never shrinks below
    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    #[inline]
    fn mask(&self) -> usize {
        self.items.len() - 1
    }

    /// Reallocate to twice the live count (at least the minimum),
    /// moving the live window to the front of the new array.
    fn resize(&mut self) {
        let capacity = (self.count << 1).max(self.min_capacity);
        let mut items = Vec::with_capacity(capacity);

        if self.count > 0 {
            if self.start < self.end {
                items.extend(self.items[self.start..self.end].iter_mut().map(Option::take));
            } else {
                // Live window wraps: tail segment first, then the head
                items.extend(self.items[self.start..].iter_mut().map(Option::take));
                items.extend(self.items[..self.end].iter_mut().map(Option::take));
            }
        }
        items.resize_with(capacity, || None);

        self.start = 0;
        self.end = self.count;
        self.items = items;
    }
}

impl<T> Extend<T> for GrowableRingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_creation() {
        let buffer: GrowableRingBuffer<u32> = GrowableRingBuffer::new(8).unwrap();

        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.min_capacity(), 8);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = GrowableRingBuffer::<u32>::new(0);
        assert!(matches!(result, Err(CollatorError::InvalidCapacity(0))));
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        let result = GrowableRingBuffer::<u32>::new(7);
        assert!(matches!(result, Err(CollatorError::InvalidCapacity(7))));
    }

    #[test]
    fn test_empty_pop() {
        let mut buffer: GrowableRingBuffer<u32> = GrowableRingBuffer::new(4).unwrap();
        assert!(buffer.pop().is_none());
        assert!(buffer.peek().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut buffer = GrowableRingBuffer::new(4).unwrap();
        for i in 0..3 {
            buffer.push(i);
        }

        assert_eq!(buffer.peek(), Some(&0));
        for i in 0..3 {
            assert_eq!(buffer.pop(), Some(i));
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_grows_to_double_on_overflow() {
        let mut buffer = GrowableRingBuffer::new(4).unwrap();
        for i in 0..5 {
            buffer.push(i);
        }

        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_shrinks_at_quarter_usage() {
        let mut buffer = GrowableRingBuffer::new(4).unwrap();
        buffer.extend(0..5);
        assert_eq!(buffer.capacity(), 8);

        // 5 -> 3 items: still above 25% of 8
        assert_eq!(buffer.pop(), Some(0));
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.capacity(), 8);

        // 2 items == 8 / 4, shrink to max(2 * 2, 4)
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.capacity(), 4);

        // 1 item == 4 / 4 but already at the minimum
        assert_eq!(buffer.pop(), Some(3));
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.pop(), Some(4));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_wraparound_resize_preserves_order() {
        let mut buffer = GrowableRingBuffer::new(4).unwrap();
        buffer.extend(0..4);

        // Move start forward so the live window wraps
        assert_eq!(buffer.pop(), Some(0));
        assert_eq!(buffer.pop(), Some(1));
        buffer.push(4);
        buffer.push(5);
        assert_eq!(buffer.capacity(), 4);

        // Full and wrapped, this push copies both segments
        buffer.push(6);
        assert_eq!(buffer.capacity(), 8);

        let drained: Vec<_> = std::iter::from_fn(|| buffer.pop()).collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_interleaved_operations_keep_invariants() {
        let mut buffer = GrowableRingBuffer::new(2).unwrap();
        let mut expected = std::collections::VecDeque::new();
        let mut next = 0u32;

        // Deterministic pseudo-random push/pop pattern
        let mut state = 0x2545_f491_u32;
        for _ in 0..10_000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;

            if state % 3 == 0 {
                assert_eq!(buffer.pop(), expected.pop_front());
            } else {
                buffer.push(next);
                expected.push_back(next);
                next += 1;
            }

            assert!(buffer.capacity().is_power_of_two());
            assert!(buffer.capacity() >= buffer.min_capacity());
            assert!(buffer.len() <= buffer.capacity());
            assert_eq!(buffer.len(), expected.len());
        }

        while let Some(item) = expected.pop_front() {
            assert_eq!(buffer.pop(), Some(item));
        }
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_capacity_after_resize_is_twice_count() {
        let mut buffer = GrowableRingBuffer::new(2).unwrap();

        for i in 0..100 {
            let before = buffer.capacity();
            let count_before = buffer.len();
            buffer.push(i);
            if buffer.capacity() != before {
                assert_eq!(buffer.capacity(), (count_before * 2).max(2));
            }
        }

        while !buffer.is_empty() {
            let before = buffer.capacity();
            buffer.pop();
            if buffer.capacity() != before {
                assert!(buffer.capacity() < before);
                assert_eq!(buffer.capacity(), (buffer.len() * 2).max(2));
            }
        }
        assert_eq!(buffer.capacity(), 2);
    }
}
