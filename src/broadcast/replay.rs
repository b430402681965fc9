//! Bounded replay history for late joiners
//!
//! Unlike a capture ring buffer this never rejects a push: once full, the
//! oldest chunk is evicted so the buffer always holds the most recent
//! `capacity` chunks in arrival order.

use bytes::Bytes;
use std::collections::VecDeque;

/// Most recent chunks of the live stream
#[derive(Debug)]
pub struct ReplayBuffer {
    chunks: VecDeque<Bytes>,
    capacity: usize,
    evicted: u64,
}

impl ReplayBuffer {
    /// Create a replay buffer holding at most `capacity` chunks
    ///
    /// A zero capacity is rounded up to one; configuration validation
    /// rejects it before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append a chunk, evicting the oldest one when over capacity
    pub fn push(&mut self, chunk: Bytes) {
        self.chunks.push_back(chunk);
        while self.chunks.len() > self.capacity {
            self.chunks.pop_front();
            self.evicted += 1;
        }
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total chunks dropped from the front since creation
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Total bytes currently held
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_keeps_order_under_capacity() {
        let mut replay = ReplayBuffer::new(4);
        replay.push(Bytes::from_static(b"a"));
        replay.push(Bytes::from_static(b"b"));

        let held: Vec<_> = replay.iter().cloned().collect();
        assert_eq!(held, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert_eq!(replay.evicted(), 0);
        assert_eq!(replay.byte_len(), 2);
    }

    #[test]
    fn test_replay_evicts_oldest_first() {
        let mut replay = ReplayBuffer::new(2);
        for chunk in ["1", "2", "3", "4"] {
            replay.push(Bytes::from(chunk));
        }

        let held: Vec<_> = replay.iter().cloned().collect();
        assert_eq!(held, vec![Bytes::from("3"), Bytes::from("4")]);
        assert_eq!(replay.len(), replay.capacity());
        assert_eq!(replay.evicted(), 2);
    }

    #[test]
    fn test_zero_capacity_still_bounded() {
        let mut replay = ReplayBuffer::new(0);
        replay.push(Bytes::from("x"));
        replay.push(Bytes::from("y"));
        assert_eq!(replay.len(), 1);
        assert_eq!(replay.iter().next(), Some(&Bytes::from("y")));
    }
}
