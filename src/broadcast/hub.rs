//! Subscriber fan-out hub
//!
//! One paced stream in, one unbounded FIFO per listener out. The subscriber
//! map and the replay buffer live behind a single lock so that seeding a new
//! subscriber from the replay buffer and registering it is atomic with
//! respect to `write`: every chunk reaches each subscriber exactly once.

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::broadcast::replay::ReplayBuffer;
use crate::error::StreamError;
use crate::stream::ChunkSink;

/// Opaque listener token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

struct Subscriber {
    sender: mpsc::UnboundedSender<Bytes>,
    joined_at: Instant,
}

struct HubState {
    subscribers: HashMap<SubscriberId, Subscriber>,
    replay: ReplayBuffer,
}

struct HubInner {
    state: Mutex<HubState>,
    chunks_written: AtomicU64,
    bytes_written: AtomicU64,
}

impl HubInner {
    fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.state.lock().subscribers.remove(&id);
        if let Some(subscriber) = &removed {
            tracing::debug!(
                "Listener {} left after {:.1}s",
                id,
                subscriber.joined_at.elapsed().as_secs_f32()
            );
        }
        removed.is_some()
    }
}

/// Fan-out hub with bounded replay for late joiners
///
/// Cheap to clone; all clones share the same subscribers.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub remembering the last `replay_capacity` chunks
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    subscribers: HashMap::new(),
                    replay: ReplayBuffer::new(replay_capacity),
                }),
                chunks_written: AtomicU64::new(0),
                bytes_written: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new listener, pre-seeded with the replay buffer
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId::generate();
        let (sender, receiver) = mpsc::unbounded_channel();

        let replayed = {
            let mut state = self.inner.state.lock();
            for chunk in state.replay.iter() {
                // The receiver is still in our hands, this cannot fail.
                let _ = sender.send(chunk.clone());
            }
            state.subscribers.insert(
                id,
                Subscriber {
                    sender,
                    joined_at: Instant::now(),
                },
            );
            !state.replay.is_empty()
        };

        if replayed {
            tracing::debug!("Listener {} joined", id);
        } else {
            tracing::debug!("Listener {} joined before any audio", id);
        }

        Subscription {
            id,
            receiver,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Record a chunk in the replay buffer and deliver it to every listener
    pub fn write(&self, chunk: Bytes) {
        let len = chunk.len() as u64;

        {
            let mut state = self.inner.state.lock();
            state.replay.push(chunk.clone());
            for subscriber in state.subscribers.values() {
                // A closed receiver means the listener is going away; the
                // serving layer unsubscribes it.
                let _ = subscriber.sender.send(chunk.clone());
            }
        }

        self.inner.chunks_written.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_written.fetch_add(len, Ordering::Relaxed);
    }

    /// Get statistics
    pub fn stats(&self) -> HubStats {
        let state = self.inner.state.lock();
        HubStats {
            subscribers: state.subscribers.len(),
            replay_len: state.replay.len(),
            replay_bytes: state.replay.byte_len(),
            replay_capacity: state.replay.capacity(),
            replay_evicted: state.replay.evicted(),
            chunks_written: self.inner.chunks_written.load(Ordering::Relaxed),
            bytes_written: self.inner.bytes_written.load(Ordering::Relaxed),
        }
    }
}

impl ChunkSink for BroadcastHub {
    fn write(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        BroadcastHub::write(self, chunk);
        Ok(())
    }
}

/// Hub statistics
#[derive(Debug, Clone)]
pub struct HubStats {
    pub subscribers: usize,
    pub replay_len: usize,
    /// Bytes a new listener receives on joining
    pub replay_bytes: usize,
    pub replay_capacity: usize,
    pub replay_evicted: u64,
    pub chunks_written: u64,
    pub bytes_written: u64,
}

/// A listener's end of the hub
///
/// Dropping it unsubscribes, so a disconnected client never lingers in the
/// subscriber map even if the caller forgets to unsubscribe.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<Bytes>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next chunk, or `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Next chunk if one is already queued
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }

    /// Turn into a stream of chunks, e.g. for an HTTP body
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|chunk| (chunk, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
