//! The station's shared input bus
//!
//! Whatever filler is current (silence or voice) is written here; a feeder
//! task copies it into the filter stage's input. Only the orchestrator
//! writes to it, so writes from different fillers can never interleave.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::stage::feed_input;
use crate::process::{ProcessInput, StageKind};

pub struct Passthrough {
    chunks: mpsc::UnboundedSender<Bytes>,
    feeder: JoinHandle<()>,
    bytes_written: u64,
}

impl Passthrough {
    /// Feed the passthrough into `stdin` of a stage of `kind`
    pub fn new(kind: StageKind, stdin: ProcessInput) -> Self {
        let (chunks, rx) = mpsc::unbounded_channel();
        Self {
            chunks,
            feeder: feed_input(kind, stdin, rx),
            bytes_written: 0,
        }
    }

    /// Queue a chunk for the filter. Returns false once the feeder is gone.
    pub fn write(&mut self, chunk: Bytes) -> bool {
        let len = chunk.len() as u64;
        if self.chunks.send(chunk).is_ok() {
            self.bytes_written += len;
            true
        } else {
            false
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Detach from the filter and drop anything still queued
    pub fn destroy(self) {
        tracing::debug!("Passthrough destroyed after {} bytes", self.bytes_written);
    }
}

impl Drop for Passthrough {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}
