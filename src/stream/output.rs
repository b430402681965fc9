//! Long-lived output task
//!
//! Filter stages come and go; the output task outlives them. It drains the
//! bounded output channel through the throttle into the hub so pacing state
//! carries across pipeline restarts.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::BroadcastHub;
use crate::error::StreamError;
use crate::stream::{ChunkMonitor, ChunkSink, Throttle};

/// The hub, optionally teed into a timing monitor
pub struct OutputSink {
    hub: BroadcastHub,
    monitor: Option<ChunkMonitor>,
}

impl OutputSink {
    pub fn new(hub: BroadcastHub, monitor: Option<ChunkMonitor>) -> Self {
        Self { hub, monitor }
    }

    /// Flush the monitor, if any
    pub fn finish(&self) {
        if let Some(monitor) = &self.monitor {
            if let Err(e) = monitor.write_results() {
                tracing::error!(
                    "Failed to write chunk monitor to {}: {}",
                    monitor.output_path().display(),
                    e
                );
            }
        }
    }
}

impl ChunkSink for OutputSink {
    fn write(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.record(chunk.len());
        }
        self.hub.write(chunk);
        Ok(())
    }
}

/// Run the throttle until every sender of `output_rx` is gone
pub fn spawn_output(
    mut output_rx: mpsc::Receiver<Bytes>,
    mut throttle: Throttle,
    mut sink: OutputSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(
            "Output started at {} B/s in {} byte chunks",
            throttle.bytes_per_second(),
            throttle.chunk_size()
        );

        while let Some(chunk) = output_rx.recv().await {
            if let Err(e) = throttle.process(chunk, &mut sink).await {
                tracing::error!("Throttle error: {}", e);
            }
        }

        tracing::debug!("Output closed after {} bytes", throttle.bytes_emitted());
        sink.finish();
    })
}
