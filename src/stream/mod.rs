//! Paced output path
//!
//! Filter-stage output is rate-matched to the nominal bitrate by the
//! [`Throttle`] and handed to a [`ChunkSink`] (the broadcast hub, optionally
//! teed into a [`ChunkMonitor`]).

pub mod monitor;
pub mod output;
pub mod throttle;

use bytes::Bytes;

use crate::error::StreamError;

pub use monitor::ChunkMonitor;
pub use output::{spawn_output, OutputSink};
pub use throttle::Throttle;

/// Destination of paced chunks
pub trait ChunkSink: Send {
    fn write(&mut self, chunk: Bytes) -> Result<(), StreamError>;
}
