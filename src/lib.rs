//! # Radio Relay
//!
//! An always-on audio station: one canonical MP3 stream, produced around the
//! clock by external media processes, fanned out to any number of HTTP
//! listeners who may join mid-stream.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                     Pipeline Orchestrator (pipeline)                   │
//! │                                                                        │
//! │  ┌──────────────┐                                                      │
//! │  │ SilenceStage │──┐  (at most one filler writes at a time)            │
//! │  └──────────────┘  │   ┌─────────────┐     ┌──────────────────────┐   │
//! │                    ├──►│ Passthrough │────►│ FilterStage          │   │
//! │  ┌──────────────┐  │   └─────────────┘     │ track ⨯ voice ducking│   │
//! │  │ VoiceStage   │──┘                       └──────────┬───────────┘   │
//! │  └──────────────┘                                     │               │
//! └───────────────────────────────────────────────────────┼───────────────┘
//!                                                         │ output channel
//!                                                         ▼
//!                                  ┌────────────────────────────────────┐
//!                                  │ Throttle (stream) - real-time pace │
//!                                  └─────────────────┬──────────────────┘
//!                                                    ▼
//!                                  ┌────────────────────────────────────┐
//!                                  │ BroadcastHub (broadcast)           │
//!                                  │ replay buffer ⨯ N subscribers      │
//!                                  └──┬──────────────┬───────────────┬──┘
//!                                     ▼              ▼               ▼
//!                                 GET /stream    GET /stream     GET /stream
//! ```
//!
//! The filter stage is replaced whenever its track ends or it crashes. The
//! output task, the hub and every listener outlive those restarts.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod library;
pub mod pipeline;
pub mod process;
pub mod server;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Nominal MP3 bitrate of the stream in bits per second
    pub const DEFAULT_BITRATE: u32 = 196 * 1024;

    /// Chunks remembered for listeners who join mid-stream
    pub const DEFAULT_REPLAY_CAPACITY: usize = 32;

    /// Delay before a closed filter stage is replaced
    pub const DEFAULT_RESTART_BACKOFF_MS: u64 = 200;

    /// Default HTTP port for the stream and control API
    pub const DEFAULT_HTTP_PORT: u16 = 3000;

    /// Entries kept in the station's message log
    pub const MESSAGE_LOG_CAPACITY: usize = 100;
}
