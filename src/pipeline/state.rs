//! Observable pipeline state

use serde::Serialize;
use std::fmt;

/// Where the pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Spawning the filter and silence stages
    Starting,
    /// A live filter stage drives the output
    Streaming,
    /// Waiting out the backoff after a filter stage closed
    Restarting,
    /// A voice interjection is playing over the stream
    VoiceActive,
    /// Shut down for good
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Streaming => "streaming",
            Phase::Restarting => "restarting",
            Phase::VoiceActive => "voice_active",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot published by the orchestrator after every transition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioStatus {
    pub phase: Phase,
    pub current_track: Option<String>,
    pub voice_active: bool,
    /// Filter stages started so far
    pub starts: u64,
    /// Filter stages that closed and were restarted
    pub restarts: u64,
}

impl Default for RadioStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Starting,
            current_track: None,
            voice_active: false,
            starts: 0,
            restarts: 0,
        }
    }
}
