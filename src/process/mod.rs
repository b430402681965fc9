//! External media processes
//!
//! Every stage of the pipeline is an opaque external program: something with
//! an optional input byte stream, an output byte stream, an exit code, and
//! an immediate kill. [`ProcessLauncher`] is the seam between the
//! orchestrator and the operating system; [`SystemLauncher`] spawns real
//! processes, [`ScriptedLauncher`] hands out in-memory ones.

pub mod commands;
pub mod media;
pub mod scripted;
pub mod system;

use std::fmt;

use crate::error::ProcessError;

pub use commands::StageCommands;
pub use media::{MediaProcess, ProcessExit, ProcessInput, ProcessOutput};
pub use scripted::{LaunchLog, ScriptedLauncher, ScriptedProcess};
pub use system::SystemLauncher;

/// Role of a process in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Mixes the track with whatever the passthrough carries
    Filter,
    /// Looped silence keeping the passthrough fed
    Silence,
    /// Pre-recorded voice bumper
    Clip,
    /// Text-to-speech producing raw PCM
    Synthesizer,
    /// Converts synthesized PCM to the stream codec
    VoiceEncoder,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Filter => "Filter",
            StageKind::Silence => "Silence",
            StageKind::Clip => "Voice",
            StageKind::Synthesizer => "Piper",
            StageKind::VoiceEncoder => "PiperVoice",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed command line of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub kind: StageKind,
    pub program: String,
    pub args: Vec<String>,
    /// Whether the stage reads from its standard input
    pub stdin: bool,
}

impl ProcessSpec {
    pub fn new(kind: StageKind, program: impl Into<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
            stdin: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_stdin(mut self) -> Self {
        self.stdin = true;
        self
    }
}

/// Starts media processes
///
/// Must be called from within a tokio runtime; implementations spawn the
/// tasks that supervise the process.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &ProcessSpec) -> Result<MediaProcess, ProcessError>;
}
