//! Error types for the radio relay

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on the paced output path
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Sink closed")]
    SinkClosed,
}

/// External media process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{stage} stage has no {pipe} pipe")]
    MissingPipe {
        stage: &'static str,
        pipe: &'static str,
    },
}

/// Track library errors
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("No tracks found in {0}")]
    NoTracksFound(PathBuf),

    #[error("Failed to read library {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Voice interjection errors, reported to the caller of a trigger
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("No message provided")]
    EmptyMessage,

    #[error("Invalid voice profile: {0}")]
    InvalidVoice(String),

    #[error("A voice interjection is already playing")]
    AlreadyActive,

    #[error("Voice stage failed to start: {0}")]
    Spawn(#[from] ProcessError),

    #[error("Pipeline is not running")]
    PipelineStopped,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
