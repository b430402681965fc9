//! Application configuration
//!
//! Every section has sensible defaults so an empty TOML file (or no file at
//! all) yields a working station. Values are validated once at load time.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub broadcast: BroadcastConfig,
    pub pipeline: PipelineConfig,
    pub library: LibraryConfig,
}

impl AppConfig {
    /// Default location of the config file for this user
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "radio-relay", "radio-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default path if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reject values that would disable pacing or replay bounds
    pub fn validate(&self) -> Result<()> {
        if self.stream.bitrate == 0 {
            return Err(Error::Config("stream.bitrate must be greater than zero".into()));
        }
        if self.stream.bytes_per_second() == 0 {
            return Err(Error::Config("stream.bitrate is below one byte per second".into()));
        }
        if self.stream.max_chunk_bytes == Some(0) {
            return Err(Error::Config("stream.max_chunk_bytes must be greater than zero".into()));
        }
        if self.broadcast.replay_capacity == 0 {
            return Err(Error::Config("broadcast.replay_capacity must be greater than zero".into()));
        }
        if self.library.extensions.is_empty() {
            return Err(Error::Config("library.extensions must not be empty".into()));
        }
        Ok(())
    }
}

/// HTTP front end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Static player page and assets
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            public_dir: PathBuf::from("./public"),
        }
    }
}

/// Output pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Nominal stream bitrate in bits per second
    pub bitrate: u32,
    /// Largest sub-chunk the throttle releases at once.
    /// Defaults to a tenth of a second of audio.
    pub max_chunk_bytes: Option<usize>,
    /// Write per-chunk timing as JSON here when the stream ends
    pub monitor_path: Option<PathBuf>,
}

impl StreamConfig {
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.bitrate) / 8
    }

    pub fn chunk_size(&self) -> usize {
        self.max_chunk_bytes
            .unwrap_or_else(|| (self.bytes_per_second() / 10).max(1) as usize)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            max_chunk_bytes: None,
            monitor_path: None,
        }
    }
}

/// Fan-out hub
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Chunks kept for late joiners
    pub replay_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

/// How voice interjections are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    /// Text-to-speech through the synthesizer
    Synthesis,
    /// A pre-recorded bumper clip regardless of the message
    Clip,
}

/// Sidechain compressor applied to the track under voice
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    pub threshold: f32,
    pub ratio: f32,
    pub attack_ms: u32,
    pub release_ms: u32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            ratio: 4.0,
            attack_ms: 20,
            release_ms: 300,
        }
    }
}

/// Media pipeline supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between a filter stage closing and the next start
    pub restart_backoff_ms: u64,
    pub voice_mode: VoiceMode,
    pub ffmpeg_path: String,
    pub piper_path: String,
    pub models_dir: PathBuf,
    pub default_voice: String,
    pub silence_file: PathBuf,
    pub clip_file: PathBuf,
    pub ducking: DuckingConfig,
}

impl PipelineConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            restart_backoff_ms: DEFAULT_RESTART_BACKOFF_MS,
            voice_mode: VoiceMode::Clip,
            ffmpeg_path: "ffmpeg".to_string(),
            piper_path: "piper".to_string(),
            models_dir: PathBuf::from("models"),
            default_voice: "kristin".to_string(),
            silence_file: PathBuf::from("./lib/silence.mp3"),
            clip_file: PathBuf::from("./lib/bumper.mp3"),
            ducking: DuckingConfig::default(),
        }
    }
}

/// Track library
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub folder: PathBuf,
    /// File extensions eligible for playback, without the dot
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("./library"),
            extensions: vec!["mp3".to_string()],
        }
    }
}
