//! Command lines of the pipeline stages

use std::path::Path;

use crate::config::PipelineConfig;
use crate::error::VoiceError;
use crate::process::{ProcessSpec, StageKind};

/// Builds the fixed argument list of each stage from configuration
#[derive(Debug, Clone)]
pub struct StageCommands {
    config: PipelineConfig,
    /// Encoder bitrate of the mixed stream in bits per second
    bitrate: u32,
}

impl StageCommands {
    pub fn new(config: PipelineConfig, bitrate: u32) -> Self {
        Self { config, bitrate }
    }

    /// Mix the track with the passthrough (stdin), ducking the track under
    /// whatever the passthrough carries
    pub fn filter(&self, track: &Path) -> ProcessSpec {
        let ducking = &self.config.ducking;
        let filter_graph = format!(
            "[0:a]asplit=2[vocals_for_sidechain][vocals_for_mix];\
             [1:a][vocals_for_sidechain]sidechaincompress=threshold={}:ratio={}:attack={}:release={}[compressed_main];\
             [compressed_main][vocals_for_mix]amix=inputs=2:duration=shortest[mix]",
            ducking.threshold, ducking.ratio, ducking.attack_ms, ducking.release_ms
        );

        ProcessSpec::new(StageKind::Filter, &self.config.ffmpeg_path)
            .args(["-y", "-loglevel", "error", "-re", "-f", "mp3", "-i", "pipe:0", "-f", "mp3", "-re", "-i"])
            .arg(track.to_string_lossy())
            .arg("-filter_complex")
            .arg(filter_graph)
            .args(["-map", "[mix]", "-ac", "2", "-b:a"])
            .arg(format!("{}k", self.bitrate / 1024))
            .args(["-ar", "48000", "-preset", "ultrafast", "-tune", "zerolatency", "-f", "mp3", "pipe:1"])
            .with_stdin()
    }

    /// Endless silence at real-time speed
    pub fn silence(&self) -> ProcessSpec {
        ProcessSpec::new(StageKind::Silence, &self.config.ffmpeg_path)
            .args(["-loglevel", "error", "-re", "-stream_loop", "-1", "-i"])
            .arg(self.config.silence_file.to_string_lossy())
            .args(["-f", "mp3", "-ar", "44100", "-ac", "2", "-preset", "ultrafast", "pipe:1"])
    }

    /// Pre-recorded bumper played instead of synthesis
    pub fn clip(&self) -> ProcessSpec {
        ProcessSpec::new(StageKind::Clip, &self.config.ffmpeg_path)
            .args(["-loglevel", "error", "-i"])
            .arg(self.config.clip_file.to_string_lossy())
            .args(["-f", "mp3", "-ar", "44100", "-ac", "2", "-preset", "ultrafast", "pipe:1"])
    }

    /// Text-to-speech reading the message from stdin, raw PCM on stdout
    pub fn synthesizer(&self, voice: &str) -> Result<ProcessSpec, VoiceError> {
        validate_voice(voice)?;
        let model = self.config.models_dir.join(format!("{}.onnx", voice));

        Ok(ProcessSpec::new(StageKind::Synthesizer, &self.config.piper_path)
            .arg("--model")
            .arg(model.to_string_lossy())
            .arg("--output_raw")
            .with_stdin())
    }

    /// 22.05 kHz mono PCM in, stream-compatible mp3 out
    pub fn voice_encoder(&self) -> ProcessSpec {
        ProcessSpec::new(StageKind::VoiceEncoder, &self.config.ffmpeg_path)
            .args([
                "-loglevel", "error", "-f", "s16le", "-ar", "22050", "-ac", "1", "-i", "pipe:0", "-f",
                "mp3", "-ar", "44100", "-ac", "2", "pipe:1",
            ])
            .with_stdin()
    }

    /// Voice used when a trigger names none
    pub fn default_voice(&self) -> &str {
        &self.config.default_voice
    }
}

/// Voice profiles name model files; keep them to a safe file stem
pub fn validate_voice(voice: &str) -> Result<(), VoiceError> {
    let valid = !voice.is_empty()
        && voice.len() <= 64
        && voice
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(VoiceError::InvalidVoice(voice.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_BITRATE;

    fn commands() -> StageCommands {
        StageCommands::new(PipelineConfig::default(), DEFAULT_BITRATE)
    }

    fn encoder_bitrate(spec: &ProcessSpec) -> &str {
        let flag = spec.args.iter().position(|a| a == "-b:a").unwrap();
        &spec.args[flag + 1]
    }

    #[test]
    fn test_filter_reads_passthrough_and_track() {
        let spec = commands().filter(Path::new("/music/song.mp3"));
        assert_eq!(spec.kind, StageKind::Filter);
        assert!(spec.stdin);
        assert_eq!(spec.program, "ffmpeg");

        let input = spec.args.iter().position(|a| a == "pipe:0").unwrap();
        let track = spec.args.iter().position(|a| a == "/music/song.mp3").unwrap();
        assert!(input < track);
        assert_eq!(spec.args.last().map(String::as_str), Some("pipe:1"));

        let graph = spec
            .args
            .iter()
            .find(|a| a.contains("sidechaincompress"))
            .unwrap();
        assert!(graph.contains("threshold=0.02:ratio=4:attack=20:release=300"));
    }

    #[test]
    fn test_filter_encodes_at_stream_bitrate() {
        let track = Path::new("/music/song.mp3");
        assert_eq!(encoder_bitrate(&commands().filter(track)), "196k");

        let low = StageCommands::new(PipelineConfig::default(), 128 * 1024);
        assert_eq!(encoder_bitrate(&low.filter(track)), "128k");
    }

    #[test]
    fn test_fillers_write_stdout_only() {
        let commands = commands();
        for spec in [commands.silence(), commands.clip()] {
            assert!(!spec.stdin);
            assert_eq!(spec.args.last().map(String::as_str), Some("pipe:1"));
        }
        assert!(commands.silence().args.iter().any(|a| a == "-stream_loop"));
    }

    #[test]
    fn test_synthesizer_model_path() {
        let spec = commands().synthesizer("kristin").unwrap();
        assert_eq!(spec.kind, StageKind::Synthesizer);
        assert!(spec.stdin);
        let model = Path::new("models").join("kristin.onnx");
        assert!(spec.args.contains(&model.to_string_lossy().into_owned()));
        assert!(spec.args.iter().any(|a| a == "--output_raw"));
    }

    #[test]
    fn test_voice_names_are_validated() {
        assert!(validate_voice("en_US-amy-medium").is_ok());
        for bad in ["", "../etc/passwd", "a b", "voice;rm", "x/y"] {
            assert!(matches!(validate_voice(bad), Err(VoiceError::InvalidVoice(_))), "{}", bad);
        }
        assert!(commands().synthesizer("../secret").is_err());
    }
}
