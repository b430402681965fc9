//! Pipeline supervisor
//!
//! A single task owns every stage, the passthrough and the restart policy.
//! It reacts to two queues: commands from [`Radio`](crate::pipeline::Radio)
//! handles and events from its own helper tasks (output pumps, exit
//! watchers, backoff timers). Because filler audio is routed through this
//! task too, deciding which filler may write to the passthrough is a plain
//! read-then-act on state nobody else touches.
//!
//! ```text
//!             trigger_voice          voice closes
//!  STREAMING ───────────────► VOICE_ACTIVE ──────────► STREAMING
//!      ▲                                                   │
//!      │ start()                       filter closes / next()
//!      │                                                   ▼
//!  STARTING ◄─────────── backoff ────────────────── RESTARTING
//! ```

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, VoiceMode};
use crate::error::{Error, ProcessError, VoiceError};
use crate::library::{Track, TrackSelector};
use crate::pipeline::passthrough::Passthrough;
use crate::pipeline::stage::{self, Stage, StageId};
use crate::pipeline::state::{Phase, RadioStatus};
use crate::process::commands::validate_voice;
use crate::process::{ProcessExit, ProcessLauncher, ProcessSpec, StageCommands, StageKind};

/// How long shutdown waits for the output task to flush
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a restart waits for a retired filter's remaining output
const RETIRED_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests from the serving layer
pub enum Command {
    TriggerVoice {
        message: String,
        voice: Option<String>,
        reply: oneshot::Sender<Result<(), VoiceError>>,
    },
    Next,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Notifications from the orchestrator's helper tasks
#[derive(Debug)]
pub enum Event {
    /// Output of a silence or voice stage
    FillerData { stage: StageId, chunk: Bytes },
    /// A filler's output reached end of stream
    FillerEnded { stage: StageId },
    StageExited {
        stage: StageId,
        kind: StageKind,
        exit: ProcessExit,
    },
    RestartDue { generation: u64 },
    SilenceDue { generation: u64 },
}

/// One interjection, from trigger to close
struct VoiceCycle {
    /// Stage whose output goes to the passthrough (clip or encoder)
    stage: Stage,
    /// Text-to-speech feeding `stage`, in synthesis mode
    synthesizer: Option<Stage>,
    /// Set by the first audio chunk; silence is killed at most once per cycle
    audible: bool,
    bytes: u64,
}

impl VoiceCycle {
    fn terminate(&mut self) {
        self.stage.terminate();
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.terminate();
        }
    }
}

pub struct Orchestrator {
    commands: StageCommands,
    voice_mode: VoiceMode,
    backoff: Duration,
    launcher: Arc<dyn ProcessLauncher>,
    library: Arc<dyn TrackSelector>,
    output: Option<mpsc::Sender<Bytes>>,
    output_task: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<Event>,
    status: Arc<RwLock<RadioStatus>>,

    next_stage_id: StageId,
    /// Bumped by every cleanup so stale timers are ignored
    generation: u64,
    phase: Phase,
    shutting_down: bool,
    current_track: Option<Track>,
    passthrough: Option<Passthrough>,
    filter: Option<Stage>,
    silence: Option<Stage>,
    voice: Option<VoiceCycle>,
    starts: u64,
    restarts: u64,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        launcher: Arc<dyn ProcessLauncher>,
        library: Arc<dyn TrackSelector>,
        output: mpsc::Sender<Bytes>,
        output_task: JoinHandle<()>,
        events_tx: mpsc::UnboundedSender<Event>,
        status: Arc<RwLock<RadioStatus>>,
    ) -> Self {
        Self {
            commands: StageCommands::new(config.pipeline.clone(), config.stream.bitrate),
            voice_mode: config.pipeline.voice_mode,
            backoff: config.pipeline.restart_backoff(),
            launcher,
            library,
            output: Some(output),
            output_task: Some(output_task),
            events_tx,
            status,
            next_stage_id: 0,
            generation: 0,
            phase: Phase::Starting,
            shutting_down: false,
            current_track: None,
            passthrough: None,
            filter: None,
            silence: None,
            voice: None,
            starts: 0,
            restarts: 0,
        }
    }

    /// Start the pipeline and serve commands until shutdown
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.start();

        let reply = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.handle_command(command),
                    // Every handle is gone; nobody can listen anymore.
                    None => break None,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        };

        self.shutdown();
        if let Some(task) = self.output_task.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Output did not drain within {:?}", OUTPUT_DRAIN_TIMEOUT);
            }
        }
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::TriggerVoice {
                message,
                voice,
                reply,
            } => {
                let result = self.trigger_voice(&message, voice.as_deref());
                if let Err(e) = &result {
                    tracing::warn!("Voice trigger rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Next => self.next(),
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::FillerData { stage, chunk } => self.on_filler_data(stage, chunk),
            Event::FillerEnded { stage } => self.on_filler_ended(stage),
            Event::StageExited { stage, kind, exit } => self.on_stage_exited(stage, kind, exit),
            Event::RestartDue { generation } => {
                if generation == self.generation && !self.shutting_down {
                    self.start();
                }
            }
            Event::SilenceDue { generation } => {
                if generation == self.generation && !self.shutting_down {
                    self.respawn_silence();
                }
            }
        }
    }

    // ---- lifecycle -------------------------------------------------------

    fn start(&mut self) {
        if self.shutting_down {
            return;
        }

        self.set_phase(Phase::Starting);
        match self.try_start() {
            Ok(track) => {
                tracing::info!("Now playing: {}", track.name);
                self.current_track = Some(track);
                self.starts += 1;
                self.set_phase(Phase::Streaming);
            }
            Err(e) => {
                tracing::warn!("Start error: {}", e);
                self.restart_after_backoff(Vec::new());
            }
        }
    }

    fn try_start(&mut self) -> Result<Track, Error> {
        let track = self.library.select_random_track()?;
        let output = self
            .output
            .clone()
            .ok_or(Error::Stream(crate::error::StreamError::SinkClosed))?;

        let spec = self.commands.filter(&track.path);
        let mut filter = self.launch(&spec)?;
        let stdin = filter.process_mut().take_stdin()?;
        let stdout = filter.process_mut().take_stdout()?;
        filter.attach(stage::pump_output(StageKind::Filter, stdout, output));

        self.passthrough = Some(Passthrough::new(StageKind::Filter, stdin));
        self.filter = Some(filter);

        // An interjection that already silenced the filler keeps the bus.
        if !self.voice_audible() {
            self.start_silence()?;
        }

        Ok(track)
    }

    /// Tear the current pipeline down and try again after the backoff
    ///
    /// `draining` are the pumps of a retired filter. The next start waits for
    /// them so its output cannot overtake the old track's tail.
    fn restart_after_backoff(&mut self, draining: Vec<JoinHandle<()>>) {
        self.cleanup();
        if self.shutting_down {
            for pump in draining {
                pump.abort();
            }
            return;
        }

        self.set_phase(Phase::Restarting);
        let generation = self.generation;
        let events = self.events_tx.clone();
        let due = tokio::time::Instant::now() + self.backoff;
        tokio::spawn(async move {
            for mut pump in draining {
                if tokio::time::timeout(RETIRED_DRAIN_TIMEOUT, &mut pump).await.is_err() {
                    tracing::warn!("Retired filter output did not drain within {:?}", RETIRED_DRAIN_TIMEOUT);
                    pump.abort();
                }
            }
            tokio::time::sleep_until(due).await;
            let _ = events.send(Event::RestartDue { generation });
        });
    }

    /// Destroy the passthrough and kill the filter and silence stages
    ///
    /// The hub, its listeners and an active interjection survive.
    fn cleanup(&mut self) {
        self.generation += 1;

        if let Some(passthrough) = self.passthrough.take() {
            passthrough.destroy();
        }
        if let Some(mut silence) = self.silence.take() {
            silence.terminate();
        }
        if let Some(mut filter) = self.filter.take() {
            filter.terminate();
        }
        self.current_track = None;
    }

    fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }

        tracing::info!("Stopping radio...");
        self.shutting_down = true;
        self.cleanup();
        if let Some(mut voice) = self.voice.take() {
            voice.terminate();
        }
        // Last sender gone: the output task drains and exits.
        self.output = None;
        self.set_phase(Phase::Stopped);
    }

    fn next(&mut self) {
        match self.filter.as_mut() {
            Some(filter) if !filter.is_killed() => {
                if let Some(track) = &self.current_track {
                    tracing::info!("Skipping {}", track.name);
                }
                // The exit event drives the usual restart.
                filter.terminate();
            }
            _ => tracing::debug!("Next requested with no live filter stage"),
        }
    }

    // ---- stages ----------------------------------------------------------

    fn launch(&mut self, spec: &ProcessSpec) -> Result<Stage, ProcessError> {
        let mut process = self.launcher.launch(spec)?;

        self.next_stage_id += 1;
        let id = self.next_stage_id;
        if let Some(exit) = process.take_exit() {
            stage::watch_exit(id, spec.kind, exit, self.events_tx.clone());
        }

        tracing::debug!("Started {} stage #{} (pid {:?})", spec.kind, id, process.pid());
        Ok(Stage::new(id, process))
    }

    /// Launch a filler whose output is routed through this task
    fn launch_filler(&mut self, spec: &ProcessSpec) -> Result<Stage, ProcessError> {
        let mut filler = self.launch(spec)?;
        let stdout = filler.process_mut().take_stdout()?;
        filler.attach(stage::pump_filler(
            filler.id(),
            spec.kind,
            stdout,
            self.events_tx.clone(),
        ));
        Ok(filler)
    }

    fn start_silence(&mut self) -> Result<(), ProcessError> {
        let spec = self.commands.silence();
        let silence = self.launch_filler(&spec)?;
        self.silence = Some(silence);
        Ok(())
    }

    fn respawn_silence(&mut self) {
        if self.passthrough.is_none() || self.silence.is_some() || self.voice_audible() {
            return;
        }

        if let Err(e) = self.start_silence() {
            tracing::warn!("Failed to start silence: {}", e);
            self.silence_after_backoff();
        }
    }

    fn silence_after_backoff(&self) {
        let generation = self.generation;
        let events = self.events_tx.clone();
        let delay = self.backoff;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::SilenceDue { generation });
        });
    }

    fn voice_audible(&self) -> bool {
        self.voice.as_ref().is_some_and(|voice| voice.audible)
    }

    // ---- voice -----------------------------------------------------------

    fn trigger_voice(&mut self, message: &str, voice: Option<&str>) -> Result<(), VoiceError> {
        if self.shutting_down {
            return Err(VoiceError::PipelineStopped);
        }

        let message = message.trim();
        if message.is_empty() {
            return Err(VoiceError::EmptyMessage);
        }
        let voice = voice
            .map(str::to_string)
            .unwrap_or_else(|| self.commands.default_voice().to_string());
        validate_voice(&voice)?;
        if self.voice.is_some() {
            return Err(VoiceError::AlreadyActive);
        }

        tracing::info!("Triggering voice process...");
        let cycle = match self.voice_mode {
            VoiceMode::Synthesis => self.launch_synthesis(message, &voice)?,
            VoiceMode::Clip => {
                let spec = self.commands.clip();
                VoiceCycle {
                    stage: self.launch_filler(&spec)?,
                    synthesizer: None,
                    audible: false,
                    bytes: 0,
                }
            }
        };

        self.voice = Some(cycle);
        self.publish();
        Ok(())
    }

    fn launch_synthesis(&mut self, message: &str, voice: &str) -> Result<VoiceCycle, VoiceError> {
        tracing::info!("Starting piper process, message: {}", message);
        let synthesizer_spec = self.commands.synthesizer(voice)?;
        let encoder_spec = self.commands.voice_encoder();

        // Dropping a half-built stage kills it, so `?` cleans up.
        let mut synthesizer = self.launch(&synthesizer_spec)?;
        let mut encoder = self.launch_filler(&encoder_spec)?;

        let text_in = synthesizer.process_mut().take_stdin()?;
        let pcm_out = synthesizer.process_mut().take_stdout()?;
        let pcm_in = encoder.process_mut().take_stdin()?;
        synthesizer.attach(stage::write_text(
            StageKind::Synthesizer,
            text_in,
            message.to_string(),
        ));
        synthesizer.attach(stage::connect(StageKind::Synthesizer, pcm_out, pcm_in));

        Ok(VoiceCycle {
            stage: encoder,
            synthesizer: Some(synthesizer),
            audible: false,
            bytes: 0,
        })
    }

    fn finish_voice(&mut self) {
        let Some(mut voice) = self.voice.take() else {
            return;
        };
        tracing::info!("Voice finished after {} bytes", voice.bytes);
        voice.terminate();

        self.respawn_silence();
        self.publish();
    }

    // ---- events ----------------------------------------------------------

    fn on_filler_data(&mut self, stage: StageId, chunk: Bytes) {
        if self.silence.as_ref().is_some_and(|s| s.id() == stage) {
            self.write_passthrough(chunk);
            return;
        }

        match self.voice.as_mut() {
            Some(voice) if voice.stage.id() == stage => {
                if !voice.audible {
                    voice.audible = true;
                    if let Some(mut silence) = self.silence.take() {
                        tracing::debug!("Voice audio started, stopping silence");
                        silence.terminate();
                    }
                }
                voice.bytes += chunk.len() as u64;
                self.write_passthrough(chunk);
            }
            // Queued before its stage was killed.
            _ => tracing::trace!("Dropping {} bytes from retired stage #{}", chunk.len(), stage),
        }
    }

    fn on_filler_ended(&mut self, stage: StageId) {
        if self.voice.as_ref().is_some_and(|v| v.stage.id() == stage) {
            self.finish_voice();
        }
    }

    fn on_stage_exited(&mut self, stage: StageId, kind: StageKind, exit: ProcessExit) {
        if self.filter.as_ref().is_some_and(|f| f.id() == stage) {
            if exit.killed || exit.success() {
                tracing::info!("Filter process closed with {}", exit);
            } else {
                tracing::warn!("Filter process exited with {}", exit);
            }
            self.restarts += 1;
            // Let the remaining output drain into the stream.
            let draining = self.filter.take().map(Stage::retire).unwrap_or_default();
            self.restart_after_backoff(draining);
            return;
        }

        if self.silence.as_ref().is_some_and(|s| s.id() == stage) {
            tracing::warn!("Silence process exited with {}", exit);
            self.silence = None;
            self.silence_after_backoff();
            return;
        }

        if let Some(voice) = &self.voice {
            if voice.stage.id() == stage {
                // The cycle ends with its output, once every chunk is through.
                tracing::info!("Voice process closed with {}", exit);
                return;
            }
            if voice.synthesizer.as_ref().is_some_and(|s| s.id() == stage) {
                if !exit.success() {
                    tracing::warn!("Piper process exited with {}", exit);
                }
                return;
            }
        }

        tracing::debug!("Retired {} stage #{} exited with {}", kind, stage, exit);
    }

    fn write_passthrough(&mut self, chunk: Bytes) {
        match self.passthrough.as_mut() {
            Some(passthrough) => {
                if !passthrough.write(chunk) {
                    tracing::debug!("Passthrough feeder gone");
                }
            }
            None => tracing::trace!("No passthrough, dropping {} bytes", chunk.len()),
        }
    }

    // ---- status ----------------------------------------------------------

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        let voice_active = self.voice.is_some();
        let phase = match self.phase {
            Phase::Stopped => Phase::Stopped,
            _ if voice_active => Phase::VoiceActive,
            phase => phase,
        };

        *self.status.write() = RadioStatus {
            phase,
            current_track: self.current_track.as_ref().map(|t| t.name.clone()),
            voice_active,
            starts: self.starts,
            restarts: self.restarts,
        };
    }
}
