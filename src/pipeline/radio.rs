//! Handle to a running station

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::{BroadcastHub, SubscriberId, Subscription};
use crate::config::AppConfig;
use crate::error::{LibraryError, VoiceError};
use crate::library::{Track, TrackSelector};
use crate::pipeline::orchestrator::{Command, Orchestrator};
use crate::pipeline::state::{Phase, RadioStatus};
use crate::process::ProcessLauncher;
use crate::stream::{spawn_output, ChunkMonitor, OutputSink, Throttle};

/// Filter output chunks buffered ahead of the throttle
const OUTPUT_QUEUE: usize = 64;

/// Cheap, cloneable front end to the orchestrator
///
/// Listener operations go straight to the hub; pipeline operations are
/// queued to the orchestrator task.
#[derive(Clone)]
pub struct Radio {
    commands: mpsc::UnboundedSender<Command>,
    hub: BroadcastHub,
    status: Arc<RwLock<RadioStatus>>,
    library: Arc<dyn TrackSelector>,
}

impl Radio {
    /// Build the output path and start the pipeline
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        config: &AppConfig,
        launcher: Arc<dyn ProcessLauncher>,
        library: Arc<dyn TrackSelector>,
    ) -> Self {
        let hub = BroadcastHub::new(config.broadcast.replay_capacity);
        let throttle = Throttle::new(config.stream.bytes_per_second(), config.stream.chunk_size());
        let monitor = config.stream.monitor_path.clone().map(ChunkMonitor::new);

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE);
        let output_task = spawn_output(output_rx, throttle, OutputSink::new(hub.clone(), monitor));

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(RadioStatus::default()));

        let orchestrator = Orchestrator::new(
            config,
            launcher,
            library.clone(),
            output_tx,
            output_task,
            events_tx,
            status.clone(),
        );
        tokio::spawn(orchestrator.run(commands_rx, events_rx));

        tracing::info!(
            "Radio started at {} kbit/s, voice mode {:?}",
            config.stream.bitrate / 1024,
            config.pipeline.voice_mode
        );

        Self {
            commands,
            hub,
            status,
            library,
        }
    }

    /// Attach a listener to the live stream
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.hub.unsubscribe(id);
    }

    pub fn listeners(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Name of the track being played, if a filter stage is live
    pub fn current_track(&self) -> Option<String> {
        self.status.read().current_track.clone()
    }

    pub fn status(&self) -> RadioStatus {
        self.status.read().clone()
    }

    pub fn phase(&self) -> Phase {
        self.status.read().phase
    }

    /// Interrupt the filler with a voice interjection
    ///
    /// `voice` selects the synthesis profile; `None` uses the configured
    /// default.
    pub async fn trigger_voice(
        &self,
        message: impl Into<String>,
        voice: Option<String>,
    ) -> Result<(), VoiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::TriggerVoice {
                message: message.into(),
                voice,
                reply,
            })
            .map_err(|_| VoiceError::PipelineStopped)?;
        response.await.map_err(|_| VoiceError::PipelineStopped)?
    }

    /// Skip to another track
    pub fn next(&self) {
        if self.commands.send(Command::Next).is_err() {
            tracing::debug!("Next requested after shutdown");
        }
    }

    /// Stop every stage and close the output. Listeners stay attached to
    /// the hub but receive nothing further.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn tracks(&self) -> Result<Vec<Track>, LibraryError> {
        self.library.tracks()
    }
}
