//! A running stage and the tasks that move its bytes
//!
//! Pump tasks own the pipe handles. Aborting them is how a stage's I/O is
//! closed before the process itself is killed.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::pipeline::orchestrator::Event;
use crate::process::{MediaProcess, ProcessExit, ProcessInput, ProcessOutput, StageKind};

const READ_CHUNK: usize = 16 * 1024;

/// Identifies one launch of one process
pub type StageId = u64;

/// A launched process plus its pump tasks
pub struct Stage {
    id: StageId,
    process: MediaProcess,
    tasks: Vec<JoinHandle<()>>,
}

impl Stage {
    pub fn new(id: StageId, process: MediaProcess) -> Self {
        Self {
            id,
            process,
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn kind(&self) -> StageKind {
        self.process.kind()
    }

    pub fn process_mut(&mut self) -> &mut MediaProcess {
        &mut self.process
    }

    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn is_killed(&self) -> bool {
        self.process.is_killed()
    }

    /// Close the stage's I/O and kill it. Idempotent.
    pub fn terminate(&mut self) {
        if self.process.is_killed() {
            return;
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.process.kill();
        tracing::debug!("Killed {} stage #{}", self.kind(), self.id);
    }

    /// Kill a stage that already exited but let its pumps finish draining
    ///
    /// Returns the pump tasks; they end once the remaining output is through.
    pub fn retire(mut self) -> Vec<JoinHandle<()>> {
        let tasks = std::mem::take(&mut self.tasks);
        self.process.kill();
        tasks
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Forward a filler's output to the orchestrator
pub fn pump_filler(
    id: StageId,
    kind: StageKind,
    mut stdout: ProcessOutput,
    events: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buf.reserve(READ_CHUNK);
            match stdout.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = buf.split().freeze();
                    if events.send(Event::FillerData { stage: id, chunk }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("[{}] Output error: {}", kind, e);
                    break;
                }
            }
        }
        tracing::debug!("[{}] Output ended", kind);
        let _ = events.send(Event::FillerEnded { stage: id });
    })
}

/// Forward the filter's output towards the throttle
pub fn pump_output(
    kind: StageKind,
    mut stdout: ProcessOutput,
    output: mpsc::Sender<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buf.reserve(READ_CHUNK);
            match stdout.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if output.send(buf.split().freeze()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("[{}] Output error: {}", kind, e);
                    break;
                }
            }
        }
        tracing::debug!("[{}] Output ended", kind);
    })
}

/// Write queued chunks into a stage's input
pub fn feed_input(
    kind: StageKind,
    mut stdin: ProcessInput,
    mut chunks: mpsc::UnboundedReceiver<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = chunks.recv().await {
            if let Err(e) = stdin.write_all(&chunk).await {
                tracing::warn!("[{}] Pipe error: {}", kind, e);
                return;
            }
        }
        let _ = stdin.shutdown().await;
    })
}

/// Connect one stage's output straight to another's input
pub fn connect(from: StageKind, mut stdout: ProcessOutput, mut stdin: ProcessInput) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut stdout, &mut stdin).await {
            tracing::warn!("[{}] Pipe error: {}", from, e);
        }
        let _ = stdin.shutdown().await;
    })
}

/// Write `text` followed by a newline, then close the input
pub fn write_text(kind: StageKind, mut stdin: ProcessInput, text: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut line = text.into_bytes();
        line.push(b'\n');
        if let Err(e) = stdin.write_all(&line).await {
            tracing::warn!("[{}] Failed to write input: {}", kind, e);
        }
        let _ = stdin.shutdown().await;
    })
}

/// Report the process's end to the orchestrator
///
/// Not attached to the stage: the exit must be reported even after the
/// stage's pumps were aborted by a kill.
pub fn watch_exit(
    id: StageId,
    kind: StageKind,
    exit: oneshot::Receiver<ProcessExit>,
    events: mpsc::UnboundedSender<Event>,
) {
    tokio::spawn(async move {
        let exit = exit.await.unwrap_or(ProcessExit {
            code: None,
            killed: false,
        });
        let _ = events.send(Event::StageExited {
            stage: id,
            kind,
            exit,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessLauncher, ProcessSpec, ScriptedLauncher};

    #[tokio::test]
    async fn test_pump_filler_reports_end() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"ab").await.unwrap();
        drop(writer);

        let (events_tx, mut events) = mpsc::unbounded_channel();
        pump_filler(7, StageKind::Silence, Box::new(reader), events_tx)
            .await
            .unwrap();

        match events.recv().await {
            Some(Event::FillerData { stage: 7, chunk }) => assert_eq!(chunk.as_ref(), b"ab"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events.recv().await,
            Some(Event::FillerEnded { stage: 7 })
        ));
    }

    #[tokio::test]
    async fn test_retire_drains_output() {
        let (launcher, mut log) = ScriptedLauncher::new();
        let spec = ProcessSpec::new(StageKind::Filter, "ffmpeg");
        let mut stage = Stage::new(1, launcher.launch(&spec).unwrap());
        let mut script = log.next().await.unwrap();

        let (output_tx, mut output) = mpsc::channel(4);
        let stdout = stage.process_mut().take_stdout().unwrap();
        stage.attach(pump_output(StageKind::Filter, stdout, output_tx));

        script.emit(b"tail").await.unwrap();
        script.exit(0);
        let pumps = stage.retire();
        assert_eq!(pumps.len(), 1);
        for pump in pumps {
            pump.await.unwrap();
        }

        // Everything is queued by the time the pumps finish.
        assert_eq!(output.try_recv().unwrap().as_ref(), b"tail");
        assert!(output.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_terminate_kills_once() {
        let (launcher, mut log) = ScriptedLauncher::new();
        let spec = ProcessSpec::new(StageKind::Silence, "ffmpeg");
        let mut stage = Stage::new(2, launcher.launch(&spec).unwrap());
        let script = log.next().await.unwrap();

        stage.terminate();
        stage.terminate();
        assert!(stage.is_killed());
        script.wait_killed().await;
    }

    #[tokio::test]
    async fn test_write_text_appends_newline() {
        let (writer, mut reader) = tokio::io::duplex(64);
        write_text(StageKind::Synthesizer, Box::new(writer), "hello".to_string())
            .await
            .unwrap();

        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "hello\n");
    }
}
