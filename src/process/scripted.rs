//! In-memory media processes
//!
//! Each launch hands the orchestrator a [`MediaProcess`] backed by duplex
//! pipes, and hands the test the other ends as a [`ScriptedProcess`]: it can
//! emit output, read what the stage received, make it exit, and observe
//! kills. Useful for exercising pipeline supervision without `ffmpeg`.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::ProcessError;
use crate::process::{
    MediaProcess, ProcessExit, ProcessInput, ProcessLauncher, ProcessOutput, ProcessSpec,
    StageKind,
};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct ScriptState {
    failing: HashSet<StageKind>,
    launches: HashMap<StageKind, usize>,
}

/// Launcher producing scripted processes
#[derive(Clone)]
pub struct ScriptedLauncher {
    state: Arc<Mutex<ScriptState>>,
    launched_tx: mpsc::UnboundedSender<ScriptedProcess>,
}

impl ScriptedLauncher {
    /// Create a launcher and the log that receives every launched process
    pub fn new() -> (Self, LaunchLog) {
        let (launched_tx, launched_rx) = mpsc::unbounded_channel();
        let launcher = Self {
            state: Arc::new(Mutex::new(ScriptState::default())),
            launched_tx,
        };
        (launcher, LaunchLog { launched_rx })
    }

    /// Make every launch of `kind` fail to spawn until cleared
    pub fn fail(&self, kind: StageKind) {
        self.state.lock().failing.insert(kind);
    }

    pub fn clear_failure(&self, kind: StageKind) {
        self.state.lock().failing.remove(&kind);
    }

    /// Successful launches of `kind` so far
    pub fn launches(&self, kind: StageKind) -> usize {
        self.state.lock().launches.get(&kind).copied().unwrap_or(0)
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(&self, spec: &ProcessSpec) -> Result<MediaProcess, ProcessError> {
        {
            let mut state = self.state.lock();
            if state.failing.contains(&spec.kind) {
                return Err(ProcessError::Spawn {
                    program: spec.program.clone(),
                    reason: "scripted spawn failure".to_string(),
                });
            }
            *state.launches.entry(spec.kind).or_default() += 1;
        }

        let (stdout_reader, stdout_writer) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdin_writer, stdin_reader) = if spec.stdin {
            let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
            (Some(Box::new(writer) as ProcessInput), Some(reader))
        } else {
            (None, None)
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (code_tx, code_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(Notify::new());

        tokio::spawn(supervise(kill_rx, code_rx, exit_tx, killed.clone(), exited.clone()));

        let process = MediaProcess::new(
            spec.kind,
            None,
            stdin_writer,
            Some(Box::new(stdout_reader) as ProcessOutput),
            kill_tx,
            exit_rx,
        );

        let handle = ScriptedProcess {
            spec: spec.clone(),
            stdin: stdin_reader,
            stdout: Some(stdout_writer),
            code_tx: Some(code_tx),
            killed,
            exited,
        };
        let _ = self.launched_tx.send(handle);

        Ok(process)
    }
}

async fn supervise(
    kill_rx: oneshot::Receiver<()>,
    code_rx: oneshot::Receiver<i32>,
    exit_tx: oneshot::Sender<ProcessExit>,
    killed: Arc<AtomicBool>,
    exited: Arc<Notify>,
) {
    let exit = tokio::select! {
        _ = kill_rx => {
            killed.store(true, Ordering::SeqCst);
            ProcessExit { code: None, killed: true }
        }
        code = async {
            match code_rx.await {
                Ok(code) => code,
                // The test dropped its handle; only a kill ends us now.
                Err(_) => std::future::pending().await,
            }
        } => ProcessExit { code: Some(code), killed: false },
    };

    exited.notify_waiters();
    let _ = exit_tx.send(exit);
}

/// Receives every process the launcher starts, in launch order
pub struct LaunchLog {
    launched_rx: mpsc::UnboundedReceiver<ScriptedProcess>,
}

impl LaunchLog {
    /// Wait for the next launch; `None` once every launcher clone is gone
    pub async fn next(&mut self) -> Option<ScriptedProcess> {
        self.launched_rx.recv().await
    }

    /// Wait for the next launch of `kind`, skipping others
    pub async fn next_of(&mut self, kind: StageKind) -> Option<ScriptedProcess> {
        loop {
            let process = self.next().await?;
            if process.spec.kind == kind {
                return Some(process);
            }
        }
    }

    /// A launch that already happened, if any
    pub fn try_next(&mut self) -> Option<ScriptedProcess> {
        self.launched_rx.try_recv().ok()
    }
}

/// Test-side ends of a scripted process
pub struct ScriptedProcess {
    pub spec: ProcessSpec,
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    code_tx: Option<oneshot::Sender<i32>>,
    killed: Arc<AtomicBool>,
    exited: Arc<Notify>,
}

impl ScriptedProcess {
    pub fn kind(&self) -> StageKind {
        self.spec.kind
    }

    /// Write bytes as if the stage produced them
    pub async fn emit(&mut self, data: &[u8]) -> io::Result<()> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.write_all(data).await,
            None => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    /// Signal end of output
    pub fn close_stdout(&mut self) {
        self.stdout = None;
    }

    /// Read whatever reaches the stage's input until `idle` passes without data
    pub async fn read_input(&mut self, idle: Duration) -> Vec<u8> {
        let mut received = Vec::new();
        let Some(stdin) = self.stdin.as_mut() else {
            return received;
        };

        let mut buf = [0u8; 4096];
        loop {
            match tokio::time::timeout(idle, stdin.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => received.extend_from_slice(&buf[..n]),
            }
        }
        received
    }

    /// Read exactly `len` input bytes
    pub async fn read_input_exact(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        let mut buf = vec![0u8; len];
        stdin.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Exit on our own with `code`
    pub fn exit(&mut self, code: i32) {
        self.stdout = None;
        if let Some(code_tx) = self.code_tx.take() {
            let _ = code_tx.send(code);
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Wait until the process has been killed
    pub async fn wait_killed(&self) {
        while !self.is_killed() {
            let notified = self.exited.notified();
            if self.is_killed() {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_round_trip() {
        let (launcher, mut log) = ScriptedLauncher::new();
        let spec = ProcessSpec::new(StageKind::Filter, "ffmpeg").with_stdin();

        let mut process = launcher.launch(&spec).unwrap();
        let mut script = log.next().await.unwrap();
        assert_eq!(script.kind(), StageKind::Filter);
        assert_eq!(launcher.launches(StageKind::Filter), 1);

        let mut stdin = process.take_stdin().unwrap();
        let mut stdout = process.take_stdout().unwrap();
        let exit = process.take_exit().unwrap();

        stdin.write_all(b"in").await.unwrap();
        assert_eq!(script.read_input_exact(2).await.unwrap(), b"in");

        script.emit(b"out").await.unwrap();
        let mut buf = [0u8; 3];
        stdout.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"out");

        script.exit(3);
        let exit = exit.await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(!script.is_killed());
    }

    #[tokio::test]
    async fn test_scripted_kill_and_failure() {
        let (launcher, mut log) = ScriptedLauncher::new();
        let spec = ProcessSpec::new(StageKind::Silence, "ffmpeg");

        let mut process = launcher.launch(&spec).unwrap();
        let script = log.next().await.unwrap();
        let exit = process.take_exit().unwrap();
        process.kill();
        script.wait_killed().await;
        assert!(exit.await.unwrap().killed);

        launcher.fail(StageKind::Silence);
        assert!(launcher.launch(&spec).is_err());
        assert!(log.try_next().is_none());
        launcher.clear_failure(StageKind::Silence);
        assert!(launcher.launch(&spec).is_ok());
        assert_eq!(launcher.launches(StageKind::Silence), 2);
    }

    #[tokio::test]
    async fn test_log_ends_with_launcher() {
        let (launcher, mut log) = ScriptedLauncher::new();
        let silence = ProcessSpec::new(StageKind::Silence, "ffmpeg");
        let filter = ProcessSpec::new(StageKind::Filter, "ffmpeg");

        let _silence = launcher.launch(&silence).unwrap();
        let _filter = launcher.launch(&filter).unwrap();
        drop(launcher);

        let script = log.next_of(StageKind::Filter).await.unwrap();
        assert_eq!(script.kind(), StageKind::Filter);
        assert!(log.next().await.is_none());
        assert!(log.next_of(StageKind::Clip).await.is_none());
    }
}
