//! Handle to a running media process

use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::error::ProcessError;
use crate::process::StageKind;

/// Writable end of a stage's input
pub type ProcessInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable end of a stage's output
pub type ProcessOutput = Box<dyn AsyncRead + Send + Unpin>;

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Whether we asked for the termination
    pub killed: bool,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.killed) {
            (_, true) => f.write_str("kill"),
            (Some(code), false) => write!(f, "code {}", code),
            (None, false) => f.write_str("signal"),
        }
    }
}

/// A spawned stage
///
/// The I/O handles are taken by the pump tasks that move bytes in and out.
/// Dropping the handle without calling [`MediaProcess::kill`] kills the
/// process as well.
pub struct MediaProcess {
    kind: StageKind,
    pid: Option<u32>,
    stdin: Option<ProcessInput>,
    stdout: Option<ProcessOutput>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: Option<oneshot::Receiver<ProcessExit>>,
}

impl MediaProcess {
    /// Assemble a handle from its parts
    ///
    /// Whoever supervises the process must terminate it when `kill_tx`
    /// fires or is dropped, and report the outcome on the exit channel.
    pub fn new(
        kind: StageKind,
        pid: Option<u32>,
        stdin: Option<ProcessInput>,
        stdout: Option<ProcessOutput>,
        kill_tx: oneshot::Sender<()>,
        exit_rx: oneshot::Receiver<ProcessExit>,
    ) -> Self {
        Self {
            kind,
            pid,
            stdin,
            stdout,
            kill_tx: Some(kill_tx),
            exit_rx: Some(exit_rx),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdin(&mut self) -> Result<ProcessInput, ProcessError> {
        self.stdin.take().ok_or(ProcessError::MissingPipe {
            stage: self.kind.name(),
            pipe: "stdin",
        })
    }

    pub fn take_stdout(&mut self) -> Result<ProcessOutput, ProcessError> {
        self.stdout.take().ok_or(ProcessError::MissingPipe {
            stage: self.kind.name(),
            pipe: "stdout",
        })
    }

    /// Resolves once when the process ends
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<ProcessExit>> {
        self.exit_rx.take()
    }

    /// Close our I/O handles and terminate immediately
    ///
    /// Idempotent. Never fails: a process that already exited simply
    /// ignores the request.
    pub fn kill(&mut self) {
        self.stdin = None;
        self.stdout = None;

        if let Some(kill_tx) = self.kill_tx.take() {
            if kill_tx.send(()).is_err() {
                tracing::debug!("{} process already exited", self.kind);
            }
        }
    }

    pub fn is_killed(&self) -> bool {
        self.kill_tx.is_none()
    }
}

impl fmt::Debug for MediaProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaProcess")
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("killed", &self.is_killed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_is_idempotent() {
        let (kill_tx, mut kill_rx) = oneshot::channel();
        let (_exit_tx, exit_rx) = oneshot::channel();
        let mut process = MediaProcess::new(StageKind::Silence, Some(42), None, None, kill_tx, exit_rx);

        assert!(!process.is_killed());
        process.kill();
        process.kill();
        assert!(process.is_killed());
        assert!(kill_rx.try_recv().is_ok());
    }

    #[test]
    fn test_missing_pipes_are_errors() {
        let (kill_tx, _kill_rx) = oneshot::channel();
        let (_exit_tx, exit_rx) = oneshot::channel();
        let mut process = MediaProcess::new(StageKind::Clip, None, None, None, kill_tx, exit_rx);

        assert!(matches!(
            process.take_stdin(),
            Err(ProcessError::MissingPipe { pipe: "stdin", .. })
        ));
        assert!(process.take_stdout().is_err());
        assert!(process.take_exit().is_some());
        assert!(process.take_exit().is_none());
    }

    #[test]
    fn test_exit_display() {
        let exit = ProcessExit { code: Some(1), killed: false };
        assert_eq!(exit.to_string(), "code 1");
        assert!(!exit.success());
        assert_eq!(ProcessExit { code: None, killed: true }.to_string(), "kill");
        assert!(ProcessExit { code: Some(0), killed: false }.success());
    }
}
