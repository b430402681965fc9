//! Operating-system processes via `tokio::process`

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

use crate::error::ProcessError;
use crate::process::{
    MediaProcess, ProcessExit, ProcessInput, ProcessLauncher, ProcessOutput, ProcessSpec,
    StageKind,
};

/// Spawns real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &ProcessSpec) -> Result<MediaProcess, ProcessError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        tracing::debug!("[{}] Process started with PID: {:?}", spec.kind, pid);

        let stdin = child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as ProcessInput);
        let stdout = child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as ProcessOutput);
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(spec.kind, pid, stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(spec.kind, child, kill_rx, exit_tx));

        Ok(MediaProcess::new(spec.kind, pid, stdin, stdout, kill_tx, exit_rx))
    }
}

/// Wait for the child to exit or for a kill request, whichever comes first
async fn supervise(
    kind: StageKind,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    let mut killed = false;

    let status = tokio::select! {
        status = child.wait() => status,
        // A dropped handle counts as a kill request.
        _ = kill_rx => {
            killed = true;
            if let Err(e) = child.start_kill() {
                tracing::error!("Error killing {} process: {}", kind, e);
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
            killed,
        },
        Err(e) => {
            tracing::warn!("[{}] Process error: {}", kind, e);
            ProcessExit { code: None, killed }
        }
    };

    tracing::debug!("[{}] Process exited with {}", kind, exit);
    let _ = exit_tx.send(exit);
}

async fn log_stderr(kind: StageKind, pid: Option<u32>, stderr: ChildStderr) {
    let pid = pid.unwrap_or_default();
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!("[{} {}] stderr: {}", kind, pid, line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("[{}] stderr closed: {}", kind, e);
                break;
            }
        }
    }
}
