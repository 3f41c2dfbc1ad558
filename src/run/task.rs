use std::process::Stdio;
use std::time::Instant;

use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::{RunError, RunEvent, TaskOutcome, TaskStatus};
use crate::manifest::{ScriptRef, package_dir};
use crate::options::RunnerCommand;

const CHUNK_SIZE: usize = 8 * 1024;

/// A script reference plus the arguments forwarded to it, not yet started.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionTask {
    pub reference: ScriptRef,
    pub args: Vec<String>,
}

impl ExecutionTask {
    pub(crate) fn new(reference: ScriptRef, args: Vec<String>) -> Self {
        Self { reference, args }
    }

    /// `<program> <runner args> <script> <args>` in the package directory,
    /// with the parent environment inherited.
    pub(crate) fn command(&self, runner: &RunnerCommand) -> Command {
        let dir = package_dir(&self.reference.manifest);
        debug!(
            "Building `{} {} {} {}` in {}",
            runner.program,
            runner.args.join(" "),
            self.reference.script,
            self.args.join(" "),
            dir.display()
        );
        let mut command = Command::new(&runner.program);
        command
            .args(&runner.args)
            .arg(&self.reference.script)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Start the subprocess.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Spawn` if the runner cannot be executed.
    pub(crate) fn spawn(self, runner: &RunnerCommand) -> Result<SpawnedTask, RunError> {
        let child = self
            .command(runner)
            .spawn()
            .map_err(|source| RunError::Spawn {
                manifest: self.reference.manifest.clone(),
                program: runner.program.clone(),
                source,
            })?;
        info!("Started {}", self.reference);
        Ok(SpawnedTask {
            reference: self.reference,
            child,
            started: Instant::now(),
        })
    }
}

/// A running subprocess. Dropping it kills the child.
pub(crate) struct SpawnedTask {
    reference: ScriptRef,
    child: Child,
    started: Instant,
}

impl SpawnedTask {
    /// Forward stdout and stderr chunks as they arrive, then wait for exit.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Io` if reading output or waiting on the child fails.
    pub(crate) async fn drive(
        mut self,
        events: &mpsc::Sender<RunEvent>,
    ) -> Result<TaskOutcome, RunError> {
        let io_error = |source: std::io::Error| RunError::Io {
            manifest: self.reference.manifest.clone(),
            source,
        };

        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let (out, err) = tokio::join!(forward(stdout, events), forward(stderr, events));
        out.map_err(io_error)?;
        err.map_err(io_error)?;

        let status = self.child.wait().await.map_err(io_error)?;
        let status = status.code().map_or(TaskStatus::Signaled, TaskStatus::Exited);
        info!("Finished {} ({status})", self.reference);

        Ok(TaskOutcome {
            reference: self.reference,
            status,
            duration: self.started.elapsed(),
        })
    }
}

/// Pump one output stream into the event channel until EOF.
async fn forward<R>(stream: Option<R>, events: &mpsc::Sender<RunEvent>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(());
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        // Keep draining with no consumer so the child never blocks on a full pipe.
        let _ = events.send(RunEvent::Data(buf[..n].to_vec())).await;
    }
}
