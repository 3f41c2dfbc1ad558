//! Running one script across every package that declares it
//!
//! [`run`] discovers manifests, starts one subprocess per package declaring the
//! script and hands back a [`RunHandle`]. The handle yields raw output chunks as
//! the children produce them, followed by exactly one terminal event.

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use futures::future::join_all;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::manifest::locate::{DiscoveryError, locate_async};
use crate::manifest::{ScriptRef, read_manifest};
use crate::options::{ExecutionMode, Options, RunnerCommand};

mod task;

use task::ExecutionTask;

const EVENT_BUFFER: usize = 256;

/// Fatal errors that end a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("Unable to start `{program}` for {manifest}: {source}")]
    Spawn {
        manifest: PathBuf,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while running script for {manifest}: {source}")]
    Io {
        manifest: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Run ended without a result")]
    Aborted,
}

/// How a subprocess terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Exited(i32),
    /// Killed by a signal, no exit code.
    Signaled,
}

impl TaskStatus {
    #[must_use]
    pub fn code(self) -> Option<i32> {
        match self {
            TaskStatus::Exited(code) => Some(code),
            TaskStatus::Signaled => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Exited(code) => write!(f, "exit code {code}"),
            TaskStatus::Signaled => write!(f, "terminated by signal"),
        }
    }
}

/// Terminal state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub reference: ScriptRef,
    pub status: TaskStatus,
    pub duration: Duration,
}

impl TaskOutcome {
    /// Whether this outcome counts against the run.
    ///
    /// Only the runner's sentinel failure code and signal termination do; any
    /// other exit code is recorded but treated as a completed script.
    #[must_use]
    pub fn is_failure(&self, failure_code: i32) -> bool {
        match self.status {
            TaskStatus::Exited(code) => code == failure_code,
            TaskStatus::Signaled => true,
        }
    }
}

/// Outcomes of every task started by one run, in task-start order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    pub outcomes: Vec<TaskOutcome>,
    pub failure_code: i32,
}

impl AggregateResult {
    #[must_use]
    pub fn codes(&self) -> Vec<Option<i32>> {
        self.outcomes.iter().map(|o| o.status.code()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.is_failure(self.failure_code))
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.failures().next().is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Events produced by a run
#[derive(Debug)]
pub enum RunEvent {
    /// A chunk of stdout or stderr from one task.
    Data(Vec<u8>),
    /// Every started task reached a terminal state.
    Done(AggregateResult),
    /// The run stopped on its first fatal error.
    Failed(RunError),
}

/// Consumer side of a run.
///
/// Dropping the handle aborts the run and kills any child still running.
pub struct RunHandle {
    events: mpsc::Receiver<RunEvent>,
    driver: JoinHandle<()>,
}

impl RunHandle {
    /// Next event, `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Drain the run, passing every output chunk to `on_data`.
    ///
    /// # Errors
    ///
    /// Returns the run's fatal error, or `RunError::Aborted` if the run stopped
    /// without a terminal event.
    pub async fn outcome(
        mut self,
        mut on_data: impl FnMut(&[u8]),
    ) -> Result<AggregateResult, RunError> {
        while let Some(event) = self.next().await {
            match event {
                RunEvent::Data(chunk) => on_data(&chunk),
                RunEvent::Done(aggregate) => return Ok(aggregate),
                RunEvent::Failed(e) => return Err(e),
            }
        }
        Err(RunError::Aborted)
    }
}

impl Stream for RunHandle {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Run `script` in every package under `root` that declares it.
///
/// `args` are appended verbatim to the runner invocation. Must be called from
/// within a tokio runtime.
#[must_use]
pub fn run(root: &Path, script: &str, options: &Options, args: Vec<String>) -> RunHandle {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let root = root.to_path_buf();
    let script = script.to_string();
    let options = options.clone();

    let driver = tokio::spawn(async move {
        let terminal = match drive(&root, &script, &options, args, &tx).await {
            Ok(aggregate) => RunEvent::Done(aggregate),
            Err(e) => RunEvent::Failed(e),
        };
        if tx.send(terminal).await.is_err() {
            debug!("Run handle dropped before the terminal event");
        }
    });

    RunHandle { events: rx, driver }
}

async fn drive(
    root: &Path,
    script: &str,
    options: &Options,
    args: Vec<String>,
    events: &mpsc::Sender<RunEvent>,
) -> Result<AggregateResult, RunError> {
    let tasks = plan(root, script, options, &args).await?;
    info!(
        "Running '{script}' in {} packages ({:?})",
        tasks.len(),
        options.mode
    );

    let outcomes = match options.mode {
        ExecutionMode::Sequential => run_sequential(tasks, &options.runner, events).await?,
        ExecutionMode::Parallel => run_parallel(tasks, &options.runner, events).await?,
    };

    Ok(AggregateResult {
        outcomes,
        failure_code: options.failure_code,
    })
}

/// One task per manifest declaring `script`, in discovery order.
async fn plan(
    root: &Path,
    script: &str,
    options: &Options,
    args: &[String],
) -> Result<Vec<ExecutionTask>, RunError> {
    let paths = locate_async(root, options.excluded_names()).await?;
    let manifests = join_all(paths.iter().map(|path| read_manifest(path))).await;

    let mut tasks = Vec::new();
    for manifest in manifests {
        match manifest {
            Ok(manifest) if manifest.declares(script) => tasks.push(ExecutionTask::new(
                ScriptRef {
                    manifest: manifest.path,
                    script: script.to_string(),
                },
                args.to_vec(),
            )),
            Ok(manifest) => {
                debug!("{} does not declare '{script}'", manifest.path.display());
            }
            Err(e) => warn!("Skipping manifest: {e}"),
        }
    }
    Ok(tasks)
}

async fn run_sequential(
    tasks: Vec<ExecutionTask>,
    runner: &RunnerCommand,
    events: &mpsc::Sender<RunEvent>,
) -> Result<Vec<TaskOutcome>, RunError> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        let spawned = task.spawn(runner)?;
        outcomes.push(spawned.drive(events).await?);
    }
    Ok(outcomes)
}

/// Start every task, then multiplex all of them on the current task.
///
/// A spawn failure stops further spawning; children already started are still
/// drained to completion before the first error is returned.
async fn run_parallel(
    tasks: Vec<ExecutionTask>,
    runner: &RunnerCommand,
    events: &mpsc::Sender<RunEvent>,
) -> Result<Vec<TaskOutcome>, RunError> {
    let mut first_error = None;
    let mut spawned = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.spawn(runner) {
            Ok(task) => spawned.push(task),
            Err(e) => {
                warn!("{e}");
                first_error = Some(e);
                break;
            }
        }
    }

    let results = join_all(spawned.into_iter().map(|task| task.drive(events))).await;

    let mut outcomes = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}
