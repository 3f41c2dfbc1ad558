use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use clap::Args;
use log::warn;

use runem::options::{ExecutionMode, Options};
use runem::report::{Style, render_summary};
use runem::{AggregateResult, RunError, RunEvent};

use crate::TreeArgs;

/// Conventional exit code after Ctrl+C.
const INTERRUPTED: u8 = 130;
/// Conventional exit code after SIGTERM.
const TERMINATED: u8 = 143;

/// Signals that stop a run, registered before any script starts.
struct StopSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl StopSignals {
    fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for a stop request and return the exit code to report for it.
    async fn recv(&mut self) -> u8 {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => INTERRUPTED,
                _ = self.terminate.recv() => TERMINATED,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            INTERRUPTED
        }
    }
}

enum Finish {
    Completed(Result<AggregateResult, RunError>),
    Stopped(u8),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Script to run in every package that declares it
    script: String,

    #[command(flatten)]
    tree: TreeArgs,

    /// Run packages one at a time instead of all at once
    #[arg(long)]
    sequential: bool,

    /// Package-script runner program (default: npm)
    #[arg(long, value_name = "PROGRAM")]
    runner: Option<String>,

    /// Runner argument placed before the script name (repeatable, default: run-script)
    #[arg(long = "runner-arg", value_name = "ARG", allow_hyphen_values = true)]
    runner_args: Vec<String>,

    /// Exit code the runner uses to report a failed script
    #[arg(long, value_name = "CODE")]
    failure_code: Option<i32>,

    /// Do not print the per-package summary
    #[arg(short, long)]
    quiet: bool,

    /// Arguments forwarded to the script
    #[arg(last = true)]
    args: Vec<String>,
}

impl RunArgs {
    fn options(&self, config: Option<&Path>) -> Result<Options, Box<dyn std::error::Error>> {
        let mut options = self.tree.options(config)?;
        if let Some(program) = &self.runner {
            options.runner.program.clone_from(program);
            options.runner.args.clone_from(&self.runner_args);
        } else if !self.runner_args.is_empty() {
            options.runner.args.clone_from(&self.runner_args);
        }
        if self.sequential {
            options.mode = ExecutionMode::Sequential;
        }
        if let Some(code) = self.failure_code {
            options.failure_code = code;
        }
        Ok(options)
    }
}

/// Run the run subcommand, streaming script output to stdout.
///
/// # Errors
///
/// Returns an error if options cannot be loaded, the run fails fatally, or
/// stdout cannot be written.
pub async fn run(
    args: &RunArgs,
    config: Option<&Path>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let options = args.options(config)?;
    let mut signals = StopSignals::install()?;
    let started = Instant::now();
    let mut handle = runem::run(&args.tree.dir, &args.script, &options, args.args.clone());

    let finish = loop {
        tokio::select! {
            event = handle.next() => match event {
                Some(RunEvent::Data(chunk)) => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&chunk)?;
                    stdout.flush()?;
                }
                Some(RunEvent::Done(aggregate)) => break Finish::Completed(Ok(aggregate)),
                Some(RunEvent::Failed(e)) => break Finish::Completed(Err(e)),
                None => break Finish::Completed(Err(RunError::Aborted)),
            },
            code = signals.recv() => break Finish::Stopped(code),
        }
    };

    let result = match finish {
        Finish::Completed(result) => result,
        Finish::Stopped(code) => {
            warn!("Stop requested, killing running scripts");
            // Dropping the handle kills every child still running.
            drop(handle);
            return Ok(ExitCode::from(code));
        }
    };

    let aggregate = result?;
    if aggregate.is_empty() {
        eprintln!("No package declares script '{}'.", args.script);
        return Ok(ExitCode::SUCCESS);
    }
    if !args.quiet {
        eprint!(
            "\n{}",
            render_summary(
                &aggregate,
                &args.tree.dir,
                started.elapsed(),
                Style::for_stderr()
            )
        );
    }

    Ok(if aggregate.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
