//! Call-time options shared by listing and running

use serde::{Deserialize, Serialize};

/// Directory names that are always excluded from manifest discovery.
pub const DEFAULT_IGNORE: [&str; 1] = ["node_modules"];

/// The external package-script runner, e.g. `npm run-script`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunnerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for RunnerCommand {
    fn default() -> Self {
        Self::new("npm", &["run-script"])
    }
}

/// How qualifying tasks are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every task is started up front and their output is multiplexed.
    #[default]
    Parallel,
    /// One task at a time, in discovery order.
    Sequential,
}

/// Options for [`crate::list::list`] and [`crate::run::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Extra directory names to exclude, on top of [`DEFAULT_IGNORE`].
    pub ignore: Vec<String>,
    pub runner: RunnerCommand,
    pub mode: ExecutionMode,
    /// Exit code the runner uses to signal "script failed".
    pub failure_code: i32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            runner: RunnerCommand::default(),
            mode: ExecutionMode::default(),
            failure_code: 1,
        }
    }
}

impl Options {
    /// The full exclusion set: defaults first, then caller additions, deduplicated.
    #[must_use]
    pub fn excluded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = DEFAULT_IGNORE.iter().map(ToString::to_string).collect();
        for name in &self.ignore {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}
