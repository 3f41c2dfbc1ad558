//! Human-readable rendering for the command line

use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anstyle::{AnsiColor, Effects};

use crate::list::ScriptListing;
use crate::manifest::package_dir;
use crate::run::{AggregateResult, TaskStatus};

const ACCENT: anstyle::Style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(
    anstyle::RgbColor(207, 106, 76),
)));
const SUCCESS: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Green)));
const FAILURE: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Red)));
const WARNING: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Yellow)));
const BOLD: anstyle::Style = anstyle::Style::new().effects(Effects::BOLD);
const DIM: anstyle::Style = anstyle::Style::new().effects(Effects::DIMMED);

/// Emits escape codes only when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    color: bool,
}

impl Style {
    /// Colored when stderr is a terminal.
    #[must_use]
    pub fn for_stderr() -> Self {
        Self {
            color: std::io::stderr().is_terminal(),
        }
    }

    /// Colored when stdout is a terminal.
    #[must_use]
    pub fn for_stdout() -> Self {
        Self {
            color: std::io::stdout().is_terminal(),
        }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self { color: false }
    }

    fn paint(self, style: anstyle::Style, s: &str) -> String {
        if self.color {
            format!("{style}{s}{style:#}")
        } else {
            s.to_string()
        }
    }

    #[must_use]
    pub fn accent(self, s: &str) -> String {
        self.paint(ACCENT, s)
    }

    #[must_use]
    pub fn bold(self, s: &str) -> String {
        self.paint(BOLD, s)
    }

    #[must_use]
    pub fn green(self, s: &str) -> String {
        self.paint(SUCCESS, s)
    }

    #[must_use]
    pub fn red(self, s: &str) -> String {
        self.paint(FAILURE, s)
    }

    #[must_use]
    pub fn yellow(self, s: &str) -> String {
        self.paint(WARNING, s)
    }

    #[must_use]
    pub fn dim(self, s: &str) -> String {
        self.paint(DIM, s)
    }
}

#[must_use]
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let tenths = d.subsec_millis() / 100;
    if total_secs < 60 {
        format!("{total_secs}.{tenths}s")
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{mins}m {secs}.{tenths}s")
    }
}

/// Show `path` relative to `root` when it lives below it.
fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// One `<manifest>: <script>, <script>` line per manifest.
#[must_use]
pub fn render_listing(listing: &ScriptListing, root: &Path, sty: Style) -> String {
    let mut out = String::new();
    for (path, scripts) in listing.iter() {
        let _ = writeln!(
            out,
            "{}: {}",
            sty.accent(&display_path(root, path)),
            scripts.join(", ")
        );
    }
    out
}

/// Per-task result lines and a totals line.
#[must_use]
pub fn render_summary(
    aggregate: &AggregateResult,
    root: &Path,
    elapsed: Duration,
    sty: Style,
) -> String {
    let total = aggregate.outcomes.len();
    let width = total.to_string().len();
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut out = String::new();

    for (i, outcome) in aggregate.outcomes.iter().enumerate() {
        let idx = i + 1;
        let prefix = format!("[{idx:>width$}/{total}]");
        let dir = display_path(root, package_dir(&outcome.reference.manifest));
        let dir = if dir.is_empty() { ".".to_string() } else { dir };

        let verdict = if outcome.is_failure(aggregate.failure_code) {
            failed += 1;
            sty.red(&format!("FAIL ({})", outcome.status))
        } else {
            passed += 1;
            match outcome.status {
                TaskStatus::Exited(0) => sty.green("PASS"),
                status => sty.yellow(&format!("DONE ({status})")),
            }
        };

        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            sty.dim(&prefix),
            outcome.reference.script,
            sty.accent(&dir),
            verdict,
            sty.dim(&format_duration(outcome.duration))
        );
    }

    let mut parts = Vec::new();
    if passed > 0 {
        parts.push(sty.green(&format!("{passed} passed")));
    }
    if failed > 0 {
        parts.push(sty.red(&format!("{failed} failed")));
    }
    let _ = writeln!(
        out,
        "{} {} {}",
        sty.bold(&format!("{total} tasks:")),
        parts.join(&sty.dim(", ")),
        sty.dim(&format!("({})", format_duration(elapsed)))
    );
    out
}
