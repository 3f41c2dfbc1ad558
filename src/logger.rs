use std::io::Write;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

struct RunemLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: LevelFilter,
    start: Instant,
}

impl RunemLogger {
    fn format(&self, record: &Record) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        format!(
            "[{elapsed:.3}s] [{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for RunemLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = self.format(record);
        let _ = writeln!(std::io::stderr().lock(), "{line}");

        if let Some(ref file) = self.file {
            let _ = writeln!(file.lock(), "{line}");
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Level from `RUST_LOG`, raised by each `-v`.
#[must_use]
pub fn level_filter(env: Option<&str>, verbose: u8) -> LevelFilter {
    let base = env
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Warn);
    let raised = match verbose {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    base.max(raised)
}

/// Initialize the global logger. Must be called once before any logging.
///
/// # Errors
///
/// Returns `log::SetLoggerError` if a logger is already installed.
pub fn init(verbose: u8, log_file: Option<std::fs::File>) -> Result<(), log::SetLoggerError> {
    let filter = level_filter(std::env::var("RUST_LOG").ok().as_deref(), verbose);

    let logger = RunemLogger {
        file: log_file.map(Mutex::new),
        filter,
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}
