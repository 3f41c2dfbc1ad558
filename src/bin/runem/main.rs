mod list;
mod run;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};

use runem::config_file::validate_ignore_name;
use runem::load_options;
use runem::options::Options;

#[derive(Parser, Debug)]
#[command(
    name = "runem",
    version,
    about = "Run a package script in every package of a directory tree"
)]
struct Cli {
    /// Path to config file (searched from the package directory upward if not specified)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log file path (log records are written to stderr as well)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the scripts declared by every package
    List(list::ListArgs),
    /// Run a script in every package that declares it
    Run(run::RunArgs),
}

/// Arguments selecting the package tree, shared by all subcommands
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Directory to search for packages
    #[arg(short = 'C', long = "dir", value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Extra directory name to exclude (repeatable, node_modules is always excluded)
    #[arg(long, value_name = "NAME")]
    pub ignore: Vec<String>,
}

impl TreeArgs {
    /// Config file options with `--ignore` entries added.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is invalid or an ignore entry is a path.
    pub fn options(&self, config: Option<&Path>) -> Result<Options, Box<dyn std::error::Error>> {
        let (mut options, _) = load_options(config, &self.dir)?;
        for name in &self.ignore {
            validate_ignore_name(name)?;
            if !options.ignore.contains(name) {
                options.ignore.push(name.clone());
            }
        }
        Ok(options)
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .as_ref()
        .map(std::fs::File::create)
        .transpose()?;
    runem::logger::init(cli.verbose, log_file)?;

    match cli.command {
        Commands::List(ref args) => list::run(args, cli.config.as_deref()).await,
        Commands::Run(ref args) => run::run(args, cli.config.as_deref()).await,
    }
}
