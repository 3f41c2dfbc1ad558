use std::path::Path;
use std::process::ExitCode;

use clap::Args;

use runem::report::{Style, render_listing};

use crate::TreeArgs;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    tree: TreeArgs,

    /// Print a JSON object mapping each manifest to its scripts
    #[arg(long)]
    json: bool,
}

/// Run the list subcommand.
///
/// # Errors
///
/// Returns an error if options cannot be loaded or the tree cannot be walked.
pub async fn run(
    args: &ListArgs,
    config: Option<&Path>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let options = args.tree.options(config)?;
    let listing = runem::list(&args.tree.dir, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing.to_json())?);
    } else {
        print!(
            "{}",
            render_listing(&listing, &args.tree.dir, Style::for_stdout())
        );
    }
    Ok(ExitCode::SUCCESS)
}
