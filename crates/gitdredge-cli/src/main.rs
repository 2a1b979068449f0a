use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use crate::commands::ExitStatus;
use crate::printer::Printer;

mod batch;
mod commands;
mod logging;
mod printer;

#[derive(Parser)]
#[command(author, version, about = "Reconstruct git repositories from exposed .git directories")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a URL, or a batch of URLs, for an exposed repository.
    Check(CheckArgs),
    /// Dump an exposed repository into a local `.git` mirror.
    Fetch(FetchArgs),
    /// Inspect a downloaded `.git/index` file offline.
    Index(IndexArgs),
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("target").required(true))]
struct CheckArgs {
    /// The URL or bare domain to probe.
    #[clap(group = "target")]
    url: Option<String>,

    /// Batch file with one URL or domain per line.
    #[clap(long, group = "target")]
    file: Option<PathBuf>,

    /// Network timeout in seconds.
    #[clap(long, default_value_t = 10)]
    timeout: u64,
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("target").required(true))]
struct FetchArgs {
    /// The URL or bare domain to dump.
    #[clap(group = "target")]
    url: Option<String>,

    /// Batch file with one URL or domain per line.
    #[clap(long, group = "target")]
    file: Option<PathBuf>,

    /// Network timeout in seconds.
    #[clap(long, default_value_t = 10)]
    timeout: u64,

    /// Refresh an existing dump directory.
    #[clap(long, short)]
    update: bool,
}

#[derive(Args)]
struct IndexArgs {
    /// Path to a `.git/index` file.
    path: PathBuf,

    /// Show the tracked files as a tree.
    #[clap(long, conflicts_with_all = ["raw", "csv"])]
    tree: bool,

    /// Show every decoded entry field.
    #[clap(long, conflicts_with_all = ["tree", "csv"])]
    raw: bool,

    /// Show the entries as CSV.
    #[clap(long, conflicts_with_all = ["tree", "raw"])]
    csv: bool,
}

async fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.verbose {
        logging::Level::Verbose
    } else if cli.quiet {
        logging::Level::Quiet
    } else {
        logging::Level::Default
    });

    let printer = if cli.quiet {
        Printer::Quiet
    } else if cli.verbose {
        Printer::Verbose
    } else {
        Printer::Default
    };

    // One token for the whole process: ctrl-c stops every in-flight fetch.
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Check(args) => {
            commands::check(
                args.url.as_deref(),
                args.file.as_deref(),
                args.timeout,
                &cancel,
                printer,
            )
            .await
        }
        Commands::Fetch(args) => {
            commands::fetch(
                args.url.as_deref(),
                args.file.as_deref(),
                args.timeout,
                args.update,
                &cancel,
                printer,
            )
            .await
        }
        Commands::Index(args) => commands::index(&args.path, args.tree, args.raw, args.csv, printer),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match inner().await {
        Ok(status) => status.into(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                let mut causes = err.chain();
                eprintln!("{}: {}", "error".red().bold(), causes.next().unwrap());
                for cause in causes {
                    eprintln!("  {}: {cause}", "Caused by".red().bold());
                }
            }
            ExitStatus::Error.into()
        }
    }
}
