use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use gophr::commands::{self, PinArgs};
use gophr::error::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gophr", about = "Version pinning for Go packages", version)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tree digest of a directory
    Digest {
        /// Directory to digest.
        dir: PathBuf,
    },
    /// Check versions against a semver selector
    Match {
        /// Selector such as `^1.2`, `1.x` or `2.0.1+`.
        selector: String,
        /// Versions to check, such as `v1.2.3` or `1.3.0-beta.2`.
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Pin every upstream import of a package tree in place
    Pin {
        /// Upstream owner of the package.
        #[arg(long)]
        author: String,
        /// Commit time of `--sha`, RFC 3339.
        #[arg(long)]
        date: String,
        /// Package root.
        dir: PathBuf,
        /// Pins file [default: <DIR>/gophr.pins.toml].
        #[arg(long)]
        pins: Option<PathBuf>,
        /// Upstream repository name.
        #[arg(long)]
        repo: String,
        /// Commit the package is pinned at.
        #[arg(long)]
        sha: String,
    },
    /// Parse a refs advertisement, optionally rewriting it for a version
    Refs {
        /// Advertisement file, or `-` for stdin.
        input: String,
        /// List candidates as JSON.
        #[arg(long)]
        json: bool,
        /// Version request to serve, such as `^1.2` or `v1-unstable`.
        #[arg(long)]
        select: Option<String>,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<ExitCode, Error> = match cli.command {
        Commands::Digest { dir } => commands::digest(&dir).map(|()| return ExitCode::SUCCESS),
        Commands::Match { selector, versions } => commands::match_versions(&selector, &versions),
        Commands::Pin {
            author,
            date,
            dir,
            pins,
            repo,
            sha,
        } => {
            let args = PinArgs {
                author,
                date,
                dir,
                pins,
                repo,
                sha,
            };
            commands::pin(&args).map(|()| return ExitCode::SUCCESS)
        },
        Commands::Refs { input, json, select } => {
            commands::refs(&input, select.as_deref(), json).map(|()| return ExitCode::SUCCESS)
        },
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    };
}
