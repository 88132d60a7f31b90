#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::format_push_string)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use qnm_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "qnm")]
#[command(
    author,
    version,
    about = "Inspect the packages installed in node_modules",
    long_about = None
)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Maximum node_modules nesting depth to walk (default: $QNM_MAX_DEPTH or 25)
    #[arg(long, global = true, value_name = "N")]
    max_depth: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Show every installed version of a package and who requires it
    Find {
        /// Package name (e.g., "lodash" or "@scope/pkg")
        name: String,
    },

    /// List installed packages
    List {
        /// Only packages declared in dependencies or devDependencies
        #[arg(long)]
        deps: bool,
    },

    /// List installed package names matching a pattern
    Match {
        /// Substring or subsequence to look for (case-insensitive)
        pattern: String,
    },

    /// Look up a package by name (e.g., `qnm lodash`)
    #[command(external_subcommand)]
    Name(Vec<String>),
}

/// Turn `qnm <name> [flags]` into `qnm find <name> [flags]`.
///
/// Flags after the name are invisible to the outer parse; re-parsing picks
/// them up and they are merged with any given before the name.
fn expand_name_shortcut(cli: Cli) -> Cli {
    let Some(Commands::Name(args)) = &cli.command else {
        return cli;
    };
    let argv = ["qnm".to_string(), "find".to_string()]
        .into_iter()
        .chain(args.iter().cloned());
    let inner = Cli::parse_from(argv);

    Cli {
        verbose: cli.verbose.saturating_add(inner.verbose),
        json: cli.json || inner.json,
        cwd: inner.cwd.or(cli.cwd),
        max_depth: inner.max_depth.or(cli.max_depth),
        command: inner.command,
    }
}

fn main() -> Result<()> {
    let cli = expand_name_shortcut(Cli::parse());

    let mut config = Config::from_env()
        .into_diagnostic()?
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);
    if let Some(cwd) = cli.cwd {
        config = config.with_cwd(cwd);
    }
    if let Some(max_depth) = cli.max_depth {
        config = config.with_max_depth(max_depth);
    }

    logging::init(&config);
    let cwd = config.cwd.display().to_string();

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Find { name }) => {
            let span = tracing::info_span!("find", cmd = "find", cwd = %cwd);
            let _guard = span.enter();
            commands::find::run(&config, &name, cli.json)
        }
        Some(Commands::Name(_)) => {
            unreachable!() // Rewritten to Find by expand_name_shortcut
        }
        Some(Commands::List { deps }) => {
            let span = tracing::info_span!("list", cmd = "list", cwd = %cwd);
            let _guard = span.enter();
            commands::list::run(&config, deps, cli.json)
        }
        Some(Commands::Match { pattern }) => {
            let span = tracing::info_span!("match", cmd = "match", cwd = %cwd);
            let _guard = span.enter();
            commands::matches::run(&config, &pattern, cli.json)
        }
    }
}
