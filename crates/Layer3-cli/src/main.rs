//! ModHost CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ModHost - dynamic module host
#[derive(Parser, Debug)]
#[command(name = "modhost")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Module search directory (repeatable, tried in order after configured dirs)
    #[arg(short = 'd', long = "dir")]
    dirs: Vec<PathBuf>,

    /// Extra settings file, applied after user/project/local settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List modules found in the search directories
    List,
    /// Print the dependency-first load order of a module
    Plan {
        /// Module name
        name: String,
    },
    /// Dry-run a batch load (defaults to `autoLoad` from settings)
    Load {
        /// Module names
        names: Vec<String>,

        /// Print the notification history afterwards
        #[arg(short, long)]
        events: bool,
    },
    /// Load modules, then reload them
    Reload {
        /// Module names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = cli::load_config(&working_dir, args.config.as_deref())?;
    let host = cli::build_host(config, &working_dir, &args.dirs);

    match args.command {
        Command::List => cli::list_modules(&host),
        Command::Plan { name } => cli::print_plan(&host, &name),
        Command::Load { names, events } => cli::dry_run_load(&host, &names, events),
        Command::Reload { names } => cli::dry_run_reload(&host, &names),
    }
}
