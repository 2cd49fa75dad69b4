//! ldpsync CLI
//!
//! Command-line entry point for warehouse synchronization.
//!
//! # Commands
//!
//! - `update` - Extract, stage and merge every table, then infer foreign keys
//! - `init` - Create the warehouse system tables
//!
//! Errors are logged once and the process exits with status 1.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Incremental FOLIO warehouse synchronization.
#[derive(Parser)]
#[command(name = "ldpsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Enable debug output and log every SQL statement
    #[arg(global = true, long)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full update
    Update(UpdateArgs),

    /// Initialize the warehouse
    Init {
        /// Data directory holding ldpconf.json
        #[arg(short = 'D', long)]
        datadir: PathBuf,
    },
}

/// Arguments of the `update` command.
#[derive(Args)]
pub struct UpdateArgs {
    /// Data directory holding ldpconf.json
    #[arg(short = 'D', long)]
    pub datadir: PathBuf,

    /// Only update this table
    #[arg(long)]
    pub table: Option<String>,

    /// Extract data without loading it
    #[arg(long)]
    pub extract_only: bool,

    /// Load previously extracted pages from this directory
    #[arg(long)]
    pub load_from_dir: Option<PathBuf>,

    /// Keep extracted page files
    #[arg(long)]
    pub savetemps: bool,
}

fn init_logging(cli: &Cli) {
    let level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Update(args) => commands::update::run(args).map(|_| ()),
        Commands::Init { datadir } => commands::init::run(datadir),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e.report_message());
            ExitCode::FAILURE
        }
    }
}
