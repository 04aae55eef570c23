//! # zkid CLI entry point
//!
//! Parses arguments, initialises logging and dispatches to subcommand
//! handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zkid_cli::publisher::{run_publisher, PublisherArgs};
use zkid_cli::state::{run_state, StateArgs};
use zkid_cli::token::{run_token, TokenArgs};

/// zkid — identity state, proof and envelope tooling.
#[derive(Parser, Debug)]
#[command(name = "zkid", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode iden3comm envelopes.
    Token(TokenArgs),

    /// Identity state computations.
    State(StateArgs),

    /// State publisher operations.
    Publisher(PublisherArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match &cli.command {
        Commands::Token(args) => run_token(args),
        Commands::State(args) => run_state(args),
        Commands::Publisher(args) => run_publisher(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
