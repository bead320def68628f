mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::select::{ProgramArgs, SelectArgs};

/// Cardinality-constrained asset selection
#[derive(Parser)]
#[command(
    name = "asel",
    version,
    about = "Cardinality-constrained asset selection",
    long_about = "Pick exactly k assets from a universe by minimising q * variance minus \
                  expected return over historical closing prices. The choice is solved \
                  as a binary quadratic program with exhaustive, branch-and-bound, \
                  local-search or variational optimizers."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Select assets from a request and a CSV of closing prices
    Select(SelectArgs),
    /// Print the selection program in LP format without solving it
    Program(ProgramArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Select(args) => commands::select::run_select(args),
        Commands::Program(args) => match commands::select::run_program(args) {
            Ok(lp) => {
                print!("{}", lp);
                return;
            }
            Err(e) => Err(e),
        },
        Commands::Version => {
            println!("asel {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
