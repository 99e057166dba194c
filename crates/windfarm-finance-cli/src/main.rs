mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::aggregation::AggregateArgs;
use commands::distributions::SampleArgs;
use commands::oem::MatrixArgs;
use commands::simulation::{SimulateArgs, ValidateArgs};

/// Monte Carlo financial simulation for wind farm projects
#[derive(Parser)]
#[command(
    name = "wfa",
    version,
    about = "Monte Carlo financial simulation for wind farm projects",
    long_about = "A CLI for seeded Monte Carlo simulation of wind farm cashflows. \
                  Samples revenue, O&M cost, OEM contract coverage and financing per \
                  iteration and reports IRR, NPV, DSCR and cashflow percentiles."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log verbosity on stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full Monte Carlo simulation
    Simulate(SimulateArgs),
    /// Validate a simulation request without sampling
    Validate(ValidateArgs),
    /// Build the OEM responsibility matrix for a contract set
    Matrix(MatrixArgs),
    /// Sample a single distribution and summarise it
    Sample(SampleArgs),
    /// Aggregate per-source percentile series into cashflow
    Aggregate(AggregateArgs),
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

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Validate(args) => commands::simulation::run_validate(args),
        Commands::Matrix(args) => commands::oem::run_matrix(args),
        Commands::Sample(args) => commands::distributions::run_sample(args),
        Commands::Aggregate(args) => commands::aggregation::run_aggregate(args),
        Commands::Version => {
            println!("wfa {}", env!("CARGO_PKG_VERSION"));
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
