mod cli;

use clap::{Parser, Subcommand};
use tracing::{error, Level};

/// Intra- and intermolecular contact-distance densities from molecular trajectories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity of the program:
    /// -v for info, -vv for debug, and -vvv for trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute contact matrices from a multi-model PDB trajectory
    Matrices(cli::matrices::Args),

    /// List the molecule types found in a structure
    Types(cli::types::Args),
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Matrices(args) => cli::matrices::run(args),
        Commands::Types(args) => cli::types::run(args),
    };
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(if e.is_configuration() { 2 } else { 1 });
    }
}
