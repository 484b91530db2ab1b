//! Roulette CLI - Seeded LoRA Selection Frontend
//!
//! A tool for trying selection requests against a LoRA library without a
//! model host.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// Roulette - seeded LoRA selection and block weighting
#[derive(Parser)]
#[command(name = "roulette")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one selection with the dry-run host
    Select(commands::select::SelectArgs),

    /// Show resolved metadata and trigger words of a LoRA
    Inspect {
        /// LoRA file
        file: PathBuf,
    },

    /// Show the UNet topology and block slot usage of a LoRA
    Topology {
        /// LoRA file
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Select(args) => commands::select::run(args)?,
        Commands::Inspect { file } => commands::inspect::run(&file),
        Commands::Topology { file } => commands::topology::run(&file)?,
    }

    Ok(())
}
