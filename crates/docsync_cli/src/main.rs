//! docsync CLI
//!
//! Command-line tools for docsync frame streams.
//!
//! # Commands
//!
//! - `replay` - Apply a frame stream to in-memory replicas and print them
//! - `encode` - Convert a JSON frame array to a length-prefixed CBOR stream
//! - `decode` - Convert a length-prefixed CBOR stream to a JSON frame array

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docsync command-line replication tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a frame stream to in-memory replicas
    Replay {
        /// Frame file (JSON array, or CBOR stream with a .cbor extension)
        file: PathBuf,

        /// Merge mode (strict, soft)
        #[arg(short, long, default_value = "strict")]
        mode: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Convert a JSON frame array to a CBOR stream
    Encode {
        /// Input JSON file
        input: PathBuf,

        /// Output CBOR file
        output: PathBuf,
    },

    /// Convert a CBOR stream to a JSON frame array
    Decode {
        /// Input CBOR file
        input: PathBuf,

        /// Output JSON file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Replay { file, mode, format } => {
            commands::replay::run(&file, &mode, &format)?;
        }
        Commands::Encode { input, output } => {
            let count = commands::convert::encode(&input, &output)?;
            println!("Encoded {count} frames to {}", output.display());
        }
        Commands::Decode { input, output } => {
            let json = commands::convert::decode(&input)?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("docsync Core v{}", docsync_core::VERSION);
        }
    }

    Ok(())
}
