//! ArborDB CLI
//!
//! Command-line interface over a local database file.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use arbordb::{ArborError, Config, Db, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// ArborDB CLI
#[derive(Parser, Debug)]
#[command(name = "arbordb-cli")]
#[command(about = "CLI for the ArborDB key-value store")]
#[command(version)]
struct Args {
    /// Database file
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Delete the database file
    Purge,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,arbordb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(ArborError::KeyNotFound) => {
            eprintln!("Key not found");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder().path(&args.db).build();
    let mut db = Db::open(config)?;

    match args.command {
        Commands::Get { key } => {
            let value = db.get(key.as_bytes())?;
            println!("{} => {}", key, String::from_utf8_lossy(&value));
        }
        Commands::Set { key, value } => {
            db.set(key.as_bytes(), value.as_bytes())?;
        }
        Commands::Del { key } => {
            db.delete(key.as_bytes())?;
        }
        Commands::Purge => {
            db.close()?;
            fs::remove_file(&args.db)?;
            tracing::info!("Purged {}", args.db.display());
            return Ok(());
        }
    }

    db.close()
}
