//! recommender: operator CLI for a shared extension recommendation store.
//!
//! Every command goes through the same lock protocol as the library, so it is
//! safe to run while editors are using the store.
//!
//! ## Subcommands
//!
//! - `register`: add or refresh one recommendation
//! - `ignore` / `ignore-one`: mark recommendations as ignored
//! - `timelock`: suppress an extension until the next session
//! - `list`: print the model as JSON
//! - `write-key`: store an auxiliary `rec_<KEY>` file
//! - `lock-status`: inspect the lock file

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use recommender_core::{load_config, load_config_from};

#[derive(Parser)]
#[command(name = "recommender")]
#[command(about = "Inspect and update the shared extension recommendation store")]
#[command(version)]
struct Cli {
    /// Storage directory (defaults to the configured or platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    storage_dir: Option<PathBuf>,

    /// Session id used for rollover. Without it the CLI joins the session the
    /// store already records and never clears time locks.
    #[arg(long, global = true)]
    session: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a recommendation from SOURCE for EXTENSION
    Register {
        #[arg(long)]
        source: String,

        #[arg(long)]
        extension: String,

        /// Display name of the recommended extension
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Show this recommendation in the startup pass
        #[arg(long)]
        startup: bool,
    },

    /// Ignore every recommendation of EXTENSION
    Ignore {
        #[arg(value_name = "EXTENSION")]
        extension: String,

        /// Only silence the startup pass
        #[arg(long)]
        startup_only: bool,
    },

    /// Ignore one source's recommendation of EXTENSION
    IgnoreOne {
        #[arg(long)]
        source: String,

        #[arg(value_name = "EXTENSION")]
        extension: String,
    },

    /// Suppress prompts for EXTENSION until the next session
    Timelock {
        #[arg(value_name = "EXTENSION")]
        extension: String,
    },

    /// Print the model, or the recommendations of one extension
    List {
        #[arg(value_name = "EXTENSION")]
        extension: Option<String>,
    },

    /// Copy FILE into the auxiliary key file rec_KEY
    WriteKey {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show whether the store is locked, and by how long
    LockStatus,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    if let Some(dir) = cli.storage_dir.clone() {
        config.storage_dir = Some(dir);
    }
    let paths = match config.storage_paths() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("recommender: {}", e);
            std::process::exit(1);
        }
    };

    let logging_guard = logging::init(config.log_dir().as_deref());
    let ctx = commands::Context::new(paths, cli.session.as_deref(), &config);

    let result = match cli.command {
        Commands::Register {
            source,
            extension,
            name,
            description,
            startup,
        } => commands::register(&ctx, &source, &extension, &name, &description, startup),
        Commands::Ignore {
            extension,
            startup_only,
        } => commands::ignore(&ctx, &extension, startup_only),
        Commands::IgnoreOne { source, extension } => commands::ignore_one(&ctx, &source, &extension),
        Commands::Timelock { extension } => commands::timelock(&ctx, &extension),
        Commands::List { extension } => commands::list(&ctx, extension.as_deref()),
        Commands::WriteKey { key, file } => commands::write_key(&ctx, &key, &file),
        Commands::LockStatus => commands::lock_status(&ctx),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "recommender command failed");
        // exit() skips destructors; flush the file log first.
        drop(logging_guard);
        std::process::exit(1);
    }
}
