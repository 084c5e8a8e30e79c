//! qspiflash - QSPI NOR flash controller tool
//!
//! Attaches the driver in `qspiflash-core` to a controller register block
//! and reads, writes or erases the flash behind it.
//!
//! # Backends
//!
//! - **dummy** - in-memory emulator, useful for trying out the tool and
//!   for tests
//! - **physmap** - the real register block mapped through `/dev/mem`

mod backends;
mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use error::CliError;
use qspiflash_core::Tuning;
use std::path::Path;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let tuning = load_tuning(cli.tuning.as_deref())?;

    match cli.command {
        Commands::Info { backend } => {
            let flash = backends::open_flash(&backend, tuning)?;
            commands::run_info(&flash);
            Ok(())
        }
        Commands::Read {
            backend,
            output,
            offset,
            length,
        } => {
            let flash = backends::open_flash(&backend, tuning)?;
            commands::run_read(&flash, &output, offset, length)
        }
        Commands::Write {
            backend,
            input,
            offset,
            verify,
        } => {
            let flash = backends::open_flash(&backend, tuning)?;
            commands::run_write(&flash, &input, offset, verify)
        }
        Commands::Erase {
            backend,
            offset,
            size,
        } => {
            let flash = backends::open_flash(&backend, tuning)?;
            commands::run_erase(&flash, offset, size)
        }
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    }
}

/// Load the tuning file if one was given, defaults otherwise
fn load_tuning(path: Option<&Path>) -> Result<Tuning, CliError> {
    match path {
        Some(path) => {
            let tuning = Tuning::load(path)?;
            log::info!("loaded tuning from {}", path.display());
            Ok(tuning)
        }
        None => Ok(Tuning::default()),
    }
}
