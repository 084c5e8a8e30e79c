//! CLI error type

use thiserror::Error;

/// Errors reported by the command line tool
#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("unknown backend option '{0}'")]
    UnknownOption(String),

    #[error("invalid value for backend option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("missing backend option '{0}'")]
    MissingOption(&'static str),

    #[error(transparent)]
    Flash(#[from] qspiflash_core::Error),

    #[error(transparent)]
    PartialWrite(#[from] qspiflash_core::PartialWrite),

    #[error(transparent)]
    Config(#[from] qspiflash_core::error::ConfigError),

    #[cfg(feature = "physmap")]
    #[error(transparent)]
    PhysMap(#[from] qspiflash_physmap::PhysMapError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset:#x} is beyond the flash size {capacity:#x}")]
    OutOfRange { offset: u64, capacity: u64 },

    #[error("verification failed at offset {0:#x}")]
    VerifyFailed(u64),

    #[error("progress bar template: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}
