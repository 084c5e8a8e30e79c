//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u64
pub fn parse_hex_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Names of the backends compiled into this binary
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn backend_names() -> Vec<&'static str> {
    let mut names = Vec::new();

    #[cfg(feature = "dummy")]
    names.push("dummy");

    #[cfg(feature = "physmap")]
    names.push("physmap");

    names
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use, as name[:key=value,...] [available: {}]",
        backend_names().join(", ")
    )
}

#[derive(Parser)]
#[command(name = "qspiflash")]
#[command(author, version, about = "QSPI NOR flash controller tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// TOML file overriding the controller tuning values
    #[arg(long, global = true)]
    pub tuning: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach to the controller and show the detected flash
    Info {
        #[arg(short, long, help = backend_help())]
        backend: String,
    },

    /// Read flash contents to a file
    Read {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Flash offset to start at (hex with 0x prefix, or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u64)]
        offset: u64,

        /// Number of bytes to read (defaults to the rest of the flash)
        #[arg(short, long, value_parser = parse_hex_u64)]
        length: Option<u64>,
    },

    /// Write a file to flash
    Write {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Flash offset to start at (hex with 0x prefix, or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u64)]
        offset: u64,

        /// Read the data back and compare after writing
        #[arg(long)]
        verify: bool,
    },

    /// Erase one 4, 32 or 64 KiB page
    Erase {
        #[arg(short, long, help = backend_help())]
        backend: String,

        /// Page-aligned flash offset (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u64)]
        offset: u64,

        /// Page size in bytes: 0x1000, 0x8000 or 0x10000
        #[arg(long, default_value = "0x1000", value_parser = parse_hex_u64)]
        size: u64,
    },

    /// List the backends compiled into this binary
    ListBackends,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x1000"), Ok(0x1000));
        assert_eq!(parse_hex_u64("0X20"), Ok(0x20));
        assert_eq!(parse_hex_u64("4096"), Ok(4096));
        assert!(parse_hex_u64("0xZZ").is_err());
        assert!(parse_hex_u64("-1").is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read_command() {
        let cli = Cli::try_parse_from([
            "qspiflash", "-vv", "read", "-b", "dummy", "-o", "out.bin", "--offset", "0x2000",
            "-l", "256",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Read {
                backend,
                offset,
                length,
                ..
            } => {
                assert_eq!(backend, "dummy");
                assert_eq!(offset, 0x2000);
                assert_eq!(length, Some(256));
            }
            _ => panic!("expected read command"),
        }
    }
}
