//! CLI command implementations
//!
//! Every command works on an attached [`Flash`](crate::backends::Flash).
//! Reads and writes go through an exclusive session so that the file
//! position bookkeeping matches what other session users see.

mod erase;
mod info;
mod list;
mod read;
mod write;

pub use erase::run_erase;
pub use info::run_info;
pub use list::list_backends;
pub use read::run_read;
pub use write::run_write;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::CliError;

/// Create a byte progress bar with a phase message
fn create_progress_bar(total: u64, phase: &str) -> Result<ProgressBar, CliError> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Print a size in bytes with its KiB/MiB rendering
fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} bytes ({} MiB)", bytes, bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} bytes ({} KiB)", bytes, bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(16 * 1024 * 1024), "16777216 bytes (16 MiB)");
        assert_eq!(format_size(4096), "4096 bytes (4 KiB)");
        assert_eq!(format_size(100), "100 bytes");
    }
}
