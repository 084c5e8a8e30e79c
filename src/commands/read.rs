//! Read command implementation

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use qspiflash_core::address::{chip_offset, HUGE_PAGE_SIZE};

use super::{create_progress_bar, format_size};
use crate::backends::Flash;
use crate::error::CliError;

/// Read `length` bytes (default: up to the end of the flash) at `offset`
/// into the file at `output`
pub fn run_read(
    flash: &Flash,
    output: &Path,
    offset: u64,
    length: Option<u64>,
) -> Result<(), CliError> {
    let data = read_flash_with_progress(flash, offset, length)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} to {:?}", format_size(data.len() as u64), output);
    Ok(())
}

/// Read a range of the flash with a progress bar
pub fn read_flash_with_progress(
    flash: &Flash,
    offset: u64,
    length: Option<u64>,
) -> Result<Vec<u8>, CliError> {
    let capacity = flash.capacity();
    let remaining = capacity.saturating_sub(chip_offset(offset));
    if remaining == 0 {
        return Err(CliError::OutOfRange { offset, capacity });
    }
    let total = length.map_or(remaining, |len| len.min(remaining)) as usize;

    let mut session = flash.open()?;
    session.seek(SeekFrom::Start(offset))?;

    let mut data = vec![0u8; total];
    let pb = create_progress_bar(total as u64, "Reading")?;

    let mut done = 0;
    while done < total {
        let end = total.min(done + HUGE_PAGE_SIZE);
        let n = session.read(&mut data[done..end])?;
        if n == 0 {
            break;
        }
        done += n;
        pb.set_position(done as u64);
    }
    data.truncate(done);

    pb.finish_with_message("Read complete");
    Ok(data)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backends::open_flash;
    use qspiflash_core::Tuning;

    #[test]
    fn test_read_erased_range() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let data = read_flash_with_progress(&flash, 0x1000, Some(0x1800)).unwrap();
        assert_eq!(data.len(), 0x1800);
        assert!(data.iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_read_clamps_to_end() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let offset = flash.capacity() - 100;
        let data = read_flash_with_progress(&flash, offset, Some(4096)).unwrap();
        assert_eq!(data.len(), 100);
    }

    #[test]
    fn test_read_past_end() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let err = read_flash_with_progress(&flash, flash.capacity(), None).unwrap_err();
        assert!(matches!(err, CliError::OutOfRange { .. }));
    }
}
