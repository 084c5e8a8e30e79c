//! Write command implementation

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use qspiflash_core::address::{chip_offset, HUGE_PAGE_SIZE};
use qspiflash_core::FlashReader;

use super::{create_progress_bar, format_size};
use crate::backends::Flash;
use crate::error::CliError;

/// Write the contents of `input` at `offset`
pub fn run_write(flash: &Flash, input: &Path, offset: u64, verify: bool) -> Result<(), CliError> {
    let data = std::fs::read(input)?;
    println!("Read {} from {:?}", format_size(data.len() as u64), input);

    let written = write_flash_with_progress(flash, offset, &data)?;
    if written < data.len() {
        log::warn!(
            "input truncated to {} bytes at the end of the flash",
            written
        );
    }

    if verify {
        verify_flash(flash, offset, &data[..written])?;
        println!("Verification passed");
    }

    Ok(())
}

/// Write `data` at `offset` with a progress bar; returns the bytes written
pub fn write_flash_with_progress(flash: &Flash, offset: u64, data: &[u8]) -> Result<usize, CliError> {
    let capacity = flash.capacity();
    let remaining = capacity.saturating_sub(chip_offset(offset));
    if remaining == 0 {
        return Err(CliError::OutOfRange { offset, capacity });
    }
    let total = data.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

    let mut session = flash.open()?;
    session.seek(SeekFrom::Start(offset))?;

    let pb = create_progress_bar(total as u64, "Writing")?;

    let mut done = 0;
    while done < total {
        let end = total.min(done + HUGE_PAGE_SIZE);
        session.write_all(&data[done..end])?;
        done = end;
        pb.set_position(done as u64);
    }

    pb.finish_with_message("Write complete");
    Ok(total)
}

/// Compare the flash contents at `offset` with `expected`
pub fn verify_flash(flash: &Flash, offset: u64, expected: &[u8]) -> Result<(), CliError> {
    let pb = create_progress_bar(expected.len() as u64, "Verifying")?;
    let mut buf = vec![0u8; HUGE_PAGE_SIZE];

    for (i, chunk) in expected.chunks(HUGE_PAGE_SIZE).enumerate() {
        let pos = offset + (i * HUGE_PAGE_SIZE) as u64;
        let actual = &mut buf[..chunk.len()];
        flash.read_at(pos, actual)?;

        if let Some(j) = actual.iter().zip(chunk).position(|(a, b)| a != b) {
            pb.abandon();
            return Err(CliError::VerifyFailed(pos + j as u64));
        }
        pb.inc(chunk.len() as u64);
    }

    pb.finish_with_message("Verify complete");
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backends::open_flash;
    use crate::commands::read::read_flash_with_progress;
    use qspiflash_core::Tuning;

    #[test]
    fn test_write_then_verify() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7) as u8).collect();

        let written = write_flash_with_progress(&flash, 0x3000, &data).unwrap();
        assert_eq!(written, data.len());
        verify_flash(&flash, 0x3000, &data).unwrap();

        let back = read_flash_with_progress(&flash, 0x3000, Some(data.len() as u64)).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let mut data = vec![0xffu8; 0x2000];
        data[0x1234] = 0;

        let err = verify_flash(&flash, 0, &data).unwrap_err();
        assert!(matches!(err, CliError::VerifyFailed(0x1234)));
    }

    #[test]
    fn test_write_truncates_at_end() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let offset = flash.capacity() - 0x1000;
        let written = write_flash_with_progress(&flash, offset, &[0x5a; 0x2000]).unwrap();
        assert_eq!(written, 0x1000);
    }
}
