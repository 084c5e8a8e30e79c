//! Erase command implementation

use qspiflash_core::PageSize;

use crate::backends::Flash;
use crate::error::CliError;

/// Erase one page of `size` bytes at `offset`
pub fn run_erase(flash: &Flash, offset: u64, size: u64) -> Result<(), CliError> {
    let size = usize::try_from(size)
        .ok()
        .and_then(PageSize::from_bytes)
        .ok_or(qspiflash_core::Error::InvalidEraseSize(size as usize))?;

    println!("Erasing {:#x} bytes at {:#x}...", size.bytes(), offset);
    flash.erase(offset, size.bytes())?;
    println!("Erase complete");

    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backends::open_flash;
    use qspiflash_core::{Error, Tuning};

    #[test]
    fn test_erase_rejects_odd_size() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        let err = run_erase(&flash, 0, 0x2000).unwrap_err();
        assert!(matches!(err, CliError::Flash(Error::InvalidEraseSize(0x2000))));
    }

    #[test]
    fn test_erase_page() {
        let flash = open_flash("dummy", Tuning::default()).unwrap();
        run_erase(&flash, 0x8000, 0x8000).unwrap();

        let err = run_erase(&flash, 0x1000, 0x8000).unwrap_err();
        assert!(matches!(err, CliError::Flash(Error::InvalidAlignment)));
    }
}
