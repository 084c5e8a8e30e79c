//! qspiflash-physmap - Memory-mapped QSPI register block
//!
//! Maps the controller register block through `/dev/mem` and exposes it as
//! a [`RegisterIo`] implementation for the core driver.
//!
//! # Safety
//!
//! Accessing physical memory is inherently unsafe and requires root
//! privileges. The caller is responsible for passing the base address of an
//! actual QSPI controller; mapping arbitrary memory and writing to it can
//! crash the system.

mod error;

pub use error::PhysMapError;

use qspiflash_core::regs::{RegisterIo, REGISTER_BLOCK_SIZE};

/// A mapped region of physical memory
#[cfg(target_os = "linux")]
pub struct PhysMap {
    /// Pointer to the requested address inside the mapping
    ptr: *mut u8,
    /// Size of the whole mapping
    map_size: usize,
    /// Offset of `ptr` from the start of the mapping
    page_offset: usize,
    /// Usable size from `ptr`
    size: usize,
    /// Physical address (for error reporting)
    phys_addr: u64,
}

#[cfg(target_os = "linux")]
impl PhysMap {
    /// Map `size` bytes of physical memory at `phys_addr`
    ///
    /// The mapping is uncached (`O_SYNC`), as required for MMIO.
    pub fn new(phys_addr: u64, size: usize) -> Result<Self, PhysMapError> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(PhysMapError::Open)?;

        // Calculate page-aligned address and offset
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let page_mask = page_size - 1;
        let page_offset = (phys_addr as usize) & page_mask;
        let aligned_addr = phys_addr & !(page_mask as u64);
        let map_size = (size + page_offset + page_mask) & !page_mask;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned_addr as libc::off_t,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(PhysMapError::Map {
                address: phys_addr,
                size,
                source: std::io::Error::last_os_error(),
            });
        }

        log::debug!(
            "mapped {:#x} bytes of physical memory at {:#x}",
            map_size,
            aligned_addr
        );

        Ok(Self {
            ptr: unsafe { (ptr as *mut u8).add(page_offset) },
            map_size,
            page_offset,
            size,
            phys_addr,
        })
    }

    /// Read a 32-bit value from the mapped region
    #[inline]
    pub fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit read");
        unsafe { core::ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    /// Write a 32-bit value to the mapped region
    #[inline]
    pub fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size);
        debug_assert!(offset & 3 == 0, "unaligned 32-bit write");
        unsafe { core::ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) }
    }

    /// Get the physical address of this mapping
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// Get the usable size of this mapping
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(target_os = "linux")]
impl Drop for PhysMap {
    fn drop(&mut self) {
        unsafe {
            let base = self.ptr.sub(self.page_offset);
            libc::munmap(base as *mut libc::c_void, self.map_size);
        }
    }
}

// The mapping is only reached through &mut QspiRegisters, and MMIO has no
// aliasing concerns of its own
#[cfg(target_os = "linux")]
unsafe impl Send for PhysMap {}

// Stub for non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub struct PhysMap {
    _private: (),
}

#[cfg(not(target_os = "linux"))]
impl PhysMap {
    pub fn new(_phys_addr: u64, _size: usize) -> Result<Self, PhysMapError> {
        Err(PhysMapError::NotSupported)
    }

    pub fn read32(&self, _offset: usize) -> u32 {
        0
    }
    pub fn write32(&self, _offset: usize, _value: u32) {}
    pub fn phys_addr(&self) -> u64 {
        0
    }
    pub fn size(&self) -> usize {
        0
    }
}

/// QSPI controller registers reached through a physical memory mapping
pub struct QspiRegisters {
    map: PhysMap,
}

impl QspiRegisters {
    /// Map the register block at `base`
    ///
    /// `size` defaults to the register block size and must cover it.
    pub fn open(base: u64, size: Option<usize>) -> Result<Self, PhysMapError> {
        let size = size.unwrap_or(REGISTER_BLOCK_SIZE);
        if size < REGISTER_BLOCK_SIZE {
            return Err(PhysMapError::TooSmall {
                size,
                required: REGISTER_BLOCK_SIZE,
            });
        }
        if base & 3 != 0 {
            return Err(PhysMapError::Unaligned(base));
        }

        let map = PhysMap::new(base, size)?;
        log::info!("QSPI registers mapped at {:#x}", map.phys_addr());
        Ok(Self { map })
    }

    /// The underlying mapping
    pub fn map(&self) -> &PhysMap {
        &self.map
    }
}

impl RegisterIo for QspiRegisters {
    fn read32(&mut self, offset: usize) -> u32 {
        self.map.read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.map.write32(offset, value)
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }

    fn yield_now(&mut self) {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_window() {
        let err = QspiRegisters::open(0x4000_0000, Some(0x40)).err();
        assert!(matches!(
            err,
            Some(PhysMapError::TooSmall {
                size: 0x40,
                required: REGISTER_BLOCK_SIZE
            })
        ));
    }

    #[test]
    fn test_rejects_unaligned_base() {
        let err = QspiRegisters::open(0x4000_0002, None).err();
        assert!(matches!(err, Some(PhysMapError::Unaligned(0x4000_0002))));
    }

    #[test]
    #[ignore] // Requires root and /dev/mem access
    fn test_physmap_create() {
        let map = PhysMap::new(0x4000_0000, REGISTER_BLOCK_SIZE).unwrap();
        assert_eq!(map.size(), REGISTER_BLOCK_SIZE);
    }
}
