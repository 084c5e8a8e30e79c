//! Flat flash addressing and erase-page geometry
//!
//! Callers see every chip behind the controller as one 64-bit flat offset:
//!
//! ```text
//!  63      56 55          32 31     24 23     16 15      8 7       0
//! +----------+--------------+---------+---------+---------+---------+
//! |  slave   |   (unused)   | sector  | addr_hi | addr_mid| addr_lo |
//! +----------+--------------+---------+---------+---------+---------+
//! ```
//!
//! The sector byte is programmed into the flash extended-address register;
//! the low three bytes travel in each command header (24-bit addressing).

use crate::opcodes;

/// Bytes addressable through one extended-address sector (16 MiB)
pub const SECTOR_SIZE: u64 = 16 * 1024 * 1024;

/// Smallest erase/program/RMW granule (4 KiB)
pub const PAGE_SIZE: usize = 4 * 1024;
/// Large erase page (32 KiB)
pub const LARGE_PAGE_SIZE: usize = 32 * 1024;
/// Huge erase page (64 KiB)
pub const HUGE_PAGE_SIZE: usize = 64 * 1024;

/// Flash program page; one program command must not cross it
pub const PROGRAM_PAGE_SIZE: usize = 256;

const PAGE_MASK: u64 = PAGE_SIZE as u64 - 1;

/// Bit position of the slave index in a flat offset
pub const SLAVE_SHIFT: u32 = 56;
/// Bits of a flat offset that select the slave
pub const SLAVE_MASK: u64 = 0xff << SLAVE_SHIFT;

/// A flat offset decomposed into its wire components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlashAddr {
    /// Chip-select index
    pub slave: u8,
    /// Extended-address (16 MiB window) byte
    pub sector: u8,
    /// Address bits 16..24
    pub addr_hi: u8,
    /// Address bits 8..16
    pub addr_mid: u8,
    /// Address bits 0..8
    pub addr_lo: u8,
}

impl FlashAddr {
    /// Decompose a flat offset
    pub const fn from_offset(offset: u64) -> Self {
        Self {
            slave: (offset >> SLAVE_SHIFT) as u8,
            sector: (offset >> 24) as u8,
            addr_hi: (offset >> 16) as u8,
            addr_mid: (offset >> 8) as u8,
            addr_lo: offset as u8,
        }
    }

    /// Recompose the flat offset
    pub const fn to_offset(&self) -> u64 {
        ((self.slave as u64) << SLAVE_SHIFT)
            | ((self.sector as u64) << 24)
            | ((self.addr_hi as u64) << 16)
            | ((self.addr_mid as u64) << 8)
            | self.addr_lo as u64
    }

    /// The same position on another slave
    pub const fn with_slave(self, slave: u8) -> Self {
        Self { slave, ..self }
    }

    /// Offset within the owning slave (slave byte zeroed)
    pub const fn chip_offset(&self) -> u64 {
        self.with_slave(0).to_offset()
    }

    /// The three in-sector address bytes, most significant first
    pub const fn address_bytes(&self) -> [u8; 3] {
        [self.addr_hi, self.addr_mid, self.addr_lo]
    }
}

/// Offset within its slave for a flat offset
pub const fn chip_offset(offset: u64) -> u64 {
    FlashAddr::from_offset(offset).chip_offset()
}

/// Round down to the containing 4 KiB page
pub const fn page_align(offset: u64) -> u64 {
    offset & !PAGE_MASK
}

/// Offset within the containing 4 KiB page
pub const fn page_offset(offset: u64) -> usize {
    (offset & PAGE_MASK) as usize
}

/// Start of the next 4 KiB page
///
/// An offset already on a page boundary advances by a whole page.
pub const fn page_roundup(offset: u64) -> u64 {
    if page_offset(offset) != 0 {
        page_align(offset) + PAGE_SIZE as u64
    } else {
        offset + PAGE_SIZE as u64
    }
}

/// Erase page sizes supported by every vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSize {
    /// 4 KiB subsector
    Page,
    /// 32 KiB subsector
    Large,
    /// 64 KiB sector
    Huge,
}

impl PageSize {
    /// All page sizes, largest first
    pub const LARGEST_FIRST: [PageSize; 3] = [Self::Huge, Self::Large, Self::Page];

    /// Size in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Self::Page => PAGE_SIZE,
            Self::Large => LARGE_PAGE_SIZE,
            Self::Huge => HUGE_PAGE_SIZE,
        }
    }

    /// Match an exact byte count to a page size
    pub const fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            PAGE_SIZE => Some(Self::Page),
            LARGE_PAGE_SIZE => Some(Self::Large),
            HUGE_PAGE_SIZE => Some(Self::Huge),
            _ => None,
        }
    }

    /// Erase opcode for this page size
    pub const fn erase_opcode(self) -> u8 {
        match self {
            Self::Page => opcodes::SE_4K,
            Self::Large => opcodes::BE_32K,
            Self::Huge => opcodes::SE_64K,
        }
    }

    /// Returns true if `offset` starts a page of this size
    pub const fn is_aligned(self, offset: u64) -> bool {
        offset % self.bytes() as u64 == 0
    }

    /// Largest page that starts at `offset` and is fully covered by `len` bytes
    pub fn for_span(offset: u64, len: usize) -> Option<Self> {
        Self::LARGEST_FIRST
            .into_iter()
            .find(|size| size.is_aligned(offset) && len >= size.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let offsets = [
            0u64,
            0x0000_0fff,
            0x00ab_cdef,
            0x0100_0000,
            0xff12_3456,
            (1 << SLAVE_SHIFT) | 0x0234_5678,
            (0xff << SLAVE_SHIFT) | 0xffff_ffff,
        ];
        for off in offsets {
            let faddr = FlashAddr::from_offset(off);
            assert_eq!(faddr.to_offset(), off, "offset {:#x}", off);
        }
    }

    #[test]
    fn test_decompose_fields() {
        let faddr = FlashAddr::from_offset((1 << SLAVE_SHIFT) | 0x0234_5678);
        assert_eq!(faddr.slave, 1);
        assert_eq!(faddr.sector, 0x02);
        assert_eq!(faddr.address_bytes(), [0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_slave_only_differs() {
        let a = FlashAddr::from_offset(0x0123_4567);
        let b = a.with_slave(1);
        assert_eq!(b.to_offset() ^ a.to_offset(), 1 << SLAVE_SHIFT);
        assert_eq!(a.chip_offset(), b.chip_offset());
        assert_eq!(chip_offset(b.to_offset()), 0x0123_4567);
    }

    #[test]
    fn test_page_roundup() {
        assert_eq!(page_roundup(0), 4096);
        assert_eq!(page_roundup(4096), 8192);
        assert_eq!(page_roundup(1), 4096);
        assert_eq!(page_roundup(4095), 4096);
        assert_eq!(page_roundup(4097), 8192);
        for off in (0..40_000u64).step_by(997) {
            let next = page_roundup(off);
            assert!(next > off);
            assert_eq!(page_offset(next), 0);
            assert!(next - off <= PAGE_SIZE as u64);
        }
    }

    #[test]
    fn test_page_size_from_bytes() {
        assert_eq!(PageSize::from_bytes(4096), Some(PageSize::Page));
        assert_eq!(PageSize::from_bytes(32 * 1024), Some(PageSize::Large));
        assert_eq!(PageSize::from_bytes(64 * 1024), Some(PageSize::Huge));
        assert_eq!(PageSize::from_bytes(5000), None);
        assert_eq!(PageSize::from_bytes(0), None);
    }

    #[test]
    fn test_page_size_for_span() {
        assert_eq!(PageSize::for_span(0, 64 * 1024), Some(PageSize::Huge));
        assert_eq!(PageSize::for_span(0, 64 * 1024 - 1), Some(PageSize::Large));
        assert_eq!(PageSize::for_span(32 * 1024, 64 * 1024), Some(PageSize::Large));
        assert_eq!(PageSize::for_span(4096, 10_000), Some(PageSize::Page));
        assert_eq!(PageSize::for_span(4096, 4095), None);
        assert_eq!(PageSize::for_span(4000, 100_000), None);
    }
}
