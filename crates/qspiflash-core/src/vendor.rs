//! Flash vendor table
//!
//! Vendors are a closed set resolved once at attach from the ID read. An
//! unrecognised vendor ID is a hard failure.

use crate::address::SECTOR_SIZE;
use crate::opcodes;

/// Supported flash vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    /// Micron (MT25Q family)
    Micron,
    /// Macronix (MX25 family)
    Macronix,
}

impl Vendor {
    /// Every vendor in the table
    pub const ALL: [Vendor; 2] = [Self::Micron, Self::Macronix];

    /// Look up a vendor by its JEDEC manufacturer ID
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }

    /// Look up a vendor by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }

    /// JEDEC manufacturer ID
    pub const fn id(self) -> u8 {
        match self {
            Self::Micron => 0x20,
            Self::Macronix => 0xC2,
        }
    }

    /// Human readable vendor name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Micron => "micron",
            Self::Macronix => "macronix",
        }
    }

    /// Number of 16 MiB sectors for a capacity code, 0 if unknown
    pub const fn code_to_sectors(self, code: u8) -> usize {
        match self {
            Self::Micron => match code {
                0x17 | 0x18 => 1,
                0x19 => 2,
                0x20 => 4,
                0x21 => 8,
                0x22 => 16,
                _ => 0,
            },
            Self::Macronix => {
                if code < 0x38 || code > 0x3c {
                    0
                } else {
                    1 << (code - 0x38)
                }
            }
        }
    }

    /// Per-slave capacity in bytes for a capacity code, `None` if unknown
    pub const fn capacity(self, code: u8) -> Option<u64> {
        match self.code_to_sectors(code) {
            0 => None,
            sectors => Some(sectors as u64 * SECTOR_SIZE),
        }
    }

    /// Opcode used to program data
    pub const fn program_opcode(self) -> u8 {
        match self {
            Self::Micron => opcodes::QPP,
            Self::Macronix => opcodes::PP,
        }
    }
}

impl core::fmt::Display for Vendor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        assert_eq!(Vendor::from_id(0x20), Some(Vendor::Micron));
        assert_eq!(Vendor::from_id(0xC2), Some(Vendor::Macronix));
        assert_eq!(Vendor::from_id(0xEF), None);
    }

    #[test]
    fn test_micron_codes() {
        let v = Vendor::Micron;
        assert_eq!(v.code_to_sectors(0x17), 1);
        assert_eq!(v.code_to_sectors(0x18), 1);
        assert_eq!(v.code_to_sectors(0x19), 2);
        assert_eq!(v.code_to_sectors(0x22), 16);
        assert_eq!(v.code_to_sectors(0x23), 0);
        assert_eq!(v.capacity(0x20), Some(64 * 1024 * 1024));
    }

    #[test]
    fn test_macronix_codes() {
        let v = Vendor::Macronix;
        assert_eq!(v.code_to_sectors(0x37), 0);
        assert_eq!(v.code_to_sectors(0x38), 1);
        assert_eq!(v.code_to_sectors(0x3a), 4);
        assert_eq!(v.code_to_sectors(0x3c), 16);
        assert_eq!(v.code_to_sectors(0x3d), 0);
        assert_eq!(v.capacity(0x3d), None);
    }

    #[test]
    fn test_program_opcodes() {
        assert_eq!(Vendor::Micron.program_opcode(), 0x32);
        assert_eq!(Vendor::Macronix.program_opcode(), 0x02);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Vendor::from_name("Micron"), Some(Vendor::Micron));
        assert_eq!(Vendor::from_name("winbond"), None);
    }
}
