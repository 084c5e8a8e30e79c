//! SPI NOR flash opcodes used by the controller driver
//!
//! Only the commands the driver actually issues are listed. Program opcodes
//! differ per vendor; see [`crate::vendor`].

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase/extended-address update
pub const WREN: u8 = 0x06;

// ============================================================================
// Status and identification
// ============================================================================

/// Read Status Register (needs one dummy byte, result in the 2nd byte)
pub const RDSR: u8 = 0x05;
/// Read JEDEC ID (vendor in the 2nd byte, capacity code in the 4th)
pub const RDID: u8 = 0x9F;

/// Status register: Write In Progress
pub const SR_WIP: u8 = 0x01;

// ============================================================================
// Addressing
// ============================================================================

/// Write Extended Address Register (selects the 16 MiB sector)
pub const WREAR: u8 = 0xC5;

// ============================================================================
// Read / program
// ============================================================================

/// Quad Output Fast Read (1-1-4)
pub const QOR: u8 = 0x6B;
/// Page Program (1-1-1)
pub const PP: u8 = 0x02;
/// Quad Input Fast Program (1-1-4)
pub const QPP: u8 = 0x32;

// ============================================================================
// Erase
// ============================================================================

/// 4 KiB subsector erase
pub const SE_4K: u8 = 0x20;
/// 32 KiB subsector erase
pub const BE_32K: u8 = 0x52;
/// 64 KiB sector erase
pub const SE_64K: u8 = 0xD8;
