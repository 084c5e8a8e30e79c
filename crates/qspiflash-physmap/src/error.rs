//! Error types for the physmap backend

/// Errors raised while mapping the controller registers
#[derive(Debug, thiserror::Error)]
pub enum PhysMapError {
    /// /dev/mem could not be opened
    #[error("failed to open /dev/mem: {0}")]
    Open(#[source] std::io::Error),

    /// mmap of the register block failed
    #[error("failed to map memory at {address:#x} (size {size:#x}): {source}")]
    Map {
        /// Physical base address
        address: u64,
        /// Requested size
        size: usize,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The requested window cannot hold the register block
    #[error("mapping of {size:#x} bytes is smaller than the {required:#x} byte register block")]
    TooSmall {
        /// Requested size
        size: usize,
        /// Size of the register block
        required: usize,
    },

    /// Register blocks must be 32-bit aligned
    #[error("base address {0:#x} is not 32-bit aligned")]
    Unaligned(u64),

    /// Physical memory mapping is not available on this platform
    #[error("physical memory mapping is only supported on Linux")]
    NotSupported,
}
