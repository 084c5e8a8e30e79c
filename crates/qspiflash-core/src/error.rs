//! Error types for qspiflash-core
//!
//! This module provides a no_std compatible error type that is shared by
//! every layer of the driver, from FIFO bursts up to the stream façade.

use core::fmt;

/// The polled condition that failed to become true within its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// Flash device never reported ready (status bit 0 stayed set)
    DeviceReady,
    /// TX/RX FIFOs did not report empty after a reset
    FifoReset,
    /// TX FIFO did not drain after starting a burst
    TxDrain,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Timing errors
    /// A polled condition did not become true in time
    Timeout(WaitTarget),

    // Controller errors
    /// Status register reported one or more error bits
    Protocol {
        /// Raw status register value
        status: u32,
    },
    /// RX FIFO ran empty before the expected byte count was pulled
    RxUnderflow {
        /// Bytes expected
        expected: usize,
        /// Bytes actually pulled
        received: usize,
    },
    /// RX FIFO still held data after the expected byte count was pulled
    RxOverflow,
    /// A single transaction would not fit the controller FIFO
    TransferTooLarge {
        /// Requested transaction length
        len: usize,
        /// Discovered FIFO depth
        fifo_depth: usize,
    },
    /// Receive buffer is shorter than the byte count to pull
    BufferTooSmall {
        /// Bytes to pull from the RX FIFO
        needed: usize,
        /// Length of the destination buffer
        available: usize,
    },
    /// Active slave index is outside the supported range
    SlaveOutOfRange(u8),
    /// FIFO depth probing found no usable FIFO
    FifoProbeFailed,

    // Address/size errors
    /// Address is beyond the flash capacity
    AddressOutOfBounds,
    /// Erase size is not one of the supported page sizes
    InvalidEraseSize(usize),
    /// Operation requires an aligned address
    InvalidAlignment,
    /// A single FIFO read would cross a 4 KiB page boundary
    CrossesPageBoundary,
    /// Zero-length or out-of-range write
    NoSpace,

    // Attach errors
    /// Flash vendor ID is not in the vendor table
    UnknownVendor(u8),
    /// Flash capacity code is not understood by the vendor
    UnknownCapacity(u8),

    // Resource errors
    /// Scratch or page buffer could not be allocated
    AllocationFailed,
    /// The device already has an open session
    Busy,
}

impl fmt::Display for WaitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceReady => write!(f, "flash device ready"),
            Self::FifoReset => write!(f, "FIFO reset"),
            Self::TxDrain => write!(f, "TX FIFO drain"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(target) => write!(f, "timed out waiting for {}", target),
            Self::Protocol { status } => {
                write!(f, "QSPI controller error, status: 0x{:x}", status)
            }
            Self::RxUnderflow { expected, received } => write!(
                f,
                "RX FIFO ran dry after {} of {} bytes",
                received, expected
            ),
            Self::RxOverflow => write!(f, "failed to drain RX FIFO"),
            Self::TransferTooLarge { len, fifo_depth } => write!(
                f,
                "transaction of {} bytes exceeds FIFO depth {}",
                len, fifo_depth
            ),
            Self::BufferTooSmall { needed, available } => write!(
                f,
                "receive buffer holds {} of {} bytes",
                available, needed
            ),
            Self::SlaveOutOfRange(slave) => write!(f, "slave index {} out of range", slave),
            Self::FifoProbeFailed => write!(f, "failed to probe QSPI FIFO depth"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidEraseSize(size) => write!(f, "invalid erase size {:#x}", size),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::CrossesPageBoundary => write!(f, "read crosses page boundary"),
            Self::NoSpace => write!(f, "out of boundary"),
            Self::UnknownVendor(id) => write!(f, "unknown flash vendor: 0x{:02x}", id),
            Self::UnknownCapacity(code) => {
                write!(f, "unknown flash memory size code: 0x{:02x}", code)
            }
            Self::AllocationFailed => write!(f, "buffer allocation failed"),
            Self::Busy => write!(f, "flash device is busy"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err {
            Error::Timeout(_) => ErrorKind::TimedOut,
            Error::AddressOutOfBounds
            | Error::NoSpace
            | Error::InvalidEraseSize(_)
            | Error::InvalidAlignment
            | Error::CrossesPageBoundary
            | Error::BufferTooSmall { .. }
            | Error::SlaveOutOfRange(_) => ErrorKind::InvalidInput,
            Error::AllocationFailed => ErrorKind::OutOfMemory,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while loading a tuning file
#[cfg(feature = "std")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Tuning file could not be read
    #[error("failed to read tuning file '{path}': {source}")]
    Read {
        /// Path of the tuning file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Tuning file is not valid TOML or has wrong field types
    #[error("failed to parse tuning file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable
    #[error("invalid tuning value '{name}': {message}")]
    Invalid {
        /// Field name
        name: &'static str,
        /// What is wrong with it
        message: String,
    },
}
