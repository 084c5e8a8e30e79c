//! qspiflash-core - Protocol engine for a register-driven QSPI flash controller
//!
//! This crate drives a NOR flash that is reachable only through a small
//! memory-mapped register block (control, status, TX/RX byte FIFOs and a
//! slave-select register). It turns arbitrary `(offset, length)` reads and
//! writes into legal sequences of flash command transactions that respect
//! the FIFO depth, erase-page alignment and device busy timing.
//!
//! The crate is layered, leaves first:
//!
//! - [`regs`] - raw register access with trace logging
//! - [`transaction`] - FIFO reset, slave select, TX/RX bursts
//! - [`command`] - flash commands, ready polling, vendor probing
//! - [`page`] - FIFO-bounded reads/writes, erase, full-page and
//!   read-modify-write programming
//! - [`stream`] - flat byte-stream façade with locking and sessions
//!   (requires `std`)
//!
//! # Features
//!
//! - `std` - Enable the stream façade, TOML tuning files and
//!   `std::error::Error` implementations
//!
//! # Example
//!
//! ```ignore
//! use qspiflash_core::{QspiFlash, Tuning};
//!
//! let flash = QspiFlash::attach(regs, Tuning::default())?;
//! let mut buf = [0u8; 256];
//! let n = flash.read(0x1000, &mut buf)?;
//! println!("read {} of {} bytes", n, flash.capacity());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod address;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod opcodes;
pub mod page;
pub mod poll;
pub mod regs;
#[cfg(feature = "std")]
pub mod stream;
pub mod transaction;
pub mod vendor;

pub use address::{FlashAddr, PageSize};
pub use config::Tuning;
pub use controller::QspiController;
pub use error::{Error, Result};
pub use page::PageProgram;
pub use regs::{Register, RegisterIo};
#[cfg(feature = "std")]
pub use stream::{Attribute, FlashReader, PartialWrite, QspiFlash, Session};
pub use vendor::Vendor;
