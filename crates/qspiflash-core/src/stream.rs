//! Byte-stream façade
//!
//! [`QspiFlash`] presents a probed controller as one flat, randomly
//! readable and writable address space. Every request holds the instance
//! lock for its whole duration, so transactions from two callers never
//! interleave on the FIFOs.
//!
//! On top of that it offers what the surrounding system consumes:
//!
//! - [`FlashReader`] for in-process users that need whole reads
//! - [`Session`], an exclusive cursor implementing `std::io::{Read, Write, Seek}`
//! - [`Attribute`] queries for the device type and size

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::address::{chip_offset, page_offset, FlashAddr, PAGE_SIZE};
use crate::config::Tuning;
use crate::controller::QspiController;
use crate::error::{Error, Result};
use crate::regs::RegisterIo;
use crate::vendor::Vendor;

/// Device type reported by the `flash_type` attribute
pub const FLASH_TYPE: &str = "spi";

/// A write that stopped early
///
/// `written` bytes starting at the requested offset were committed before
/// `error` occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialWrite {
    /// Bytes programmed before the failure
    pub written: usize,
    /// What stopped the write
    pub error: Error,
}

impl fmt::Display for PartialWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "write failed after {} bytes: {}", self.written, self.error)
    }
}

impl std::error::Error for PartialWrite {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<PartialWrite> for io::Error {
    fn from(err: PartialWrite) -> Self {
        err.error.into()
    }
}

/// Whole-buffer reads for in-process consumers such as bitstream loaders
pub trait FlashReader {
    /// Per-slave flash capacity in bytes
    fn capacity(&self) -> u64;

    /// Fill all of `buf` from `offset`
    ///
    /// Fails with [`Error::AddressOutOfBounds`] if the range does not fit.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Read-only device attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Controller class, always `spi`
    FlashType,
    /// Per-slave capacity as a decimal byte count
    Size,
}

impl Attribute {
    /// All attributes
    pub const ALL: [Attribute; 2] = [Self::FlashType, Self::Size];

    /// Attribute name
    pub const fn name(self) -> &'static str {
        match self {
            Self::FlashType => "flash_type",
            Self::Size => "size",
        }
    }

    /// Look up an attribute by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.name() == name)
    }
}

/// A flash controller shared behind one lock
pub struct QspiFlash<B> {
    inner: Mutex<QspiController<B>>,
    capacity: u64,
    vendor: Vendor,
    fifo_depth: usize,
    session_open: AtomicBool,
}

impl<B: RegisterIo> QspiFlash<B> {
    /// Attach to the controller behind `io` and identify its flash
    pub fn attach(io: B, tuning: Tuning) -> Result<Self> {
        QspiController::attach(io, tuning).map(Self::new)
    }

    /// Wrap an already attached controller
    pub fn new(controller: QspiController<B>) -> Self {
        Self {
            capacity: controller.capacity(),
            vendor: controller.vendor(),
            fifo_depth: controller.fifo_depth(),
            inner: Mutex::new(controller),
            session_open: AtomicBool::new(false),
        }
    }

    /// Per-slave flash capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Flash vendor
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Controller FIFO depth in bytes
    pub fn fifo_depth(&self) -> usize {
        self.fifo_depth
    }

    /// Release the controller
    pub fn into_inner(self) -> QspiController<B> {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, QspiController<B>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes available from `offset` to the end of its slave, 0 if outside
    fn remaining(&self, offset: u64) -> u64 {
        self.capacity.saturating_sub(chip_offset(offset))
    }

    /// Read into `buf` from `offset`
    ///
    /// Returns the number of bytes read, which is short at the end of the
    /// flash and zero for an empty buffer or an offset past the end.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.remaining(offset);
        if buf.is_empty() || remaining == 0 {
            return Ok(0);
        }
        let len = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        log::debug!("read {:#x} bytes at {:#x}", len, offset);

        let mut ctrl = self.lock();
        ctrl.set_active_slave(FlashAddr::from_offset(offset).slave)?;
        ctrl.wait_until_ready()?;

        let mut done = 0;
        while done < len {
            let pos = offset + done as u64;
            let chunk = (len - done).min(PAGE_SIZE - page_offset(pos));
            ctrl.bulk_read(pos, &mut buf[done..done + chunk])?;
            done += chunk;
        }

        Ok(len)
    }

    /// Program `data` at `offset`
    ///
    /// Data that would run past the end of the flash is cut off and the
    /// shorter length returned. An empty buffer or an offset past the end
    /// fails with [`Error::NoSpace`]. A failure part way through reports
    /// how much was already committed.
    pub fn write(&self, offset: u64, data: &[u8]) -> core::result::Result<usize, PartialWrite> {
        let remaining = self.remaining(offset);
        if data.is_empty() || remaining == 0 {
            return Err(PartialWrite {
                written: 0,
                error: Error::NoSpace,
            });
        }
        let len = data.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        log::debug!("write {:#x} bytes at {:#x}", len, offset);

        let mut scratch = [0u8; PAGE_SIZE];
        let mut done = 0;
        let fail = |written, error| PartialWrite { written, error };

        let mut ctrl = self.lock();
        ctrl.set_active_slave(FlashAddr::from_offset(offset).slave)
            .and_then(|()| ctrl.wait_until_ready())
            .map_err(|e| fail(0, e))?;

        while done < len {
            let pos = offset + done as u64;
            match ctrl.program(pos, &data[done..len], &mut scratch) {
                Ok(n) => done += n,
                Err(e) => {
                    log::error!("write failed at {:#x}: {}", pos, e);
                    return Err(fail(done, e));
                }
            }
        }

        Ok(len)
    }

    /// Erase one 4, 32 or 64 KiB page at `offset`
    pub fn erase(&self, offset: u64, page_size: usize) -> Result<()> {
        if self.remaining(offset) < page_size as u64 {
            return Err(Error::AddressOutOfBounds);
        }
        self.lock().erase(offset, page_size)
    }

    /// Render an attribute the way it is presented to users
    pub fn attribute(&self, attr: Attribute) -> String {
        match attr {
            Attribute::FlashType => format!("{}\n", FLASH_TYPE),
            Attribute::Size => format!("{}\n", self.capacity),
        }
    }

    /// Open the exclusive byte-stream session
    ///
    /// Fails with [`Error::Busy`] while another session is open.
    pub fn open(&self) -> Result<Session<'_, B>> {
        if self
            .session_open
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Error::Busy);
        }
        Ok(Session {
            flash: self,
            pos: 0,
        })
    }
}

impl<B: RegisterIo> FlashReader for QspiFlash<B> {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if (buf.len() as u64) > self.remaining(offset) {
            return Err(Error::AddressOutOfBounds);
        }
        self.read(offset, buf).map(|_| ())
    }
}

/// An open byte-stream session with its own file position
///
/// Dropping the session closes it.
pub struct Session<'a, B> {
    flash: &'a QspiFlash<B>,
    pos: u64,
}

impl<B> Session<'_, B> {
    /// Current file position
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<B> Drop for Session<'_, B> {
    fn drop(&mut self) {
        self.flash.session_open.store(false, Ordering::Release);
    }
}

impl<B: RegisterIo> Read for Session<'_, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.flash.read(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<B: RegisterIo> Write for Session<'_, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.flash.write(self.pos, buf) {
            Ok(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            // Report what landed; the next call surfaces the error
            Err(partial) if partial.written > 0 => {
                self.pos += partial.written as u64;
                Ok(partial.written)
            }
            Err(partial) => Err(partial.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B> Seek for Session<'_, B> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seeking relative to the end is not supported",
                ))
            }
        };

        // Positions are signed file offsets to the session users
        match new_pos.filter(|&p| p <= i64::MAX as u64) {
            Some(new_pos) => {
                self.pos = new_pos;
                Ok(new_pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative position",
            )),
        }
    }
}
