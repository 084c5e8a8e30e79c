//! Page I/O
//!
//! Single-transaction reads and writes bounded by the FIFO depth, bulk
//! loops over them, erase, and the two page programming strategies:
//!
//! - full page: the target is aligned to and covered by a 64/32/4 KiB
//!   page, so it can be erased and rewritten outright
//! - read-modify-write: the bytes around the target in its 4 KiB page are
//!   read back first and rewritten together with the new data

use crate::address::{
    page_align, page_offset, FlashAddr, PageSize, PAGE_SIZE, PROGRAM_PAGE_SIZE,
};
use crate::controller::QspiController;
use crate::error::{Error, Result};
use crate::opcodes;
use crate::regs::RegisterIo;

/// Outcome of a full page program attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageProgram {
    /// This many bytes were erased and programmed
    Programmed(usize),
    /// No page size fits the offset and length; use read-modify-write
    NotApplicable,
}

impl<B: RegisterIo> QspiController<B> {
    /// Read up to one FIFO worth of data at `offset`
    ///
    /// The request must stay inside one 4 KiB page. Returns the number of
    /// bytes read, which may be less than `buf.len()`.
    pub fn read_one_fifo(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if page_offset(offset) + buf.len() > PAGE_SIZE {
            return Err(Error::CrossesPageBoundary);
        }

        let header_len = self.build_header(opcodes::QOR, FlashAddr::from_offset(offset))?;

        // Data shows up in the RX FIFO only after the dummy cycles
        let data_start = header_len + self.tuning.read_dummy_len;
        let payload = buf.len().min(self.io_buf.len().saturating_sub(data_start));
        if payload == 0 {
            return Err(Error::TransferTooLarge {
                len: data_start + 1,
                fifo_depth: self.io_buf.len(),
            });
        }
        let total = data_start + payload;

        self.io_buf[header_len..total].fill(0);
        self.bus.transaction(&mut self.io_buf[..total], true)?;

        buf[..payload].copy_from_slice(&self.io_buf[data_start..total]);
        Ok(payload)
    }

    /// Program up to one FIFO worth of data at `offset`
    ///
    /// The target must already be erased. Returns the number of bytes
    /// programmed, never more than the tuned write ceiling and never past
    /// the end of the flash program page.
    pub fn write_one_fifo(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let opcode = self.vendor.program_opcode();
        let header_len = self.build_header(opcode, FlashAddr::from_offset(offset))?;

        let payload = buf
            .len()
            .min(self.io_buf.len().saturating_sub(header_len))
            .min(self.tuning.write_max_len)
            .min(PROGRAM_PAGE_SIZE - (offset % PROGRAM_PAGE_SIZE as u64) as usize);
        if payload == 0 {
            return Err(Error::TransferTooLarge {
                len: header_len + 1,
                fifo_depth: self.io_buf.len(),
            });
        }
        let total = header_len + payload;

        self.io_buf[header_len..total].copy_from_slice(&buf[..payload]);

        self.bus.enable_write()?;
        self.bus.transaction(&mut self.io_buf[..total], false)?;
        self.bus.wait_until_ready()?;

        Ok(payload)
    }

    /// Fill `buf` from `offset`, one FIFO at a time
    pub fn bulk_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let page_left = PAGE_SIZE - page_offset(pos);
            let end = buf.len().min(done + page_left);
            done += self.read_one_fifo(pos, &mut buf[done..end])?;
        }

        self.bus.yield_now();
        Ok(())
    }

    /// Program all of `buf` at `offset`, one FIFO at a time
    pub fn bulk_write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            done += self.write_one_fifo(offset + done as u64, &buf[done..])?;
        }

        self.bus.yield_now();
        Ok(())
    }

    /// Erase one page of `page_size` bytes at `offset`
    ///
    /// `page_size` must be 4, 32 or 64 KiB; anything else is rejected
    /// before the hardware is touched.
    pub fn erase(&mut self, offset: u64, page_size: usize) -> Result<()> {
        let size = match PageSize::from_bytes(page_size) {
            Some(size) => size,
            None => {
                log::error!("invalid erase size {:#x}", page_size);
                return Err(Error::InvalidEraseSize(page_size));
            }
        };
        self.erase_page(offset, size)
    }

    /// Erase the page of `size` starting at `offset`
    pub fn erase_page(&mut self, offset: u64, size: PageSize) -> Result<()> {
        if !size.is_aligned(offset) {
            log::error!("erase offset {:#x} is not {:#x} aligned", offset, size.bytes());
            return Err(Error::InvalidAlignment);
        }

        let addr = FlashAddr::from_offset(offset);
        self.set_active_slave(addr.slave)?;
        self.bus.wait_until_ready()?;

        let header_len = self.build_header(size.erase_opcode(), addr)?;
        self.bus.enable_write()?;
        self.bus.transaction(&mut self.io_buf[..header_len], false)?;

        log::debug!("erasing {:#x} bytes at {:#x}", size.bytes(), offset);
        self.bus.wait_until_ready()
    }

    /// Erase and program a whole page taken from the front of `src`
    ///
    /// Tries 64, 32 and 4 KiB pages in that order. Returns
    /// [`PageProgram::NotApplicable`] if `offset` is not aligned to a page
    /// that `src` fully covers.
    pub fn page_program_full(&mut self, offset: u64, src: &[u8]) -> Result<PageProgram> {
        let size = match PageSize::for_span(offset, src.len()) {
            Some(size) => size,
            None => return Ok(PageProgram::NotApplicable),
        };
        let len = size.bytes();

        self.erase_page(offset, size)?;
        self.bulk_write(offset, &src[..len])?;

        Ok(PageProgram::Programmed(len))
    }

    /// Program the part of `src` that falls into the 4 KiB page at `offset`
    ///
    /// Bytes of that page outside the written range are read back into
    /// `scratch` first and programmed again after the erase. Returns the
    /// number of bytes of `src` consumed.
    pub fn page_program_rmw(
        &mut self,
        offset: u64,
        src: &[u8],
        scratch: &mut [u8; PAGE_SIZE],
    ) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }

        let base = page_align(offset);
        let front = page_offset(offset);
        let len = src.len().min(PAGE_SIZE - front);
        let back = front + len;

        if front > 0 {
            self.bulk_read(base, &mut scratch[..front])?;
        }
        if back < PAGE_SIZE {
            self.bulk_read(base + back as u64, &mut scratch[back..])?;
        }
        scratch[front..back].copy_from_slice(&src[..len]);

        self.erase_page(base, PageSize::Page)?;
        self.bulk_write(base, &scratch[..])?;

        Ok(len)
    }

    /// Program as much of `src` at `offset` as one page operation allows
    ///
    /// Uses a full page program where possible and falls back to
    /// read-modify-write otherwise. Returns the number of bytes consumed.
    pub fn program(
        &mut self,
        offset: u64,
        src: &[u8],
        scratch: &mut [u8; PAGE_SIZE],
    ) -> Result<usize> {
        match self.page_program_full(offset, src)? {
            PageProgram::Programmed(len) => Ok(len),
            PageProgram::NotApplicable => self.page_program_rmw(offset, src, scratch),
        }
    }
}
