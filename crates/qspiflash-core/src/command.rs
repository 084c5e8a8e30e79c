//! Flash command layer
//!
//! Builds the individual flash commands on top of single transactions.
//! Status polling, write enable and ID reads only need a few bytes and are
//! issued from small stack buffers; addressed commands are framed in the
//! controller's scratch buffer by [`QspiController::build_header`].

use crate::address::FlashAddr;
use crate::controller::QspiController;
use crate::error::{Error, Result, WaitTarget};
use crate::opcodes;
use crate::regs::RegisterIo;
use crate::transaction::QspiBus;
use crate::vendor::Vendor;

/// Length of an addressed command header: opcode plus three address bytes
pub const HEADER_LEN: usize = 4;

/// Length of the ID read transaction
const ID_LEN: usize = 5;

impl<B: RegisterIo> QspiBus<B> {
    /// Returns true if the flash is not busy
    ///
    /// A failed status read counts as busy.
    pub fn is_ready(&mut self) -> bool {
        let mut cmd = [opcodes::RDSR, 0];

        match self.transaction(&mut cmd, true) {
            Ok(()) => cmd[1] & opcodes::SR_WIP == 0,
            Err(e) => {
                log::debug!("status read failed: {}", e);
                false
            }
        }
    }

    /// Poll the flash status until it is no longer busy
    pub fn wait_until_ready(&mut self) -> Result<()> {
        let budget = self.budget();
        if budget.wait(self, |bus| bus.is_ready()).is_none() {
            log::error!("flash device is not ready");
            return Err(Error::Timeout(WaitTarget::DeviceReady));
        }
        Ok(())
    }

    /// Set the write enable latch
    pub fn enable_write(&mut self) -> Result<()> {
        let mut cmd = [opcodes::WREN];
        self.transaction(&mut cmd, false)
    }

    /// Read the raw JEDEC ID bytes
    pub fn read_id(&mut self) -> Result<[u8; ID_LEN]> {
        let mut cmd = [0u8; ID_LEN];
        cmd[0] = opcodes::RDID;
        self.transaction(&mut cmd, true)?;
        Ok(cmd)
    }

    /// Identify the flash vendor and its per-slave capacity
    pub fn probe_vendor_and_capacity(&mut self) -> Result<(Vendor, u64)> {
        let id = self.read_id()?;
        let (vendor_id, code) = (id[1], id[3]);

        let vendor = match Vendor::from_id(vendor_id) {
            Some(vendor) => vendor,
            None => {
                log::error!("unknown flash vendor: 0x{:02x}", vendor_id);
                return Err(Error::UnknownVendor(vendor_id));
            }
        };

        let capacity = match vendor.capacity(code) {
            Some(capacity) => capacity,
            None => {
                log::error!("unknown {} flash memory size code: 0x{:02x}", vendor, code);
                return Err(Error::UnknownCapacity(code));
            }
        };

        log::debug!(
            "flash ID: vendor 0x{:02x}, type 0x{:02x}, size code 0x{:02x}",
            vendor_id,
            id[2],
            code
        );
        Ok((vendor, capacity))
    }
}

impl<B: RegisterIo> QspiController<B> {
    /// Returns true if the active slave is not busy
    pub fn is_ready(&mut self) -> bool {
        self.bus.is_ready()
    }

    /// Wait for the active slave to finish its current operation
    pub fn wait_until_ready(&mut self) -> Result<()> {
        self.bus.wait_until_ready()
    }

    /// Set the write enable latch on the active slave
    pub fn enable_write(&mut self) -> Result<()> {
        self.bus.enable_write()
    }

    /// Program the flash extended-address register
    ///
    /// Skipped when `sector` is already selected. The cache is only updated
    /// once the command went through.
    pub fn select_sector(&mut self, sector: u8) -> Result<()> {
        if self.curr_sector == sector {
            return Ok(());
        }

        self.bus.enable_write()?;
        let mut cmd = [opcodes::WREAR, sector];
        self.bus.transaction(&mut cmd, false)?;

        log::debug!("selected sector {}", sector);
        self.curr_sector = sector;
        Ok(())
    }

    /// Frame an addressed command at the start of the scratch buffer
    ///
    /// Switches to the slave and sector `addr` lives in, then writes the
    /// opcode and the big-endian in-sector address. Returns the header
    /// length.
    pub fn build_header(&mut self, opcode: u8, addr: FlashAddr) -> Result<usize> {
        self.set_active_slave(addr.slave)?;
        self.select_sector(addr.sector)?;

        self.io_buf[0] = opcode;
        self.io_buf[1..HEADER_LEN].copy_from_slice(&addr.address_bytes());
        Ok(HEADER_LEN)
    }
}
