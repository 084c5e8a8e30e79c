//! QSPI controller instance
//!
//! A [`QspiController`] owns one register block and everything the driver
//! learns about it at attach: the FIFO depth, the flash vendor and the
//! per-slave capacity. It also carries the state that is cached between
//! commands (the selected extended-address sector and the active slave) and
//! the scratch buffer every transaction is built in.
//!
//! The controller itself is not synchronised. The stream façade wraps it in
//! a mutex; direct users must provide their own exclusion.

use alloc::vec::Vec;

use crate::command::HEADER_LEN;
use crate::config::Tuning;
use crate::error::{Error, Result};
use crate::regs::{RegisterIo, MAX_SLAVES};
use crate::transaction::QspiBus;
use crate::vendor::Vendor;

/// Cached sector value meaning "nothing selected yet"
pub const SECTOR_NONE: u8 = 0xff;

/// A probed QSPI flash controller
pub struct QspiController<B> {
    pub(crate) bus: QspiBus<B>,
    pub(crate) io_buf: Vec<u8>,
    pub(crate) curr_sector: u8,
    pub(crate) vendor: Vendor,
    pub(crate) capacity: u64,
    pub(crate) tuning: Tuning,
}

impl<B: RegisterIo> QspiController<B> {
    /// Initialise the controller and identify the attached flash
    ///
    /// Programs the control register, measures the FIFO depth, waits for
    /// the flash to become ready and reads its ID. Any failure leaves no
    /// usable controller behind.
    pub fn attach(io: B, tuning: Tuning) -> Result<Self> {
        let mut bus = QspiBus::new(io, tuning.poll_budget());

        if tuning.soft_reset_on_attach {
            log::debug!("pulsing QSPI soft reset");
            bus.soft_reset();
        }
        bus.init_control();
        bus.set_slave(0);

        let fifo_depth = bus.discover_fifo_depth(tuning.fifo_filler)?;
        if fifo_depth <= HEADER_LEN + tuning.read_dummy_len {
            log::error!(
                "FIFO depth {} leaves no room for read data after {} header bytes",
                fifo_depth,
                HEADER_LEN + tuning.read_dummy_len
            );
            return Err(Error::FifoProbeFailed);
        }

        bus.wait_until_ready()?;
        let (vendor, capacity) = bus.probe_vendor_and_capacity()?;

        let io_buf = alloc_buffer(fifo_depth)?;

        log::info!(
            "QSPI flash: {} ({} bytes), FIFO depth {}",
            vendor,
            capacity,
            fifo_depth
        );

        Ok(Self {
            bus,
            io_buf,
            curr_sector: SECTOR_NONE,
            vendor,
            capacity,
            tuning,
        })
    }

    /// Per-slave flash capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Flash vendor resolved at attach
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Discovered FIFO depth in bytes
    pub fn fifo_depth(&self) -> usize {
        self.bus.fifo_depth()
    }

    /// Tuning values this controller was attached with
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Extended-address sector currently selected on the flash
    pub fn current_sector(&self) -> u8 {
        self.curr_sector
    }

    /// Slave addressed by subsequent commands
    pub fn active_slave(&self) -> u8 {
        self.bus.slave()
    }

    /// Address subsequent commands to `slave`
    ///
    /// Each chip has its own extended-address register, so switching chips
    /// forgets the cached sector.
    pub fn set_active_slave(&mut self, slave: u8) -> Result<()> {
        if slave >= MAX_SLAVES {
            return Err(Error::SlaveOutOfRange(slave));
        }
        if self.bus.slave() != slave {
            log::debug!("switching to slave {}", slave);
            self.bus.set_slave(slave);
            self.curr_sector = SECTOR_NONE;
        }
        Ok(())
    }

    /// Transaction engine, for issuing raw commands
    pub fn bus_mut(&mut self) -> &mut QspiBus<B> {
        &mut self.bus
    }

    /// Borrow the raw register block
    pub fn io(&self) -> &B {
        self.bus.io()
    }

    /// Mutably borrow the raw register block
    pub fn io_mut(&mut self) -> &mut B {
        self.bus.io_mut()
    }

    /// Release the register block
    pub fn into_inner(self) -> B {
        self.bus.into_inner()
    }
}

/// Allocate a zeroed buffer, reporting failure instead of aborting
pub(crate) fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed)?;
    buf.resize(len, 0);
    Ok(buf)
}
