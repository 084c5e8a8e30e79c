//! QSPI transaction engine
//!
//! A transaction is the unit of work on the bus:
//!
//! 1. reset both FIFOs
//! 2. assert the active slave
//! 3. push the command bytes into the TX FIFO and run one burst
//! 4. pull the same number of bytes back out of the RX FIFO
//! 5. deassert every slave
//!
//! The controller is full duplex: for every byte clocked out one byte is
//! clocked in, so the RX FIFO always has to be drained, even for commands
//! whose response is meaningless.

use crate::error::{Error, Result, WaitTarget};
use crate::poll::{Delay, PollBudget};
use crate::regs::{
    Control, Register, RegisterIo, Registers, Status, MAX_SLAVES, SLAVE_SELECT_NONE,
    SOFT_RESET_KEY,
};

/// Upper bound on bytes pushed while probing the FIFO depth
const FIFO_PROBE_LIMIT: usize = 64 * 1024;

/// Byte-level access to the controller FIFOs
pub struct QspiBus<B> {
    regs: Registers<B>,
    budget: PollBudget,
    fifo_depth: usize,
    slave: u8,
}

impl<B: RegisterIo> Delay for QspiBus<B> {
    fn delay_us(&mut self, us: u32) {
        self.regs.delay_us(us);
    }
}

impl<B: RegisterIo> QspiBus<B> {
    /// Create a bus over a register block
    ///
    /// The FIFO depth is unknown (zero) until [`Self::discover_fifo_depth`]
    /// has run, so no transaction can succeed before that.
    pub fn new(io: B, budget: PollBudget) -> Self {
        Self {
            regs: Registers::new(io),
            budget,
            fifo_depth: 0,
            slave: 0,
        }
    }

    /// Discovered FIFO depth in bytes
    pub fn fifo_depth(&self) -> usize {
        self.fifo_depth
    }

    /// Slave used by the next transaction
    pub fn slave(&self) -> u8 {
        self.slave
    }

    /// Select the slave used by subsequent transactions
    ///
    /// The index is validated when the next transaction starts.
    pub fn set_slave(&mut self, slave: u8) {
        self.slave = slave;
    }

    /// Busy-wait budget used by every poll on this bus
    pub fn budget(&self) -> PollBudget {
        self.budget
    }

    /// Borrow the raw register block
    pub fn io(&self) -> &B {
        self.regs.io()
    }

    /// Mutably borrow the raw register block
    pub fn io_mut(&mut self) -> &mut B {
        self.regs.io_mut()
    }

    /// Release the raw register block
    pub fn into_inner(self) -> B {
        self.regs.into_inner()
    }

    /// Pulse the controller soft reset
    pub fn soft_reset(&mut self) {
        self.regs.write(Register::Reset, SOFT_RESET_KEY);
    }

    /// Program the attach-time control state
    pub fn init_control(&mut self) {
        self.regs.set_control(Control::INIT_STATE);
    }

    /// Give up the processor
    pub fn yield_now(&mut self) {
        self.regs.yield_now();
    }

    fn check_errors(&mut self) -> Result<()> {
        let status = self.regs.status();
        if status.has_error() {
            log::error!("QSPI error status: 0x{:x}", status.bits());
            return Err(Error::Protocol {
                status: status.bits(),
            });
        }
        Ok(())
    }

    /// Reset both RX and TX FIFO
    ///
    /// Does nothing if both FIFOs already report empty.
    pub fn reset_fifos(&mut self) -> Result<()> {
        if self.regs.status() & Status::FIFO_MASK == Status::FIFOS_EMPTY {
            return Ok(());
        }

        let ctrl = self.regs.control();
        self.regs
            .set_control(ctrl | Control::TXFIFO_RESET | Control::RXFIFO_RESET);

        let budget = self.budget;
        if budget
            .wait(self, |bus| {
                bus.regs.status() & Status::FIFO_MASK == Status::FIFOS_EMPTY
            })
            .is_none()
        {
            let status = self.regs.status();
            log::error!("failed to reset FIFO, status: 0x{:x}", status.bits());
            return Err(Error::Timeout(WaitTarget::FifoReset));
        }
        Ok(())
    }

    /// Drive the slave-select register
    ///
    /// Slave select is active low: the selected chip's bit is cleared and
    /// every other bit stays set. `None`, or an index without a chip
    /// select line, deselects every chip.
    pub fn activate_slave(&mut self, slave: Option<u8>) {
        let value = match slave {
            Some(index) if index < MAX_SLAVES => !(1u32 << index),
            Some(index) => {
                log::error!("no chip select line for slave {}", index);
                SLAVE_SELECT_NONE
            }
            None => SLAVE_SELECT_NONE,
        };
        self.regs.write(Register::SlaveSelect, value);
    }

    /// Push `buf` through the TX FIFO in one burst
    pub fn transmit(&mut self, buf: &[u8]) -> Result<()> {
        if buf.len() > self.fifo_depth {
            return Err(Error::TransferTooLarge {
                len: buf.len(),
                fifo_depth: self.fifo_depth,
            });
        }

        let ctrl = self.regs.control();

        // Stop transferring to the flash while the FIFO fills up
        self.regs.set_control(ctrl | Control::TRANS_INHIBIT);
        for &byte in buf {
            self.regs.send8(byte);
        }

        // Start the burst
        self.regs.set_control(ctrl - Control::TRANS_INHIBIT);

        let budget = self.budget;
        let drained = budget.wait(self, |bus| {
            bus.regs
                .status()
                .intersects(Status::TX_EMPTY | Status::ERRORS)
        });

        self.regs.set_control(ctrl | Control::TRANS_INHIBIT);

        if drained.is_none() {
            let status = self.regs.status();
            if status.has_error() {
                log::error!("QSPI write failed, status: 0x{:x}", status.bits());
                return Err(Error::Protocol {
                    status: status.bits(),
                });
            }
            log::error!("QSPI write timeout, status: 0x{:x}", status.bits());
            return Err(Error::Timeout(WaitTarget::TxDrain));
        }

        self.check_errors()
    }

    /// Pull exactly `len` bytes out of the RX FIFO
    ///
    /// With `buf` set to `None` the bytes are drained and discarded. The RX
    /// FIFO must hold exactly `len` bytes. A `buf` shorter than `len` is
    /// rejected before anything is pulled.
    pub fn receive(&mut self, mut buf: Option<&mut [u8]>, len: usize) -> Result<()> {
        if let Some(out) = buf.as_deref() {
            if out.len() < len {
                return Err(Error::BufferTooSmall {
                    needed: len,
                    available: out.len(),
                });
            }
        }

        for cnt in 0..len {
            if self.regs.status().contains(Status::RX_EMPTY) {
                return Err(Error::RxUnderflow {
                    expected: len,
                    received: cnt,
                });
            }

            let byte = self.regs.read8();
            if let Some(out) = buf.as_mut() {
                out[cnt] = byte;
            }
        }

        if !self.regs.status().contains(Status::RX_EMPTY) {
            log::error!("failed to drain RX fifo");
            return Err(Error::RxOverflow);
        }

        self.check_errors()
    }

    /// Run one complete transaction on the active slave
    ///
    /// With `want_output` the received bytes overwrite `buf`. Every slave is
    /// deselected before returning, whether or not the transfer succeeded.
    pub fn transaction(&mut self, buf: &mut [u8], want_output: bool) -> Result<()> {
        if buf.len() > self.fifo_depth {
            return Err(Error::TransferTooLarge {
                len: buf.len(),
                fifo_depth: self.fifo_depth,
            });
        }

        self.reset_fifos()?;

        if self.slave >= MAX_SLAVES {
            return Err(Error::SlaveOutOfRange(self.slave));
        }
        self.activate_slave(Some(self.slave));

        let ret = self.transfer(buf, want_output);

        self.activate_slave(None);
        ret
    }

    fn transfer(&mut self, buf: &mut [u8], want_output: bool) -> Result<()> {
        self.transmit(buf)?;

        let len = buf.len();
        if want_output {
            self.receive(Some(buf), len)
        } else {
            // The FIFO has to be drained even when the data is not wanted
            if let Err(e) = self.receive(None, len) {
                log::debug!("ignoring RX drain failure: {}", e);
            }
            Ok(())
        }
    }

    /// Measure the TX FIFO depth
    ///
    /// Fills the TX FIFO with `filler` while transfers are inhibited until
    /// the controller reports it full, then restores the control register
    /// and empties the FIFOs again.
    pub fn discover_fifo_depth(&mut self, filler: u8) -> Result<usize> {
        self.reset_fifos()?;

        let ctrl = self.regs.control();
        self.regs.set_control(ctrl | Control::TRANS_INHIBIT);

        let mut depth = 0;
        while !self
            .regs
            .status()
            .intersects(Status::TX_FULL | Status::ERRORS)
        {
            if depth == FIFO_PROBE_LIMIT {
                log::error!("TX FIFO never reported full after {} bytes", depth);
                self.regs.set_control(ctrl);
                return Err(Error::FifoProbeFailed);
            }
            self.regs.send8(filler);
            depth += 1;
        }

        // Make sure the controller is still in good shape
        let status = self.regs.status();
        if status.has_error() {
            log::error!("FIFO probe failed, status: 0x{:x}", status.bits());
            self.regs.set_control(ctrl);
            return Err(Error::FifoProbeFailed);
        }

        self.regs.set_control(ctrl);
        self.reset_fifos()?;

        if depth == 0 {
            return Err(Error::FifoProbeFailed);
        }
        self.fifo_depth = depth;
        log::debug!("QSPI FIFO depth is: {}", depth);
        Ok(depth)
    }
}
