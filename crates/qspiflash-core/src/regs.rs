//! QSPI controller register definitions and traced register access
//!
//! The controller exposes one 32-bit register block. Only six registers are
//! used by the driver; everything else in the block is padding.
//!
//! | Offset | Register      |
//! |--------|---------------|
//! | 0x40   | soft reset    |
//! | 0x60   | control       |
//! | 0x64   | status        |
//! | 0x68   | TX data       |
//! | 0x6C   | RX data       |
//! | 0x70   | slave select  |

use bitflags::bitflags;

/// Maximum number of flash chips behind one controller
pub const MAX_SLAVES: u8 = 2;

/// Slave-select value with every chip deselected (active-low one-hot)
pub const SLAVE_SELECT_NONE: u32 = (1 << MAX_SLAVES) - 1;

/// Value written to the reset register to pulse a controller soft reset
pub const SOFT_RESET_KEY: u32 = 0x0000_000A;

/// Size of the mapped register block in bytes
pub const REGISTER_BLOCK_SIZE: usize = 0x80;

/// A register in the QSPI controller block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Software reset register
    Reset,
    /// Control register
    Control,
    /// Status register
    Status,
    /// TX FIFO data register
    Tx,
    /// RX FIFO data register
    Rx,
    /// Slave select register
    SlaveSelect,
}

impl Register {
    /// Byte offset of the register from the block base
    pub const fn offset(self) -> usize {
        match self {
            Self::Reset => 0x40,
            Self::Control => 0x60,
            Self::Status => 0x64,
            Self::Tx => 0x68,
            Self::Rx => 0x6C,
            Self::SlaveSelect => 0x70,
        }
    }

    /// Symbolic name used in register traces
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "qspi_reset",
            Self::Control => "qspi_ctrl",
            Self::Status => "qspi_status",
            Self::Tx => "qspi_tx",
            Self::Rx => "qspi_rx",
            Self::SlaveSelect => "qspi_slave",
        }
    }

    /// Look up a register by its byte offset
    pub fn from_offset(offset: usize) -> Option<Self> {
        [
            Self::Reset,
            Self::Control,
            Self::Status,
            Self::Tx,
            Self::Rx,
            Self::SlaveSelect,
        ]
        .into_iter()
        .find(|reg| reg.offset() == offset)
    }
}

bitflags! {
    /// Control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control: u32 {
        /// Local loopback mode
        const LOOPBACK         = 1 << 0;
        /// SPI system enable
        const ENABLED          = 1 << 1;
        /// Master mode
        const MASTER_MODE      = 1 << 2;
        /// Clock polarity
        const CLK_POLARITY     = 1 << 3;
        /// Clock phase
        const CLK_PHASE        = 1 << 4;
        /// TX FIFO reset (self-clearing)
        const TXFIFO_RESET     = 1 << 5;
        /// RX FIFO reset (self-clearing)
        const RXFIFO_RESET     = 1 << 6;
        /// Manual slave select assertion
        const MANUAL_SLAVE_SEL = 1 << 7;
        /// Master transaction inhibit
        const TRANS_INHIBIT    = 1 << 8;
        /// LSB first transfer format
        const LSB_FIRST        = 1 << 9;

        /// Control value programmed at attach
        const INIT_STATE = Self::TRANS_INHIBIT.bits()
            | Self::MANUAL_SLAVE_SEL.bits()
            | Self::RXFIFO_RESET.bits()
            | Self::TXFIFO_RESET.bits()
            | Self::ENABLED.bits()
            | Self::MASTER_MODE.bits();
    }
}

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        /// RX FIFO empty
        const RX_EMPTY       = 1 << 0;
        /// RX FIFO full
        const RX_FULL        = 1 << 1;
        /// TX FIFO empty
        const TX_EMPTY       = 1 << 2;
        /// TX FIFO full
        const TX_FULL        = 1 << 3;
        /// Mode fault error
        const MODE_ERR       = 1 << 4;
        /// Slave mode select
        const SLAVE_MODE     = 1 << 5;
        /// CPOL/CPHA configuration error
        const CPOL_CPHA_ERR  = 1 << 6;
        /// Slave mode error
        const SLAVE_MODE_ERR = 1 << 7;
        /// MSB/LSB first error
        const MSB_ERR        = 1 << 8;
        /// Loopback error
        const LOOPBACK_ERR   = 1 << 9;
        /// Command error
        const CMD_ERR        = 1 << 10;

        /// All error bits
        const ERRORS = Self::CMD_ERR.bits()
            | Self::LOOPBACK_ERR.bits()
            | Self::MSB_ERR.bits()
            | Self::SLAVE_MODE_ERR.bits()
            | Self::CPOL_CPHA_ERR.bits()
            | Self::MODE_ERR.bits();

        /// FIFO occupancy bits
        const FIFO_MASK = Self::TX_FULL.bits()
            | Self::RX_FULL.bits()
            | Self::TX_EMPTY.bits()
            | Self::RX_EMPTY.bits();

        /// Both FIFOs idle
        const FIFOS_EMPTY = Self::TX_EMPTY.bits() | Self::RX_EMPTY.bits();
    }
}

impl Status {
    /// Returns true if any error bit is set
    pub fn has_error(self) -> bool {
        self.intersects(Self::ERRORS)
    }
}

/// Raw access to a mapped QSPI register block
///
/// Implementations perform direct, ordered, non-buffered 32-bit accesses.
/// A failed mapping is reported when the implementation is constructed, so
/// the accessors themselves cannot fail.
pub trait RegisterIo {
    /// Read the 32-bit register at `offset` bytes from the block base
    fn read32(&mut self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset` bytes from the block base
    fn write32(&mut self, offset: usize, value: u32);

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Give up the processor between long transfers
    fn yield_now(&mut self) {}
}

impl<T: RegisterIo + ?Sized> RegisterIo for &mut T {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn yield_now(&mut self) {
        (**self).yield_now()
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for alloc::boxed::Box<T> {
    fn read32(&mut self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn yield_now(&mut self) {
        (**self).yield_now()
    }
}

/// Typed, traced view of a register block
///
/// Every access is logged at `trace` level with the symbolic register name.
pub struct Registers<B> {
    io: B,
}

impl<B: RegisterIo> Registers<B> {
    /// Wrap a raw register block
    pub fn new(io: B) -> Self {
        Self { io }
    }

    /// Read a register
    #[inline]
    pub fn read(&mut self, reg: Register) -> u32 {
        let val = self.io.read32(reg.offset());
        log::trace!("REG_RD({})=0x{:x}", reg.name(), val);
        val
    }

    /// Write a register
    #[inline]
    pub fn write(&mut self, reg: Register, val: u32) {
        log::trace!("REG_WR({},0x{:x})", reg.name(), val);
        self.io.write32(reg.offset(), val);
    }

    /// Read the status register
    pub fn status(&mut self) -> Status {
        Status::from_bits_retain(self.read(Register::Status))
    }

    /// Read the control register
    pub fn control(&mut self) -> Control {
        Control::from_bits_retain(self.read(Register::Control))
    }

    /// Write the control register
    pub fn set_control(&mut self, ctrl: Control) {
        self.write(Register::Control, ctrl.bits());
    }

    /// Push one byte into the TX FIFO (8-bit data width only)
    pub fn send8(&mut self, val: u8) {
        self.write(Register::Tx, val as u32);
    }

    /// Pull one byte from the RX FIFO (8-bit data width only)
    pub fn read8(&mut self) -> u8 {
        self.read(Register::Rx) as u8
    }

    /// Delay for the specified number of microseconds
    pub fn delay_us(&mut self, us: u32) {
        self.io.delay_us(us);
    }

    /// Give up the processor
    pub fn yield_now(&mut self) {
        self.io.yield_now();
    }

    /// Borrow the raw register block
    pub fn io(&self) -> &B {
        &self.io
    }

    /// Mutably borrow the raw register block
    pub fn io_mut(&mut self) -> &mut B {
        &mut self.io
    }

    /// Release the raw register block
    pub fn into_inner(self) -> B {
        self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_offsets_round_trip() {
        for reg in [
            Register::Reset,
            Register::Control,
            Register::Status,
            Register::Tx,
            Register::Rx,
            Register::SlaveSelect,
        ] {
            assert_eq!(Register::from_offset(reg.offset()), Some(reg));
        }
        assert_eq!(Register::from_offset(0x00), None);
    }

    #[test]
    fn test_status_error_bits() {
        assert!(!Status::FIFOS_EMPTY.has_error());
        assert!((Status::TX_EMPTY | Status::CMD_ERR).has_error());
        // Slave mode select is informational, not an error
        assert!(!Status::SLAVE_MODE.has_error());
    }

    #[test]
    fn test_init_state() {
        assert_eq!(Control::INIT_STATE.bits(), 0x1e6);
        assert_eq!(SLAVE_SELECT_NONE, 0b11);
    }
}
