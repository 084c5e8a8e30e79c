//! qspiflash-dummy - In-memory QSPI controller and flash emulator
//!
//! This crate emulates the controller register block together with one
//! NOR flash chip per slave select line. It behaves like the hardware as
//! far as the driver can observe it: byte FIFOs of a fixed depth, a burst
//! started by clearing transfer inhibit, full-duplex responses, a write
//! enable latch, an extended-address register and a busy flag after
//! program and erase.
//!
//! It also keeps statistics (erases, burst lengths, commands sent while
//! the chip was busy) and can inject faults so that error paths can be
//! tested without hardware.

use std::collections::{BTreeMap, VecDeque};

use qspiflash_core::address::{PAGE_SIZE, PROGRAM_PAGE_SIZE, SECTOR_SIZE};
use qspiflash_core::opcodes;
use qspiflash_core::regs::{Control, Register, RegisterIo, Status, MAX_SLAVES, SOFT_RESET_KEY};
use qspiflash_core::Vendor;

/// FIFO depth of the emulated controller unless configured otherwise
pub const DEFAULT_FIFO_DEPTH: usize = 256;

/// Dummy bytes the emulated flash clocks before read data
pub const READ_DUMMY_LEN: usize = 4;

/// Control register value after reset
const CONTROL_RESET_VALUE: u32 = 0x180;

/// Status register: write enable latch
const SR_WEL: u8 = 0x02;

const HEADER_LEN: usize = 4;

/// Configuration for the emulated controller and flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID returned by the ID read
    pub vendor_id: u8,
    /// Memory type byte returned by the ID read
    pub device_type: u8,
    /// Capacity code returned by the ID read
    pub capacity_code: u8,
    /// Depth of the TX and RX FIFOs in bytes
    pub fifo_depth: usize,
    /// Status polls a program or erase keeps the chip busy for
    pub busy_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x20,     // Micron
            device_type: 0xBA,   // MT25QL
            capacity_code: 0x18, // 128 Mbit
            fifo_depth: DEFAULT_FIFO_DEPTH,
            busy_polls: 2,
        }
    }
}

impl DummyConfig {
    /// Emulate a Macronix part with the given capacity code
    pub fn macronix(capacity_code: u8) -> Self {
        Self {
            vendor_id: 0xC2,
            device_type: 0x20,
            capacity_code,
            ..Self::default()
        }
    }

    /// Per-chip capacity implied by the ID bytes
    ///
    /// IDs the driver does not know fall back to one 16 MiB sector.
    pub fn capacity(&self) -> u64 {
        Vendor::from_id(self.vendor_id)
            .and_then(|vendor| vendor.capacity(self.capacity_code))
            .unwrap_or(SECTOR_SIZE)
    }

    fn program_opcode(&self) -> Option<u8> {
        Vendor::from_id(self.vendor_id).map(Vendor::program_opcode)
    }
}

/// A fault to inject into a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The burst never starts, so the TX FIFO never drains
    Stall,
    /// The burst is dropped and these status error bits are raised
    Error(Status),
    /// The burst runs but leaves one extra byte in the RX FIFO
    ExtraRx,
    /// The burst runs but the last response byte never reaches the RX FIFO
    ShortRx,
    /// The burst leaves an extra byte in the RX FIFO that FIFO resets
    /// cannot clear; only a soft reset recovers
    StuckFifo,
}

#[derive(Debug, Clone, Copy)]
struct FaultPlan {
    fault: Fault,
    opcode: Option<u8>,
    skip: usize,
}

/// One executed erase command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRecord {
    /// Slave the erase was sent to
    pub slave: u8,
    /// Chip offset of the erased region
    pub offset: u64,
    /// Erased size in bytes
    pub size: usize,
}

/// Observations collected by the emulator
#[derive(Debug, Clone, Default)]
pub struct DummyStats {
    /// Bursts executed
    pub bursts: usize,
    /// Longest burst seen, in bytes
    pub max_burst_len: usize,
    /// Longest program payload seen, in bytes
    pub max_program_len: usize,
    /// Every erase, in order
    pub erases: Vec<EraseRecord>,
    /// Commands other than status reads sent while the chip was busy
    pub commands_while_busy: usize,
    /// Commands ignored because the write enable latch was clear
    pub rejected_commands: usize,
    /// Soft resets through the reset register
    pub soft_resets: usize,
    /// Total requested delay in microseconds
    pub delayed_us: u64,
}

/// One emulated NOR flash chip
///
/// Storage is sparse: 4 KiB pages that were never programmed read as
/// erased.
struct DummyChip {
    pages: BTreeMap<u64, Box<[u8; PAGE_SIZE]>>,
    capacity: u64,
    write_enabled: bool,
    ext_addr: u8,
    busy: u32,
}

impl DummyChip {
    fn new(capacity: u64) -> Self {
        Self {
            pages: BTreeMap::new(),
            capacity,
            write_enabled: false,
            ext_addr: 0,
            busy: 0,
        }
    }

    fn split(&self, addr: u64) -> (u64, usize) {
        let addr = addr % self.capacity;
        let base = addr - addr % PAGE_SIZE as u64;
        (base, (addr - base) as usize)
    }

    fn read_byte(&self, addr: u64) -> u8 {
        let (base, idx) = self.split(addr);
        self.pages.get(&base).map_or(0xFF, |page| page[idx])
    }

    fn page_mut(&mut self, base: u64) -> &mut [u8; PAGE_SIZE] {
        self.pages
            .entry(base)
            .or_insert_with(|| Box::new([0xFF; PAGE_SIZE]))
    }

    fn store_byte(&mut self, addr: u64, val: u8) {
        let (base, idx) = self.split(addr);
        self.page_mut(base)[idx] = val;
    }

    fn program_byte(&mut self, addr: u64, val: u8) {
        // Programming can only clear bits
        let (base, idx) = self.split(addr);
        self.page_mut(base)[idx] &= val;
    }

    fn erase(&mut self, base: u64, size: usize) {
        for page in (base..base + size as u64).step_by(PAGE_SIZE) {
            self.pages.remove(&(page % self.capacity));
        }
    }

    /// Chip address carried by a command header
    fn address(&self, cmd: &[u8]) -> u64 {
        ((self.ext_addr as u64) << 24)
            | ((cmd[1] as u64) << 16)
            | ((cmd[2] as u64) << 8)
            | cmd[3] as u64
    }

    fn take_write_enable(&mut self) -> bool {
        core::mem::replace(&mut self.write_enabled, false)
    }
}

/// Emulated QSPI controller with its attached flash chips
pub struct DummyQspi {
    config: DummyConfig,
    chips: Vec<DummyChip>,
    control: u32,
    slave_select: u32,
    tx: VecDeque<u8>,
    rx: VecDeque<u8>,
    errors: Status,
    rx_stuck: bool,
    fault: Option<FaultPlan>,
    stats: DummyStats,
}

impl DummyQspi {
    /// Create an emulator with erased flash chips
    pub fn new(config: DummyConfig) -> Self {
        let capacity = config.capacity();
        Self {
            chips: (0..MAX_SLAVES).map(|_| DummyChip::new(capacity)).collect(),
            config,
            control: CONTROL_RESET_VALUE,
            slave_select: !0,
            tx: VecDeque::new(),
            rx: VecDeque::new(),
            errors: Status::empty(),
            rx_stuck: false,
            fault: None,
            stats: DummyStats::default(),
        }
    }

    /// Create an emulator with the default configuration (16 MiB Micron)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Statistics collected so far
    pub fn stats(&self) -> &DummyStats {
        &self.stats
    }

    /// Current slave-select register value
    pub fn slave_select(&self) -> u32 {
        self.slave_select
    }

    /// Current control register value
    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.control)
    }

    /// Copy flash contents of `slave` at chip offset `offset` into `buf`
    pub fn read_flash(&self, slave: u8, offset: u64, buf: &mut [u8]) {
        let chip = &self.chips[slave as usize];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = chip.read_byte(offset + i as u64);
        }
    }

    /// Flash contents of `slave` at chip offset `offset`
    pub fn contents(&self, slave: u8, offset: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.read_flash(slave, offset, &mut buf);
        buf
    }

    /// Overwrite flash contents directly, bypassing program semantics
    pub fn load(&mut self, slave: u8, offset: u64, data: &[u8]) {
        let chip = &mut self.chips[slave as usize];
        for (i, &byte) in data.iter().enumerate() {
            chip.store_byte(offset + i as u64, byte);
        }
    }

    /// Keep `slave` busy for the next `polls` status reads
    pub fn set_busy(&mut self, slave: u8, polls: u32) {
        self.chips[slave as usize].busy = polls;
    }

    /// Inject `fault` into the next burst
    pub fn fail_next_burst(&mut self, fault: Fault) {
        self.fault = Some(FaultPlan {
            fault,
            opcode: None,
            skip: 0,
        });
    }

    /// Inject `fault` into a burst starting with `opcode`, after letting
    /// `skip` such bursts through
    pub fn fail_opcode(&mut self, opcode: u8, skip: usize, fault: Fault) {
        self.fault = Some(FaultPlan {
            fault,
            opcode: Some(opcode),
            skip,
        });
    }

    fn status(&self) -> Status {
        let mut status = self.errors;
        if self.rx.is_empty() {
            status |= Status::RX_EMPTY;
        }
        if self.rx.len() >= self.config.fifo_depth {
            status |= Status::RX_FULL;
        }
        if self.tx.is_empty() {
            status |= Status::TX_EMPTY;
        }
        if self.tx.len() >= self.config.fifo_depth {
            status |= Status::TX_FULL;
        }
        status
    }

    fn soft_reset(&mut self) {
        self.control = CONTROL_RESET_VALUE;
        self.slave_select = !0;
        self.tx.clear();
        self.rx.clear();
        self.errors = Status::empty();
        self.rx_stuck = false;
        self.stats.soft_resets += 1;
    }

    fn write_control(&mut self, value: u32) {
        let ctrl = Control::from_bits_retain(value);
        if ctrl.contains(Control::TXFIFO_RESET) {
            self.tx.clear();
        }
        if ctrl.contains(Control::RXFIFO_RESET) && !self.rx_stuck {
            self.rx.clear();
        }

        let was_inhibited = self.control().contains(Control::TRANS_INHIBIT);
        // FIFO reset bits are self-clearing
        self.control = (ctrl - Control::TXFIFO_RESET - Control::RXFIFO_RESET).bits();

        let running = ctrl.contains(Control::ENABLED | Control::MASTER_MODE)
            && !ctrl.contains(Control::TRANS_INHIBIT);
        if was_inhibited && running && !self.tx.is_empty() {
            self.run_burst();
        }
    }

    fn selected_slave(&self) -> Option<usize> {
        let active = !self.slave_select & ((1 << MAX_SLAVES) - 1);
        if active.count_ones() == 1 {
            Some(active.trailing_zeros() as usize)
        } else {
            None
        }
    }

    fn take_fault(&mut self, opcode: u8) -> Option<Fault> {
        let plan = self.fault.as_mut()?;
        if plan.opcode.is_some_and(|op| op != opcode) {
            return None;
        }
        if plan.skip > 0 {
            plan.skip -= 1;
            return None;
        }
        self.fault.take().map(|plan| plan.fault)
    }

    fn run_burst(&mut self) {
        self.errors = Status::empty();

        let opcode = self.tx.front().copied().unwrap_or(0);
        let fault = self.take_fault(opcode);
        match fault {
            Some(Fault::Stall) => {
                log::debug!("dummy: stalling burst 0x{:02x}", opcode);
                return;
            }
            Some(Fault::Error(bits)) => {
                log::debug!("dummy: failing burst 0x{:02x}", opcode);
                self.tx.clear();
                self.errors = bits;
                return;
            }
            _ => {}
        }

        let burst: Vec<u8> = self.tx.drain(..).collect();
        self.stats.bursts += 1;
        self.stats.max_burst_len = self.stats.max_burst_len.max(burst.len());

        let response = match self.selected_slave() {
            Some(slave) => self.execute(slave, &burst),
            None => vec![0xFF; burst.len()],
        };
        self.rx.extend(response);

        match fault {
            Some(Fault::ExtraRx) => self.rx.push_back(0),
            Some(Fault::ShortRx) => {
                self.rx.pop_back();
            }
            Some(Fault::StuckFifo) => {
                self.rx.push_back(0);
                self.rx_stuck = true;
            }
            _ => {}
        }
    }

    fn execute(&mut self, slave: usize, cmd: &[u8]) -> Vec<u8> {
        let mut resp = vec![0u8; cmd.len()];
        let program_opcode = self.config.program_opcode();
        let chip = &mut self.chips[slave];
        let stats = &mut self.stats;
        let opcode = cmd[0];

        if chip.busy > 0 && opcode != opcodes::RDSR {
            log::warn!("dummy: opcode 0x{:02x} sent while busy", opcode);
            stats.commands_while_busy += 1;
            return resp;
        }

        match opcode {
            opcodes::RDSR => {
                let mut sr = 0;
                if chip.busy > 0 {
                    sr |= opcodes::SR_WIP;
                    chip.busy -= 1;
                }
                if chip.write_enabled {
                    sr |= SR_WEL;
                }
                resp[1..].fill(sr);
            }

            opcodes::WREN => chip.write_enabled = true,

            opcodes::RDID => {
                let id = [
                    0,
                    self.config.vendor_id,
                    self.config.device_type,
                    self.config.capacity_code,
                ];
                for (out, &byte) in resp.iter_mut().zip(id.iter()).skip(1) {
                    *out = byte;
                }
            }

            opcodes::WREAR if cmd.len() >= 2 => {
                if chip.take_write_enable() {
                    chip.ext_addr = cmd[1];
                } else {
                    stats.rejected_commands += 1;
                }
            }

            opcodes::QOR if cmd.len() > HEADER_LEN + READ_DUMMY_LEN => {
                let addr = chip.address(cmd);
                let data_start = HEADER_LEN + READ_DUMMY_LEN;
                for (i, out) in resp[data_start..].iter_mut().enumerate() {
                    *out = chip.read_byte(addr + i as u64);
                }
            }

            op if Some(op) == program_opcode && cmd.len() > HEADER_LEN => {
                if !chip.take_write_enable() {
                    stats.rejected_commands += 1;
                    return resp;
                }
                let addr = chip.address(cmd);
                let data = &cmd[HEADER_LEN..];
                stats.max_program_len = stats.max_program_len.max(data.len());

                // Addresses wrap inside the program page
                let page = PROGRAM_PAGE_SIZE as u64;
                let base = addr - addr % page;
                for (i, &byte) in data.iter().enumerate() {
                    chip.program_byte(base + (addr + i as u64) % page, byte);
                }
                chip.busy = self.config.busy_polls;
            }

            opcodes::SE_4K | opcodes::BE_32K | opcodes::SE_64K if cmd.len() >= HEADER_LEN => {
                let size = match opcode {
                    opcodes::SE_4K => 4 * 1024,
                    opcodes::BE_32K => 32 * 1024,
                    _ => 64 * 1024,
                };
                if !chip.take_write_enable() {
                    stats.rejected_commands += 1;
                    return resp;
                }
                let addr = chip.address(cmd);
                let base = addr - addr % size as u64;
                chip.erase(base, size);
                stats.erases.push(EraseRecord {
                    slave: slave as u8,
                    offset: base,
                    size,
                });
                chip.busy = self.config.busy_polls;
            }

            _ => log::warn!("dummy: unsupported command 0x{:02x}", opcode),
        }

        resp
    }
}

impl RegisterIo for DummyQspi {
    fn read32(&mut self, offset: usize) -> u32 {
        match Register::from_offset(offset) {
            Some(Register::Control) => self.control,
            Some(Register::Status) => self.status().bits(),
            Some(Register::Rx) => self.rx.pop_front().map_or(0, u32::from),
            Some(Register::SlaveSelect) => self.slave_select,
            _ => 0,
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        match Register::from_offset(offset) {
            Some(Register::Reset) if value == SOFT_RESET_KEY => self.soft_reset(),
            Some(Register::Control) => self.write_control(value),
            Some(Register::Tx) => {
                if self.tx.len() < self.config.fifo_depth {
                    self.tx.push_back(value as u8);
                }
            }
            Some(Register::SlaveSelect) => self.slave_select = value,
            _ => {}
        }
    }

    fn delay_us(&mut self, us: u32) {
        // No delay needed for in-memory operations
        self.stats.delayed_us += us as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qspiflash_core::error::{Error, WaitTarget};
    use qspiflash_core::regs::SLAVE_SELECT_NONE;
    use qspiflash_core::{Attribute, FlashReader, PartialWrite, QspiController, QspiFlash, Tuning};
    use std::io::{Read, Seek, SeekFrom, Write};

    const MIB16: u64 = 16 * 1024 * 1024;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    fn attach(emu: DummyQspi) -> QspiFlash<DummyQspi> {
        QspiFlash::attach(emu, Tuning::default()).unwrap()
    }

    fn controller(emu: DummyQspi) -> QspiController<DummyQspi> {
        QspiController::attach(emu, Tuning::default()).unwrap()
    }

    fn into_emulator(flash: QspiFlash<DummyQspi>) -> DummyQspi {
        flash.into_inner().into_inner()
    }

    fn erase_log(emu: &DummyQspi) -> Vec<(u64, usize)> {
        emu.stats()
            .erases
            .iter()
            .map(|e| (e.offset, e.size))
            .collect()
    }

    #[test]
    fn test_attach_identifies_flash() {
        let flash = attach(DummyQspi::new_default());
        assert_eq!(flash.capacity(), MIB16);
        assert_eq!(flash.vendor(), Vendor::Micron);
        assert_eq!(flash.fifo_depth(), DEFAULT_FIFO_DEPTH);

        let ctrl = flash.into_inner();
        assert_eq!(ctrl.current_sector(), 0xff);
        let emu = ctrl.into_inner();
        assert_eq!(emu.slave_select(), SLAVE_SELECT_NONE);
        assert!(emu.control().contains(Control::TRANS_INHIBIT));
    }

    #[test]
    fn test_attach_macronix() {
        let flash = attach(DummyQspi::new(DummyConfig::macronix(0x39)));
        assert_eq!(flash.vendor(), Vendor::Macronix);
        assert_eq!(flash.capacity(), 2 * MIB16);

        let data = pattern(300, 7);
        assert_eq!(flash.write(0x100, &data), Ok(300));
        let mut buf = vec![0; 300];
        assert_eq!(flash.read(0x100, &mut buf).unwrap(), 300);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_attach_waits_for_busy_flash() {
        let mut emu = DummyQspi::new_default();
        emu.set_busy(0, 10);
        let emu = into_emulator(attach(emu));
        assert_eq!(emu.stats().commands_while_busy, 0);
        assert!(emu.stats().delayed_us > 0);
    }

    #[test]
    fn test_soft_reset_on_attach() {
        let tuning = Tuning {
            soft_reset_on_attach: true,
            ..Tuning::default()
        };
        let flash = QspiFlash::attach(DummyQspi::new_default(), tuning).unwrap();
        assert_eq!(into_emulator(flash).stats().soft_resets, 1);

        let emu = into_emulator(attach(DummyQspi::new_default()));
        assert_eq!(emu.stats().soft_resets, 0);
    }

    #[test]
    fn test_unknown_vendor_fails_attach() {
        let config = DummyConfig {
            vendor_id: 0xEF,
            ..DummyConfig::default()
        };
        let result = QspiFlash::attach(DummyQspi::new(config), Tuning::default());
        assert!(matches!(result, Err(Error::UnknownVendor(0xEF))));
    }

    #[test]
    fn test_unknown_capacity_fails_attach() {
        let config = DummyConfig {
            capacity_code: 0x30,
            ..DummyConfig::default()
        };
        let result = QspiFlash::attach(DummyQspi::new(config), Tuning::default());
        assert!(matches!(result, Err(Error::UnknownCapacity(0x30))));
    }

    #[test]
    fn test_tiny_fifo_fails_attach() {
        for depth in [4, 8] {
            let config = DummyConfig {
                fifo_depth: depth,
                ..DummyConfig::default()
            };
            let result = QspiController::attach(DummyQspi::new(config), Tuning::default());
            assert!(matches!(result, Err(Error::FifoProbeFailed)), "depth {}", depth);
        }
    }

    #[test]
    fn test_read_erased_flash() {
        let flash = attach(DummyQspi::new_default());
        let mut buf = vec![0; 5000];
        assert_eq!(flash.read(0x123, &mut buf).unwrap(), 5000);
        assert!(buf.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_read_preloaded_data() {
        let data = pattern(10_000, 3);
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0x7F00, &data);

        let flash = attach(emu);
        let mut buf = vec![0; data.len()];
        assert_eq!(flash.read(0x7F00, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn test_write_read_back() {
        let flash = attach(DummyQspi::new_default());
        let data = pattern(1000, 0x42);
        assert_eq!(flash.write(0x2345, &data), Ok(1000));

        let mut buf = vec![0; 1000];
        flash.read(0x2345, &mut buf).unwrap();
        assert_eq!(buf, data);

        let emu = into_emulator(flash);
        assert_eq!(emu.stats().commands_while_busy, 0);
        assert_eq!(emu.stats().rejected_commands, 0);
    }

    #[test]
    fn test_rmw_preserves_surrounding_bytes() {
        let old = pattern(PAGE_SIZE, 0x5A);
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0x3000, &old);

        let flash = attach(emu);
        let start = 0x107;
        assert_eq!(flash.write(0x3000 + start as u64, &[0u8; 100]), Ok(100));

        let emu = into_emulator(flash);
        let page = emu.contents(0, 0x3000, PAGE_SIZE);
        assert_eq!(&page[..start], &old[..start]);
        assert!(page[start..start + 100].iter().all(|&b| b == 0));
        assert_eq!(&page[start + 100..], &old[start + 100..]);
        assert_eq!(erase_log(&emu), vec![(0x3000, PAGE_SIZE)]);
    }

    #[test]
    fn test_full_page_program_64k() {
        let guard = vec![0x11; PAGE_SIZE];
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0xF000, &guard);
        emu.load(0, 0x20000, &guard);

        let flash = attach(emu);
        let data = pattern(64 * 1024, 9);
        assert_eq!(flash.write(0x10000, &data), Ok(data.len()));

        let emu = into_emulator(flash);
        assert_eq!(erase_log(&emu), vec![(0x10000, 64 * 1024)]);
        assert_eq!(emu.contents(0, 0x10000, data.len()), data);
        assert_eq!(emu.contents(0, 0xF000, PAGE_SIZE), guard);
        assert_eq!(emu.contents(0, 0x20000, PAGE_SIZE), guard);
    }

    #[test]
    fn test_full_page_program_32k() {
        let flash = attach(DummyQspi::new_default());
        let data = pattern(32 * 1024, 1);
        assert_eq!(flash.write(0x8000, &data), Ok(data.len()));

        let emu = into_emulator(flash);
        assert_eq!(erase_log(&emu), vec![(0x8000, 32 * 1024)]);
        assert_eq!(emu.contents(0, 0x8000, data.len()), data);
    }

    #[test]
    fn test_unaligned_write_mixes_page_sizes() {
        let flash = attach(DummyQspi::new_default());
        let data = pattern(64 * 1024, 77);
        assert_eq!(flash.write(0x10800, &data), Ok(data.len()));

        let emu = into_emulator(flash);
        let mut expected: Vec<(u64, usize)> = (0x10000..0x18000u64)
            .step_by(PAGE_SIZE)
            .map(|off| (off, PAGE_SIZE))
            .collect();
        expected.push((0x18000, 32 * 1024));
        expected.push((0x20000, PAGE_SIZE));
        assert_eq!(erase_log(&emu), expected);
        assert_eq!(emu.contents(0, 0x10800, data.len()), data);
        assert!(emu.contents(0, 0x10000, 0x800).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_transactions_fit_fifo() {
        let config = DummyConfig {
            fifo_depth: 64,
            ..DummyConfig::default()
        };
        let flash = attach(DummyQspi::new(config));
        assert_eq!(flash.fifo_depth(), 64);

        let data = pattern(3 * PAGE_SIZE + 500, 5);
        assert_eq!(flash.write(0x1234, &data), Ok(data.len()));
        let mut buf = vec![0; data.len()];
        flash.read(0x1234, &mut buf).unwrap();
        assert_eq!(buf, data);

        let emu = into_emulator(flash);
        assert_eq!(emu.stats().max_burst_len, 64);
        assert_eq!(emu.stats().max_program_len, 60);
    }

    #[test]
    fn test_program_ceiling() {
        let flash = attach(DummyQspi::new_default());
        flash.write(0, &pattern(PAGE_SIZE, 0)).unwrap();

        let emu = into_emulator(flash);
        assert_eq!(emu.stats().max_program_len, 128);
        assert!(emu.stats().max_burst_len <= DEFAULT_FIFO_DEPTH);
    }

    #[test]
    fn test_oversized_transaction_rejected() {
        let mut ctrl = controller(DummyQspi::new_default());
        let bursts = ctrl.io().stats().bursts;

        let mut buf = [0u8; DEFAULT_FIFO_DEPTH + 1];
        assert_eq!(
            ctrl.bus_mut().transaction(&mut buf, true),
            Err(Error::TransferTooLarge {
                len: DEFAULT_FIFO_DEPTH + 1,
                fifo_depth: DEFAULT_FIFO_DEPTH,
            })
        );
        assert_eq!(ctrl.io().stats().bursts, bursts);
    }

    #[test]
    fn test_read_crossing_page_rejected() {
        let mut ctrl = controller(DummyQspi::new_default());
        let mut buf = [0u8; 16];
        assert_eq!(
            ctrl.read_one_fifo(0xFF8, &mut buf),
            Err(Error::CrossesPageBoundary)
        );
    }

    #[test]
    fn test_read_one_fifo_is_bounded() {
        let mut ctrl = controller(DummyQspi::new_default());
        let mut buf = [0u8; PAGE_SIZE];
        let n = ctrl.read_one_fifo(0, &mut buf).unwrap();
        assert_eq!(n, DEFAULT_FIFO_DEPTH - HEADER_LEN - READ_DUMMY_LEN);
    }

    #[test]
    fn test_read_clamps_at_end() {
        let flash = attach(DummyQspi::new_default());
        let cap = flash.capacity();

        let mut buf = [0u8; 100];
        assert_eq!(flash.read(cap - 10, &mut buf).unwrap(), 10);
        assert_eq!(flash.read(cap, &mut buf[..1]).unwrap(), 0);
        assert_eq!(flash.read(cap + 4096, &mut buf).unwrap(), 0);
        assert_eq!(flash.read(0, &mut []).unwrap(), 0);
    }

    #[test]
    fn test_write_bounds() {
        let flash = attach(DummyQspi::new_default());
        let cap = flash.capacity();

        let no_space = Err(PartialWrite {
            written: 0,
            error: Error::NoSpace,
        });
        assert_eq!(flash.write(cap, &[0]), no_space);
        assert_eq!(flash.write(0, &[]), no_space);
        assert_eq!(flash.write(cap - 4, &[0u8; 10]), Ok(4));

        let emu = into_emulator(flash);
        assert_eq!(emu.contents(0, cap - 4, 4), vec![0; 4]);
    }

    #[test]
    fn test_erase_rejects_bad_size() {
        let mut ctrl = controller(DummyQspi::new_default());
        let bursts = ctrl.io().stats().bursts;

        assert_eq!(ctrl.erase(0, 5000), Err(Error::InvalidEraseSize(5000)));
        assert_eq!(ctrl.io().stats().bursts, bursts);
        assert!(ctrl.io().stats().erases.is_empty());
    }

    #[test]
    fn test_erase_rejects_misaligned() {
        let mut ctrl = controller(DummyQspi::new_default());
        assert_eq!(ctrl.erase(0x1000, 64 * 1024), Err(Error::InvalidAlignment));
        assert!(ctrl.io().stats().erases.is_empty());
    }

    #[test]
    fn test_erase_page() {
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0x8000, &[0u8; 0x9000]);

        let flash = attach(emu);
        flash.erase(0x8000, 32 * 1024).unwrap();
        assert_eq!(
            flash.erase(flash.capacity() - 4096, 64 * 1024),
            Err(Error::AddressOutOfBounds)
        );

        let emu = into_emulator(flash);
        assert!(emu.contents(0, 0x8000, 0x8000).iter().all(|&b| b == 0xFF));
        assert!(emu.contents(0, 0x10000, 0x1000).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_end_to_end_unaligned_write() {
        let old = pattern(3 * PAGE_SIZE, 0xC3);
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0, &old);

        let flash = attach(emu);
        let data = pattern(6000, 0x11);
        assert_eq!(flash.write(4000, &data), Ok(6000));

        let mut buf = vec![0; 6000];
        assert_eq!(flash.read(4000, &mut buf).unwrap(), 6000);
        assert_eq!(buf, data);

        let emu = into_emulator(flash);
        assert_eq!(
            erase_log(&emu),
            vec![(0, PAGE_SIZE), (4096, PAGE_SIZE), (8192, PAGE_SIZE)]
        );
        assert_eq!(emu.contents(0, 0, 4000), old[..4000].to_vec());
        assert_eq!(emu.contents(0, 10_000, 3 * PAGE_SIZE - 10_000), old[10_000..].to_vec());
    }

    #[test]
    fn test_write_across_sector_boundary() {
        let config = DummyConfig {
            capacity_code: 0x19,
            ..DummyConfig::default()
        };
        let flash = attach(DummyQspi::new(config));
        assert_eq!(flash.capacity(), 2 * MIB16);

        let data = [1u8, 2, 3, 4];
        assert_eq!(flash.write(MIB16 - 2, &data), Ok(4));

        let mut buf = [0u8; 4];
        flash.read(MIB16 - 2, &mut buf).unwrap();
        assert_eq!(buf, data);

        let ctrl = flash.into_inner();
        assert_eq!(ctrl.current_sector(), 1);
        let emu = ctrl.into_inner();
        assert_eq!(emu.contents(0, MIB16 - 2, 4), data.to_vec());
        assert_eq!(
            erase_log(&emu),
            vec![(MIB16 - PAGE_SIZE as u64, PAGE_SIZE), (MIB16, PAGE_SIZE)]
        );
    }

    #[test]
    fn test_second_slave() {
        let flash = attach(DummyQspi::new_default());
        let slave1 = 1u64 << 56;
        let data = pattern(500, 0x99);
        assert_eq!(flash.write(slave1 | 0x100, &data), Ok(500));

        let mut buf = vec![0; 500];
        assert_eq!(flash.read(slave1 | 0x100, &mut buf).unwrap(), 500);
        assert_eq!(buf, data);

        // Slave 1 clamps against its own capacity
        let mut tail = [0u8; 16];
        assert_eq!(flash.read(slave1 | (MIB16 - 8), &mut tail).unwrap(), 8);

        let emu = into_emulator(flash);
        assert_eq!(emu.contents(1, 0x100, 500), data);
        assert!(emu.contents(0, 0, PAGE_SIZE).iter().all(|&b| b == 0xFF));
        assert!(emu.stats().erases.iter().all(|e| e.slave == 1));
        assert_eq!(emu.slave_select(), SLAVE_SELECT_NONE);
    }

    #[test]
    fn test_slave_out_of_range() {
        let flash = attach(DummyQspi::new_default());
        let mut buf = [0u8; 4];
        assert_eq!(flash.read(2u64 << 56, &mut buf), Err(Error::SlaveOutOfRange(2)));
        assert_eq!(into_emulator(flash).slave_select(), SLAVE_SELECT_NONE);
    }

    #[test]
    fn test_slave_deselected_after_tx_stall() {
        let mut ctrl = controller(DummyQspi::new_default());
        ctrl.io_mut().fail_next_burst(Fault::Stall);

        assert_eq!(
            ctrl.enable_write(),
            Err(Error::Timeout(WaitTarget::TxDrain))
        );
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);

        // The next transaction recovers through the FIFO reset
        assert!(ctrl.is_ready());
    }

    #[test]
    fn test_slave_deselected_after_protocol_error() {
        let mut ctrl = controller(DummyQspi::new_default());
        ctrl.io_mut().fail_next_burst(Fault::Error(Status::MODE_ERR));

        let result = ctrl.bus_mut().read_id();
        assert!(
            matches!(result, Err(Error::Protocol { status }) if status & Status::MODE_ERR.bits() != 0)
        );
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);
        assert!(ctrl.bus_mut().read_id().is_ok());
    }

    #[test]
    fn test_status_read_error_means_busy() {
        let mut ctrl = controller(DummyQspi::new_default());
        ctrl.io_mut().fail_next_burst(Fault::Error(Status::CMD_ERR));
        assert!(!ctrl.is_ready());
        assert!(ctrl.is_ready());
    }

    #[test]
    fn test_drain_ignores_extra_rx() {
        let mut ctrl = controller(DummyQspi::new_default());

        ctrl.io_mut().fail_next_burst(Fault::ExtraRx);
        assert_eq!(ctrl.enable_write(), Ok(()));

        ctrl.io_mut().fail_next_burst(Fault::ExtraRx);
        assert_eq!(ctrl.bus_mut().read_id(), Err(Error::RxOverflow));

        assert!(ctrl.bus_mut().read_id().is_ok());
    }

    #[test]
    fn test_short_rx_is_underflow() {
        let mut ctrl = controller(DummyQspi::new_default());

        ctrl.io_mut().fail_next_burst(Fault::ShortRx);
        assert_eq!(
            ctrl.bus_mut().read_id(),
            Err(Error::RxUnderflow {
                expected: 5,
                received: 4
            })
        );
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);

        // Drained commands only log it
        ctrl.io_mut().fail_next_burst(Fault::ShortRx);
        assert_eq!(ctrl.enable_write(), Ok(()));
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);
    }

    #[test]
    fn test_stuck_fifo_times_out_reset() {
        let mut ctrl = controller(DummyQspi::new_default());

        ctrl.io_mut().fail_next_burst(Fault::StuckFifo);
        assert_eq!(ctrl.bus_mut().read_id(), Err(Error::RxOverflow));
        assert_eq!(
            ctrl.bus_mut().read_id(),
            Err(Error::Timeout(WaitTarget::FifoReset))
        );
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);
        assert!(!ctrl.is_ready());

        ctrl.bus_mut().soft_reset();
        ctrl.bus_mut().init_control();
        assert!(ctrl.bus_mut().read_id().is_ok());
    }

    #[test]
    fn test_never_ready_fails_attach() {
        let mut emu = DummyQspi::new_default();
        emu.set_busy(0, u32::MAX);
        let err = QspiFlash::attach(emu, Tuning::default()).err();
        assert_eq!(err, Some(Error::Timeout(WaitTarget::DeviceReady)));
    }

    #[test]
    fn test_never_ready_fails_erase() {
        let mut ctrl = controller(DummyQspi::new_default());
        ctrl.io_mut().set_busy(0, u32::MAX);

        assert_eq!(
            ctrl.erase(0, PAGE_SIZE),
            Err(Error::Timeout(WaitTarget::DeviceReady))
        );
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);
        assert!(ctrl.io().stats().erases.is_empty());
    }

    #[test]
    fn test_receive_rejects_short_buffer() {
        let mut ctrl = controller(DummyQspi::new_default());
        let bus = ctrl.bus_mut();

        bus.activate_slave(Some(0));
        bus.transmit(&[opcodes::RDSR, 0, 0, 0]).unwrap();
        let mut out = [0u8; 1];
        assert_eq!(
            bus.receive(Some(&mut out[..]), 4),
            Err(Error::BufferTooSmall {
                needed: 4,
                available: 1
            })
        );

        // Nothing was pulled, so the response can still be drained
        assert_eq!(bus.receive(None, 4), Ok(()));
        bus.activate_slave(None);
    }

    #[test]
    fn test_activate_slave_out_of_range_deselects() {
        let mut ctrl = controller(DummyQspi::new_default());

        ctrl.bus_mut().activate_slave(Some(0));
        assert_ne!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);

        ctrl.bus_mut().activate_slave(Some(40));
        assert_eq!(ctrl.io().slave_select(), SLAVE_SELECT_NONE);
    }

    #[test]
    fn test_partial_write_reports_committed_bytes() {
        let mut emu = DummyQspi::new_default();
        // Let the first 4 KiB erase through, fail the second
        emu.fail_opcode(opcodes::SE_4K, 1, Fault::Error(Status::CMD_ERR));

        let flash = attach(emu);
        let data = pattern(2 * PAGE_SIZE, 0x21);
        let err = flash.write(0, &data).unwrap_err();
        assert_eq!(err.written, PAGE_SIZE);
        assert!(matches!(err.error, Error::Protocol { .. }));

        let emu = into_emulator(flash);
        assert_eq!(emu.contents(0, 0, PAGE_SIZE), data[..PAGE_SIZE].to_vec());
    }

    #[test]
    fn test_session_is_exclusive() {
        let flash = attach(DummyQspi::new_default());
        let session = flash.open().unwrap();
        assert!(matches!(flash.open(), Err(Error::Busy)));
        drop(session);
        assert!(flash.open().is_ok());
    }

    #[test]
    fn test_session_read_write_seek() {
        let flash = attach(DummyQspi::new_default());
        let mut session = flash.open().unwrap();

        assert_eq!(session.seek(SeekFrom::Start(100)).unwrap(), 100);
        session.write_all(b"hello flash").unwrap();
        assert_eq!(session.position(), 111);

        assert_eq!(session.seek(SeekFrom::Current(-11)).unwrap(), 100);
        let mut buf = [0u8; 11];
        session.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello flash");

        let err = session.seek(SeekFrom::Current(-200)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        let err = session.seek(SeekFrom::End(0)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        let err = session.seek(SeekFrom::Start(1 << 63)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(session.position(), 111);

        assert_eq!(
            session.seek(SeekFrom::Start(i64::MAX as u64)).unwrap(),
            i64::MAX as u64
        );
        let err = session.seek(SeekFrom::Current(1)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_session_read_at_end() {
        let flash = attach(DummyQspi::new_default());
        let cap = flash.capacity();
        let mut session = flash.open().unwrap();

        session.seek(SeekFrom::Start(cap - 3)).unwrap();
        let mut buf = Vec::new();
        assert_eq!(session.read_to_end(&mut buf).unwrap(), 3);
        assert!(session.write(&[0]).is_err());
    }

    #[test]
    fn test_attributes() {
        let flash = attach(DummyQspi::new_default());
        assert_eq!(flash.attribute(Attribute::FlashType), "spi\n");
        assert_eq!(flash.attribute(Attribute::Size), "16777216\n");
        assert_eq!(Attribute::from_name("size"), Some(Attribute::Size));
        assert_eq!(Attribute::from_name("vendor"), None);
    }

    #[test]
    fn test_flash_reader() {
        let mut emu = DummyQspi::new_default();
        emu.load(0, 0x4000, b"bitstream");

        let flash = attach(emu);
        let reader: &dyn FlashReader = &flash;
        assert_eq!(reader.capacity(), MIB16);

        let mut buf = [0u8; 9];
        reader.read_at(0x4000, &mut buf).unwrap();
        assert_eq!(&buf, b"bitstream");

        let mut buf = [0u8; 8];
        assert_eq!(
            reader.read_at(MIB16 - 4, &mut buf),
            Err(Error::AddressOutOfBounds)
        );
    }
}
