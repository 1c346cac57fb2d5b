//! Board-level memory-mapped status registers.
//!
//! The device model reports bring-up progress and interrupt activity by writing fixed status
//! codes into the PCI bank of an external register file. Consumers of that file key on the exact
//! address/value pairs, so the codes below are part of the observable contract.

use std::sync::{Arc, Mutex, PoisonError};

pub const BOARD_REG_BASE: u32 = 0x4000_0000;
pub const BOARD_REG_UART: u32 = 0x4000_1000;
pub const BOARD_REG_SPI: u32 = 0x4000_2000;
pub const BOARD_REG_PCI: u32 = 0x4000_3000;
pub const BOARD_REG_SENSOR: u32 = 0x4000_4000;

/// Status code written to [`BOARD_REG_PCI`] once the link is up.
pub const PCI_STATUS_LINK_UP: u32 = 0x01;
/// Status code written to [`BOARD_REG_PCI`] for every generated interrupt.
pub const PCI_STATUS_INTERRUPT: u32 = 0x02;
pub const PCI_STATUS_CLOCK_LOCKED: u32 = 0x10;
pub const PCI_STATUS_PERST_DEASSERTED: u32 = 0x11;
pub const PCI_STATUS_FIRMWARE_LOADED: u32 = 0x12;
pub const PCI_STATUS_CR_PARA_WRITTEN: u32 = 0x13;
pub const PCI_STATUS_SPEED_WIDTH_SET: u32 = 0x14;
pub const PCI_STATUS_LINK_TRAINED: u32 = 0x15;

/// Sink for board register writes.
pub trait BoardRegisterWrite {
    fn write_reg(&mut self, addr: u32, value: u32);
}

/// Four-bank register file (UART, SPI, PCI, sensor).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardRegisters {
    uart: u32,
    spi: u32,
    pci: u32,
    sensor: u32,
}

impl BoardRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, addr: u32) -> Option<&u32> {
        match addr {
            BOARD_REG_UART => Some(&self.uart),
            BOARD_REG_SPI => Some(&self.spi),
            BOARD_REG_PCI => Some(&self.pci),
            BOARD_REG_SENSOR => Some(&self.sensor),
            _ => None,
        }
    }

    fn slot_mut(&mut self, addr: u32) -> Option<&mut u32> {
        match addr {
            BOARD_REG_UART => Some(&mut self.uart),
            BOARD_REG_SPI => Some(&mut self.spi),
            BOARD_REG_PCI => Some(&mut self.pci),
            BOARD_REG_SENSOR => Some(&mut self.sensor),
            _ => None,
        }
    }

    /// Reads a bank register. Unknown addresses read as zero.
    pub fn read(&self, addr: u32) -> u32 {
        match self.slot(addr) {
            Some(value) => *value,
            None => {
                tracing::warn!(addr = format_args!("{addr:#010x}"), "invalid board register read");
                0
            }
        }
    }

    /// Writes a bank register. Writes to unknown addresses are dropped.
    pub fn write(&mut self, addr: u32, value: u32) {
        match self.slot_mut(addr) {
            Some(slot) => {
                *slot = value;
                tracing::trace!(
                    addr = format_args!("{addr:#010x}"),
                    value = format_args!("{value:#010x}"),
                    "board register write"
                );
            }
            None => {
                tracing::warn!(addr = format_args!("{addr:#010x}"), "invalid board register write");
            }
        }
    }
}

impl BoardRegisterWrite for BoardRegisters {
    fn write_reg(&mut self, addr: u32, value: u32) {
        self.write(addr, value);
    }
}

// One register file shared by several simulated devices (e.g. an RC and an EP on separate
// threads). Each write is a single locked store.
impl BoardRegisterWrite for Arc<Mutex<BoardRegisters>> {
    fn write_reg(&mut self, addr: u32, value: u32) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(addr, value);
    }
}

/// Records every write in order. Useful for asserting the exact status-code sequence.
impl BoardRegisterWrite for Vec<(u32, u32)> {
    fn write_reg(&mut self, addr: u32, value: u32) {
        self.push((addr, value));
    }
}

impl<T: BoardRegisterWrite + ?Sized> BoardRegisterWrite for &mut T {
    fn write_reg(&mut self, addr: u32, value: u32) {
        (**self).write_reg(addr, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banks_are_independent() {
        let mut regs = BoardRegisters::new();
        regs.write(BOARD_REG_PCI, 0x15);
        regs.write(BOARD_REG_UART, 0x41);

        assert_eq!(regs.read(BOARD_REG_PCI), 0x15);
        assert_eq!(regs.read(BOARD_REG_UART), 0x41);
        assert_eq!(regs.read(BOARD_REG_SPI), 0);
        assert_eq!(regs.read(BOARD_REG_SENSOR), 0);
    }

    #[test]
    fn unknown_addresses_are_ignored() {
        let mut regs = BoardRegisters::new();
        regs.write(BOARD_REG_BASE, 0xdead);
        regs.write(BOARD_REG_PCI + 4, 0xbeef);

        assert_eq!(regs, BoardRegisters::new());
        assert_eq!(regs.read(BOARD_REG_BASE), 0);
    }

    #[test]
    fn shared_register_file_sees_writes_from_every_handle() {
        let shared = Arc::new(Mutex::new(BoardRegisters::new()));
        let mut a = shared.clone();
        let mut b = shared.clone();

        a.write_reg(BOARD_REG_PCI, PCI_STATUS_LINK_UP);
        b.write_reg(BOARD_REG_SENSOR, 7);

        let regs = shared.lock().unwrap();
        assert_eq!(regs.read(BOARD_REG_PCI), PCI_STATUS_LINK_UP);
        assert_eq!(regs.read(BOARD_REG_SENSOR), 7);
    }
}
