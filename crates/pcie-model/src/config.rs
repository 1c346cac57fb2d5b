use crate::capabilities::{
    CapabilityList, CAPABILITY_PAYLOAD_LEN, PCI_CAP_ID_MSI, PCI_CAP_ID_PCIE,
};
use crate::error::{PcieError, Resource, Result};

/// Number of 32-bit registers (256 bytes of config space).
pub const CONFIG_SPACE_REGISTERS: usize = 64;

pub const REG_VENDOR_DEVICE: usize = 0x00 / 4;
pub const REG_CLASS_REVISION: usize = 0x08 / 4;
pub const REG_HEADER: usize = 0x0c / 4;
pub const REG_BAR0: usize = 0x10 / 4;
pub const REG_BAR1: usize = 0x14 / 4;
pub const REG_SUBSYSTEM: usize = 0x2c / 4;
pub const REG_CAP_PTR: usize = 0x34 / 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PciVendorDeviceId {
    pub vendor_id: u16,
    pub device_id: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PciSubsystemIds {
    pub subsystem_vendor_id: u16,
    pub subsystem_id: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PciClassCode {
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision_id: u8,
}

/// Register values seeded into the header during bring-up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeaderIdentity {
    pub vendor_device: u32,
    pub class_revision: u32,
    pub header: u32,
    pub subsystem: u32,
    pub capabilities_pointer: u32,
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self {
            vendor_device: 0x1234_8086,
            // Bridge device (class 0x06, subclass 0x04), revision 0.
            class_revision: 0x0604_0000,
            header: 0x0010_0000,
            subsystem: 0xabcd_5678,
            capabilities_pointer: 0x40,
        }
    }
}

/// 256-byte configuration space addressed by register index, plus the capability list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpace {
    regs: [u32; CONFIG_SPACE_REGISTERS],
    capabilities: CapabilityList,
}

impl Default for ConfigSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSpace {
    pub fn new() -> Self {
        Self {
            regs: [0; CONFIG_SPACE_REGISTERS],
            capabilities: CapabilityList::new(),
        }
    }

    fn check_offset(offset: usize) -> Result<()> {
        if offset < CONFIG_SPACE_REGISTERS {
            Ok(())
        } else {
            tracing::warn!(offset, "config register offset out of range");
            Err(PcieError::index_out_of_range(
                Resource::ConfigRegister,
                offset,
                CONFIG_SPACE_REGISTERS,
            ))
        }
    }

    pub fn read_register(&self, offset: usize) -> Result<u32> {
        Self::check_offset(offset)?;
        let value = self.regs[offset];
        tracing::debug!(offset, value = format_args!("{value:#010x}"), "config read");
        Ok(value)
    }

    pub fn write_register(&mut self, offset: usize, value: u32) -> Result<()> {
        Self::check_offset(offset)?;
        self.regs[offset] = value;
        tracing::debug!(offset, value = format_args!("{value:#010x}"), "config write");
        Ok(())
    }

    pub fn registers(&self) -> &[u32; CONFIG_SPACE_REGISTERS] {
        &self.regs
    }

    pub fn capabilities(&self) -> &CapabilityList {
        &self.capabilities
    }

    pub fn add_capability(&mut self, id: u8, payload: &[u8]) -> Result<usize> {
        self.capabilities.add(id, payload)
    }

    /// Seeds the identity registers, clears the BAR shadows and installs the PCIe and MSI
    /// capabilities.
    pub fn init_header(&mut self, identity: &HeaderIdentity) {
        self.regs[REG_VENDOR_DEVICE] = identity.vendor_device;
        self.regs[REG_CLASS_REVISION] = identity.class_revision;
        self.regs[REG_HEADER] = identity.header;
        self.regs[REG_SUBSYSTEM] = identity.subsystem;
        self.regs[REG_CAP_PTR] = identity.capabilities_pointer;
        self.regs[REG_BAR0] = 0;
        self.regs[REG_BAR1] = 0;
        tracing::info!("header/config space initialized");

        // Each payload only carries its own capability id in byte 0.
        for id in [PCI_CAP_ID_PCIE, PCI_CAP_ID_MSI] {
            let mut payload = [0u8; CAPABILITY_PAYLOAD_LEN];
            payload[0] = id;
            if let Err(err) = self.capabilities.add(id, &payload) {
                tracing::warn!(cap_id = format_args!("{id:#04x}"), "{err}");
            }
        }
    }

    pub fn vendor_device_id(&self) -> PciVendorDeviceId {
        let reg = self.regs[REG_VENDOR_DEVICE];
        PciVendorDeviceId {
            vendor_id: reg as u16,
            device_id: (reg >> 16) as u16,
        }
    }

    pub fn class_code(&self) -> PciClassCode {
        let [revision_id, prog_if, subclass, class] = self.regs[REG_CLASS_REVISION].to_le_bytes();
        PciClassCode {
            class,
            subclass,
            prog_if,
            revision_id,
        }
    }

    pub fn subsystem_ids(&self) -> PciSubsystemIds {
        let reg = self.regs[REG_SUBSYSTEM];
        PciSubsystemIds {
            subsystem_vendor_id: reg as u16,
            subsystem_id: (reg >> 16) as u16,
        }
    }

    pub fn capabilities_pointer(&self) -> u8 {
        self.regs[REG_CAP_PTR] as u8
    }
}
