use std::fmt;

use bitflags::bitflags;

/// Base class for devices that fit no other class.
pub const PCI_CLASS_OTHERS: u8 = 0xff;

pub const PCI_VENDOR_ID_OFFSET: u16 = 0x00;
pub const PCI_DEVICE_ID_OFFSET: u16 = 0x02;
pub const PCI_COMMAND_OFFSET: u16 = 0x04;
pub const PCI_REVISION_ID_OFFSET: u16 = 0x08;
pub const PCI_CLASS_PROG_OFFSET: u16 = 0x09;
/// Bytes of the type-0 header this crate models.
pub const PCI_IDENTITY_HEADER_LEN: usize = 0x10;

bitflags! {
    #[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
    pub struct PciCommand: u16 {
        const IO_SPACE     = 0b1;
        const MEMORY_SPACE = 0b10;
        const BUS_MASTER   = 0b100;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PciClassCode {
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
}

impl PciClassCode {
    pub const OTHERS: Self = Self {
        class: PCI_CLASS_OTHERS,
        subclass: 0,
        prog_if: 0,
    };

    /// `class << 8 | subclass`, the 16-bit form drivers usually match on.
    pub const fn class_id(self) -> u16 {
        ((self.class as u16) << 8) | self.subclass as u16
    }
}

/// Identification tuple answered during enumeration. Fixed per device type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PciIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision: u8,
    pub class_code: PciClassCode,
}

impl PciIdentity {
    pub fn matches(&self, vendor_id: u16, device_id: u16) -> bool {
        self.vendor_id == vendor_id && self.device_id == device_id
    }

    /// Encodes the identity into the leading bytes of a type-0 config header.
    /// The command word is left to the caller.
    pub fn header_bytes(&self) -> [u8; PCI_IDENTITY_HEADER_LEN] {
        let mut bytes = [0u8; PCI_IDENTITY_HEADER_LEN];
        let vendor = PCI_VENDOR_ID_OFFSET as usize;
        let device = PCI_DEVICE_ID_OFFSET as usize;
        let class = PCI_CLASS_PROG_OFFSET as usize;
        bytes[vendor..vendor + 2].copy_from_slice(&self.vendor_id.to_le_bytes());
        bytes[device..device + 2].copy_from_slice(&self.device_id.to_le_bytes());
        bytes[PCI_REVISION_ID_OFFSET as usize] = self.revision;
        bytes[class..class + 3].copy_from_slice(&[
            self.class_code.prog_if,
            self.class_code.subclass,
            self.class_code.class,
        ]);
        bytes
    }
}

impl fmt::Display for PciIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (rev {:02x}, class {:04x})",
            self.vendor_id,
            self.device_id,
            self.revision,
            self.class_code.class_id()
        )
    }
}

/// PCI bus/device/function address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    /// The caller keeps the values inside the PCI ranges:
    /// device < 32, function < 8.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0000:{:02x}:{:02x}.{:x}",
            self.bus, self.device, self.function
        )
    }
}
