//! The custom PCI function: a single memory BAR backed by a `RegisterFile`
//! plus the fixed identity answered during enumeration.
use std::{
    ops::{Range, RangeInclusive},
    sync::Arc,
};

use crate::soc::{
    bus::{BusResult, DeviceBus},
    pci::{PciClassCode, PciIdentity},
};

use super::{device_trait::Device, endianness::Endianness, register_file::RegisterFile};

pub const CUSTOM_PCI_DEVICE_TYPE: &str = "custom-pci-device";
pub const CUSTOM_PCI_VENDOR_ID: u16 = 0x1234;
pub const CUSTOM_PCI_DEVICE_ID: u16 = 0x5678;
pub const CUSTOM_PCI_REVISION: u8 = 0x01;
pub const BAR0_SIZE: u64 = 4096;

/// Static description of a device type, fixed at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTypeInfo {
    pub name: String,
    pub description: String,
    pub identity: PciIdentity,
    pub bar0_size: u64,
}

impl DeviceTypeInfo {
    pub fn custom_pci_device() -> Self {
        Self {
            name: CUSTOM_PCI_DEVICE_TYPE.into(),
            description: "Custom PCI Device".into(),
            identity: PciIdentity {
                vendor_id: CUSTOM_PCI_VENDOR_ID,
                device_id: CUSTOM_PCI_DEVICE_ID,
                revision: CUSTOM_PCI_REVISION,
                class_code: PciClassCode::OTHERS,
            },
            bar0_size: BAR0_SIZE,
        }
    }
}

pub struct CustomPciDevice {
    type_name: String,
    identity: PciIdentity,
    bar0: RegisterFile,
}

impl CustomPciDevice {
    /// Creates the device with a zeroed BAR0. The region is not decoded
    /// anywhere until [`CustomPciDevice::attach`] registers it on a bus.
    pub fn instantiate(info: &DeviceTypeInfo, instance: usize) -> Self {
        let region_name = format!("{}.{instance}-bar0", info.name);
        Self {
            type_name: info.name.clone(),
            identity: info.identity,
            bar0: RegisterFile::with_endianness(
                region_name,
                info.bar0_size as usize,
                Endianness::Little,
            ),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn identify(&self) -> PciIdentity {
        self.identity
    }

    pub fn bar0_size(&self) -> u64 {
        self.bar0.capacity() as u64
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.bar0
    }

    /// Registers BAR0 on `bus` at `base`.
    pub fn attach(self: &Arc<Self>, bus: &DeviceBus, base: u64) -> BusResult<()> {
        bus.register_device(self.clone(), base)?;
        tracing::debug!(region = self.bar0.name(), base, "BAR0 registered");
        Ok(())
    }

    /// Releases the BAR0 registration. Safe to call when never attached.
    pub fn teardown(&self, bus: &DeviceBus) -> bool {
        let released = bus.unregister_device(self.bar0.name());
        if released {
            tracing::debug!(region = self.bar0.name(), "BAR0 released");
        }
        released
    }

    pub fn reset(&self) {
        self.bar0.reset();
    }
}

impl Device for CustomPciDevice {
    fn name(&self) -> &str {
        self.bar0.name()
    }

    fn span(&self) -> Range<u64> {
        0..self.bar0_size()
    }

    fn endianness(&self) -> Endianness {
        self.bar0.endianness()
    }

    fn access_sizes(&self) -> RangeInclusive<usize> {
        1..=8
    }

    fn read(&self, offset: u64, size: usize) -> u64 {
        self.bar0.read(offset, size)
    }

    fn write(&self, offset: u64, size: usize, value: u64) {
        self.bar0.write(offset, size, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Arc<CustomPciDevice> {
        Arc::new(CustomPciDevice::instantiate(
            &DeviceTypeInfo::custom_pci_device(),
            0,
        ))
    }

    #[test]
    fn identify_reports_fixed_identity() {
        let id = device().identify();
        assert_eq!(id.vendor_id, 0x1234);
        assert_eq!(id.device_id, 0x5678);
        assert_eq!(id.revision, 0x01);
        assert_eq!(id.class_code.class_id(), 0xff00, "class is 'other'");
    }

    #[test]
    fn instantiate_allocates_zeroed_bar0() {
        let dev = device();
        assert_eq!(dev.bar0_size(), 4096);
        assert_eq!(dev.name(), "custom-pci-device.0-bar0");
        assert!(dev.registers().snapshot().iter().all(|b| *b == 0));
    }

    #[test]
    fn attached_region_answers_bus_accesses() {
        let bus = DeviceBus::new(12);
        let dev = device();
        dev.attach(&bus, 0xFE00_0000).expect("attach BAR0");

        bus.write(0xFE00_0000, 4, 0xDEAD_BEEF).unwrap();
        assert_eq!(bus.read(0xFE00_0000, 4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(
            bus.read(0xFE00_0000 + 4093, 8).unwrap(),
            0,
            "access running past BAR0 is absorbed by the device"
        );
    }

    #[test]
    fn teardown_is_idempotent() {
        let bus = DeviceBus::new(12);
        let dev = device();
        assert!(!dev.teardown(&bus), "teardown before attach is a no-op");
        dev.attach(&bus, 0x1000).unwrap();
        assert!(dev.teardown(&bus));
        assert!(!dev.teardown(&bus), "second teardown is a no-op");
        assert!(bus.read(0x1000, 4).is_err(), "region no longer decodes");
    }
}
