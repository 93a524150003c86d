//! The bus collaborator as the driver sees it: discovery, enable/disable and
//! region ownership. Tokens handed out here are not `Clone`, so each claimed
//! region and each mapping is given back exactly once.
use std::{error::Error, fmt, sync::Arc};

use crate::soc::{
    bus::{BusError, BusResult, DeviceBus},
    pci::{PciAddress, PciIdentity},
};

pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    NotFound { vendor_id: u16, device_id: u16 },
    NoSuchDevice(PciAddress),
    Refused { device: PciAddress, reason: String },
    Busy { device: PciAddress, bar: u8, owner: String },
    NoSuchRegion { device: PciAddress, bar: u8 },
    MapFailed { device: PciAddress, bar: u8, reason: String },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::NotFound {
                vendor_id,
                device_id,
            } => write!(f, "no device {vendor_id:04x}:{device_id:04x} present"),
            HostError::NoSuchDevice(address) => write!(f, "no device at {address}"),
            HostError::Refused { device, reason } => {
                write!(f, "{device}: enable refused: {reason}")
            }
            HostError::Busy { device, bar, owner } => {
                write!(f, "{device}: BAR{bar} already claimed by '{owner}'")
            }
            HostError::NoSuchRegion { device, bar } => write!(f, "{device}: BAR{bar} not present"),
            HostError::MapFailed {
                device,
                bar,
                reason,
            } => write!(f, "{device}: cannot map BAR{bar}: {reason}"),
        }
    }
}

impl Error for HostError {}

/// A discovered device, as handed to the driver by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceRef {
    pub address: PciAddress,
    pub identity: PciIdentity,
}

/// Exclusive ownership of one BAR.
#[derive(Debug, PartialEq, Eq)]
pub struct RegionToken {
    device: PciAddress,
    bar: u8,
    base: u64,
    len: u64,
}

impl RegionToken {
    pub fn new(device: PciAddress, bar: u8, base: u64, len: u64) -> Self {
        Self {
            device,
            bar,
            base,
            len,
        }
    }

    pub fn device(&self) -> PciAddress {
        self.device
    }

    pub fn bar(&self) -> u8 {
        self.bar
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Host-addressable view of a claimed region. Offsets are relative to the
/// BAR base and checked against the mapped length before touching the bus.
pub struct IoMapping {
    device: PciAddress,
    bar: u8,
    base: u64,
    len: u64,
    bus: Arc<DeviceBus>,
}

impl fmt::Debug for IoMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoMapping")
            .field("device", &self.device)
            .field("bar", &self.bar)
            .field("base", &format_args!("0x{:x}", self.base))
            .field("len", &self.len)
            .finish()
    }
}

impl IoMapping {
    pub fn new(region: &RegionToken, bus: Arc<DeviceBus>) -> Self {
        Self {
            device: region.device,
            bar: region.bar,
            base: region.base,
            len: region.len,
            bus,
        }
    }

    pub fn device(&self) -> PciAddress {
        self.device
    }

    pub fn bar(&self) -> u8 {
        self.bar
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn address(&self, offset: u64, size: usize) -> BusResult<u64> {
        let end = offset.checked_add(size as u64);
        match end {
            Some(end) if end <= self.len => Ok(self.base + offset),
            _ => Err(BusError::OutOfRange {
                address: self.base.saturating_add(offset),
                end: self.base + self.len,
            }),
        }
    }

    pub fn read(&self, offset: u64, size: usize) -> BusResult<u64> {
        let address = self.address(offset, size)?;
        self.bus.read(address, size)
    }

    pub fn write(&self, offset: u64, size: usize, value: u64) -> BusResult<()> {
        let address = self.address(offset, size)?;
        self.bus.write(address, size, value)
    }

    pub fn read8(&self, offset: u64) -> BusResult<u8> {
        self.read(offset, 1).map(|v| v as u8)
    }

    pub fn read16(&self, offset: u64) -> BusResult<u16> {
        self.read(offset, 2).map(|v| v as u16)
    }

    pub fn read32(&self, offset: u64) -> BusResult<u32> {
        self.read(offset, 4).map(|v| v as u32)
    }

    pub fn read64(&self, offset: u64) -> BusResult<u64> {
        self.read(offset, 8)
    }

    pub fn write8(&self, offset: u64, value: u8) -> BusResult<()> {
        self.write(offset, 1, value.into())
    }

    pub fn write16(&self, offset: u64, value: u16) -> BusResult<()> {
        self.write(offset, 2, value.into())
    }

    pub fn write32(&self, offset: u64, value: u32) -> BusResult<()> {
        self.write(offset, 4, value.into())
    }

    pub fn write64(&self, offset: u64, value: u64) -> BusResult<()> {
        self.write(offset, 8, value)
    }
}

/// Services the driver needs from the bus it is attached to.
pub trait PciHost: Send + Sync {
    fn enumerate(&self) -> Vec<PciDeviceRef>;

    fn find_device(&self, vendor_id: u16, device_id: u16) -> HostResult<PciDeviceRef> {
        self.enumerate()
            .into_iter()
            .find(|dev| dev.identity.matches(vendor_id, device_id))
            .ok_or(HostError::NotFound {
                vendor_id,
                device_id,
            })
    }

    fn enable_device(&self, device: &PciDeviceRef) -> HostResult<()>;
    fn disable_device(&self, device: &PciDeviceRef);

    fn request_region(&self, device: &PciDeviceRef, bar: u8, owner: &str)
    -> HostResult<RegionToken>;
    fn release_region(&self, region: RegionToken);

    fn iomap(&self, region: &RegionToken) -> HostResult<IoMapping>;
    fn iounmap(&self, mapping: IoMapping);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::device::{CustomPciDevice, DeviceTypeInfo};

    fn mapping() -> IoMapping {
        let bus = Arc::new(DeviceBus::new(12));
        let dev = Arc::new(CustomPciDevice::instantiate(
            &DeviceTypeInfo::custom_pci_device(),
            0,
        ));
        dev.attach(&bus, 0x2000).expect("attach");
        let region = RegionToken::new(PciAddress::new(0, 1, 0), 0, 0x2000, 0x1000);
        IoMapping::new(&region, bus)
    }

    #[test]
    fn typed_accessors_hit_register_offsets() {
        let map = mapping();
        map.write32(0x10, 0xDEAD_BEEF).expect("write32");
        assert_eq!(map.read32(0x10).unwrap(), 0xDEAD_BEEF);
        assert_eq!(map.read16(0x12).unwrap(), 0xDEAD);
        assert_eq!(map.read8(0x10).unwrap(), 0xEF);
        map.write64(0x18, u64::MAX).unwrap();
        assert_eq!(map.read64(0x18).unwrap(), u64::MAX);
    }

    #[test]
    fn accesses_past_the_mapping_are_rejected_host_side() {
        let map = mapping();
        assert!(matches!(
            map.read(0xFFD, 8),
            Err(BusError::OutOfRange { address: 0x2FFD, end: 0x3000 })
        ));
        assert!(map.write(u64::MAX, 4, 0).is_err(), "offset overflow is caught");
        assert!(map.write8(0xFFF, 1).is_ok(), "last byte is in range");
    }

    #[test]
    fn default_find_device_matches_id_pair() {
        struct Fixed(Vec<PciDeviceRef>);
        impl PciHost for Fixed {
            fn enumerate(&self) -> Vec<PciDeviceRef> {
                self.0.clone()
            }
            fn enable_device(&self, _device: &PciDeviceRef) -> HostResult<()> {
                Ok(())
            }
            fn disable_device(&self, _device: &PciDeviceRef) {}
            fn request_region(
                &self,
                device: &PciDeviceRef,
                bar: u8,
                _owner: &str,
            ) -> HostResult<RegionToken> {
                Err(HostError::NoSuchRegion {
                    device: device.address,
                    bar,
                })
            }
            fn release_region(&self, _region: RegionToken) {}
            fn iomap(&self, region: &RegionToken) -> HostResult<IoMapping> {
                Err(HostError::MapFailed {
                    device: region.device(),
                    bar: region.bar(),
                    reason: "unsupported".into(),
                })
            }
            fn iounmap(&self, _mapping: IoMapping) {}
        }

        let identity = DeviceTypeInfo::custom_pci_device().identity;
        let host = Fixed(vec![PciDeviceRef {
            address: PciAddress::new(0, 4, 0),
            identity,
        }]);
        let found = host.find_device(0x1234, 0x5678).expect("device present");
        assert_eq!(found.address, PciAddress::new(0, 4, 0));
        assert_eq!(
            host.find_device(0x1234, 0x9999),
            Err(HostError::NotFound {
                vendor_id: 0x1234,
                device_id: 0x9999
            })
        );
    }
}
