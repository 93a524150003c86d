//! A single virtual PCI segment. Emulated functions are plugged into device
//! slots on bus 0, get BAR0 assigned out of a fixed MMIO window, and are then
//! visible to drivers through [`PciHost`].
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    driver::host::{HostError, HostResult, IoMapping, PciDeviceRef, PciHost, RegionToken},
    soc::{
        bus::{BusError, BusResult, DeviceBus},
        device::{CustomPciDevice, Device},
    },
};

use super::identity::{PCI_COMMAND_OFFSET, PciAddress, PciCommand};

/// Start of the window BARs are allocated from.
pub const MMIO_WINDOW_BASE: u64 = 0xFE00_0000;
const FIRST_DEVICE_NUMBER: u8 = 1;
const MAX_DEVICE_NUMBER: u8 = 31;

struct PciSlot {
    address: PciAddress,
    device: Arc<CustomPciDevice>,
    command: PciCommand,
    bar0_base: u64,
    owner: Option<String>,
    mappings: usize,
}

impl PciSlot {
    fn device_ref(&self) -> PciDeviceRef {
        PciDeviceRef {
            address: self.address,
            identity: self.device.identify(),
        }
    }
}

struct BusState {
    /// Sorted by address.
    slots: Vec<PciSlot>,
    next_bar_base: u64,
}

pub struct VirtualPciBus {
    mmio: Arc<DeviceBus>,
    state: Mutex<BusState>,
}

impl VirtualPciBus {
    pub fn new(mmio: Arc<DeviceBus>) -> Self {
        Self {
            mmio,
            state: Mutex::new(BusState {
                slots: Vec::new(),
                next_bar_base: MMIO_WINDOW_BASE,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address space the BARs are decoded in. Bus masters access devices through it.
    pub fn mmio(&self) -> &Arc<DeviceBus> {
        &self.mmio
    }

    /// Inserts `device` into the lowest free slot and decodes its BAR0. BAR0
    /// must be a non-zero power of two so it can be size-aligned.
    pub fn plug(&self, device: CustomPciDevice) -> BusResult<PciAddress> {
        let size = device.bar0_size();
        if !size.is_power_of_two() {
            return Err(BusError::InvalidDeviceSpan {
                device: device.name().to_string(),
            });
        }
        let mut state = self.state();
        let number = (FIRST_DEVICE_NUMBER..=MAX_DEVICE_NUMBER)
            .find(|number| state.slots.iter().all(|slot| slot.address.device != *number))
            .ok_or(BusError::NoFreeSlot)?;
        let device = Arc::new(device);
        let base = state.next_bar_base.next_multiple_of(size);
        device.attach(&self.mmio, base)?;

        let address = PciAddress::new(0, number, 0);
        state.next_bar_base = base + size;
        tracing::info!(%address, identity = %device.identify(), base, "device plugged");
        let idx = state.slots.partition_point(|slot| slot.address < address);
        state.slots.insert(
            idx,
            PciSlot {
                address,
                device,
                command: PciCommand::empty(),
                bar0_base: base,
                owner: None,
                mappings: 0,
            },
        );
        Ok(address)
    }

    /// Removes the device at `address` and stops decoding its BAR0.
    pub fn unplug(&self, address: PciAddress) -> bool {
        let mut state = self.state();
        let Some(idx) = state.slots.iter().position(|slot| slot.address == address) else {
            return false;
        };
        let slot = state.slots.remove(idx);
        slot.device.teardown(&self.mmio);
        tracing::info!(%address, "device unplugged");
        true
    }

    pub fn device(&self, address: PciAddress) -> Option<Arc<CustomPciDevice>> {
        self.state()
            .slots
            .iter()
            .find(|slot| slot.address == address)
            .map(|slot| slot.device.clone())
    }

    pub fn bar0_base(&self, address: PciAddress) -> Option<u64> {
        self.with_slot(address, |slot| slot.bar0_base)
    }

    pub fn is_enabled(&self, address: PciAddress) -> bool {
        self.with_slot(address, |slot| slot.command.contains(PciCommand::MEMORY_SPACE))
            .unwrap_or(false)
    }

    pub fn region_owner(&self, address: PciAddress) -> Option<String> {
        self.with_slot(address, |slot| slot.owner.clone()).flatten()
    }

    pub fn mapping_count(&self, address: PciAddress) -> usize {
        self.with_slot(address, |slot| slot.mappings).unwrap_or(0)
    }

    /// Reads the identity part of the type-0 config header. Offsets past the
    /// modelled header read as zero; an empty slot reads as all ones.
    pub fn config_read(&self, address: PciAddress, offset: u16, size: usize) -> u32 {
        let size = size.clamp(1, 4);
        let mask = if size == 4 {
            u32::MAX
        } else {
            (1u32 << (size * 8)) - 1
        };
        let header = self.with_slot(address, |slot| {
            let mut header = slot.device.identify().header_bytes();
            let command = PCI_COMMAND_OFFSET as usize;
            header[command..command + 2].copy_from_slice(&slot.command.bits().to_le_bytes());
            header
        });
        let Some(header) = header else {
            return mask;
        };
        let start = offset as usize;
        match header.get(start..start + size) {
            Some(bytes) => {
                let mut buf = [0u8; 4];
                buf[..size].copy_from_slice(bytes);
                u32::from_le_bytes(buf)
            }
            None => 0,
        }
    }

    fn with_slot<T>(&self, address: PciAddress, f: impl FnOnce(&PciSlot) -> T) -> Option<T> {
        self.state()
            .slots
            .iter()
            .find(|slot| slot.address == address)
            .map(f)
    }

    fn with_slot_mut<T>(
        &self,
        address: PciAddress,
        f: impl FnOnce(&mut PciSlot) -> T,
    ) -> Option<T> {
        self.state()
            .slots
            .iter_mut()
            .find(|slot| slot.address == address)
            .map(f)
    }
}

impl PciHost for VirtualPciBus {
    fn enumerate(&self) -> Vec<PciDeviceRef> {
        self.state().slots.iter().map(PciSlot::device_ref).collect()
    }

    fn enable_device(&self, device: &PciDeviceRef) -> HostResult<()> {
        self.with_slot_mut(device.address, |slot| {
            slot.command.insert(PciCommand::MEMORY_SPACE);
        })
        .ok_or(HostError::NoSuchDevice(device.address))
    }

    fn disable_device(&self, device: &PciDeviceRef) {
        self.with_slot_mut(device.address, |slot| {
            slot.command
                .remove(PciCommand::MEMORY_SPACE | PciCommand::BUS_MASTER);
        });
    }

    fn request_region(
        &self,
        device: &PciDeviceRef,
        bar: u8,
        owner: &str,
    ) -> HostResult<RegionToken> {
        let address = device.address;
        self.with_slot_mut(address, |slot| {
            if bar != 0 {
                return Err(HostError::NoSuchRegion {
                    device: address,
                    bar,
                });
            }
            if let Some(current) = &slot.owner {
                return Err(HostError::Busy {
                    device: address,
                    bar,
                    owner: current.clone(),
                });
            }
            slot.owner = Some(owner.to_string());
            Ok(RegionToken::new(
                address,
                bar,
                slot.bar0_base,
                slot.device.bar0_size(),
            ))
        })
        .unwrap_or(Err(HostError::NoSuchDevice(address)))
    }

    fn release_region(&self, region: RegionToken) {
        self.with_slot_mut(region.device(), |slot| {
            slot.owner = None;
        });
    }

    fn iomap(&self, region: &RegionToken) -> HostResult<IoMapping> {
        let address = region.device();
        let bar = region.bar();
        self.with_slot_mut(address, |slot| {
            if slot.owner.is_none() {
                return Err(HostError::MapFailed {
                    device: address,
                    bar,
                    reason: "region is not claimed".into(),
                });
            }
            if self.mmio.base_of(slot.device.name()) != Some(region.base()) {
                return Err(HostError::MapFailed {
                    device: address,
                    bar,
                    reason: "region is not decoded on the bus".into(),
                });
            }
            slot.mappings += 1;
            Ok(IoMapping::new(region, self.mmio.clone()))
        })
        .unwrap_or(Err(HostError::NoSuchDevice(address)))
    }

    fn iounmap(&self, mapping: IoMapping) {
        self.with_slot_mut(mapping.device(), |slot| {
            slot.mappings = slot.mappings.saturating_sub(1);
        });
    }
}
