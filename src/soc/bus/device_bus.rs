//! DeviceBus owns the memory-mapped address space. Devices register a region
//! at a base address; raw `(address, size)` accesses from a bus master are
//! resolved through hashed buckets and forwarded to the owning device at the
//! matching offset. Regions can be unregistered at any time so hot-removed
//! devices stop decoding immediately.
use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::soc::device::Device;

use super::{
    error::{BusError, BusResult},
    range::{BusRange, ResolvedRange},
};

type Bucket = SmallVec<[BusRange; 2]>;

struct Registration {
    device_id: usize,
    range_id: u64,
    base: u64,
}

pub struct DeviceBus {
    bucket_bits: u8,
    devices: RwLock<Vec<Option<Arc<dyn Device>>>>,
    name_index: RwLock<AHashMap<String, Registration>>,
    buckets: RwLock<AHashMap<u64, Bucket>>,
    range_index: RwLock<AHashMap<u64, Vec<u64>>>,
    next_range_id: AtomicU64,
}

impl DeviceBus {
    pub fn new(bucket_bits: u8) -> Self {
        assert!(bucket_bits < 63, "bucket_bits must be < 63");
        Self {
            bucket_bits,
            devices: RwLock::new(Vec::new()),
            name_index: RwLock::new(AHashMap::new()),
            buckets: RwLock::new(AHashMap::new()),
            range_index: RwLock::new(AHashMap::new()),
            next_range_id: AtomicU64::new(1),
        }
    }

    fn bucket_index(&self, address: u64) -> u64 {
        address >> self.bucket_bits
    }

    fn insert_segment(&self, entry: &mut Bucket, segment: BusRange) -> BusResult<()> {
        if let Some(conflict) = entry.iter().find(|existing| existing.overlaps(&segment)) {
            let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
            let details = devices
                .get(conflict.device_id)
                .and_then(Option::as_ref)
                .map(|d| format!("conflicts with device '{}'", d.name()))
                .unwrap_or_else(|| "conflicts with unknown device".into());
            return Err(BusError::Overlap {
                address: segment.bus_start,
                details,
            });
        }

        let pos = entry
            .iter()
            .position(|existing| existing.bus_start > segment.bus_start);
        match pos {
            Some(idx) => entry.insert(idx, segment),
            None => entry.push(segment),
        }
        Ok(())
    }

    fn add_range(&self, bus_start: u64, bus_end: u64, device_id: usize) -> BusResult<u64> {
        if bus_end <= bus_start {
            return Err(BusError::Overlap {
                address: bus_start,
                details: "range is empty".into(),
            });
        }

        let id = self.next_range_id.fetch_add(1, Ordering::Relaxed);
        let segment = BusRange {
            id,
            bus_start,
            bus_end,
            device_id,
        };
        let start_idx = self.bucket_index(bus_start);
        let end_idx = self.bucket_index(bus_end - 1);
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);

        // Check every bucket before touching any so a conflict leaves no partial range behind.
        for idx in start_idx..=end_idx {
            if let Some(entry) = buckets.get(&idx) {
                let mut probe = entry.clone();
                self.insert_segment(&mut probe, segment.clone())?;
            }
        }

        let mut touched = Vec::new();
        for idx in start_idx..=end_idx {
            let entry = buckets.entry(idx).or_default();
            self.insert_segment(entry, segment.clone())?;
            touched.push(idx);
        }

        self.range_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, touched);
        Ok(id)
    }

    fn remove_range(&self, range_id: u64) -> bool {
        let bucket_indices = match self
            .range_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&range_id)
        {
            Some(indices) => indices,
            None => return false,
        };

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        for idx in bucket_indices {
            if let Some(entry) = buckets.get_mut(&idx) {
                entry.retain(|segment| segment.id != range_id);
                if entry.is_empty() {
                    buckets.remove(&idx);
                }
            }
        }
        true
    }

    /// Maps `device` at `base_address`. Device names are unique on a bus.
    pub fn register_device(&self, device: Arc<dyn Device>, base_address: u64) -> BusResult<()> {
        let span = device.span();
        if span.start != 0 || span.end <= span.start {
            return Err(BusError::InvalidDeviceSpan {
                device: device.name().to_string(),
            });
        }
        let end = base_address
            .checked_add(span.end)
            .ok_or(BusError::Overlap {
                address: base_address,
                details: "range exceeds address space".into(),
            })?;

        let name = device.name().to_string();
        let mut names = self.name_index.write().unwrap_or_else(PoisonError::into_inner);
        if names.contains_key(&name) {
            return Err(BusError::Overlap {
                address: base_address,
                details: format!("device '{name}' already registered"),
            });
        }

        let device_id = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            match devices.iter().position(Option::is_none) {
                Some(free) => {
                    devices[free] = Some(device);
                    free
                }
                None => {
                    devices.push(Some(device));
                    devices.len() - 1
                }
            }
        };

        match self.add_range(base_address, end, device_id) {
            Ok(range_id) => {
                names.insert(
                    name,
                    Registration {
                        device_id,
                        range_id,
                        base: base_address,
                    },
                );
                Ok(())
            }
            Err(err) => {
                self.devices.write().unwrap_or_else(PoisonError::into_inner)[device_id] = None;
                Err(err)
            }
        }
    }

    /// Stops decoding the named device. Returns `false` when it was not registered.
    pub fn unregister_device(&self, name: &str) -> bool {
        let registration = match self
            .name_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
        {
            Some(registration) => registration,
            None => return false,
        };
        self.remove_range(registration.range_id);
        self.devices.write().unwrap_or_else(PoisonError::into_inner)[registration.device_id] = None;
        true
    }

    /// Base address the named device is decoded at, if registered.
    pub fn base_of(&self, name: &str) -> Option<u64> {
        self.name_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|registration| registration.base)
    }

    pub fn resolve(&self, address: u64) -> BusResult<ResolvedRange> {
        let bucket_idx = self.bucket_index(address);
        let segment = {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            buckets.get(&bucket_idx).and_then(|segments| {
                segments
                    .iter()
                    .find(|segment| segment.contains(address))
                    .cloned()
            })
        };

        let segment = segment.ok_or(BusError::NotMapped { address })?;
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let device = devices
            .get(segment.device_id)
            .cloned()
            .flatten()
            .ok_or(BusError::NotMapped { address })?;

        Ok(ResolvedRange {
            device,
            bus_start: segment.bus_start,
            bus_end: segment.bus_end,
        })
    }

    fn resolve_access(&self, address: u64, size: usize) -> BusResult<ResolvedRange> {
        let resolved = self.resolve(address)?;
        if !resolved.device.access_sizes().contains(&size) {
            return Err(BusError::InvalidAccessSize {
                address,
                size,
                device: resolved.device.name().to_string(),
            });
        }
        Ok(resolved)
    }

    /// Dispatches a bus-master read. Widths the device does not accept are
    /// rejected here; everything else is the device's to decide.
    pub fn read(&self, address: u64, size: usize) -> BusResult<u64> {
        let resolved = self.resolve_access(address, size)?;
        Ok(resolved.device.read(resolved.offset_of(address), size))
    }

    pub fn write(&self, address: u64, size: usize, value: u64) -> BusResult<()> {
        let resolved = self.resolve_access(address, size)?;
        resolved
            .device
            .write(resolved.offset_of(address), size, value);
        Ok(())
    }
}
