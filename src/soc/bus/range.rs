use std::sync::Arc;

use crate::soc::device::Device;

#[derive(Debug, Clone)]
pub struct BusRange {
    pub id: u64,
    pub bus_start: u64,
    pub bus_end: u64,
    pub device_id: usize,
}

impl BusRange {
    pub fn contains(&self, addr: u64) -> bool {
        self.bus_start <= addr && addr < self.bus_end
    }

    pub fn overlaps(&self, other: &BusRange) -> bool {
        self.bus_start < other.bus_end && other.bus_start < self.bus_end
    }
}

#[derive(Clone)]
pub struct ResolvedRange {
    pub device: Arc<dyn Device>,
    pub bus_start: u64,
    pub bus_end: u64,
}

impl ResolvedRange {
    /// Offset of `addr` inside the device.
    pub fn offset_of(&self, addr: u64) -> u64 {
        addr - self.bus_start
    }
}
