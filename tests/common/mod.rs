use std::sync::{Arc, Mutex};

use custompci::soc::{
    bus::DeviceBus,
    device::{AccessRecord, AccessTracer, CUSTOM_PCI_DEVICE_TYPE, DeviceTypeRegistry},
    pci::{PciAddress, VirtualPciBus},
};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. `RUST_LOG` selects what
/// is shown, e.g. `RUST_LOG=custompci::guest_error=warn`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A virtual segment with `count` custom devices plugged in.
pub fn segment_with_devices(count: usize) -> (Arc<VirtualPciBus>, Vec<PciAddress>) {
    init_tracing();
    let mut registry = DeviceTypeRegistry::with_builtin_types();
    let bus = Arc::new(VirtualPciBus::new(Arc::new(DeviceBus::new(12))));
    let addresses = (0..count)
        .map(|_| {
            let device = registry
                .instantiate(CUSTOM_PCI_DEVICE_TYPE)
                .expect("builtin type instantiates");
            bus.plug(device).expect("free slot")
        })
        .collect();
    (bus, addresses)
}

#[derive(Clone, Default)]
pub struct RecordingTracer {
    pub records: Arc<Mutex<Vec<AccessRecord>>>,
}

impl RecordingTracer {
    pub fn take(&self) -> Vec<AccessRecord> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }
}

impl AccessTracer for RecordingTracer {
    fn on_access(&mut self, record: AccessRecord) {
        self.records.lock().unwrap().push(record);
    }
}
