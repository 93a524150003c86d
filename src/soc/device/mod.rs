pub mod custom;
#[path = "device.rs"]
mod device_trait;
pub mod endianness;
pub mod error;
pub mod register_file;
pub mod registry;
pub mod trace;

pub use custom::{
    BAR0_SIZE, CUSTOM_PCI_DEVICE_ID, CUSTOM_PCI_DEVICE_TYPE, CUSTOM_PCI_REVISION,
    CUSTOM_PCI_VENDOR_ID, CustomPciDevice, DeviceTypeInfo,
};
pub use device_trait::Device;
pub use endianness::Endianness;
pub use error::{DeviceError, DeviceResult};
pub use register_file::RegisterFile;
pub use registry::DeviceTypeRegistry;
pub use trace::{AccessDirection, AccessOutcome, AccessRecord, AccessTracer, GUEST_ERROR_TARGET};
