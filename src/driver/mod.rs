//! Driver side of the device: everything that runs against a [`host::PciHost`]
//! rather than inside the emulated hardware.

pub mod channel;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod pci_driver;
pub mod transfer;

pub use channel::{CharChannel, ChannelSession};
pub use config::{ConfigError, DEFAULT_DRIVER_NAME, DriverConfig};
pub use error::{DriverError, DriverResult};
pub use host::{HostError, HostResult, IoMapping, PciDeviceRef, PciHost, RegionToken};
pub use lifecycle::{DeviceLifecycle, LifecycleState};
pub use pci_driver::{PciDeviceId, PciDriver};
pub use transfer::{TRANSFER_BUFFER_SIZE, TransferBuffer, TransferError};
