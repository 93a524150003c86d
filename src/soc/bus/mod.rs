pub mod device_bus;
pub mod error;
pub mod range;

pub use device_bus::DeviceBus;
pub use error::{BusError, BusResult};
pub use range::{BusRange, ResolvedRange};
