//! PCI identity types and the virtual segment emulated functions plug into.

pub mod bus;
pub mod identity;

pub use bus::{MMIO_WINDOW_BASE, VirtualPciBus};
pub use identity::{PCI_CLASS_OTHERS, PciAddress, PciClassCode, PciCommand, PciIdentity};
