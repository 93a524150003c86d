pub mod bus;
pub mod device;
pub mod pci;
