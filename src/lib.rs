//! An emulated custom PCI function and the driver that binds to it.
//!
//! [`soc`] holds the hardware side: a bounds-absorbing register file exposed
//! as BAR0 of a PCI function on a virtual segment. [`driver`] holds the host
//! side: bring-up and tear-down of each discovered function and a
//! character-device style channel over a fixed-size transfer buffer.

pub mod driver;
pub mod soc;
