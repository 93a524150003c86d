//! Defines the `Device` trait used by the memory-mapped bus. A device exposes
//! its register span and answers raw `(offset, size)` accesses. Unlike the bus
//! itself, devices have no error surface: whatever a bus master asks for, the
//! device decides how much of it to honour.
use std::ops::{Range, RangeInclusive};

use super::endianness::Endianness;

pub trait Device: Send + Sync {
    fn name(&self) -> &str;
    fn span(&self) -> Range<u64>;

    #[inline(always)]
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    /// Access widths, in bytes, the bus may forward to this device.
    #[inline(always)]
    fn access_sizes(&self) -> RangeInclusive<usize> {
        1..=8
    }

    /// Read `size` bytes at `offset`, zero-extended.
    fn read(&self, offset: u64, size: usize) -> u64;

    /// Write the low `size` bytes of `value` at `offset`.
    fn write(&self, offset: u64, size: usize, value: u64);
}
