use std::{error::Error, fmt};

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    NotMapped {
        address: u64,
    },
    Overlap {
        address: u64,
        details: String,
    },
    InvalidAccessSize {
        address: u64,
        size: usize,
        device: String,
    },
    OutOfRange {
        address: u64,
        end: u64,
    },
    InvalidDeviceSpan {
        device: String,
    },
    NoFreeSlot,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::NotMapped { address } => write!(f, "address 0x{address:016X} is not mapped"),
            BusError::Overlap { address, details } => write!(
                f,
                "address 0x{address:016X} overlaps existing mapping ({details})"
            ),
            BusError::InvalidAccessSize {
                address,
                size,
                device,
            } => write!(
                f,
                "device '{device}' does not accept {size}-byte accesses (address 0x{address:016X})"
            ),
            BusError::OutOfRange { address, end } => write!(
                f,
                "address 0x{address:016X} exceeds mapping end 0x{end:016X}"
            ),
            BusError::InvalidDeviceSpan { device } => {
                write!(f, "device '{device}' reported an invalid span")
            }
            BusError::NoFreeSlot => write!(f, "no free device number left on the bus"),
        }
    }
}

impl Error for BusError {}
