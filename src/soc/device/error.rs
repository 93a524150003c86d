use std::{error::Error, fmt};

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    UnknownType(String),
    DuplicateType(String),
    InvalidRegionSize { type_name: String, size: u64 },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::UnknownType(name) => write!(f, "device type '{name}' is not registered"),
            DeviceError::DuplicateType(name) => {
                write!(f, "device type '{name}' is already registered")
            }
            DeviceError::InvalidRegionSize { type_name, size } => write!(
                f,
                "device type '{type_name}' declares invalid region size 0x{size:X} (must be a non-zero power of two)"
            ),
        }
    }
}

impl Error for DeviceError {}
