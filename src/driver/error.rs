use std::{error::Error, fmt};

use crate::soc::pci::PciAddress;

use super::{host::HostError, lifecycle::LifecycleState};

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    NotFound(HostError),
    UnsupportedDevice(PciAddress),
    EnableFailed {
        device: PciAddress,
        source: HostError,
    },
    RegionBusy {
        device: PciAddress,
        source: HostError,
    },
    MapFailed {
        device: PciAddress,
        source: HostError,
    },
    AlreadyBound(PciAddress),
    NotBound(PciAddress),
    InvalidTransition {
        device: PciAddress,
        state: LifecycleState,
        operation: &'static str,
    },
    RegionAlreadyRequested(PciAddress),
    NoSuchNode(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NotFound(_) => write!(f, "no matching device found"),
            DriverError::UnsupportedDevice(device) => {
                write!(f, "{device}: not in this driver's id table")
            }
            DriverError::EnableFailed { device, .. } => write!(f, "{device}: enable failed"),
            DriverError::RegionBusy { device, .. } => {
                write!(f, "{device}: region could not be claimed")
            }
            DriverError::MapFailed { device, .. } => write!(f, "{device}: region could not be mapped"),
            DriverError::AlreadyBound(device) => write!(f, "{device}: already bound"),
            DriverError::NotBound(device) => write!(f, "{device}: not bound"),
            DriverError::InvalidTransition {
                device,
                state,
                operation,
            } => write!(f, "{device}: cannot {operation} while {state}"),
            DriverError::RegionAlreadyRequested(device) => {
                write!(f, "{device}: region was already requested by this instance")
            }
            DriverError::NoSuchNode(node) => write!(f, "no channel node named '{node}'"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DriverError::NotFound(source)
            | DriverError::EnableFailed { source, .. }
            | DriverError::RegionBusy { source, .. }
            | DriverError::MapFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
