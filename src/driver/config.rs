use std::fmt;

use crate::soc::device::{CUSTOM_PCI_DEVICE_ID, CUSTOM_PCI_VENDOR_ID};

use super::transfer::TRANSFER_BUFFER_SIZE;

pub const DEFAULT_DRIVER_NAME: &str = "drv_pci";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub name: String,
    pub vendor_id: u16,
    pub device_id: u16,
    pub bar_index: u8,
    pub buffer_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DRIVER_NAME.into(),
            vendor_id: CUSTOM_PCI_VENDOR_ID,
            device_id: CUSTOM_PCI_DEVICE_ID,
            bar_index: 0,
            buffer_capacity: TRANSFER_BUFFER_SIZE,
        }
    }
}

impl DriverConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ids(mut self, vendor_id: u16, device_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.device_id = device_id;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Defaults overlaid with `CUSTOMPCI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup("CUSTOMPCI_DRIVER_NAME") {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidEnv("CUSTOMPCI_DRIVER_NAME"));
            }
            config.name = name.to_string();
        }
        if let Some(raw) = lookup("CUSTOMPCI_VENDOR_ID") {
            config.vendor_id =
                parse_id(&raw).ok_or(ConfigError::InvalidEnv("CUSTOMPCI_VENDOR_ID"))?;
        }
        if let Some(raw) = lookup("CUSTOMPCI_DEVICE_ID") {
            config.device_id =
                parse_id(&raw).ok_or(ConfigError::InvalidEnv("CUSTOMPCI_DEVICE_ID"))?;
        }
        if let Some(raw) = lookup("CUSTOMPCI_BUFFER_SIZE") {
            config.buffer_capacity = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or(ConfigError::InvalidEnv("CUSTOMPCI_BUFFER_SIZE"))?;
        }
        Ok(config)
    }
}

fn parse_id(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidEnv(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnv(var) => write!(f, "invalid value for env var {var}"),
        }
    }
}

impl std::error::Error for ConfigError {}
