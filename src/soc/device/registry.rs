//! Table of device types known to the emulator. Populated once at start-up
//! and passed around explicitly; nothing here is global.
use ahash::AHashMap;

use super::{
    custom::{CustomPciDevice, DeviceTypeInfo},
    error::{DeviceError, DeviceResult},
};

#[derive(Default)]
pub struct DeviceTypeRegistry {
    types: AHashMap<String, DeviceTypeInfo>,
    next_instance: usize,
}

impl DeviceTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every type this crate ships.
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        let info = DeviceTypeInfo::custom_pci_device();
        registry.types.insert(info.name.clone(), info);
        registry
    }

    pub fn register(&mut self, info: DeviceTypeInfo) -> DeviceResult<()> {
        if info.bar0_size == 0 || !info.bar0_size.is_power_of_two() {
            return Err(DeviceError::InvalidRegionSize {
                type_name: info.name,
                size: info.bar0_size,
            });
        }
        if self.types.contains_key(&info.name) {
            return Err(DeviceError::DuplicateType(info.name));
        }
        tracing::debug!(device_type = %info.name, identity = %info.identity, "device type registered");
        self.types.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Option<DeviceTypeInfo> {
        self.types.remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&DeviceTypeInfo> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Creates a new instance of `name`. Each instance gets a unique region name.
    pub fn instantiate(&mut self, name: &str) -> DeviceResult<CustomPciDevice> {
        let info = self
            .types
            .get(name)
            .ok_or_else(|| DeviceError::UnknownType(name.to_string()))?;
        let instance = self.next_instance;
        self.next_instance += 1;
        Ok(CustomPciDevice::instantiate(info, instance))
    }

    /// Drops every registered type.
    pub fn clear(&mut self) {
        self.types.clear();
    }
}
