//! The driver object: owns one [`DeviceLifecycle`] per probed device and
//! hands out consumer sessions by node name.
use std::sync::Arc;

use ahash::AHashMap;

use crate::soc::pci::{PciAddress, PciIdentity};

use super::{
    channel::ChannelSession,
    config::DriverConfig,
    error::{DriverError, DriverResult},
    host::{PciDeviceRef, PciHost},
    lifecycle::DeviceLifecycle,
};

/// One row of the driver's match table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PciDeviceId {
    pub vendor_id: u16,
    pub device_id: u16,
}

impl PciDeviceId {
    pub fn matches(&self, identity: &PciIdentity) -> bool {
        identity.matches(self.vendor_id, self.device_id)
    }
}

pub struct PciDriver {
    config: DriverConfig,
    host: Arc<dyn PciHost>,
    instances: AHashMap<PciAddress, DeviceLifecycle>,
    next_minor: u32,
}

impl PciDriver {
    pub fn new(config: DriverConfig, host: Arc<dyn PciHost>) -> Self {
        tracing::info!(
            driver = %config.name,
            vendor_id = config.vendor_id,
            device_id = config.device_id,
            "loading driver"
        );
        Self {
            config,
            host,
            instances: AHashMap::new(),
            next_minor: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn id_table(&self) -> [PciDeviceId; 1] {
        [PciDeviceId {
            vendor_id: self.config.vendor_id,
            device_id: self.config.device_id,
        }]
    }

    pub fn matches(&self, identity: &PciIdentity) -> bool {
        self.id_table().iter().any(|id| id.matches(identity))
    }

    /// Looks up the configured id pair on the host and probes it.
    pub fn load(&mut self) -> DriverResult<String> {
        let device = self
            .host
            .find_device(self.config.vendor_id, self.config.device_id)
            .map_err(|err| {
                tracing::warn!(driver = %self.config.name, error = %err, "no device to bind");
                DriverError::NotFound(err)
            })?;
        self.probe(device)
    }

    /// Brings `device` up and returns the name of its published channel node.
    /// A failed bring-up leaves no instance behind.
    pub fn probe(&mut self, device: PciDeviceRef) -> DriverResult<String> {
        let address = device.address;
        if !self.matches(&device.identity) {
            return Err(DriverError::UnsupportedDevice(address));
        }
        if self.instances.contains_key(&address) {
            return Err(DriverError::AlreadyBound(address));
        }
        let node = format!("{}{}", self.config.name, self.next_minor);
        tracing::info!(device = %address, identity = %device.identity, %node, "probing");

        let mut lifecycle =
            DeviceLifecycle::new(device, self.host.clone(), &self.config, node.clone());
        if let Err(err) = lifecycle.bring_up() {
            tracing::warn!(device = %address, error = %err, "probe failed");
            return Err(err);
        }
        self.next_minor += 1;
        self.instances.insert(address, lifecycle);
        Ok(node)
    }

    /// Tears the instance at `address` down. Returns false if nothing was bound there.
    pub fn remove(&mut self, address: PciAddress) -> bool {
        let Some(mut lifecycle) = self.instances.remove(&address) else {
            return false;
        };
        lifecycle.teardown();
        tracing::info!(device = %address, node = lifecycle.node(), "removed");
        true
    }

    pub fn unload(&mut self) {
        let mut addresses: Vec<_> = self.instances.keys().copied().collect();
        addresses.sort();
        for address in addresses {
            self.remove(address);
        }
        tracing::info!(driver = %self.config.name, "driver unloaded");
    }

    pub fn instance(&self, address: PciAddress) -> Option<&DeviceLifecycle> {
        self.instances.get(&address)
    }

    /// Published node names, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .instances
            .values()
            .filter(|lifecycle| lifecycle.is_active())
            .map(|lifecycle| lifecycle.node().to_string())
            .collect();
        nodes.sort();
        nodes
    }

    pub fn open(&mut self, node: &str) -> DriverResult<ChannelSession<'_>> {
        let lifecycle = self
            .instances
            .values_mut()
            .find(|lifecycle| lifecycle.node() == node)
            .ok_or_else(|| DriverError::NoSuchNode(node.to_string()))?;
        lifecycle.open()
    }
}

impl Drop for PciDriver {
    fn drop(&mut self) {
        if !self.instances.is_empty() {
            self.unload();
        }
    }
}
