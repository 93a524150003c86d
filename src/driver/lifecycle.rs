//! Per-device bring-up and tear-down.
//!
//! ```text
//! Unbound --enable--> Enabled --claim_region--> RegionClaimed
//!         --map_region--> RegionMapped --bind_channel--> Active
//! Active --unbind--> RegionMapped --release_region--> Enabled --disable--> Unbound
//! ```
//!
//! Every resource taken on the way up is given back in reverse order, both
//! when a later step fails and on tear-down. Reverse steps only release what
//! is actually held, so tear-down is safe from any state and repeatable.
use std::{fmt, sync::Arc};

use super::{
    channel::{CharChannel, ChannelSession},
    config::DriverConfig,
    error::{DriverError, DriverResult},
    host::{IoMapping, PciDeviceRef, PciHost, RegionToken},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unbound,
    Enabled,
    RegionClaimed,
    RegionMapped,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unbound => "unbound",
            LifecycleState::Enabled => "enabled",
            LifecycleState::RegionClaimed => "region-claimed",
            LifecycleState::RegionMapped => "region-mapped",
            LifecycleState::Active => "active",
        };
        f.write_str(name)
    }
}

pub struct DeviceLifecycle {
    device: PciDeviceRef,
    host: Arc<dyn PciHost>,
    owner: String,
    node: String,
    bar: u8,
    buffer_capacity: usize,
    state: LifecycleState,
    region: Option<RegionToken>,
    mapping: Option<IoMapping>,
    channel: Option<CharChannel>,
    claim_attempted: bool,
}

impl DeviceLifecycle {
    pub fn new(
        device: PciDeviceRef,
        host: Arc<dyn PciHost>,
        config: &DriverConfig,
        node: impl Into<String>,
    ) -> Self {
        Self {
            device,
            host,
            owner: config.name.clone(),
            node: node.into(),
            bar: config.bar_index,
            buffer_capacity: config.buffer_capacity,
            state: LifecycleState::Unbound,
            region: None,
            mapping: None,
            channel: None,
            claim_attempted: false,
        }
    }

    pub fn device(&self) -> &PciDeviceRef {
        &self.device
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// The mapped register window, while the region is mapped.
    pub fn registers(&self) -> Option<&IoMapping> {
        self.mapping.as_ref()
    }

    pub fn channel(&self) -> Option<&CharChannel> {
        self.channel.as_ref()
    }

    fn expect_state(&self, expected: LifecycleState, operation: &'static str) -> DriverResult<()> {
        if self.state == expected {
            return Ok(());
        }
        if self.state == LifecycleState::Active {
            return Err(DriverError::AlreadyBound(self.device.address));
        }
        Err(DriverError::InvalidTransition {
            device: self.device.address,
            state: self.state,
            operation,
        })
    }

    /// Runs the whole bring-up. On failure everything acquired is already released.
    pub fn bring_up(&mut self) -> DriverResult<()> {
        if self.state == LifecycleState::Active {
            return Err(DriverError::AlreadyBound(self.device.address));
        }
        if self.claim_attempted {
            return Err(DriverError::RegionAlreadyRequested(self.device.address));
        }
        self.enable()?;
        self.claim_region()?;
        self.map_region()?;
        self.bind_channel()?;
        Ok(())
    }

    pub fn enable(&mut self) -> DriverResult<()> {
        self.expect_state(LifecycleState::Unbound, "enable")?;
        let address = self.device.address;
        self.host
            .enable_device(&self.device)
            .map_err(|source| DriverError::EnableFailed {
                device: address,
                source,
            })?;
        self.state = LifecycleState::Enabled;
        tracing::debug!(device = %address, "device enabled");
        Ok(())
    }

    /// Claims the configured BAR. Attempted at most once per instance; on
    /// failure the device is disabled again before the error is returned.
    pub fn claim_region(&mut self) -> DriverResult<()> {
        self.expect_state(LifecycleState::Enabled, "claim region")?;
        let address = self.device.address;
        if self.claim_attempted {
            return Err(DriverError::RegionAlreadyRequested(address));
        }
        self.claim_attempted = true;
        match self.host.request_region(&self.device, self.bar, &self.owner) {
            Ok(token) => {
                tracing::debug!(device = %address, bar = self.bar, base = token.base(), "region claimed");
                self.region = Some(token);
                self.state = LifecycleState::RegionClaimed;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(device = %address, error = %source, "claim failed, unwinding");
                self.disable();
                Err(DriverError::RegionBusy {
                    device: address,
                    source,
                })
            }
        }
    }

    /// Maps the claimed region. On failure the region is released and then the
    /// device is disabled, in that order.
    pub fn map_region(&mut self) -> DriverResult<()> {
        self.expect_state(LifecycleState::RegionClaimed, "map region")?;
        let address = self.device.address;
        let Some(region) = self.region.as_ref() else {
            return Err(DriverError::InvalidTransition {
                device: address,
                state: self.state,
                operation: "map region",
            });
        };
        match self.host.iomap(region) {
            Ok(mapping) => {
                tracing::debug!(device = %address, len = mapping.len(), "region mapped");
                self.mapping = Some(mapping);
                self.state = LifecycleState::RegionMapped;
                Ok(())
            }
            Err(source) => {
                tracing::warn!(device = %address, error = %source, "map failed, unwinding");
                self.release_region();
                self.disable();
                Err(DriverError::MapFailed {
                    device: address,
                    source,
                })
            }
        }
    }

    /// Allocates the transfer buffer and publishes the channel node.
    pub fn bind_channel(&mut self) -> DriverResult<()> {
        self.expect_state(LifecycleState::RegionMapped, "bind channel")?;
        self.channel = Some(CharChannel::new(self.node.clone(), self.buffer_capacity));
        self.state = LifecycleState::Active;
        tracing::info!(device = %self.device.address, node = %self.node, "device bound");
        Ok(())
    }

    /// Unpublishes the channel. Returns whether anything was unbound.
    pub fn unbind(&mut self) -> bool {
        let Some(channel) = self.channel.take() else {
            return false;
        };
        tracing::debug!(device = %self.device.address, node = channel.node(), "channel unpublished");
        self.state = LifecycleState::RegionMapped;
        true
    }

    /// Unmaps and releases the region, whichever of the two is held.
    pub fn release_region(&mut self) -> bool {
        self.unbind();
        let mut released = false;
        if let Some(mapping) = self.mapping.take() {
            self.host.iounmap(mapping);
            released = true;
        }
        if let Some(region) = self.region.take() {
            self.host.release_region(region);
            released = true;
        }
        if released {
            tracing::debug!(device = %self.device.address, "region released");
            self.state = LifecycleState::Enabled;
        }
        released
    }

    pub fn disable(&mut self) -> bool {
        self.release_region();
        if self.state == LifecycleState::Unbound {
            return false;
        }
        self.host.disable_device(&self.device);
        self.state = LifecycleState::Unbound;
        tracing::debug!(device = %self.device.address, "device disabled");
        true
    }

    /// Full reverse unwind from whatever state bring-up reached.
    pub fn teardown(&mut self) {
        if self.state == LifecycleState::Unbound {
            return;
        }
        self.unbind();
        self.release_region();
        self.disable();
    }

    /// Opens the published channel.
    pub fn open(&mut self) -> DriverResult<ChannelSession<'_>> {
        let address = self.device.address;
        self.channel
            .as_mut()
            .map(CharChannel::open)
            .ok_or(DriverError::NotBound(address))
    }
}

impl Drop for DeviceLifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::host::{HostError, HostResult};
    use crate::soc::{
        bus::DeviceBus,
        device::DeviceTypeInfo,
        pci::PciAddress,
    };
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Enable,
        Disable,
        Request,
        Release,
        Map,
        Unmap,
    }

    #[derive(Default)]
    struct Faults {
        refuse_enable: bool,
        region_busy: bool,
        map_fails: bool,
    }

    /// Records every collaborator call and fails on request.
    struct ScriptedHost {
        calls: Mutex<Vec<Call>>,
        faults: Faults,
        bus: Arc<DeviceBus>,
    }

    impl ScriptedHost {
        fn new(faults: Faults) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                faults,
                bus: Arc::new(DeviceBus::new(12)),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, call: Call) -> usize {
            self.calls().iter().filter(|c| **c == call).count()
        }

        fn log(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl PciHost for ScriptedHost {
        fn enumerate(&self) -> Vec<PciDeviceRef> {
            vec![device_ref()]
        }

        fn enable_device(&self, device: &PciDeviceRef) -> HostResult<()> {
            self.log(Call::Enable);
            if self.faults.refuse_enable {
                return Err(HostError::Refused {
                    device: device.address,
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }

        fn disable_device(&self, _device: &PciDeviceRef) {
            self.log(Call::Disable);
        }

        fn request_region(
            &self,
            device: &PciDeviceRef,
            bar: u8,
            _owner: &str,
        ) -> HostResult<RegionToken> {
            self.log(Call::Request);
            if self.faults.region_busy {
                return Err(HostError::Busy {
                    device: device.address,
                    bar,
                    owner: "other".into(),
                });
            }
            Ok(RegionToken::new(device.address, bar, 0x1000, 0x1000))
        }

        fn release_region(&self, _region: RegionToken) {
            self.log(Call::Release);
        }

        fn iomap(&self, region: &RegionToken) -> HostResult<IoMapping> {
            self.log(Call::Map);
            if self.faults.map_fails {
                return Err(HostError::MapFailed {
                    device: region.device(),
                    bar: region.bar(),
                    reason: "scripted".into(),
                });
            }
            Ok(IoMapping::new(region, self.bus.clone()))
        }

        fn iounmap(&self, _mapping: IoMapping) {
            self.log(Call::Unmap);
        }
    }

    fn device_ref() -> PciDeviceRef {
        PciDeviceRef {
            address: PciAddress::new(0, 2, 0),
            identity: DeviceTypeInfo::custom_pci_device().identity,
        }
    }

    fn lifecycle(host: &Arc<ScriptedHost>) -> DeviceLifecycle {
        DeviceLifecycle::new(device_ref(), host.clone(), &DriverConfig::default(), "drv_pci0")
    }

    #[test]
    fn bring_up_acquires_in_order_and_teardown_reverses() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.bring_up().expect("bring-up");
        assert_eq!(lc.state(), LifecycleState::Active);
        assert!(lc.registers().is_some(), "region is mapped while active");
        assert_eq!(host.calls(), vec![Call::Enable, Call::Request, Call::Map]);

        lc.teardown();
        assert_eq!(lc.state(), LifecycleState::Unbound);
        assert_eq!(
            host.calls(),
            vec![
                Call::Enable,
                Call::Request,
                Call::Map,
                Call::Unmap,
                Call::Release,
                Call::Disable
            ]
        );
    }

    #[test]
    fn enable_failure_is_propagated_without_unwind() {
        let host = ScriptedHost::new(Faults {
            refuse_enable: true,
            ..Faults::default()
        });
        let mut lc = lifecycle(&host);
        assert!(matches!(lc.bring_up(), Err(DriverError::EnableFailed { .. })));
        assert_eq!(lc.state(), LifecycleState::Unbound);
        assert_eq!(host.calls(), vec![Call::Enable], "nothing to release");
    }

    #[test]
    fn claim_failure_disables_exactly_once() {
        let host = ScriptedHost::new(Faults {
            region_busy: true,
            ..Faults::default()
        });
        let mut lc = lifecycle(&host);
        let err = lc.bring_up().expect_err("claim must fail");
        assert!(
            matches!(err, DriverError::RegionBusy { source: HostError::Busy { .. }, .. }),
            "original error is reported: {err:?}"
        );
        assert_eq!(lc.state(), LifecycleState::Unbound);
        assert_eq!(host.calls(), vec![Call::Enable, Call::Request, Call::Disable]);

        lc.teardown();
        drop(lc);
        assert_eq!(host.count(Call::Disable), 1, "no double disable");
        assert_eq!(host.count(Call::Release), 0, "nothing was claimed");
    }

    #[test]
    fn map_failure_releases_then_disables() {
        let host = ScriptedHost::new(Faults {
            map_fails: true,
            ..Faults::default()
        });
        let mut lc = lifecycle(&host);
        assert!(matches!(lc.bring_up(), Err(DriverError::MapFailed { .. })));
        assert_eq!(lc.state(), LifecycleState::Unbound);
        assert_eq!(
            host.calls(),
            vec![Call::Enable, Call::Request, Call::Map, Call::Release, Call::Disable]
        );

        lc.teardown();
        drop(lc);
        assert_eq!(host.count(Call::Release), 1, "region released exactly once");
        assert_eq!(host.count(Call::Disable), 1, "device disabled exactly once");
        assert_eq!(host.count(Call::Unmap), 0, "nothing was mapped");
    }

    #[test]
    fn teardown_on_unbound_instance_is_a_no_op() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.teardown();
        lc.teardown();
        assert!(host.calls().is_empty(), "teardown of an unbound instance touches nothing");
    }

    #[test]
    fn teardown_twice_after_bring_up_releases_once() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.bring_up().unwrap();
        lc.teardown();
        let after_first = host.calls().len();
        lc.teardown();
        drop(lc);
        assert_eq!(host.calls().len(), after_first, "second teardown and drop are no-ops");
    }

    #[test]
    fn partial_bring_up_tears_down_safely() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.enable().unwrap();
        lc.claim_region().unwrap();
        assert_eq!(lc.state(), LifecycleState::RegionClaimed);
        lc.teardown();
        assert_eq!(
            host.calls(),
            vec![Call::Enable, Call::Request, Call::Release, Call::Disable]
        );
    }

    #[test]
    fn re_entrant_bring_up_is_rejected() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.bring_up().unwrap();
        let calls = host.calls();
        assert_eq!(
            lc.bring_up(),
            Err(DriverError::AlreadyBound(device_ref().address))
        );
        assert_eq!(lc.enable(), Err(DriverError::AlreadyBound(device_ref().address)));
        assert_eq!(lc.state(), LifecycleState::Active, "no state change");
        assert_eq!(host.calls(), calls, "no collaborator calls");
    }

    #[test]
    fn claim_is_attempted_at_most_once() {
        let host = ScriptedHost::new(Faults {
            region_busy: true,
            ..Faults::default()
        });
        let mut lc = lifecycle(&host);
        assert!(lc.bring_up().is_err());
        assert_eq!(
            lc.bring_up(),
            Err(DriverError::RegionAlreadyRequested(device_ref().address))
        );
        assert_eq!(host.count(Call::Request), 1);
        assert_eq!(host.count(Call::Enable), 1, "rejected retry has no side effects");
    }

    #[test]
    fn out_of_order_steps_are_invalid_transitions() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        assert!(matches!(
            lc.map_region(),
            Err(DriverError::InvalidTransition {
                state: LifecycleState::Unbound,
                ..
            })
        ));
        assert!(matches!(lc.open(), Err(DriverError::NotBound(_))));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn unbind_unpublishes_but_keeps_region() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.bring_up().unwrap();
        assert!(lc.unbind());
        assert_eq!(lc.state(), LifecycleState::RegionMapped);
        assert!(lc.open().is_err(), "channel is gone");
        assert!(lc.registers().is_some(), "mapping is still held");
        assert!(!lc.unbind(), "second unbind is a no-op");
    }

    #[test]
    fn open_session_reads_and_writes_buffer() {
        let host = ScriptedHost::new(Faults::default());
        let mut lc = lifecycle(&host);
        lc.bring_up().unwrap();
        let mut session = lc.open().expect("open");
        assert_eq!(session.node(), "drv_pci0");
        session.write(b"ping").unwrap();
        assert_eq!(session.read_to_end().unwrap(), b"ping");
    }
}
