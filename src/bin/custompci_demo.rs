//! Plugs one custom PCI function into a virtual segment, binds the driver to
//! it and exercises both BAR0 and the transfer channel.
//!
//! Run with `RUST_LOG=debug cargo run --bin custompci_demo` to see the
//! lifecycle steps and register accesses.

use std::sync::Arc;

use custompci::{
    driver::{DriverConfig, PciDriver, PciHost},
    soc::{
        bus::DeviceBus,
        device::{CUSTOM_PCI_DEVICE_TYPE, DeviceTypeRegistry},
        pci::VirtualPciBus,
    },
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DriverConfig::from_env()?;

    let mut registry = DeviceTypeRegistry::with_builtin_types();
    let host = Arc::new(VirtualPciBus::new(Arc::new(DeviceBus::new(12))));
    let address = host.plug(registry.instantiate(CUSTOM_PCI_DEVICE_TYPE)?)?;
    println!("plugged {CUSTOM_PCI_DEVICE_TYPE} at {address}");

    let mut driver = PciDriver::new(config, host.clone());
    let node = driver.load()?;
    println!("driver {} bound, channel node {node}", driver.name());

    if let Some(registers) = driver.instance(address).and_then(|lc| lc.registers()) {
        registers.write32(0x0, 0xDEAD_BEEF)?;
        println!("BAR0[0x0] = {:#010x}", registers.read32(0x0)?);
        // Straddles the end of BAR0: the device absorbs it and reads zero.
        let straddling = host.mmio().read(registers.base() + 0xFFD, 8)?;
        println!("BAR0[0xffd..+8] = {straddling:#x}");
    }

    {
        let mut session = driver.open(&node)?;
        let written = session.write(b"hello from the host")?;
        let echoed = session.read_to_end()?;
        println!(
            "wrote {written} bytes, read back {:?}",
            String::from_utf8_lossy(&echoed)
        );
    }

    driver.unload();
    registry.clear();
    for device in host.enumerate() {
        host.unplug(device.address);
    }
    Ok(())
}
