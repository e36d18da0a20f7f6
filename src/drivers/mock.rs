use async_trait::async_trait;
use tracing::debug;

use super::{DiscoveredOnu, OltDriver, OnuConfig};

/// No-op driver for OLTs without a vendor tag. Every operation succeeds.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    discovered: Vec<DiscoveredOnu>,
}

impl MockDriver {
    /// A mock that reports the given ONUs as unconfigured.
    pub fn with_discovered(discovered: Vec<DiscoveredOnu>) -> Self {
        Self { discovered }
    }
}

#[async_trait]
impl OltDriver for MockDriver {
    fn vendor(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> bool {
        true
    }

    async fn register_onu(&mut self, serial: &str, config: &OnuConfig) -> bool {
        debug!(serial = serial, interface = %config.interface, "Mock OLT: register ONU.");
        self.discovered.retain(|onu| onu.serial != serial);
        true
    }

    async fn deregister_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        debug!(interface = interface, onu_index = onu_index, "Mock OLT: deregister ONU.");
        true
    }

    async fn reboot_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        debug!(interface = interface, onu_index = onu_index, "Mock OLT: reboot ONU.");
        true
    }

    async fn get_signal(&mut self, _interface: &str, _onu_index: u32) -> Option<f64> {
        None
    }

    async fn discover_unconfigured_onus(&mut self) -> Vec<DiscoveredOnu> {
        self.discovered.clone()
    }

    async fn disconnect(&mut self) {}
}
