//! OLT drivers: one capability contract, one implementation per vendor.

pub mod cli;
pub mod huawei;
pub mod mock;
pub mod zte;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::db::entities::prelude::Device;
use cli::{CliTarget, DEFAULT_CLI_PORT};

pub use huawei::HuaweiDriver;
pub use mock::MockDriver;
pub use zte::ZteDriver;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Unsupported OLT vendor: {0}")]
    UnsupportedVendor(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Driver is not connected")]
    NotConnected,
    #[error("Invalid ONU interface: {0}")]
    InvalidInterface(String),
}

/// Provisioning parameters for a new ONU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuConfig {
    /// PON port, e.g. `gpon-olt_1/2/1` (ZTE) or `0/1/0` (Huawei).
    pub interface: String,
    /// ONU id on the port; the driver picks one when absent.
    pub onu_index: Option<u32>,
    pub onu_type: Option<String>,
    pub name: String,
    pub vlan: Option<u16>,
    pub line_profile: Option<String>,
    pub service_profile: Option<String>,
}

/// An ONU seen on a PON port but not yet configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredOnu {
    pub serial: String,
    pub interface: String,
}

/// Failures are logged by the implementation and reported as `false`/`None`/empty.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OltDriver: Send + Sync {
    fn vendor(&self) -> &'static str;
    async fn connect(&mut self) -> bool;
    async fn register_onu(&mut self, serial: &str, config: &OnuConfig) -> bool;
    async fn deregister_onu(&mut self, interface: &str, onu_index: u32) -> bool;
    async fn reboot_onu(&mut self, interface: &str, onu_index: u32) -> bool;
    /// Received optical power at the ONU, in dBm.
    async fn get_signal(&mut self, interface: &str, onu_index: u32) -> Option<f64>;
    async fn discover_unconfigured_onus(&mut self) -> Vec<DiscoveredOnu>;
    async fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Zte,
    Huawei,
    Mock,
}

/// Maps a vendor tag to a driver family. Blank and `mock` select the no-op driver.
pub fn normalize_vendor(tag: &str) -> Result<Vendor, DriverError> {
    match tag.trim().to_ascii_lowercase().as_str() {
        "zte" | "zte-c3xx" => Ok(Vendor::Zte),
        "huawei" | "huawei-ma5xxx" => Ok(Vendor::Huawei),
        "" | "mock" => Ok(Vendor::Mock),
        other => Err(DriverError::UnsupportedVendor(other.to_string())),
    }
}

fn cli_target(device: &Device, timeout: Duration) -> CliTarget {
    CliTarget {
        host: device.ip_address.clone().unwrap_or_default(),
        port: device
            .port
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_CLI_PORT),
        username: device.username.clone().unwrap_or_default(),
        password: device.password.clone().unwrap_or_default(),
        timeout,
    }
}

/// Builds the driver for an OLT from its vendor tag.
pub fn resolve_driver(device: &Device, timeout: Duration) -> Result<Box<dyn OltDriver>, DriverError> {
    let driver: Box<dyn OltDriver> = match normalize_vendor(&device.vendor_tag())? {
        Vendor::Zte => Box::new(ZteDriver::new(cli_target(device, timeout))),
        Vendor::Huawei => Box::new(HuaweiDriver::new(cli_target(device, timeout))),
        Vendor::Mock => Box::new(MockDriver::default()),
    };
    Ok(driver)
}

/// `gpon-olt_1/2/1`, `gpon-onu_1/2/1:5`, `gpon_olt-1/2/1` or `1/2/1` → `1/2/1`.
pub fn port_path(interface: &str) -> Result<String, DriverError> {
    let trimmed = interface.trim();
    let without_prefix = trimmed
        .rsplit(['_', '-'])
        .next()
        .unwrap_or(trimmed);
    let path = without_prefix.split(':').next().unwrap_or(without_prefix);
    let parts: Vec<&str> = path.split('/').collect();
    let valid = parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(DriverError::InvalidInterface(interface.to_string()));
    }
    Ok(path.to_string())
}

/// First number in `text` followed by a dBm unit, or after a `:` on a power line.
pub(crate) fn parse_dbm(text: &str) -> Option<f64> {
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(pos) = lower.find("(dbm)") {
            let number = line[..pos]
                .rsplit(|c: char| c.is_whitespace() || c == ':')
                .next()
                .unwrap_or("");
            if let Ok(value) = number.trim().parse::<f64>() {
                return Some(value);
            }
        }
    }
    None
}
