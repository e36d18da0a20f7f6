//! ZTE C3xx (ZXAN) OLTs over the telnet CLI.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::cli::{CliConnection, CliTarget};
use super::{DiscoveredOnu, DriverError, OltDriver, OnuConfig, parse_dbm, port_path};

const SETUP: &[&str] = &["terminal length 0"];
const MAX_ONU_INDEX: u32 = 128;

pub struct ZteDriver {
    conn: CliConnection,
}

impl ZteDriver {
    pub fn new(target: CliTarget) -> Self {
        Self {
            conn: CliConnection::new(target),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), DriverError> {
        self.conn.connect(SETUP).await
    }

    async fn free_index(&mut self, path: &str) -> Result<u32, DriverError> {
        let output = self
            .conn
            .run(&format!("show gpon onu state gpon-olt_{path}"))
            .await?;
        let used = parse_used_indexes(&output);
        (1..=MAX_ONU_INDEX)
            .find(|i| !used.contains(i))
            .ok_or_else(|| DriverError::Command(format!("no free ONU index on gpon-olt_{path}")))
    }

    async fn register(&mut self, serial: &str, config: &OnuConfig) -> Result<u32, DriverError> {
        self.ensure_connected().await?;
        let path = port_path(&config.interface)?;
        let index = match config.onu_index {
            Some(index) => index,
            None => self.free_index(&path).await?,
        };
        self.conn
            .run_script(&registration_script(&path, index, serial, config))
            .await?;
        Ok(index)
    }

    async fn run_on_port(&mut self, commands: Vec<String>) -> Result<(), DriverError> {
        self.ensure_connected().await?;
        self.conn.run_script(&commands).await.map(|_| ())
    }
}

fn registration_script(path: &str, index: u32, serial: &str, config: &OnuConfig) -> Vec<String> {
    let onu_type = config.onu_type.as_deref().unwrap_or("ZTE-F660");
    let mut script = vec![
        "configure terminal".to_string(),
        format!("interface gpon-olt_{path}"),
        format!("onu {index} type {onu_type} sn {serial}"),
        "exit".to_string(),
        format!("interface gpon-onu_{path}:{index}"),
        format!("name {}", config.name.replace(' ', "_")),
    ];
    if let Some(profile) = &config.line_profile {
        script.push(format!("tcont 1 profile {profile}"));
        script.push("gemport 1 tcont 1".to_string());
    }
    if let Some(vlan) = config.vlan {
        script.push(format!("service-port 1 vport 1 user-vlan {vlan} vlan {vlan}"));
    }
    script.push("exit".to_string());
    script.push("exit".to_string());
    script
}

/// `show gpon onu uncfg` rows look like `gpon-onu_1/2/1:1   ZTEGC8A1B2C3   unknown`.
pub(crate) fn parse_uncfg(output: &str) -> Vec<DiscoveredOnu> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let onu = cols.next()?;
            let serial = cols.next()?;
            if !onu.starts_with("gpon-onu_") {
                return None;
            }
            let path = port_path(onu).ok()?;
            Some(DiscoveredOnu {
                serial: serial.to_ascii_uppercase(),
                interface: format!("gpon-olt_{path}"),
            })
        })
        .collect()
}

/// `show gpon onu state` rows start with `1/2/1:5`.
fn parse_used_indexes(output: &str) -> BTreeSet<u32> {
    output
        .lines()
        .filter_map(|line| {
            let first = line.split_whitespace().next()?;
            let (_, index) = first.rsplit_once(':')?;
            index.parse().ok()
        })
        .collect()
}

#[async_trait]
impl OltDriver for ZteDriver {
    fn vendor(&self) -> &'static str {
        "zte"
    }

    async fn connect(&mut self) -> bool {
        match self.ensure_connected().await {
            Ok(()) => true,
            Err(e) => {
                warn!(host = %self.conn.host(), error = %e, "Failed to connect to ZTE OLT.");
                false
            }
        }
    }

    async fn register_onu(&mut self, serial: &str, config: &OnuConfig) -> bool {
        match self.register(serial, config).await {
            Ok(index) => {
                info!(host = %self.conn.host(), serial = serial, interface = %config.interface, onu_index = index, "ONU registered.");
                true
            }
            Err(e) => {
                warn!(host = %self.conn.host(), serial = serial, error = %e, "Failed to register ONU.");
                false
            }
        }
    }

    async fn deregister_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        let result = match port_path(interface) {
            Ok(path) => {
                self.run_on_port(vec![
                    "configure terminal".to_string(),
                    format!("interface gpon-olt_{path}"),
                    format!("no onu {onu_index}"),
                    "exit".to_string(),
                    "exit".to_string(),
                ])
                .await
            }
            Err(e) => Err(e),
        };
        result
            .inspect_err(|e| warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to deregister ONU."))
            .is_ok()
    }

    async fn reboot_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        let result = match port_path(interface) {
            Ok(path) => {
                self.run_on_port(vec![
                    "configure terminal".to_string(),
                    format!("pon-onu-mng gpon-onu_{path}:{onu_index}"),
                    "reboot".to_string(),
                    "exit".to_string(),
                    "exit".to_string(),
                ])
                .await
            }
            Err(e) => Err(e),
        };
        result
            .inspect_err(|e| warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to reboot ONU."))
            .is_ok()
    }

    async fn get_signal(&mut self, interface: &str, onu_index: u32) -> Option<f64> {
        let path = port_path(interface).ok()?;
        if let Err(e) = self.ensure_connected().await {
            warn!(host = %self.conn.host(), error = %e, "Failed to connect to ZTE OLT.");
            return None;
        }
        match self
            .conn
            .run(&format!("show pon power onu-rx gpon-onu_{path}:{onu_index}"))
            .await
        {
            Ok(output) => parse_dbm(&output),
            Err(e) => {
                warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to read ONU signal.");
                None
            }
        }
    }

    async fn discover_unconfigured_onus(&mut self) -> Vec<DiscoveredOnu> {
        if let Err(e) = self.ensure_connected().await {
            warn!(host = %self.conn.host(), error = %e, "Failed to connect to ZTE OLT.");
            return Vec::new();
        }
        match self.conn.run("show gpon onu uncfg").await {
            Ok(output) => parse_uncfg(&output),
            Err(e) => {
                warn!(host = %self.conn.host(), error = %e, "Failed to list unconfigured ONUs.");
                Vec::new()
            }
        }
    }

    async fn disconnect(&mut self) {
        self.conn.close().await;
    }
}
