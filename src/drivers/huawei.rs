//! Huawei MA5xxx OLTs over the telnet CLI.

use async_trait::async_trait;
use tracing::{info, warn};

use super::cli::{CliConnection, CliTarget};
use super::{DiscoveredOnu, DriverError, OltDriver, OnuConfig, port_path};

const SETUP: &[&str] = &["enable", "screen-length 0 temporary"];

pub struct HuaweiDriver {
    conn: CliConnection,
}

/// Huawei addresses a PON port as frame/slot on the board plus the port number.
struct PonPort {
    board: String,
    port: String,
}

fn pon_port(interface: &str) -> Result<PonPort, DriverError> {
    let path = port_path(interface)?;
    let (board, port) = path
        .rsplit_once('/')
        .ok_or_else(|| DriverError::InvalidInterface(interface.to_string()))?;
    Ok(PonPort {
        board: board.to_string(),
        port: port.to_string(),
    })
}

impl HuaweiDriver {
    pub fn new(target: CliTarget) -> Self {
        Self {
            conn: CliConnection::new(target),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), DriverError> {
        self.conn.connect(SETUP).await
    }

    /// Runs `commands` inside `interface gpon <board>` and returns the transcript.
    async fn on_board(&mut self, board: &str, commands: Vec<String>) -> Result<String, DriverError> {
        self.ensure_connected().await?;
        let mut script = vec!["config".to_string(), format!("interface gpon {board}")];
        script.extend(commands);
        script.push("quit".to_string());
        script.push("quit".to_string());
        self.conn.run_script(&script).await
    }

    async fn register(&mut self, serial: &str, config: &OnuConfig) -> Result<(), DriverError> {
        let pon = pon_port(&config.interface)?;
        let mut add = format!("ont add {}", pon.port);
        if let Some(index) = config.onu_index {
            add.push_str(&format!(" {index}"));
        }
        add.push_str(&format!(" sn-auth {serial} omci"));
        if let Some(profile) = &config.line_profile {
            add.push_str(&format!(" ont-lineprofile-name {profile}"));
        }
        if let Some(profile) = &config.service_profile {
            add.push_str(&format!(" ont-srvprofile-name {profile}"));
        }
        add.push_str(&format!(" desc {}", config.name.replace(' ', "_")));
        self.on_board(&pon.board, vec![add]).await.map(|_| ())
    }

    async fn signal(&mut self, interface: &str, onu_index: u32) -> Result<Option<f64>, DriverError> {
        let pon = pon_port(interface)?;
        let transcript = self
            .on_board(
                &pon.board,
                vec![format!("display ont optical-info {} {onu_index}", pon.port)],
            )
            .await?;
        Ok(parse_rx_power(&transcript))
    }
}

/// `display ont autofind all` prints one block per ONT with `F/S/P` and `Ont SN` lines.
pub(crate) fn parse_autofind(output: &str) -> Vec<DiscoveredOnu> {
    let mut found = Vec::new();
    let mut interface: Option<String> = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "F/S/P" => interface = Some(value.replace(' ', "")),
            "Ont SN" => {
                let serial = value.split_whitespace().next().unwrap_or("");
                if let (Some(interface), false) = (interface.take(), serial.is_empty()) {
                    found.push(DiscoveredOnu {
                        serial: serial.to_ascii_uppercase(),
                        interface,
                    });
                }
            }
            _ => {}
        }
    }
    found
}

/// `Rx optical power(dBm)   : -21.37`
pub(crate) fn parse_rx_power(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().to_ascii_lowercase().starts_with("rx optical power") {
            return None;
        }
        value.trim().parse().ok()
    })
}

#[async_trait]
impl OltDriver for HuaweiDriver {
    fn vendor(&self) -> &'static str {
        "huawei"
    }

    async fn connect(&mut self) -> bool {
        self.ensure_connected()
            .await
            .inspect_err(|e| warn!(host = %self.conn.host(), error = %e, "Failed to connect to Huawei OLT."))
            .is_ok()
    }

    async fn register_onu(&mut self, serial: &str, config: &OnuConfig) -> bool {
        match self.register(serial, config).await {
            Ok(()) => {
                info!(host = %self.conn.host(), serial = serial, interface = %config.interface, "ONT registered.");
                true
            }
            Err(e) => {
                warn!(host = %self.conn.host(), serial = serial, error = %e, "Failed to register ONT.");
                false
            }
        }
    }

    async fn deregister_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        let result = match pon_port(interface) {
            Ok(pon) => {
                self.on_board(&pon.board, vec![format!("ont delete {} {onu_index}", pon.port)])
                    .await
            }
            Err(e) => Err(e),
        };
        result
            .inspect_err(|e| warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to delete ONT."))
            .is_ok()
    }

    async fn reboot_onu(&mut self, interface: &str, onu_index: u32) -> bool {
        let result = match pon_port(interface) {
            Ok(pon) => {
                self.on_board(&pon.board, vec![format!("ont reset {} {onu_index}", pon.port)])
                    .await
            }
            Err(e) => Err(e),
        };
        result
            .inspect_err(|e| warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to reset ONT."))
            .is_ok()
    }

    async fn get_signal(&mut self, interface: &str, onu_index: u32) -> Option<f64> {
        match self.signal(interface, onu_index).await {
            Ok(value) => value,
            Err(e) => {
                warn!(host = %self.conn.host(), interface = interface, onu_index = onu_index, error = %e, "Failed to read ONT optical info.");
                None
            }
        }
    }

    async fn discover_unconfigured_onus(&mut self) -> Vec<DiscoveredOnu> {
        if let Err(e) = self.ensure_connected().await {
            warn!(host = %self.conn.host(), error = %e, "Failed to connect to Huawei OLT.");
            return Vec::new();
        }
        match self.conn.run("display ont autofind all").await {
            Ok(output) => parse_autofind(&output),
            Err(e) => {
                warn!(host = %self.conn.host(), error = %e, "Failed to list autofind ONTs.");
                Vec::new()
            }
        }
    }

    async fn disconnect(&mut self) {
        self.conn.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::cli::tests::{fake_console, target};
    use std::collections::HashMap;

    #[test]
    fn parses_autofind_blocks() {
        let output = "   ----------------------------------------------------------------------------
   Number              : 1
   F/S/P               : 0/1/0
   Ont SN              : 485754431A2B3C4D (HWTC-1A2B3C4D)
   Password            : 0x00000000000000000000
   ----------------------------------------------------------------------------
   Number              : 2
   F/S/P               : 0/1/3
   Ont SN              : 48575443DEADBEEF (HWTC-DEADBEEF)
   ----------------------------------------------------------------------------";
        let found = parse_autofind(output);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].interface, "0/1/0");
        assert_eq!(found[0].serial, "485754431A2B3C4D");
        assert_eq!(found[1].interface, "0/1/3");
    }

    #[test]
    fn parses_rx_power() {
        let output = "  Rx optical power(dBm)                  : -21.37\n  Tx optical power(dBm)                  : 2.11";
        assert_eq!(parse_rx_power(output), Some(-21.37));
        assert_eq!(parse_rx_power("  Failure: The ONT is not online"), None);
    }

    #[tokio::test]
    async fn registers_inside_board_interface() {
        let (port, seen) = fake_console("MA5608T(config)#", HashMap::new()).await;
        let mut driver = HuaweiDriver::new(target(port, "secret"));
        let config = OnuConfig {
            interface: "0/1/3".to_string(),
            name: "customer 9".to_string(),
            line_profile: Some("ftth".to_string()),
            service_profile: Some("ftth".to_string()),
            ..Default::default()
        };
        assert!(driver.register_onu("48575443DEADBEEF", &config).await);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "enable",
                "screen-length 0 temporary",
                "config",
                "interface gpon 0/1",
                "ont add 3 sn-auth 48575443DEADBEEF omci ont-lineprofile-name ftth ont-srvprofile-name ftth desc customer_9",
                "quit",
                "quit",
            ]
        );
    }
}
