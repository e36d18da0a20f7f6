//! RFC 3576 Disconnect-Request through an external client process.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::CoaConfig;
use crate::db::entities::prelude::Subscriber;
use crate::db::services::settings_service::keys;
use crate::db::{DeviceRegistry, Settings};

#[derive(Error, Debug)]
pub enum CoaError {
    #[error("Failed to run CoA client: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("CoA client exited with status {code:?}: {stderr}")]
    Rejected { code: Option<i32>, stderr: String },
    #[error("CoA client did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Cannot send disconnect: {0}")]
    InvalidTarget(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub username: String,
    pub nas_ip: String,
    pub secret: String,
    pub port: u16,
}

/// Sends one Disconnect-Request. `Ok` only when the NAS acknowledged it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoaClient: Send + Sync {
    async fn disconnect(&self, request: &DisconnectRequest) -> Result<(), CoaError>;
}

/// Runs FreeRADIUS `radclient`: `radclient -r N -t T ip:port disconnect secret`,
/// with the attribute list on stdin.
pub struct RadclientCoa {
    client_path: String,
    retries: u32,
    timeout: Duration,
}

impl RadclientCoa {
    pub fn new(config: &CoaConfig) -> Self {
        Self {
            client_path: config.client_path.clone(),
            retries: config.retries,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn args(&self, request: &DisconnectRequest) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.retries.max(1).to_string(),
            "-t".to_string(),
            self.timeout.as_secs().max(1).to_string(),
            format!("{}:{}", request.nas_ip, request.port),
            "disconnect".to_string(),
            request.secret.clone(),
        ]
    }

    /// radclient's own retries bound the run; the outer limit only catches a hung process.
    fn deadline(&self) -> Duration {
        self.timeout * (self.retries.max(1) + 1) + Duration::from_secs(1)
    }
}

#[async_trait]
impl CoaClient for RadclientCoa {
    async fn disconnect(&self, request: &DisconnectRequest) -> Result<(), CoaError> {
        let mut child = Command::new(&self.client_path)
            .args(self.args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let attributes = format!("User-Name = \"{}\"\n", request.username.replace('"', ""));
            stdin.write_all(attributes.as_bytes()).await?;
        }

        let deadline = self.deadline();
        let output = timeout(deadline, child.wait_with_output())
            .await
            .map_err(|_| CoaError::Timeout(deadline))??;

        if output.status.success() {
            Ok(())
        } else {
            Err(CoaError::Rejected {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Resolves a subscriber's router and sends the Disconnect-Request there.
#[derive(Clone)]
pub struct DisconnectService {
    registry: Arc<dyn DeviceRegistry>,
    client: Arc<dyn CoaClient>,
    settings: Settings,
    default_port: u16,
}

impl DisconnectService {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        client: Arc<dyn CoaClient>,
        settings: Settings,
        default_port: u16,
    ) -> Self {
        Self {
            registry,
            client,
            settings,
            default_port,
        }
    }

    async fn request_for(&self, subscriber: &Subscriber) -> Result<DisconnectRequest, CoaError> {
        let username = subscriber
            .login_identity()
            .ok_or_else(|| CoaError::InvalidTarget(format!("subscriber {} has no login", subscriber.id)))?;
        let router_id = subscriber
            .router_id
            .ok_or_else(|| CoaError::InvalidTarget(format!("subscriber {} has no router", subscriber.id)))?;
        let router = self
            .registry
            .get(router_id)
            .await
            .map_err(|e| CoaError::InvalidTarget(format!("router {router_id} lookup failed: {e}")))?
            .ok_or_else(|| CoaError::InvalidTarget(format!("router {router_id} not found")))?;
        let nas_ip = router
            .ip_address
            .clone()
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| CoaError::InvalidTarget(format!("router {router_id} has no IP address")))?;

        let port = self
            .settings
            .int(keys::COA_PORT, i64::from(self.default_port))
            .await;
        let port = u16::try_from(port).unwrap_or(self.default_port);

        Ok(DisconnectRequest {
            username: username.to_string(),
            nas_ip,
            secret: router.radius_secret.clone().unwrap_or_default(),
            port,
        })
    }

    /// Fire-and-forget: `true` only if the client reported success. Not retried here.
    pub async fn send_disconnect_request(&self, subscriber: &Subscriber) -> bool {
        match self.try_send(subscriber).await {
            Ok(request) => {
                info!(username = %request.username, nas_ip = %request.nas_ip, port = request.port, "Disconnect-Request acknowledged.");
                true
            }
            Err(e) => {
                warn!(subscriber_id = subscriber.id, error = %e, "Disconnect-Request failed.");
                false
            }
        }
    }

    pub async fn try_send(&self, subscriber: &Subscriber) -> Result<DisconnectRequest, CoaError> {
        let request = self.request_for(subscriber).await?;
        self.client.disconnect(&request).await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{MockDeviceRegistry, MockSettingsStore};
    use crate::testing::{router_device, subscriber};
    use mockall::predicate::eq;

    fn settings(coa_port: Option<i64>) -> Settings {
        let mut store = MockSettingsStore::new();
        store
            .expect_get_value()
            .returning(move |key| Ok((key == "coa_port").then_some(coa_port).flatten().map(serde_json::Value::from)));
        Settings::new(Arc::new(store))
    }

    #[tokio::test]
    async fn resolves_router_secret_and_port() {
        let mut registry = MockDeviceRegistry::new();
        registry
            .expect_get()
            .with(eq(1))
            .returning(|id| Ok(Some(router_device(id, "10.0.0.5", None))));
        let mut client = MockCoaClient::new();
        client
            .expect_disconnect()
            .withf(|r| {
                r.username == "alice" && r.nas_ip == "10.0.0.5" && r.secret == "nas-secret" && r.port == 3799
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = DisconnectService::new(
            Arc::new(registry),
            Arc::new(client),
            settings(Some(3799)),
            1700,
        );
        assert!(service.send_disconnect_request(&subscriber(1, Some("alice"))).await);
    }

    #[tokio::test]
    async fn client_failure_and_missing_router_report_false() {
        let mut registry = MockDeviceRegistry::new();
        registry.expect_get().returning(|id| Ok((id == 1).then(|| router_device(1, "10.0.0.5", None))));
        let mut client = MockCoaClient::new();
        client.expect_disconnect().returning(|r| {
            assert_eq!(r.port, 1700);
            Err(CoaError::Rejected {
                code: Some(1),
                stderr: "no response from server".to_string(),
            })
        });
        let service = DisconnectService::new(Arc::new(registry), Arc::new(client), settings(None), 1700);

        assert!(!service.send_disconnect_request(&subscriber(1, Some("alice"))).await);

        let mut orphan = subscriber(2, Some("carol"));
        orphan.router_id = Some(99);
        assert!(matches!(
            service.try_send(&orphan).await,
            Err(CoaError::InvalidTarget(_))
        ));
    }

    #[test]
    fn radclient_arguments() {
        let coa = RadclientCoa::new(&CoaConfig::default());
        let request = DisconnectRequest {
            username: "alice".to_string(),
            nas_ip: "10.0.0.5".to_string(),
            secret: "s3cret".to_string(),
            port: 1700,
        };
        assert_eq!(
            coa.args(&request),
            vec!["-r", "3", "-t", "3", "10.0.0.5:1700", "disconnect", "s3cret"]
        );
        assert_eq!(coa.deadline(), Duration::from_secs(13));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_success() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let write_script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        };
        let capture = dir.path().join("stdin.txt");
        let ok = write_script("ok.sh", &format!("cat > '{}'; exit 0", capture.display()));
        let fail = write_script("fail.sh", "cat > /dev/null; echo 'no reply' >&2; exit 1");
        let missing = dir.path().join("missing").to_string_lossy().into_owned();

        let request = DisconnectRequest {
            username: "alice".to_string(),
            nas_ip: "127.0.0.1".to_string(),
            secret: "s".to_string(),
            port: 1700,
        };
        let client = |path: String| {
            RadclientCoa::new(&CoaConfig {
                client_path: path,
                ..CoaConfig::default()
            })
        };

        assert!(client(ok).disconnect(&request).await.is_ok());
        assert_eq!(
            std::fs::read_to_string(&capture).unwrap(),
            "User-Name = \"alice\"\n"
        );
        match client(fail).disconnect(&request).await {
            Err(CoaError::Rejected { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "no reply");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(
            client(missing).disconnect(&request).await,
            Err(CoaError::Spawn(_))
        ));
    }
}
