use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{
    DeviceSession, InterfaceInfo, InterfaceTraffic, PppSecret, RouterGateway, RouterSnapshot,
    SessionKind, SystemResource,
};
use crate::config::RouterApiConfig;
use crate::db::entities::prelude::Device;
use crate::routeros::{ApiError, ApiSession, ConnectOptions, Record, is_error};

/// `RouterGateway` over the RouterOS API. Every call opens its own session.
#[derive(Debug, Clone, Default)]
pub struct MikrotikRouter {
    api: RouterApiConfig,
}

impl MikrotikRouter {
    pub fn new(api: RouterApiConfig) -> Self {
        Self { api }
    }

    fn connect_options(&self, router: &Device) -> Result<ConnectOptions, ApiError> {
        let host = router
            .ip_address
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ApiError::InvalidTarget(format!("device {} has no IP address", router.id)))?;
        let port = router
            .port
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .unwrap_or(self.api.port);

        Ok(ConnectOptions {
            host: host.to_string(),
            port,
            username: router.username.clone().unwrap_or_default(),
            password: router.password.clone().unwrap_or_default(),
            timeout: self.api.timeout(),
            attempts: self.api.attempts,
            retry_delay: self.api.retry_delay(),
        })
    }

    async fn open(&self, router: &Device) -> Result<ApiSession, ApiError> {
        ApiSession::connect(&self.connect_options(router)?).await
    }

    /// Opens a session or logs why it could not.
    async fn open_logged(&self, router: &Device, purpose: &str) -> Option<ApiSession> {
        match self.open(router).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(device_id = router.id, purpose = purpose, error = %e, "Could not open router API session.");
                None
            }
        }
    }
}

/// Like `try_comm`, but a `!trap` in the reply becomes `ApiError::Trap`.
async fn run(
    session: &mut ApiSession,
    command: &str,
    args: &[(&str, &str)],
) -> Result<Vec<Record>, ApiError> {
    let records = session.try_comm(command, args).await?;
    if let Some(trap) = records.iter().find(|r| is_error(r)) {
        let message = trap
            .get("message")
            .cloned()
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ApiError::Trap(message));
    }
    Ok(records)
}

fn field(record: &Record, key: &str) -> Option<String> {
    record.get(key).filter(|v| !v.is_empty()).cloned()
}

fn flag(record: &Record, key: &str) -> bool {
    record.get(key).is_some_and(|v| v == "true" || v == "yes")
}

fn number<T: std::str::FromStr>(record: &Record, key: &str) -> Option<T> {
    record.get(key).and_then(|v| v.trim().parse().ok())
}

fn count_from(records: &[Record]) -> Option<usize> {
    records.iter().find_map(|r| number(r, "ret"))
}

fn ids(records: &[Record]) -> Vec<String> {
    records.iter().filter_map(|r| field(r, ".id")).collect()
}

pub(crate) fn parse_resource(records: &[Record]) -> Option<SystemResource> {
    let r = records.first()?;
    Some(SystemResource {
        uptime: field(r, "uptime"),
        version: field(r, "version"),
        board_name: field(r, "board-name"),
        cpu_load: number(r, "cpu-load"),
        free_memory: number(r, "free-memory"),
        total_memory: number(r, "total-memory"),
    })
}

fn parse_interface(r: &Record) -> Option<InterfaceInfo> {
    Some(InterfaceInfo {
        name: field(r, "name")?,
        kind: field(r, "type"),
        running: flag(r, "running"),
        disabled: flag(r, "disabled"),
    })
}

fn parse_traffic(r: &Record) -> Option<InterfaceTraffic> {
    Some(InterfaceTraffic {
        name: field(r, "name")?,
        rx_bps: number(r, "rx-bits-per-second").unwrap_or(0),
        tx_bps: number(r, "tx-bits-per-second").unwrap_or(0),
    })
}

/// PPP sessions name the user `name`, hotspot sessions `user`.
fn parse_session(r: &Record, kind: SessionKind) -> Option<DeviceSession> {
    let login_key = match kind {
        SessionKind::Ppp => "name",
        SessionKind::Hotspot => "user",
    };
    Some(DeviceSession {
        id: field(r, ".id")?,
        kind,
        login: field(r, login_key)?,
        address: field(r, "address"),
        uptime: field(r, "uptime"),
    })
}

fn parse_secret(r: &Record) -> Option<PppSecret> {
    Some(PppSecret {
        name: field(r, "name")?,
        password: r.get("password").cloned().unwrap_or_default(),
        profile: field(r, "profile"),
        service: field(r, "service"),
        remote_address: field(r, "remote-address"),
        disabled: flag(r, "disabled"),
    })
}

async fn traffic_once(
    session: &mut ApiSession,
    interfaces: &[String],
) -> Result<Vec<InterfaceTraffic>, ApiError> {
    if interfaces.is_empty() {
        return Ok(Vec::new());
    }
    let joined = interfaces.join(",");
    let records = run(
        session,
        "/interface/monitor-traffic",
        &[("interface", joined.as_str()), ("once", "")],
    )
    .await?;
    Ok(records.iter().filter_map(parse_traffic).collect())
}

async fn count_sessions(session: &mut ApiSession) -> Result<usize, ApiError> {
    let ppp = run(session, "/ppp/active/print", &[("count-only", "")]).await?;
    let hotspot = run(session, "/ip/hotspot/active/print", &[("count-only", "")]).await;
    // Routers without the hotspot package trap on this path.
    let hotspot = match hotspot {
        Ok(records) => count_from(&records).unwrap_or(0),
        Err(ApiError::Trap(_)) => 0,
        Err(e) => return Err(e),
    };
    Ok(count_from(&ppp).unwrap_or(0) + hotspot)
}

async fn lookup_session(session: &mut ApiSession, login: &str) -> Result<Option<DeviceSession>, ApiError> {
    let ppp = run(session, "/ppp/active/print", &[("?name", login)]).await?;
    if let Some(found) = ppp.iter().find_map(|r| parse_session(r, SessionKind::Ppp)) {
        return Ok(Some(found));
    }
    match run(session, "/ip/hotspot/active/print", &[("?user", login)]).await {
        Ok(hotspot) => Ok(hotspot
            .iter()
            .find_map(|r| parse_session(r, SessionKind::Hotspot))),
        Err(ApiError::Trap(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn add_address(
    session: &mut ApiSession,
    list: &str,
    address: &str,
    comment: &str,
) -> Result<(), ApiError> {
    let result = run(
        session,
        "/ip/firewall/address-list/add",
        &[("list", list), ("address", address), ("comment", comment)],
    )
    .await;
    match result {
        Ok(_) => Ok(()),
        Err(ApiError::Trap(message)) if message.contains("already have such entry") => Ok(()),
        Err(e) => Err(e),
    }
}

async fn remove_addresses(session: &mut ApiSession, list: &str, address: &str) -> Result<usize, ApiError> {
    let found = run(
        session,
        "/ip/firewall/address-list/print",
        &[("?list", list), ("?address", address)],
    )
    .await?;
    let ids = ids(&found);
    if ids.is_empty() {
        return Ok(0);
    }
    run(
        session,
        "/ip/firewall/address-list/remove",
        &[(".id", ids.join(",").as_str())],
    )
    .await?;
    Ok(ids.len())
}

async fn upsert_secret(session: &mut ApiSession, secret: &PppSecret) -> Result<(), ApiError> {
    let existing = run(session, "/ppp/secret/print", &[("?name", secret.name.as_str())]).await?;
    let disabled = if secret.disabled { "yes" } else { "no" };
    let mut args: Vec<(&str, &str)> = vec![
        ("password", secret.password.as_str()),
        ("disabled", disabled),
    ];
    if let Some(profile) = &secret.profile {
        args.push(("profile", profile.as_str()));
    }
    if let Some(service) = &secret.service {
        args.push(("service", service.as_str()));
    }
    if let Some(remote) = &secret.remote_address {
        args.push(("remote-address", remote.as_str()));
    }

    match ids(&existing).first() {
        Some(id) => {
            args.insert(0, (".id", id.as_str()));
            run(session, "/ppp/secret/set", &args).await?;
        }
        None => {
            args.insert(0, ("name", secret.name.as_str()));
            run(session, "/ppp/secret/add", &args).await?;
        }
    }
    Ok(())
}

async fn remove_secret(session: &mut ApiSession, name: &str) -> Result<usize, ApiError> {
    let existing = run(session, "/ppp/secret/print", &[("?name", name)]).await?;
    let ids = ids(&existing);
    if !ids.is_empty() {
        run(session, "/ppp/secret/remove", &[(".id", ids.join(",").as_str())]).await?;
    }
    Ok(ids.len())
}

#[async_trait]
impl RouterGateway for MikrotikRouter {
    async fn check_connection(&self, router: &Device) -> bool {
        match self.open(router).await {
            Ok(mut session) => {
                session.disconnect().await;
                true
            }
            Err(e) => {
                debug!(device_id = router.id, error = %e, "Router API connection check failed.");
                false
            }
        }
    }

    async fn system_resource(&self, router: &Device) -> Option<SystemResource> {
        let mut session = self.open_logged(router, "system resource").await?;
        let records = session.comm("/system/resource/print", &[]).await;
        session.disconnect().await;
        parse_resource(&records)
    }

    async fn interfaces(&self, router: &Device) -> Vec<InterfaceInfo> {
        let Some(mut session) = self.open_logged(router, "interfaces").await else {
            return Vec::new();
        };
        let records = session.comm("/interface/print", &[]).await;
        session.disconnect().await;
        records.iter().filter_map(parse_interface).collect()
    }

    async fn interface_traffic(&self, router: &Device, interfaces: &[String]) -> Vec<InterfaceTraffic> {
        let Some(mut session) = self.open_logged(router, "interface traffic").await else {
            return Vec::new();
        };
        let result = traffic_once(&mut session, interfaces).await;
        session.disconnect().await;
        result.unwrap_or_else(|e| {
            warn!(device_id = router.id, error = %e, "Failed to read interface traffic.");
            Vec::new()
        })
    }

    async fn active_sessions(&self, router: &Device) -> Vec<DeviceSession> {
        let Some(mut session) = self.open_logged(router, "active sessions").await else {
            return Vec::new();
        };
        let ppp = session.comm("/ppp/active/print", &[]).await;
        let hotspot = session.comm("/ip/hotspot/active/print", &[]).await;
        session.disconnect().await;

        ppp.iter()
            .filter(|r| !is_error(r))
            .filter_map(|r| parse_session(r, SessionKind::Ppp))
            .chain(
                hotspot
                    .iter()
                    .filter(|r| !is_error(r))
                    .filter_map(|r| parse_session(r, SessionKind::Hotspot)),
            )
            .collect()
    }

    async fn find_active_session(
        &self,
        router: &Device,
        login: &str,
    ) -> Result<Option<DeviceSession>, ApiError> {
        let mut session = self.open(router).await?;
        let result = lookup_session(&mut session, login).await;
        session.disconnect().await;
        result
    }

    async fn count_active_sessions(&self, router: &Device) -> Option<usize> {
        let mut session = self.open_logged(router, "session count").await?;
        let result = count_sessions(&mut session).await;
        session.disconnect().await;
        result
            .inspect_err(|e| warn!(device_id = router.id, error = %e, "Failed to count active sessions."))
            .ok()
    }

    async fn add_address_list_entry(
        &self,
        router: &Device,
        list: &str,
        address: &str,
        comment: &str,
    ) -> bool {
        let Some(mut session) = self.open_logged(router, "address-list add").await else {
            return false;
        };
        let result = add_address(&mut session, list, address, comment).await;
        session.disconnect().await;
        match result {
            Ok(()) => {
                info!(device_id = router.id, list = list, address = address, "Address added to list.");
                true
            }
            Err(e) => {
                warn!(device_id = router.id, list = list, address = address, error = %e, "Failed to add address-list entry.");
                false
            }
        }
    }

    async fn remove_address_list_entries(&self, router: &Device, list: &str, address: &str) -> bool {
        let Some(mut session) = self.open_logged(router, "address-list remove").await else {
            return false;
        };
        let result = remove_addresses(&mut session, list, address).await;
        session.disconnect().await;
        match result {
            Ok(removed) => {
                info!(device_id = router.id, list = list, address = address, removed = removed, "Address-list entries removed.");
                true
            }
            Err(e) => {
                warn!(device_id = router.id, list = list, address = address, error = %e, "Failed to remove address-list entries.");
                false
            }
        }
    }

    async fn list_ppp_secrets(&self, router: &Device) -> Vec<PppSecret> {
        let Some(mut session) = self.open_logged(router, "ppp secrets").await else {
            return Vec::new();
        };
        let records = session.comm("/ppp/secret/print", &[]).await;
        session.disconnect().await;
        records.iter().filter_map(parse_secret).collect()
    }

    async fn upsert_ppp_secret(&self, router: &Device, secret: &PppSecret) -> bool {
        let Some(mut session) = self.open_logged(router, "ppp secret upsert").await else {
            return false;
        };
        let result = upsert_secret(&mut session, secret).await;
        session.disconnect().await;
        result
            .inspect_err(|e| warn!(device_id = router.id, name = %secret.name, error = %e, "Failed to upsert PPP secret."))
            .is_ok()
    }

    async fn remove_ppp_secret(&self, router: &Device, name: &str) -> bool {
        let Some(mut session) = self.open_logged(router, "ppp secret remove").await else {
            return false;
        };
        let result = remove_secret(&mut session, name).await;
        session.disconnect().await;
        result
            .inspect_err(|e| warn!(device_id = router.id, name = name, error = %e, "Failed to remove PPP secret."))
            .is_ok()
    }

    async fn monitoring_snapshot(&self, router: &Device) -> Option<RouterSnapshot> {
        let mut session = self.open_logged(router, "monitoring snapshot").await?;

        let resource = parse_resource(&session.comm("/system/resource/print", &[]).await);
        let running: Vec<String> = session
            .comm("/interface/print", &[("?running", "true")])
            .await
            .iter()
            .filter_map(parse_interface)
            .filter(|i| !i.disabled)
            .map(|i| i.name)
            .collect();
        let traffic = match traffic_once(&mut session, &running).await {
            Ok(traffic) => traffic,
            Err(e) => {
                warn!(device_id = router.id, error = %e, "Failed to read interface traffic.");
                Vec::new()
            }
        };
        let active_sessions = if session.is_connected() {
            count_sessions(&mut session).await.ok()
        } else {
            None
        };
        session.disconnect().await;

        Some(RouterSnapshot {
            resource,
            traffic,
            active_sessions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routeros::{Sentence, SentenceCodec};
    use crate::testing::router_device;
    use futures_util::{SinkExt, StreamExt};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    fn words(ws: &[&str]) -> Sentence {
        ws.iter().map(|w| w.to_string()).collect()
    }

    type Received = Arc<Mutex<Vec<Sentence>>>;

    /// A scripted router: logs in anyone, then answers each command from `script`
    /// by its first word. Unknown commands get a `!trap`. Every command sentence is recorded.
    async fn recording_router(script: HashMap<&'static str, Vec<Sentence>>) -> (u16, Received) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received: Received = Arc::default();
        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let script = script.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, SentenceCodec::default());
                    while let Some(Ok(sentence)) = framed.next().await {
                        let replies = match sentence[0].as_str() {
                            "/login" => vec![words(&["!done"])],
                            cmd => script.get(cmd).cloned().unwrap_or_else(|| {
                                vec![words(&["!trap", "=message=no such command"]), words(&["!done"])]
                            }),
                        };
                        if sentence[0] != "/login" {
                            log.lock().unwrap().push(sentence);
                        }
                        for reply in replies {
                            if framed.send(reply).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });
        (port, received)
    }

    async fn scripted_router(script: HashMap<&'static str, Vec<Sentence>>) -> u16 {
        recording_router(script).await.0
    }

    fn commands(received: &Received) -> Vec<String> {
        received.lock().unwrap().iter().map(|s| s[0].clone()).collect()
    }

    fn gateway() -> MikrotikRouter {
        MikrotikRouter::new(RouterApiConfig {
            port: 1,
            timeout_secs: 2,
            attempts: 1,
            retry_delay_secs: 0,
        })
    }

    #[tokio::test]
    async fn finds_hotspot_session_when_no_ppp_session_matches() {
        let port = scripted_router(HashMap::from([
            ("/ppp/active/print", vec![words(&["!done"])]),
            (
                "/ip/hotspot/active/print",
                vec![
                    words(&["!re", "=.id=*A1", "=user=alice", "=address=10.20.0.7", "=uptime=1h2m"]),
                    words(&["!done"]),
                ],
            ),
        ]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));

        let session = gateway()
            .find_active_session(&router, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.kind, SessionKind::Hotspot);
        assert_eq!(session.id, "*A1");
        assert_eq!(session.address.as_deref(), Some("10.20.0.7"));
    }

    #[tokio::test]
    async fn unreachable_router_is_an_error_for_lookup_and_false_for_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let router = router_device(1, "127.0.0.1", Some(port));
        let gateway = gateway();

        assert!(gateway.find_active_session(&router, "alice").await.is_err());
        assert!(!gateway.add_address_list_entry(&router, "ISOLIR", "10.20.0.7", "x").await);
        assert!(!gateway.check_connection(&router).await);
        assert_eq!(gateway.count_active_sessions(&router).await, None);
    }

    #[tokio::test]
    async fn counts_ppp_and_tolerates_missing_hotspot() {
        let port = scripted_router(HashMap::from([(
            "/ppp/active/print",
            vec![words(&["!done", "=ret=12"])],
        )]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));
        assert_eq!(gateway().count_active_sessions(&router).await, Some(12));
    }

    #[tokio::test]
    async fn duplicate_address_list_entry_counts_as_success() {
        let port = scripted_router(HashMap::from([(
            "/ip/firewall/address-list/add",
            vec![
                words(&["!trap", "=message=failure: already have such entry"]),
                words(&["!done"]),
            ],
        )]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));
        assert!(
            gateway()
                .add_address_list_entry(&router, "ISOLIR", "10.20.0.7", "isolated")
                .await
        );
    }

    #[tokio::test]
    async fn snapshot_collects_resource_traffic_and_sessions() {
        let port = scripted_router(HashMap::from([
            (
                "/system/resource/print",
                vec![
                    words(&["!re", "=uptime=3d4h", "=version=7.14", "=cpu-load=17", "=free-memory=1048576"]),
                    words(&["!done"]),
                ],
            ),
            (
                "/interface/print",
                vec![
                    words(&["!re", "=name=ether1", "=type=ether", "=running=true", "=disabled=false"]),
                    words(&["!done"]),
                ],
            ),
            (
                "/interface/monitor-traffic",
                vec![
                    words(&["!re", "=name=ether1", "=rx-bits-per-second=2000", "=tx-bits-per-second=500"]),
                    words(&["!done"]),
                ],
            ),
            ("/ppp/active/print", vec![words(&["!done", "=ret=3"])]),
            ("/ip/hotspot/active/print", vec![words(&["!done", "=ret=2"])]),
        ]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));

        let snapshot = tokio::time::timeout(Duration::from_secs(5), gateway().monitoring_snapshot(&router))
            .await
            .unwrap()
            .unwrap();
        let resource = snapshot.resource.unwrap();
        assert_eq!(resource.cpu_load, Some(17));
        assert_eq!(resource.version.as_deref(), Some("7.14"));
        assert_eq!(
            snapshot.traffic,
            vec![InterfaceTraffic {
                name: "ether1".to_string(),
                rx_bps: 2000,
                tx_bps: 500
            }]
        );
        assert_eq!(snapshot.active_sessions, Some(5));
    }

    fn secret(name: &str) -> PppSecret {
        PppSecret {
            name: name.to_string(),
            password: "pw".to_string(),
            profile: Some("home-20m".to_string()),
            service: Some("pppoe".to_string()),
            remote_address: None,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn lists_interfaces_and_ppp_secrets() {
        let port = scripted_router(HashMap::from([
            (
                "/interface/print",
                vec![
                    words(&["!re", "=name=ether1", "=type=ether", "=running=true", "=disabled=false"]),
                    words(&["!re", "=name=sfp1", "=type=ether", "=running=false", "=disabled=true"]),
                    words(&["!re", "=type=bridge"]),
                    words(&["!done"]),
                ],
            ),
            (
                "/ppp/secret/print",
                vec![
                    words(&["!re", "=.id=*1", "=name=alice", "=password=s3cret", "=profile=home-20m", "=service=pppoe", "=disabled=no"]),
                    words(&["!re", "=.id=*2", "=name=bob", "=password=", "=disabled=yes"]),
                    words(&["!done"]),
                ],
            ),
        ]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));
        let gateway = gateway();

        let interfaces = gateway.interfaces(&router).await;
        assert_eq!(
            interfaces,
            vec![
                InterfaceInfo {
                    name: "ether1".to_string(),
                    kind: Some("ether".to_string()),
                    running: true,
                    disabled: false,
                },
                InterfaceInfo {
                    name: "sfp1".to_string(),
                    kind: Some("ether".to_string()),
                    running: false,
                    disabled: true,
                },
            ]
        );

        let secrets = gateway.list_ppp_secrets(&router).await;
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].profile.as_deref(), Some("home-20m"));
        assert_eq!(secrets[0].password, "s3cret");
        assert!(secrets[1].disabled);
        assert_eq!(secrets[1].password, "");
    }

    #[tokio::test]
    async fn upsert_sets_existing_secret_by_id() {
        let (port, received) = recording_router(HashMap::from([
            (
                "/ppp/secret/print",
                vec![words(&["!re", "=.id=*7", "=name=alice"]), words(&["!done"])],
            ),
            ("/ppp/secret/set", vec![words(&["!done"])]),
        ]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));

        assert!(gateway().upsert_ppp_secret(&router, &secret("alice")).await);
        assert_eq!(commands(&received), vec!["/ppp/secret/print", "/ppp/secret/set"]);
        let set = received.lock().unwrap()[1].clone();
        assert!(set.contains(&"=.id=*7".to_string()));
        assert!(set.contains(&"=profile=home-20m".to_string()));
        assert!(set.contains(&"=disabled=no".to_string()));
    }

    #[tokio::test]
    async fn upsert_adds_missing_secret_and_reports_traps() {
        let (port, received) = recording_router(HashMap::from([(
            "/ppp/secret/print",
            vec![words(&["!done"])],
        )]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));

        // `/ppp/secret/add` is unscripted, so the router traps.
        assert!(!gateway().upsert_ppp_secret(&router, &secret("carol")).await);
        assert_eq!(commands(&received), vec!["/ppp/secret/print", "/ppp/secret/add"]);
        let add = received.lock().unwrap()[1].clone();
        assert!(add.contains(&"=name=carol".to_string()));
        assert!(add.contains(&"=service=pppoe".to_string()));
    }

    #[tokio::test]
    async fn remove_secret_only_issues_remove_when_found() {
        let (port, received) = recording_router(HashMap::from([
            (
                "/ppp/secret/print",
                vec![words(&["!re", "=.id=*3", "=name=dave"]), words(&["!done"])],
            ),
            ("/ppp/secret/remove", vec![words(&["!done"])]),
        ]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));
        assert!(gateway().remove_ppp_secret(&router, "dave").await);
        let remove = received.lock().unwrap()[1].clone();
        assert_eq!(remove, words(&["/ppp/secret/remove", "=.id=*3"]));

        let (port, received) = recording_router(HashMap::from([(
            "/ppp/secret/print",
            vec![words(&["!done"])],
        )]))
        .await;
        let router = router_device(1, "127.0.0.1", Some(port));
        assert!(gateway().remove_ppp_secret(&router, "ghost").await);
        assert_eq!(commands(&received), vec!["/ppp/secret/print"]);
    }

    #[test]
    fn device_without_ip_is_not_a_target() {
        let mut router = router_device(9, "", None);
        router.ip_address = None;
        assert!(matches!(
            gateway().connect_options(&router),
            Err(ApiError::InvalidTarget(_))
        ));
        let router = router_device(9, "192.0.2.1", None);
        assert_eq!(gateway().connect_options(&router).unwrap().port, 1);
    }
}
