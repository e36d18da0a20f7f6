//! Router Driver Facade: typed RouterOS operations over short-lived API sessions.

pub mod mikrotik;

use async_trait::async_trait;
use serde::Serialize;

use crate::db::entities::prelude::Device;
use crate::routeros::ApiError;

pub use mikrotik::MikrotikRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Ppp,
    Hotspot,
}

/// A live PPP or hotspot session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSession {
    /// RouterOS internal id, e.g. `*8000001A`.
    pub id: String,
    pub kind: SessionKind,
    pub login: String,
    pub address: Option<String>,
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemResource {
    pub uptime: Option<String>,
    pub version: Option<String>,
    pub board_name: Option<String>,
    pub cpu_load: Option<u32>,
    pub free_memory: Option<u64>,
    pub total_memory: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub kind: Option<String>,
    pub running: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceTraffic {
    pub name: String,
    pub rx_bps: u64,
    pub tx_bps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PppSecret {
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub profile: Option<String>,
    pub service: Option<String>,
    pub remote_address: Option<String>,
    pub disabled: bool,
}

/// Resource, traffic and session count gathered over one API session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterSnapshot {
    pub resource: Option<SystemResource>,
    pub traffic: Vec<InterfaceTraffic>,
    pub active_sessions: Option<usize>,
}

/// Operations the orchestration and monitoring layers need from a router.
///
/// Methods returning plain values log failures and degrade to empty, `false`
/// or `None`. `find_active_session` returns a `Result` because the isolate
/// workflow must tell an unreachable router from an offline subscriber.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouterGateway: Send + Sync {
    async fn check_connection(&self, router: &Device) -> bool;
    async fn system_resource(&self, router: &Device) -> Option<SystemResource>;
    async fn interfaces(&self, router: &Device) -> Vec<InterfaceInfo>;
    async fn interface_traffic(&self, router: &Device, interfaces: &[String]) -> Vec<InterfaceTraffic>;
    async fn active_sessions(&self, router: &Device) -> Vec<DeviceSession>;
    async fn find_active_session(
        &self,
        router: &Device,
        login: &str,
    ) -> Result<Option<DeviceSession>, ApiError>;
    async fn count_active_sessions(&self, router: &Device) -> Option<usize>;
    async fn add_address_list_entry(
        &self,
        router: &Device,
        list: &str,
        address: &str,
        comment: &str,
    ) -> bool;
    async fn remove_address_list_entries(&self, router: &Device, list: &str, address: &str) -> bool;
    async fn list_ppp_secrets(&self, router: &Device) -> Vec<PppSecret>;
    async fn upsert_ppp_secret(&self, router: &Device, secret: &PppSecret) -> bool;
    async fn remove_ppp_secret(&self, router: &Device, name: &str) -> bool;
    async fn monitoring_snapshot(&self, router: &Device) -> Option<RouterSnapshot>;
}
