//! Device monitoring: cached resource/traffic/session snapshots and global stats.

pub mod cache;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::db::entities::prelude::Device;
use crate::db::enums::ConnectionMethod;
use crate::router::{InterfaceTraffic, RouterGateway, SystemResource};

pub use cache::MonitoringCache;

/// Port probed for devices monitored by `snmp` when none is configured.
const DEFAULT_PROBE_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub device_id: i32,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub resource: Option<SystemResource>,
    pub traffic: Vec<InterfaceTraffic>,
    pub active_sessions: Option<usize>,
    pub polled_at: DateTime<Utc>,
}

impl DeviceSnapshot {
    fn reachability(device_id: i32, latency: Option<Duration>) -> Self {
        Self {
            device_id,
            reachable: latency.is_some(),
            latency_ms: latency.map(|d| d.as_millis() as u64),
            resource: None,
            traffic: Vec::new(),
            active_sessions: None,
            polled_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub devices_total: usize,
    pub devices_polled: usize,
    pub devices_reachable: usize,
    pub active_sessions: usize,
    pub rx_bps: u64,
    pub tx_bps: u64,
}

async fn tcp_probe(ip: IpAddr, port: u16, limit: Duration) -> Option<Duration> {
    let started = Instant::now();
    match timeout(limit, TcpStream::connect((ip, port))).await {
        Ok(Ok(_)) => Some(started.elapsed()),
        Ok(Err(e)) => {
            debug!(ip = %ip, port = port, error = %e, "TCP probe failed.");
            None
        }
        Err(_) => None,
    }
}

async fn icmp_probe(ip: IpAddr, limit: Duration) -> Option<Duration> {
    let config = match ip {
        IpAddr::V4(_) => surge_ping::Config::default(),
        IpAddr::V6(_) => surge_ping::Config::builder().kind(surge_ping::ICMP::V6).build(),
    };
    let client = match surge_ping::Client::new(&config) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Cannot open ICMP socket; ping monitoring unavailable.");
            return None;
        }
    };
    let mut pinger = client
        .pinger(ip, surge_ping::PingIdentifier(rand::random()))
        .await;
    pinger.timeout(limit);
    match pinger.ping(surge_ping::PingSequence(0), &[]).await {
        Ok((_reply, rtt)) => Some(rtt),
        Err(e) => {
            debug!(ip = %ip, error = %e, "Ping failed.");
            None
        }
    }
}

/// Snapshots per connection method: `api` polls the router through the cache,
/// `ping` and `snmp` only record reachability, `none` yields nothing.
pub struct MonitoringService {
    router: Arc<dyn RouterGateway>,
    cache: MonitoringCache<DeviceSnapshot>,
    probe_timeout: Duration,
    concurrency: usize,
}

impl MonitoringService {
    pub fn new(router: Arc<dyn RouterGateway>, ttl: Duration, probe_timeout: Duration, concurrency: usize) -> Self {
        Self {
            router,
            cache: MonitoringCache::new(ttl),
            probe_timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &MonitoringCache<DeviceSnapshot> {
        &self.cache
    }

    pub async fn snapshot(&self, device: &Device) -> Option<Arc<DeviceSnapshot>> {
        if device.connection_method == ConnectionMethod::None {
            return None;
        }
        self.cache
            .get_or_refresh(device.id, || self.poll(device))
            .await
    }

    async fn poll(&self, device: &Device) -> Option<DeviceSnapshot> {
        let ip: Option<IpAddr> = device
            .ip_address
            .as_deref()
            .and_then(|ip| ip.trim().parse().ok());

        match device.connection_method {
            ConnectionMethod::None => None,
            ConnectionMethod::Api if device.is_router() => {
                let started = Instant::now();
                let snapshot = self.router.monitoring_snapshot(device).await;
                let latency = snapshot.as_ref().map(|_| started.elapsed());
                let mut result = DeviceSnapshot::reachability(device.id, latency);
                if let Some(s) = snapshot {
                    result.resource = s.resource;
                    result.traffic = s.traffic;
                    result.active_sessions = s.active_sessions;
                }
                Some(result)
            }
            ConnectionMethod::Api | ConnectionMethod::Snmp => {
                let ip = ip?;
                let port = device
                    .port
                    .and_then(|p| u16::try_from(p).ok())
                    .filter(|p| *p > 0)
                    .unwrap_or(DEFAULT_PROBE_PORT);
                let latency = tcp_probe(ip, port, self.probe_timeout).await;
                Some(DeviceSnapshot::reachability(device.id, latency))
            }
            ConnectionMethod::Ping => {
                let latency = icmp_probe(ip?, self.probe_timeout).await;
                Some(DeviceSnapshot::reachability(device.id, latency))
            }
        }
    }

    /// Global counters over `devices`, polling at most `concurrency` at a time.
    pub async fn aggregate(&self, devices: &[Device]) -> AggregateStats {
        let snapshots: Vec<Option<Arc<DeviceSnapshot>>> = stream::iter(devices)
            .map(|device| self.snapshot(device))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stats = AggregateStats {
            devices_total: devices.len(),
            ..Default::default()
        };
        for snapshot in snapshots.into_iter().flatten() {
            stats.devices_polled += 1;
            if snapshot.reachable {
                stats.devices_reachable += 1;
            }
            stats.active_sessions += snapshot.active_sessions.unwrap_or(0);
            for t in &snapshot.traffic {
                stats.rx_bps += t.rx_bps;
                stats.tx_bps += t.tx_bps;
            }
        }
        stats
    }
}
