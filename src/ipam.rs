//! IP address management: carves fixed-size subnets out of a root block,
//! skipping any block that already holds a device address.

use ipnetwork::Ipv4Network;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::services::settings_service::keys;
use crate::db::{DeviceRegistry, RepositoryError, Settings};

#[derive(Error, Debug)]
pub enum IpamError {
    #[error("Invalid CIDR '{0}'")]
    InvalidCidr(String),
    #[error("Prefix /{prefix} does not fit inside {root}")]
    InvalidPrefix { root: Ipv4Network, prefix: u8 },
    #[error("Invalid IP address '{0}'")]
    InvalidAddress(String),
    #[error("IP address {ip} is already assigned to device {device_id}")]
    AddressInUse { ip: String, device_id: i32 },
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub fn parse_root(cidr: &str) -> Result<Ipv4Network, IpamError> {
    let network: Ipv4Network = cidr
        .trim()
        .parse()
        .map_err(|_| IpamError::InvalidCidr(cidr.to_string()))?;
    Ipv4Network::new(network.network(), network.prefix())
        .map_err(|_| IpamError::InvalidCidr(cidr.to_string()))
}

/// Parses stored addresses, tolerating a `/len` suffix. Unparsable entries are skipped.
fn used_addresses<S: AsRef<str>>(used: &[S]) -> Vec<u32> {
    let mut addrs: Vec<u32> = used
        .iter()
        .filter_map(|ip| {
            let raw = ip.as_ref().trim();
            let addr = raw.split('/').next().unwrap_or(raw);
            match addr.parse::<Ipv4Addr>() {
                Ok(a) => Some(u32::from(a)),
                Err(_) => {
                    debug!(ip = raw, "Ignoring non-IPv4 address in used set.");
                    None
                }
            }
        })
        .collect();
    addrs.sort_unstable();
    addrs.dedup();
    addrs
}

fn any_in_range(sorted: &[u32], start: u32, end: u32) -> bool {
    let i = sorted.partition_point(|a| *a < start);
    sorted.get(i).is_some_and(|a| *a <= end)
}

/// First `/prefix` block inside `root`, in address order, containing none of `used`.
///
/// `Ok(None)` means the root block is exhausted.
pub fn next_available_subnet<S: AsRef<str>>(
    root: Ipv4Network,
    prefix: u8,
    used: &[S],
) -> Result<Option<Ipv4Network>, IpamError> {
    if prefix > 32 || prefix < root.prefix() {
        return Err(IpamError::InvalidPrefix { root, prefix });
    }
    let used = used_addresses(used);
    let block: u64 = 1 << (32 - u32::from(prefix));
    let count: u64 = 1 << (u32::from(prefix) - u32::from(root.prefix()));
    let base = u64::from(u32::from(root.network()));

    for i in 0..count {
        let start = base + i * block;
        let end = start + block - 1;
        // Both bounds lie inside the root block, which is within u32.
        let (start, end) = (start as u32, end as u32);
        if !any_in_range(&used, start, end) {
            let subnet = Ipv4Network::new(Ipv4Addr::from(start), prefix)
                .map_err(|_| IpamError::InvalidPrefix { root, prefix })?;
            return Ok(Some(subnet));
        }
    }
    Ok(None)
}

/// Network address + 1; for /31 and /32 the network address itself.
pub fn first_host(subnet: Ipv4Network) -> Ipv4Addr {
    let network = u32::from(subnet.network());
    if subnet.prefix() >= 31 {
        Ipv4Addr::from(network)
    } else {
        Ipv4Addr::from(network + 1)
    }
}

/// First unused host address in `pool`, skipping network and broadcast addresses.
pub fn next_available_host<S: AsRef<str>>(pool: Ipv4Network, used: &[S]) -> Option<Ipv4Addr> {
    let used = used_addresses(used);
    let network = u32::from(pool.network());
    let broadcast = u32::from(pool.broadcast());
    let (first, last) = if pool.prefix() >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    };
    (first..=last)
        .find(|a| used.binary_search(a).is_err())
        .map(Ipv4Addr::from)
}

/// Checks that `ip` parses and is not held by a device other than `exclude_id`.
pub async fn validate_ip(
    registry: &dyn DeviceRegistry,
    ip: &str,
    exclude_id: Option<i32>,
) -> Result<IpAddr, IpamError> {
    let addr: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| IpamError::InvalidAddress(ip.to_string()))?;
    if let Some(owner) = registry.find_by_ip(&addr.to_string()).await? {
        if Some(owner.id) != exclude_id {
            return Err(IpamError::AddressInUse {
                ip: addr.to_string(),
                device_id: owner.id,
            });
        }
    }
    Ok(addr)
}

/// IPAM over the device registry, with root block and subnet size from settings.
#[derive(Clone)]
pub struct IpamService {
    registry: Arc<dyn DeviceRegistry>,
    settings: Settings,
}

impl IpamService {
    pub fn new(registry: Arc<dyn DeviceRegistry>, settings: Settings) -> Self {
        Self { registry, settings }
    }

    pub async fn pool(&self) -> Result<(Ipv4Network, u8), IpamError> {
        let cidr = self
            .settings
            .string(keys::IPAM_ROOT_CIDR, keys::DEFAULT_IPAM_ROOT_CIDR)
            .await;
        let prefix = self
            .settings
            .int(keys::IPAM_SUBNET_PREFIX, keys::DEFAULT_IPAM_SUBNET_PREFIX)
            .await;
        let root = parse_root(&cidr)?;
        let prefix = u8::try_from(prefix).map_err(|_| IpamError::InvalidPrefix { root, prefix: 0 })?;
        Ok((root, prefix))
    }

    /// Allocates from an explicit used set (e.g. one read inside a transaction).
    pub async fn allocate_from(&self, used: &[String]) -> Result<Option<Ipv4Addr>, IpamError> {
        let (root, prefix) = self.pool().await?;
        match next_available_subnet(root, prefix, used)? {
            Some(subnet) => {
                let host = first_host(subnet);
                info!(subnet = %subnet, host = %host, "Allocated device subnet.");
                Ok(Some(host))
            }
            None => {
                warn!(root = %root, prefix = prefix, "IP pool exhausted.");
                Ok(None)
            }
        }
    }

    pub async fn allocate_device_ip(&self) -> Result<Option<Ipv4Addr>, IpamError> {
        let used = self.registry.list_used_ips().await?;
        self.allocate_from(&used).await
    }

    pub async fn validate_ip(&self, ip: &str, exclude_id: Option<i32>) -> Result<IpAddr, IpamError> {
        validate_ip(self.registry.as_ref(), ip, exclude_id).await
    }
}
