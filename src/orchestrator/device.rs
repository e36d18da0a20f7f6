//! Router/OLT record lifecycle with address allocation and NAS registration.

use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, Set, TransactionTrait};
use std::net::IpAddr;
use thiserror::Error;
use tracing::info;

use crate::db::entities::device;
use crate::db::entities::prelude::Device;
use crate::db::enums::{ConnectionMethod, DeviceKind};
use crate::db::services::device_service;
use crate::ipam::{self, IpamError, IpamService};
use crate::radius::RadiusSynchronizer;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("No free subnet left in the IP pool")]
    PoolExhausted,
    #[error("IPAM error: {0}")]
    Ipam(#[from] IpamError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Device {0} not found")]
    NotFound(i32),
}

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub kind: DeviceKind,
    pub sub_type: Option<String>,
    /// Allocated from the pool when absent or blank.
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<i32>,
    pub connection_method: ConnectionMethod,
    pub radius_enabled: bool,
    pub radius_secret: Option<String>,
}

/// Fields to change; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct DeviceChanges {
    pub name: Option<String>,
    pub sub_type: Option<String>,
    pub ip_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<i32>,
    pub connection_method: Option<ConnectionMethod>,
    pub radius_enabled: Option<bool>,
    pub radius_secret: Option<String>,
    pub is_active: Option<bool>,
}

/// Creates, updates and deletes devices. The record write is one transaction;
/// the NAS row follows after commit, for radius-enabled routers only.
#[derive(Clone)]
pub struct DeviceProvisioner {
    db: DatabaseConnection,
    ipam: IpamService,
    radius: RadiusSynchronizer,
}

/// Rejects an address held by another device; returns it normalized.
async fn ensure_free(
    txn: &DatabaseTransaction,
    ip: &str,
    exclude_id: Option<i32>,
) -> Result<String, ProvisionError> {
    let addr: IpAddr = ip
        .trim()
        .parse()
        .map_err(|_| IpamError::InvalidAddress(ip.to_string()))?;
    let normalized = addr.to_string();
    if let Some(owner) = device_service::find_device_by_ip(txn, &normalized).await? {
        if Some(owner.id) != exclude_id {
            return Err(IpamError::AddressInUse {
                ip: normalized,
                device_id: owner.id,
            }
            .into());
        }
    }
    Ok(normalized)
}

fn requested_ip(ip: Option<&str>) -> Option<&str> {
    ip.map(str::trim).filter(|ip| !ip.is_empty())
}

impl DeviceProvisioner {
    pub fn new(db: DatabaseConnection, ipam: IpamService, radius: RadiusSynchronizer) -> Self {
        Self { db, ipam, radius }
    }

    pub async fn create_device(&self, new: NewDevice) -> Result<Device, ProvisionError> {
        let requested = requested_ip(new.ip_address.as_deref()).map(str::to_string);
        let (root, prefix) = self.ipam.pool().await?;

        let txn = self.db.begin().await?;
        let ip = match requested {
            Some(ip) => ensure_free(&txn, &ip, None).await?,
            None => {
                let used = device_service::list_used_ips(&txn).await?;
                let subnet = ipam::next_available_subnet(root, prefix, &used)?
                    .ok_or(ProvisionError::PoolExhausted)?;
                ipam::first_host(subnet).to_string()
            }
        };

        let device = device_service::insert_device(
            &txn,
            device::ActiveModel {
                name: Set(new.name),
                kind: Set(new.kind),
                sub_type: Set(new.sub_type),
                ip_address: Set(Some(ip)),
                username: Set(new.username),
                password: Set(new.password),
                port: Set(new.port),
                connection_method: Set(new.connection_method),
                radius_enabled: Set(new.radius_enabled),
                radius_secret: Set(new.radius_secret),
                is_active: Set(true),
                ..Default::default()
            },
        )
        .await?;
        txn.commit().await?;
        info!(device_id = device.id, kind = %device.kind, ip = ?device.ip_address, "Device created.");

        if device.is_router() && device.radius_enabled {
            self.radius.sync_nas(&device).await;
        }
        Ok(device)
    }

    pub async fn update_device(&self, device_id: i32, changes: DeviceChanges) -> Result<Device, ProvisionError> {
        let txn = self.db.begin().await?;
        let existing = device_service::get_device(&txn, device_id)
            .await?
            .ok_or(ProvisionError::NotFound(device_id))?;

        let mut active: device::ActiveModel = existing.clone().into();
        if let Some(ip) = requested_ip(changes.ip_address.as_deref()) {
            let ip = ensure_free(&txn, ip, Some(device_id)).await?;
            if existing.ip_address.as_deref() != Some(ip.as_str()) {
                active.ip_address = Set(Some(ip));
            }
        }
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(sub_type) = changes.sub_type {
            active.sub_type = Set(Some(sub_type));
        }
        if let Some(username) = changes.username {
            active.username = Set(Some(username));
        }
        if let Some(password) = changes.password {
            active.password = Set(Some(password));
        }
        if let Some(port) = changes.port {
            active.port = Set(Some(port));
        }
        if let Some(method) = changes.connection_method {
            active.connection_method = Set(method);
        }
        if let Some(enabled) = changes.radius_enabled {
            active.radius_enabled = Set(enabled);
        }
        if let Some(secret) = changes.radius_secret {
            active.radius_secret = Set(Some(secret));
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }

        let updated = device_service::update_device(&txn, active).await?;
        txn.commit().await?;
        info!(device_id = updated.id, ip = ?updated.ip_address, "Device updated.");

        let was_nas = existing.is_router() && existing.radius_enabled;
        let moved = existing.ip_address != updated.ip_address
            || existing.radius_enabled != updated.radius_enabled;
        if was_nas && moved {
            if let Some(old_ip) = existing.ip_address.as_deref() {
                self.radius.remove_nas(old_ip).await;
            }
        }
        if updated.is_router() && (updated.radius_enabled || was_nas) {
            self.radius.sync_nas(&updated).await;
        }
        Ok(updated)
    }

    /// Deletes the record, then any NAS row registered under its address.
    pub async fn delete_device(&self, device_id: i32) -> Result<Device, ProvisionError> {
        let txn = self.db.begin().await?;
        let existing = device_service::get_device(&txn, device_id)
            .await?
            .ok_or(ProvisionError::NotFound(device_id))?;
        device_service::delete_device(&txn, device_id).await?;
        txn.commit().await?;
        info!(device_id = device_id, "Device deleted.");

        if existing.is_router() {
            if let Some(ip) = existing.ip_address.as_deref() {
                self.radius.remove_nas(ip).await;
            }
        }
        Ok(existing)
    }
}
