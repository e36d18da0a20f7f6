//! Collaborator traits consumed by the orchestration layer and their
//! database-backed implementation.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::db::entities::prelude::{Device, Plan, Subscriber};
use crate::db::enums::{DeviceKind, SubscriberStatus};
use crate::db::services::{device_service, settings_service, subscriber_service};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Read access to device connection parameters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn get(&self, device_id: i32) -> Result<Option<Device>, RepositoryError>;
    async fn list_by_kind(&self, kind: DeviceKind) -> Result<Vec<Device>, RepositoryError>;
    async fn list_used_ips(&self) -> Result<Vec<String>, RepositoryError>;
    async fn find_by_ip(&self, ip: &str) -> Result<Option<Device>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn get(&self, subscriber_id: i32) -> Result<Option<Subscriber>, RepositoryError>;
    async fn get_plan(&self, plan_id: i32) -> Result<Option<Plan>, RepositoryError>;
    async fn find_pending_by_serial(
        &self,
        olt_id: i32,
        serial: &str,
    ) -> Result<Option<Subscriber>, RepositoryError>;
    async fn update_status(
        &self,
        subscriber_id: i32,
        status: SubscriberStatus,
    ) -> Result<(), RepositoryError>;
    async fn set_fup_active(&self, subscriber_id: i32, active: bool)
    -> Result<(), RepositoryError>;
    /// Adds `bytes` to the usage counter and returns the new total.
    async fn add_usage(&self, subscriber_id: i32, bytes: i64) -> Result<i64, RepositoryError>;
    async fn reset_usage(&self, subscriber_id: i32) -> Result<(), RepositoryError>;
    async fn list_fup_candidates(&self) -> Result<Vec<Subscriber>, RepositoryError>;
}

/// Raw key/value access to runtime settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, RepositoryError>;
}

/// Typed reads over a `SettingsStore` with hard-coded fallbacks.
///
/// A failing store is logged and treated like a missing key.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    async fn value(&self, key: &str) -> Option<serde_json::Value> {
        match self.store.get_value(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read setting, using default.");
                None
            }
        }
    }

    pub async fn string(&self, key: &str, default: &str) -> String {
        match self.value(key).await {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => default.to_string(),
        }
    }

    pub async fn int(&self, key: &str, default: i64) -> i64 {
        match self.value(key).await {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }
}

/// `DeviceRegistry`, `SubscriberRepository` and `SettingsStore` over one database.
#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl DeviceRegistry for DbStore {
    async fn get(&self, device_id: i32) -> Result<Option<Device>, RepositoryError> {
        Ok(device_service::get_device(&self.db, device_id).await?)
    }

    async fn list_by_kind(&self, kind: DeviceKind) -> Result<Vec<Device>, RepositoryError> {
        Ok(device_service::list_devices_by_kind(&self.db, kind, true).await?)
    }

    async fn list_used_ips(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(device_service::list_used_ips(&self.db).await?)
    }

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Device>, RepositoryError> {
        Ok(device_service::find_device_by_ip(&self.db, ip).await?)
    }
}

#[async_trait]
impl SubscriberRepository for DbStore {
    async fn get(&self, subscriber_id: i32) -> Result<Option<Subscriber>, RepositoryError> {
        Ok(subscriber_service::get_subscriber(&self.db, subscriber_id).await?)
    }

    async fn get_plan(&self, plan_id: i32) -> Result<Option<Plan>, RepositoryError> {
        Ok(subscriber_service::get_plan(&self.db, plan_id).await?)
    }

    async fn find_pending_by_serial(
        &self,
        olt_id: i32,
        serial: &str,
    ) -> Result<Option<Subscriber>, RepositoryError> {
        Ok(subscriber_service::find_pending_by_serial(&self.db, olt_id, serial).await?)
    }

    async fn update_status(
        &self,
        subscriber_id: i32,
        status: SubscriberStatus,
    ) -> Result<(), RepositoryError> {
        let rows = subscriber_service::update_status(&self.db, subscriber_id, status).await?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("subscriber {subscriber_id}")));
        }
        Ok(())
    }

    async fn set_fup_active(
        &self,
        subscriber_id: i32,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let rows = subscriber_service::set_fup_active(&self.db, subscriber_id, active).await?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("subscriber {subscriber_id}")));
        }
        Ok(())
    }

    async fn add_usage(&self, subscriber_id: i32, bytes: i64) -> Result<i64, RepositoryError> {
        subscriber_service::add_usage(&self.db, subscriber_id, bytes)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("subscriber {subscriber_id}")))
    }

    async fn reset_usage(&self, subscriber_id: i32) -> Result<(), RepositoryError> {
        subscriber_service::reset_usage(&self.db, subscriber_id).await?;
        Ok(())
    }

    async fn list_fup_candidates(&self) -> Result<Vec<Subscriber>, RepositoryError> {
        Ok(subscriber_service::list_fup_candidates(&self.db).await?)
    }
}

#[async_trait]
impl SettingsStore for DbStore {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, RepositoryError> {
        Ok(settings_service::get_setting(&self.db, key)
            .await?
            .map(|s| s.value))
    }
}
