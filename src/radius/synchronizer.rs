use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, warn};

use super::{PASSWORD_ATTRIBUTE, RadiusAttribute, RadiusError};
use crate::db::Settings;
use crate::db::entities::prelude::Device;
use crate::db::entities::{nas, radcheck, radreply, radusergroup};
use crate::db::services::settings_service::keys;

/// Writes subscriber and NAS state into the FreeRADIUS tables.
///
/// Public operations never return errors: failures are logged and reported as
/// `false`. Every write is an upsert or a delete, never read-modify-write, since
/// the AAA server reads these tables concurrently.
#[derive(Clone)]
pub struct RadiusSynchronizer {
    db: DatabaseConnection,
    settings: Settings,
}

fn report(result: Result<(), RadiusError>, operation: &str, subject: &str) -> bool {
    match result {
        Ok(()) => {
            info!(operation = operation, subject = subject, "RADIUS sync complete.");
            true
        }
        Err(e) => {
            warn!(operation = operation, subject = subject, error = %e, "RADIUS sync failed.");
            false
        }
    }
}

impl RadiusSynchronizer {
    pub fn new(db: DatabaseConnection, settings: Settings) -> Self {
        Self { db, settings }
    }

    /// Upserts the password, replaces every other check item, and merges reply items.
    pub async fn sync_user(
        &self,
        username: &str,
        password: Option<&str>,
        reply: &[RadiusAttribute],
        check: &[RadiusAttribute],
    ) -> bool {
        report(
            self.try_sync_user(username, password, reply, check).await,
            "sync_user",
            username,
        )
    }

    async fn try_sync_user(
        &self,
        username: &str,
        password: Option<&str>,
        reply: &[RadiusAttribute],
        check: &[RadiusAttribute],
    ) -> Result<(), RadiusError> {
        let txn = self.db.begin().await?;

        if let Some(password) = password {
            radcheck::Entity::insert(radcheck::ActiveModel {
                username: Set(username.to_string()),
                attribute: Set(PASSWORD_ATTRIBUTE.to_string()),
                op: Set(":=".to_string()),
                value: Set(password.to_string()),
                ..Default::default()
            })
            .on_conflict(
                OnConflict::columns([radcheck::Column::Username, radcheck::Column::Attribute])
                    .update_columns([radcheck::Column::Op, radcheck::Column::Value])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        radcheck::Entity::delete_many()
            .filter(radcheck::Column::Username.eq(username))
            .filter(radcheck::Column::Attribute.ne(PASSWORD_ATTRIBUTE))
            .exec(&txn)
            .await?;

        let rows: Vec<radcheck::ActiveModel> = check
            .iter()
            .filter(|a| a.name != PASSWORD_ATTRIBUTE)
            .map(|a| radcheck::ActiveModel {
                username: Set(username.to_string()),
                attribute: Set(a.name.clone()),
                op: Set(a.op.clone()),
                value: Set(a.value.clone()),
                ..Default::default()
            })
            .collect();
        if !rows.is_empty() {
            radcheck::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        for attribute in reply {
            radreply::Entity::insert(radreply::ActiveModel {
                username: Set(username.to_string()),
                attribute: Set(attribute.name.clone()),
                op: Set(attribute.op.clone()),
                value: Set(attribute.value.clone()),
                ..Default::default()
            })
            .on_conflict(
                OnConflict::columns([radreply::Column::Username, radreply::Column::Attribute])
                    .update_columns([radreply::Column::Op, radreply::Column::Value])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Deletes the named reply items.
    pub async fn remove_reply_attributes(&self, username: &str, names: &[&str]) -> bool {
        let result = radreply::Entity::delete_many()
            .filter(radreply::Column::Username.eq(username))
            .filter(radreply::Column::Attribute.is_in(names.iter().copied()))
            .exec(&self.db)
            .await
            .map(|_| ())
            .map_err(RadiusError::from);
        report(result, "remove_reply_attributes", username)
    }

    /// Puts the user in exactly one group.
    pub async fn assign_group(&self, username: &str, group: &str, priority: i32) -> bool {
        let result = radusergroup::Entity::insert(radusergroup::ActiveModel {
            username: Set(username.to_string()),
            groupname: Set(group.to_string()),
            priority: Set(priority),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(radusergroup::Column::Username)
                .update_columns([radusergroup::Column::Groupname, radusergroup::Column::Priority])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map(|_| ())
        .map_err(RadiusError::from);
        report(result, "assign_group", username)
    }

    pub async fn clear_group(&self, username: &str) -> bool {
        let result = radusergroup::Entity::delete_many()
            .filter(radusergroup::Column::Username.eq(username))
            .exec(&self.db)
            .await
            .map(|_| ())
            .map_err(RadiusError::from);
        report(result, "clear_group", username)
    }

    /// Removes every check, reply and group row of the user.
    pub async fn remove_user(&self, username: &str) -> bool {
        report(self.try_remove_user(username).await, "remove_user", username)
    }

    async fn try_remove_user(&self, username: &str) -> Result<(), RadiusError> {
        let txn = self.db.begin().await?;
        radcheck::Entity::delete_many()
            .filter(radcheck::Column::Username.eq(username))
            .exec(&txn)
            .await?;
        radreply::Entity::delete_many()
            .filter(radreply::Column::Username.eq(username))
            .exec(&txn)
            .await?;
        radusergroup::Entity::delete_many()
            .filter(radusergroup::Column::Username.eq(username))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    /// Registers a radius-enabled router as a NAS, or removes it when RADIUS is off.
    pub async fn sync_nas(&self, device: &Device) -> bool {
        let subject = device.ip_address.clone().unwrap_or_else(|| device.id.to_string());
        if !device.radius_enabled {
            return match device.ip_address.as_deref() {
                Some(ip) => self.remove_nas(ip).await,
                None => true,
            };
        }
        report(self.try_upsert_nas(device).await, "sync_nas", &subject)
    }

    async fn try_upsert_nas(&self, device: &Device) -> Result<(), RadiusError> {
        let ip = device
            .ip_address
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .ok_or(RadiusError::MissingNasAddress(device.id))?;
        let nas_type = self
            .settings
            .string(keys::NAS_TYPE, keys::DEFAULT_NAS_TYPE)
            .await;

        nas::Entity::insert(nas::ActiveModel {
            nasname: Set(ip.to_string()),
            shortname: Set(device.name.clone()),
            nas_type: Set(nas_type),
            ports: Set(None),
            secret: Set(device.radius_secret.clone().unwrap_or_default()),
            server: Set(None),
            community: Set(None),
            description: Set(Some(format!("device #{}", device.id))),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(nas::Column::Nasname)
                .update_columns([
                    nas::Column::Shortname,
                    nas::Column::NasType,
                    nas::Column::Secret,
                    nas::Column::Description,
                ])
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }

    pub async fn remove_nas(&self, nasname: &str) -> bool {
        let result = nas::Entity::delete_many()
            .filter(nas::Column::Nasname.eq(nasname))
            .exec(&self.db)
            .await
            .map(|_| ())
            .map_err(RadiusError::from);
        report(result, "remove_nas", nasname)
    }
}
