use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};

use crate::db::entities::device;
use crate::db::enums::DeviceKind;

// --- Device Service Functions ---

/// Retrieves a device by its ID.
pub async fn get_device<C: ConnectionTrait>(
    db: &C,
    device_id: i32,
) -> Result<Option<device::Model>, DbErr> {
    device::Entity::find_by_id(device_id).one(db).await
}

/// Lists devices of one kind, ordered by id so batch sweeps are deterministic.
pub async fn list_devices_by_kind<C: ConnectionTrait>(
    db: &C,
    kind: DeviceKind,
    active_only: bool,
) -> Result<Vec<device::Model>, DbErr> {
    let mut query = device::Entity::find().filter(device::Column::Kind.eq(kind));
    if active_only {
        query = query.filter(device::Column::IsActive.eq(true));
    }
    query.order_by_asc(device::Column::Id).all(db).await
}

/// Every IP address currently assigned to a device.
pub async fn list_used_ips<C: ConnectionTrait>(db: &C) -> Result<Vec<String>, DbErr> {
    let devices = device::Entity::find()
        .filter(device::Column::IpAddress.is_not_null())
        .all(db)
        .await?;
    Ok(devices
        .into_iter()
        .filter_map(|d| d.ip_address)
        .filter(|ip| !ip.trim().is_empty())
        .collect())
}

pub async fn find_device_by_ip<C: ConnectionTrait>(
    db: &C,
    ip: &str,
) -> Result<Option<device::Model>, DbErr> {
    device::Entity::find()
        .filter(device::Column::IpAddress.eq(ip))
        .one(db)
        .await
}

/// Inserts a device, stamping both timestamps.
pub async fn insert_device<C: ConnectionTrait>(
    db: &C,
    mut active: device::ActiveModel,
) -> Result<device::Model, DbErr> {
    let now = Utc::now();
    active.created_at = Set(now);
    active.updated_at = Set(now);
    active.insert(db).await
}

pub async fn update_device<C: ConnectionTrait>(
    db: &C,
    mut active: device::ActiveModel,
) -> Result<device::Model, DbErr> {
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

/// Deletes a device. Returns the number of rows removed.
pub async fn delete_device<C: ConnectionTrait>(db: &C, device_id: i32) -> Result<u64, DbErr> {
    let result = device::Entity::delete_by_id(device_id).exec(db).await?;
    Ok(result.rows_affected)
}
