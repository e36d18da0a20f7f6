use chrono::Utc;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set, sea_query::OnConflict};

use crate::db::entities::setting;

/// Keys read from the `settings` table, with their fallbacks.
pub mod keys {
    pub const RADIUS_SERVER_IP: &str = "radius_server_ip";
    pub const COA_PORT: &str = "coa_port";
    pub const ISOLATION_ADDRESS_LIST: &str = "isolation_address_list";
    pub const ISOLATION_PROFILE: &str = "isolation_profile";
    pub const ISOLATION_RATE_LIMIT: &str = "isolation_rate_limit";
    pub const IPAM_ROOT_CIDR: &str = "ipam_root_cidr";
    pub const IPAM_SUBNET_PREFIX: &str = "ipam_subnet_prefix";
    pub const NAS_TYPE: &str = "nas_type";
    pub const DEFAULT_SIMULTANEOUS_USE: &str = "default_simultaneous_use";

    pub const DEFAULT_ISOLATION_ADDRESS_LIST: &str = "ISOLIR";
    pub const DEFAULT_ISOLATION_PROFILE: &str = "isolir";
    pub const DEFAULT_ISOLATION_RATE_LIMIT: &str = "1k/1k";
    pub const DEFAULT_IPAM_ROOT_CIDR: &str = "10.10.0.0/16";
    pub const DEFAULT_IPAM_SUBNET_PREFIX: i64 = 30;
    pub const DEFAULT_NAS_TYPE: &str = "other";
    pub const DEFAULT_SIMULTANEOUS_USE_VALUE: i64 = 1;
}

// --- Settings Service Functions ---

/// Retrieves a setting by its key.
pub async fn get_setting<C: ConnectionTrait>(
    db: &C,
    key: &str,
) -> Result<Option<setting::Model>, DbErr> {
    setting::Entity::find_by_id(key.to_owned()).one(db).await
}

/// Creates or updates a setting.
pub async fn update_setting<C: ConnectionTrait>(
    db: &C,
    key: &str,
    value: &serde_json::Value,
) -> Result<(), DbErr> {
    let active_setting = setting::ActiveModel {
        key: Set(key.to_owned()),
        value: Set(value.clone()),
        updated_at: Set(Utc::now()),
    };
    setting::Entity::insert(active_setting)
        .on_conflict(
            OnConflict::column(setting::Column::Key)
                .update_columns([setting::Column::Value, setting::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
