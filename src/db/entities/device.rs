use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{ConnectionMethod, DeviceKind};

/// A managed network element: a subscriber-facing router or an OLT.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub kind: DeviceKind,
    /// Vendor tag, e.g. "zte" or "huawei" for OLTs. Blank means "use the mock driver".
    pub sub_type: Option<String>,
    #[sea_orm(unique)]
    pub ip_address: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub port: Option<i32>,
    pub connection_method: ConnectionMethod,
    pub radius_enabled: bool,
    #[serde(skip_serializing)]
    pub radius_secret: Option<String>,
    pub is_active: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Vendor tag normalized for driver resolution.
    pub fn vendor_tag(&self) -> String {
        self.sub_type
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    pub fn is_router(&self) -> bool {
        self.kind == DeviceKind::Router
    }
}
