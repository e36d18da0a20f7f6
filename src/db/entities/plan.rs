use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Mikrotik-Rate-Limit string, e.g. "10M/10M".
    pub rate_limit: String,
    pub fup_threshold_gb: Option<i32>,
    pub fup_rate_limit: Option<String>,
    /// RADIUS group assigned while the subscriber is active.
    pub radius_profile: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscriber::Entity")]
    Subscribers,
}

impl Related<super::subscriber::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscribers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// FUP threshold in bytes, when the plan has one.
    pub fn fup_threshold_bytes(&self) -> Option<i64> {
        self.fup_threshold_gb
            .filter(|gb| *gb > 0)
            .map(|gb| i64::from(gb) * 1024 * 1024 * 1024)
    }
}
