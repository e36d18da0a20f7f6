use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::SubscriberStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscribers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// RADIUS username. A subscriber without one cannot be isolated or restored.
    pub login: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub plan_id: Option<i32>,
    pub router_id: Option<i32>,
    pub olt_id: Option<i32>,
    pub olt_port: Option<String>,
    pub onu_serial: Option<String>,
    pub status: SubscriberStatus,
    pub usage_bytes: i64,
    pub fup_active: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plan::Entity",
        from = "Column::PlanId",
        to = "super::plan::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    Plan,
}

impl Related<super::plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The login, if present and non-blank.
    pub fn login_identity(&self) -> Option<&str> {
        self.login.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}
