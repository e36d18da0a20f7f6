use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operator-tunable key/value row (IPAM pool, isolation profile and rate, FUP and CoA knobs).
///
/// Read through `db::repository::Settings`, which supplies a fallback for every missing key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub value: Json,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
