use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// FreeRADIUS `nas`: the AAA server's view of a router.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nas")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub nasname: String,
    pub shortname: String,
    #[sea_orm(column_name = "type")]
    pub nas_type: String,
    pub ports: Option<i32>,
    #[serde(skip_serializing)]
    pub secret: String,
    pub server: Option<String>,
    pub community: Option<String>,
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
