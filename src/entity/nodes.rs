//! `SeaORM` Entity for the nodes table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    // Client-facing address; doubles as the cluster-wide node identity.
    #[sea_orm(primary_key, auto_increment = false)]
    pub url: String,
    pub node_url: String,
    pub r#type: String,
    // JSON rendering of the node's last known DataVersion triple.
    #[sea_orm(column_type = "Text")]
    pub data_version_str: String,
    pub last_check_utc: i64,
    pub created_utc: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
