//! `SeaORM` Entity for the config_update_history audit table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

// Append-only; rows are never updated after insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "config_update_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub config_key: String,
    pub op_user_key: String,
    #[sea_orm(column_type = "Text")]
    pub old_v: String,
    #[sea_orm(column_type = "Text")]
    pub new_v: String,
    pub applied_utc: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::configs::Entity",
        from = "Column::ConfigKey",
        to = "super::configs::Column::Key"
    )]
    Configs,
}

impl Related<super::configs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Configs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
