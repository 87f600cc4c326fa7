//! `SeaORM` entities for the replicated tables

pub mod apps;
pub mod config_update_history;
pub mod configs;
pub mod data_version;
pub mod nodes;
pub mod users;
pub mod web_hooks;
