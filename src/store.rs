// Durable store adapter. Every helper is generic over
// `sea_orm::ConnectionTrait`, so the same function runs inside an explicit
// transaction (the write pipeline, full resync) or directly on the
// connection as its own auto-committed session.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::{
    entity::{apps, config_update_history, configs, data_version, nodes, users, web_hooks},
    model::common::DataVersion,
};

const DATA_VERSION_ROW_ID: i32 = 1;

pub async fn begin(db: &DatabaseConnection) -> Result<DatabaseTransaction, DbErr> {
    db.begin().await
}

fn user_active(row: &users::Model) -> users::ActiveModel {
    users::ActiveModel {
        key: Set(row.key.clone()),
        name: Set(row.name.clone()),
        pass_hash: Set(row.pass_hash.clone()),
        role: Set(row.role.clone()),
        created_utc: Set(row.created_utc),
    }
}

fn app_active(row: &apps::Model) -> apps::ActiveModel {
    apps::ActiveModel {
        key: Set(row.key.clone()),
        user_key: Set(row.user_key.clone()),
        name: Set(row.name.clone()),
        r#type: Set(row.r#type.clone()),
        data_sign: Set(row.data_sign.clone()),
        created_utc: Set(row.created_utc),
    }
}

fn config_active(row: &configs::Model) -> configs::ActiveModel {
    configs::ActiveModel {
        key: Set(row.key.clone()),
        app_key: Set(row.app_key.clone()),
        k: Set(row.k.clone()),
        v: Set(row.v.clone()),
        v_type: Set(row.v_type.clone()),
        status: Set(row.status),
        created_utc: Set(row.created_utc),
    }
}

fn web_hook_active(row: &web_hooks::Model) -> web_hooks::ActiveModel {
    web_hooks::ActiveModel {
        key: Set(row.key.clone()),
        app_key: Set(row.app_key.clone()),
        url: Set(row.url.clone()),
        scope: Set(row.scope.clone()),
        created_utc: Set(row.created_utc),
    }
}

fn node_active(row: &nodes::Model) -> nodes::ActiveModel {
    nodes::ActiveModel {
        url: Set(row.url.clone()),
        node_url: Set(row.node_url.clone()),
        r#type: Set(row.r#type.clone()),
        data_version_str: Set(row.data_version_str.clone()),
        last_check_utc: Set(row.last_check_utc),
        created_utc: Set(row.created_utc),
    }
}

fn history_active(row: &config_update_history::Model) -> config_update_history::ActiveModel {
    config_update_history::ActiveModel {
        id: Set(row.id.clone()),
        config_key: Set(row.config_key.clone()),
        op_user_key: Set(row.op_user_key.clone()),
        old_v: Set(row.old_v.clone()),
        new_v: Set(row.new_v.clone()),
        applied_utc: Set(row.applied_utc),
    }
}

pub async fn insert_user<C: ConnectionTrait>(c: &C, row: &users::Model) -> Result<(), DbErr> {
    users::Entity::insert(user_active(row)).exec(c).await?;
    Ok(())
}

pub async fn update_user<C: ConnectionTrait>(c: &C, row: &users::Model) -> Result<(), DbErr> {
    user_active(row).update(c).await?;
    Ok(())
}

pub async fn insert_app<C: ConnectionTrait>(c: &C, row: &apps::Model) -> Result<(), DbErr> {
    apps::Entity::insert(app_active(row)).exec(c).await?;
    Ok(())
}

pub async fn update_app<C: ConnectionTrait>(c: &C, row: &apps::Model) -> Result<(), DbErr> {
    app_active(row).update(c).await?;
    Ok(())
}

pub async fn insert_config<C: ConnectionTrait>(c: &C, row: &configs::Model) -> Result<(), DbErr> {
    configs::Entity::insert(config_active(row)).exec(c).await?;
    Ok(())
}

pub async fn update_config<C: ConnectionTrait>(c: &C, row: &configs::Model) -> Result<(), DbErr> {
    config_active(row).update(c).await?;
    Ok(())
}

pub async fn insert_web_hook<C: ConnectionTrait>(
    c: &C,
    row: &web_hooks::Model,
) -> Result<(), DbErr> {
    web_hooks::Entity::insert(web_hook_active(row)).exec(c).await?;
    Ok(())
}

pub async fn update_web_hook<C: ConnectionTrait>(
    c: &C,
    row: &web_hooks::Model,
) -> Result<(), DbErr> {
    web_hook_active(row).update(c).await?;
    Ok(())
}

pub async fn insert_node<C: ConnectionTrait>(c: &C, row: &nodes::Model) -> Result<(), DbErr> {
    nodes::Entity::insert(node_active(row)).exec(c).await?;
    Ok(())
}

pub async fn update_node<C: ConnectionTrait>(c: &C, row: &nodes::Model) -> Result<(), DbErr> {
    node_active(row).update(c).await?;
    Ok(())
}

pub async fn delete_node<C: ConnectionTrait>(c: &C, url: &str) -> Result<(), DbErr> {
    nodes::Entity::delete_by_id(url).exec(c).await?;
    Ok(())
}

pub async fn insert_history<C: ConnectionTrait>(
    c: &C,
    row: &config_update_history::Model,
) -> Result<(), DbErr> {
    config_update_history::Entity::insert(history_active(row))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn all_users<C: ConnectionTrait>(c: &C) -> Result<Vec<users::Model>, DbErr> {
    users::Entity::find().all(c).await
}

pub async fn all_apps<C: ConnectionTrait>(c: &C) -> Result<Vec<apps::Model>, DbErr> {
    apps::Entity::find().all(c).await
}

// Configs in authored order; the resolver's duplicate-key rule depends on
// this ordering.
pub async fn all_configs<C: ConnectionTrait>(c: &C) -> Result<Vec<configs::Model>, DbErr> {
    configs::Entity::find()
        .order_by_asc(configs::Column::CreatedUtc)
        .order_by_asc(configs::Column::Key)
        .all(c)
        .await
}

pub async fn all_web_hooks<C: ConnectionTrait>(c: &C) -> Result<Vec<web_hooks::Model>, DbErr> {
    web_hooks::Entity::find().all(c).await
}

pub async fn all_nodes<C: ConnectionTrait>(c: &C) -> Result<Vec<nodes::Model>, DbErr> {
    nodes::Entity::find().all(c).await
}

pub async fn all_history<C: ConnectionTrait>(
    c: &C,
) -> Result<Vec<config_update_history::Model>, DbErr> {
    config_update_history::Entity::find()
        .order_by_asc(config_update_history::Column::AppliedUtc)
        .all(c)
        .await
}

pub async fn find_user_by_name<C: ConnectionTrait>(
    c: &C,
    name: &str,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::Name.eq(name))
        .one(c)
        .await
}

// Bulk inserts used by the full resync path.

pub async fn insert_users<C: ConnectionTrait>(c: &C, rows: &[users::Model]) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    users::Entity::insert_many(rows.iter().map(user_active))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn insert_apps<C: ConnectionTrait>(c: &C, rows: &[apps::Model]) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    apps::Entity::insert_many(rows.iter().map(app_active))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn insert_configs<C: ConnectionTrait>(
    c: &C,
    rows: &[configs::Model],
) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    configs::Entity::insert_many(rows.iter().map(config_active))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn insert_web_hooks<C: ConnectionTrait>(
    c: &C,
    rows: &[web_hooks::Model],
) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    web_hooks::Entity::insert_many(rows.iter().map(web_hook_active))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn insert_nodes<C: ConnectionTrait>(c: &C, rows: &[nodes::Model]) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    nodes::Entity::insert_many(rows.iter().map(node_active))
        .exec(c)
        .await?;
    Ok(())
}

pub async fn insert_histories<C: ConnectionTrait>(
    c: &C,
    rows: &[config_update_history::Model],
) -> Result<(), DbErr> {
    if rows.is_empty() {
        return Ok(());
    }
    config_update_history::Entity::insert_many(rows.iter().map(history_active))
        .exec(c)
        .await?;
    Ok(())
}

// Removes every replicated row. Runs inside the resync transaction so a
// failed resync leaves the old state intact.
pub async fn clear_replicated<C: ConnectionTrait>(c: &C) -> Result<(), DbErr> {
    config_update_history::Entity::delete_many().exec(c).await?;
    configs::Entity::delete_many().exec(c).await?;
    web_hooks::Entity::delete_many().exec(c).await?;
    apps::Entity::delete_many().exec(c).await?;
    users::Entity::delete_many().exec(c).await?;
    nodes::Entity::delete_many().exec(c).await?;
    data_version::Entity::delete_many().exec(c).await?;
    Ok(())
}

pub async fn load_data_version<C: ConnectionTrait>(c: &C) -> Result<Option<DataVersion>, DbErr> {
    let row = data_version::Entity::find_by_id(DATA_VERSION_ROW_ID)
        .one(c)
        .await?;

    Ok(row.map(|row| DataVersion {
        version: row.version,
        sign: row.sign,
        old_sign: row.old_sign,
    }))
}

pub async fn save_data_version<C: ConnectionTrait>(
    c: &C,
    ver: &DataVersion,
) -> Result<(), DbErr> {
    let existing = data_version::Entity::find_by_id(DATA_VERSION_ROW_ID)
        .one(c)
        .await?;

    let active = data_version::ActiveModel {
        id: Set(DATA_VERSION_ROW_ID),
        version: Set(ver.version),
        sign: Set(ver.sign.clone()),
        old_sign: Set(ver.old_sign.clone()),
    };

    if existing.is_some() {
        active.update(c).await?;
    } else {
        data_version::Entity::insert(active).exec(c).await?;
    }

    Ok(())
}
