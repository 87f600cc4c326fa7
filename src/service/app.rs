// Operator app management.

use crate::{
    entity::apps,
    error::ConfitError,
    generate_key,
    model::{
        common::AppState,
        replication::{ReplicatedRow, SyncOutcome},
    },
    now_utc,
    service::pipeline,
};

pub async fn create(
    state: &AppState,
    user_key: &str,
    name: &str,
    app_type: &str,
    op_user_key: &str,
) -> Result<(apps::Model, Vec<SyncOutcome>), ConfitError> {
    if name.is_empty() || app_type.is_empty() {
        return Err(ConfitError::bad_request("name and type are required"));
    }

    let guard = state.shared.write_lock.lock().await;

    let user_exists = state.shared.read(|mem| mem.users.contains_key(user_key));
    if !user_exists {
        return Err(ConfitError::bad_request(format!(
            "unknown user '{}'",
            user_key
        )));
    }

    let app = apps::Model {
        key: generate_key(),
        user_key: user_key.to_string(),
        name: name.to_string(),
        r#type: app_type.to_string(),
        data_sign: String::new(),
        created_utc: now_utc(),
    };

    let row = ReplicatedRow::App(app.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((app, outcomes))
}

pub async fn update(
    state: &AppState,
    key: &str,
    name: Option<&str>,
    app_type: Option<&str>,
    op_user_key: &str,
) -> Result<(apps::Model, Vec<SyncOutcome>), ConfitError> {
    let guard = state.shared.write_lock.lock().await;

    let mut app = state
        .shared
        .read(|mem| mem.apps.get(key).cloned())
        .ok_or_else(|| ConfitError::bad_request(format!("unknown app '{}'", key)))?;

    if let Some(name) = name {
        if name.is_empty() {
            return Err(ConfitError::bad_request("name must not be empty"));
        }
        app.name = name.to_string();
    }
    if let Some(app_type) = app_type {
        if app_type.is_empty() {
            return Err(ConfitError::bad_request("type must not be empty"));
        }
        app.r#type = app_type.to_string();
    }

    let row = ReplicatedRow::App(app.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((app, outcomes))
}

pub fn list_for_user(state: &AppState, user_key: &str) -> Vec<apps::Model> {
    let mut apps: Vec<apps::Model> = state.shared.read(|mem| {
        mem.apps
            .values()
            .filter(|app| app.user_key == user_key)
            .cloned()
            .collect()
    });
    apps.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then_with(|| a.key.cmp(&b.key)));
    apps
}
