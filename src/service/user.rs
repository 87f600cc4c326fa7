// Operator user management. All writes run the pipeline on the master.

use crate::{
    entity::users,
    error::ConfitError,
    generate_key,
    model::{
        common::{AppState, UserRole},
        replication::{ReplicatedRow, SyncOutcome},
    },
    now_utc,
    service::pipeline,
};

// Managing users requires the acting operator to be an admin. An empty
// op_user_key is only accepted while the user table is empty, so the
// first admin can bootstrap itself.
fn check_user_admin(state: &AppState, op_user_key: &str) -> Result<(), ConfitError> {
    state.shared.read(|mem| {
        if op_user_key.is_empty() {
            if mem.users.is_empty() {
                return Ok(());
            }
            return Err(ConfitError::not_permitted("missing op_user_key"));
        }

        match mem.users.get(op_user_key) {
            Some(user) if user.role == UserRole::Admin.as_str() => Ok(()),
            Some(_) => Err(ConfitError::not_permitted(
                "admin role required to manage users",
            )),
            None => Err(ConfitError::not_permitted("unknown op_user_key")),
        }
    })
}

pub async fn create(
    state: &AppState,
    name: &str,
    password: &str,
    role: &str,
    op_user_key: &str,
) -> Result<(users::Model, Vec<SyncOutcome>), ConfitError> {
    if name.is_empty() || password.is_empty() {
        return Err(ConfitError::bad_request("name and password are required"));
    }
    let role = role
        .parse::<UserRole>()
        .map_err(ConfitError::BadRequest)?;

    let guard = state.shared.write_lock.lock().await;

    check_user_admin(state, op_user_key)?;
    let name_taken = state
        .shared
        .read(|mem| mem.users.values().any(|user| user.name == name));
    if name_taken {
        return Err(ConfitError::bad_request(format!(
            "user name '{}' already exists",
            name
        )));
    }

    let pass_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ConfitError::Internal(e.into()))?;
    let user = users::Model {
        key: generate_key(),
        name: name.to_string(),
        pass_hash,
        role: role.as_str().to_string(),
        created_utc: now_utc(),
    };

    let row = ReplicatedRow::User(user.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((user, outcomes))
}

pub async fn update(
    state: &AppState,
    key: &str,
    name: Option<&str>,
    password: Option<&str>,
    role: Option<&str>,
    op_user_key: &str,
) -> Result<(users::Model, Vec<SyncOutcome>), ConfitError> {
    let guard = state.shared.write_lock.lock().await;

    check_user_admin(state, op_user_key)?;
    let mut user = state
        .shared
        .read(|mem| mem.users.get(key).cloned())
        .ok_or_else(|| ConfitError::bad_request(format!("unknown user '{}'", key)))?;

    if let Some(name) = name {
        if name.is_empty() {
            return Err(ConfitError::bad_request("name must not be empty"));
        }
        let taken = state
            .shared
            .read(|mem| mem.users.values().any(|u| u.name == name && u.key != key));
        if taken {
            return Err(ConfitError::bad_request(format!(
                "user name '{}' already exists",
                name
            )));
        }
        user.name = name.to_string();
    }
    if let Some(password) = password {
        user.pass_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| ConfitError::Internal(e.into()))?;
    }
    if let Some(role) = role {
        let role = role.parse::<UserRole>().map_err(ConfitError::BadRequest)?;
        user.role = role.as_str().to_string();
    }

    let row = ReplicatedRow::User(user.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((user, outcomes))
}

pub fn list(state: &AppState) -> Vec<users::Model> {
    let mut users: Vec<users::Model> =
        state.shared.read(|mem| mem.users.values().cloned().collect());
    users.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then_with(|| a.key.cmp(&b.key)));
    // Hashes never leave the process.
    for user in &mut users {
        user.pass_hash = String::new();
    }
    users
}
