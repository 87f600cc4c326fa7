// WebHook management. Hooks replicate like any other entity; delivery is
// a separate notifier's concern and not wired here.

use crate::{
    entity::web_hooks,
    error::ConfitError,
    generate_key,
    model::{
        common::{AppState, HookScope},
        replication::{ReplicatedRow, SyncOutcome},
    },
    now_utc,
    service::pipeline,
};

fn check_hook(state: &AppState, scope: HookScope, app_key: Option<&str>, url: &str) -> Result<(), ConfitError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfitError::bad_request("url must be http(s)"));
    }

    match (scope, app_key) {
        (HookScope::Global, None) => Ok(()),
        (HookScope::Global, Some(_)) => Err(ConfitError::bad_request(
            "global hooks must not name an app",
        )),
        (HookScope::App, Some(app_key)) => {
            let exists = state.shared.read(|mem| mem.apps.contains_key(app_key));
            if exists {
                Ok(())
            } else {
                Err(ConfitError::bad_request(format!(
                    "unknown app '{}'",
                    app_key
                )))
            }
        }
        (HookScope::App, None) => Err(ConfitError::bad_request("app hooks require app_key")),
    }
}

pub async fn create(
    state: &AppState,
    app_key: Option<&str>,
    url: &str,
    scope: &str,
    op_user_key: &str,
) -> Result<(web_hooks::Model, Vec<SyncOutcome>), ConfitError> {
    let scope = scope.parse::<HookScope>().map_err(ConfitError::BadRequest)?;

    let guard = state.shared.write_lock.lock().await;
    check_hook(state, scope, app_key, url)?;

    let hook = web_hooks::Model {
        key: generate_key(),
        app_key: app_key.map(str::to_string),
        url: url.to_string(),
        scope: scope.as_str().to_string(),
        created_utc: now_utc(),
    };

    let row = ReplicatedRow::WebHook(hook.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((hook, outcomes))
}

pub async fn update(
    state: &AppState,
    key: &str,
    url: &str,
    op_user_key: &str,
) -> Result<(web_hooks::Model, Vec<SyncOutcome>), ConfitError> {
    let guard = state.shared.write_lock.lock().await;

    let mut hook = state
        .shared
        .read(|mem| {
            mem.global_webhooks
                .iter()
                .find(|h| h.key == key)
                .cloned()
                .or_else(|| {
                    mem.app_webhooks
                        .values()
                        .flat_map(|hooks| hooks.iter())
                        .find(|h| h.key == key)
                        .cloned()
                })
        })
        .ok_or_else(|| ConfitError::bad_request(format!("unknown webhook '{}'", key)))?;

    let scope = hook
        .scope
        .parse::<HookScope>()
        .map_err(ConfitError::BadRequest)?;
    check_hook(state, scope, hook.app_key.as_deref(), url)?;
    hook.url = url.to_string();

    let row = ReplicatedRow::WebHook(hook.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((hook, outcomes))
}
