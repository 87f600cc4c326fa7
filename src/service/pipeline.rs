// The write pipeline: every mutation on every node runs through
// `apply_row` while holding the write lock. Store mutations commit first;
// the snapshot is only touched after a successful commit, so the two can
// never disagree about the data version. Fan-out to slaves happens after
// the lock is released and never reverts a commit.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    entity::{config_update_history, configs},
    error::ConfitError,
    generate_key,
    model::{
        common::{AppState, DataVersion},
        replication::{ReplicatedRow, SyncKind, SyncOutcome, SyncPayload},
    },
    now_utc, store, version,
};

// How the commit obtains its version: the master advances the oracle, a
// slave adopts the version the master assigned.
pub enum VersionMode<'a> {
    Advance,
    Adopt(&'a DataVersion),
}

// Persists one replicated row plus its side effects and installs the
// result into the snapshot. The caller MUST hold `write_lock`.
pub async fn apply_row(
    state: &AppState,
    row: &ReplicatedRow,
    op_user_key: &str,
    mode: VersionMode<'_>,
) -> Result<DataVersion, ConfitError> {
    // NODE rows are replication membership metadata, outside the version
    // chain.
    if let ReplicatedRow::Node(node) = row {
        let exists = state.shared.read(|mem| mem.nodes.contains_key(&node.url));
        let node_row = node.to_row();
        if exists {
            store::update_node(&state.db, &node_row).await?;
        } else {
            store::insert_node(&state.db, &node_row).await?;
        }
        let current = state.shared.write(|mem| {
            mem.upsert_node(node.clone());
            mem.data_version.clone()
        });
        return Ok(current);
    }

    let current = state.shared.data_version();
    let next = match mode {
        VersionMode::Advance => version::advance(&current, &version::descriptor(row)?),
        VersionMode::Adopt(ver) => ver.clone(),
    };

    let tx = store::begin(&state.db).await?;

    let mut updated_app = None;
    let mut history = None;

    match row {
        ReplicatedRow::User(user) => {
            let exists = state.shared.read(|mem| mem.users.contains_key(&user.key));
            if exists {
                store::update_user(&tx, user).await?;
            } else {
                store::insert_user(&tx, user).await?;
            }
        }
        ReplicatedRow::App(app) => {
            let exists = state.shared.read(|mem| mem.apps.contains_key(&app.key));
            if exists {
                store::update_app(&tx, app).await?;
            } else {
                store::insert_app(&tx, app).await?;
            }
        }
        ReplicatedRow::WebHook(hook) => {
            let exists = state.shared.read(|mem| {
                mem.global_webhooks.iter().any(|h| h.key == hook.key)
                    || mem
                        .app_webhooks
                        .values()
                        .any(|hooks| hooks.iter().any(|h| h.key == hook.key))
            });
            if exists {
                store::update_web_hook(&tx, hook).await?;
            } else {
                store::insert_web_hook(&tx, hook).await?;
            }
        }
        ReplicatedRow::Config(config) => {
            let (old, app) = state.shared.read(|mem| {
                (
                    mem.raw_configs.get(&config.key).cloned(),
                    mem.apps.get(&config.app_key).cloned(),
                )
            });
            let mut app = app.ok_or_else(|| {
                ConfitError::bad_request(format!("unknown app '{}'", config.app_key))
            })?;

            if old.is_some() {
                store::update_config(&tx, config).await?;
            } else {
                store::insert_config(&tx, config).await?;
            }

            // Audit row for the change.
            let history_row = config_update_history::Model {
                id: generate_key(),
                config_key: config.key.clone(),
                op_user_key: op_user_key.to_string(),
                old_v: old.map(|c| c.v).unwrap_or_default(),
                new_v: config.v.clone(),
                applied_utc: now_utc(),
            };
            store::insert_history(&tx, &history_row).await?;
            history = Some(history_row);

            // The app fingerprint is a pure function of its config set;
            // recompute it from the post-write list.
            let list = state
                .shared
                .read(|mem| mem.configs_for(&config.app_key))
                .unwrap_or_else(|| Arc::new(Vec::new()));
            let next_list = with_config(&list, config);
            app.data_sign = super::config::data_sign(&next_list);
            store::update_app(&tx, &app).await?;
            updated_app = Some(app);
        }
        ReplicatedRow::Node(_) => unreachable!("handled above"),
    }

    // The local node row mirrors the singleton, so peers always see the
    // version this node has actually applied.
    let local_node = state
        .shared
        .read(|mem| mem.nodes.get(&state.settings.client_addr()).cloned())
        .map(|mut node| {
            node.data_version = next.clone();
            node
        });
    if let Some(node) = &local_node {
        store::update_node(&tx, &node.to_row()).await?;
    }

    store::save_data_version(&tx, &next).await?;
    tx.commit().await?;

    // Commit succeeded; install the new state. Assignments only.
    state.shared.write(|mem| {
        match row {
            ReplicatedRow::User(user) => mem.upsert_user(user.clone()),
            ReplicatedRow::App(app) => mem.upsert_app(app.clone()),
            ReplicatedRow::WebHook(hook) => mem.upsert_webhook(hook.clone()),
            ReplicatedRow::Config(config) => {
                mem.upsert_config(config.clone());
                if let Some(app) = updated_app.take() {
                    mem.upsert_app(app);
                }
            }
            ReplicatedRow::Node(_) => {}
        }
        if let Some(node) = local_node {
            mem.upsert_node(node);
        }
        mem.data_version = next.clone();
    });

    if let Some(history_row) = history {
        info!(
            config = %history_row.config_key,
            op_user = %history_row.op_user_key,
            version = next.version,
            "config change committed"
        );
    }

    Ok(next)
}

// Pushes one committed row to every slave. Failures are reported, never
// fatal; a missed slave repairs itself on its next reconciliation tick.
pub async fn fan_out(
    state: &AppState,
    row: &ReplicatedRow,
    ver: &DataVersion,
    op_user_key: &str,
) -> Vec<SyncOutcome> {
    let slaves: Vec<_> = state.shared.read(|mem| {
        mem.nodes
            .values()
            .filter(|node| !node.is_master())
            .cloned()
            .collect()
    });

    let kind = row.kind();
    let mut outcomes = Vec::with_capacity(slaves.len());

    for slave in slaves {
        // A node does not need to hear about itself.
        if let ReplicatedRow::Node(node) = row {
            if node.url == slave.url {
                continue;
            }
        }

        // A slave that is not exactly one version behind cannot take this
        // update; leave it to the reconciler.
        if kind != SyncKind::Node && ver.version != slave.data_version.version + 1 {
            let err = format!(
                "slave '{}' at version {}, master at {}",
                slave.url, slave.data_version.version, ver.version
            );
            warn!("fan-out skipped: {}", err);
            outcomes.push(SyncOutcome::failed(&slave.url, err));
            continue;
        }

        let payload = match row.row_json() {
            Ok(data) => SyncPayload {
                data_version: ver.clone(),
                kind,
                data,
                op_user_key: op_user_key.to_string(),
            },
            Err(err) => {
                outcomes.push(SyncOutcome::failed(&slave.url, err.to_string()));
                continue;
            }
        };

        match state.peer.sync_slave(&slave.node_url, &payload).await {
            Ok(()) => {
                if kind != SyncKind::Node {
                    if let Err(err) =
                        super::node::record_slave_version(state, &slave.url, ver).await
                    {
                        warn!(slave = %slave.url, "failed to record slave version: {}", err);
                    }
                }
                outcomes.push(SyncOutcome::ok(&slave.url));
            }
            Err(err) => {
                warn!(code = crate::error::SYNC_TARGET_FAILED, slave = %slave.url,
                    "fan-out failed: {}", err);
                outcomes.push(SyncOutcome::failed(&slave.url, err.to_string()));
            }
        }
    }

    outcomes
}

// The app's config list as it will look once `row` is applied, in
// authored order.
fn with_config(current: &[configs::Model], row: &configs::Model) -> Vec<configs::Model> {
    let mut list: Vec<configs::Model> = current
        .iter()
        .filter(|config| config.key != row.key)
        .cloned()
        .collect();
    list.push(row.clone());
    list.sort_by(|a, b| {
        a.created_utc
            .cmp(&b.created_utc)
            .then_with(|| a.key.cmp(&b.key))
    });
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::STATUS_ACTIVE;

    fn config(key: &str, k: &str, created: i64) -> configs::Model {
        configs::Model {
            key: key.to_string(),
            app_key: "a1".to_string(),
            k: k.to_string(),
            v: "1".to_string(),
            v_type: "int".to_string(),
            status: STATUS_ACTIVE,
            created_utc: created,
        }
    }

    #[test]
    fn test_with_config_appends_in_order() {
        let current = vec![config("c1", "a", 10), config("c2", "b", 20)];
        let list = with_config(&current, &config("c3", "c", 15));
        let keys: Vec<&str> = list.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["c1", "c3", "c2"]);
    }

    #[test]
    fn test_with_config_replaces_existing() {
        let current = vec![config("c1", "a", 10), config("c2", "b", 20)];
        let mut updated = config("c1", "a", 10);
        updated.v = "9".to_string();
        let list = with_config(&current, &updated);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].v, "9");
    }
}
