// Inbound side of the replication protocol: the three request kinds a
// node answers on its peer address, plus the master's NODE fan-out task.

use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    entity::{apps, configs, users, web_hooks},
    error::ConfitError,
    model::{
        common::AppState,
        node::NodeInfo,
        replication::{FullState, ReplicatedRow, SyncKind, SyncPayload},
    },
    service::{node as node_service, pipeline},
    store, version,
};

// SyncSlave: apply one master-committed row if it extends the local chain
// exactly; anything else is reported and left for the reconciler.
pub async fn handle_sync_slave(state: &AppState, data: &str) -> Result<(), ConfitError> {
    if state.settings.is_master() {
        return Err(ConfitError::bad_request(
            "invalid request type for master node: SYNCSLAVE",
        ));
    }

    let payload: SyncPayload = serde_json::from_str(data)
        .map_err(|_| ConfitError::bad_request("bad sync payload format"))?;

    let _guard = state.shared.write_lock.lock().await;

    let local = state.shared.data_version();
    if payload.kind != SyncKind::Node && !version::chain_extends(&local, &payload.data_version) {
        return Err(ConfitError::DataVersion(format!(
            "local ({}, {}) does not chain to incoming ({}, old_sign {})",
            local.version, local.sign, payload.data_version.version, payload.data_version.old_sign
        )));
    }

    let row = decode_row(payload.kind, &payload.data)?;
    pipeline::apply_row(
        state,
        &row,
        &payload.op_user_key,
        pipeline::VersionMode::Adopt(&payload.data_version),
    )
    .await?;

    Ok(())
}

fn decode_row(kind: SyncKind, data: &str) -> Result<ReplicatedRow, ConfitError> {
    let row = match kind {
        SyncKind::User => ReplicatedRow::User(
            serde_json::from_str::<users::Model>(data)
                .map_err(|_| ConfitError::bad_request("bad data format for user row"))?,
        ),
        SyncKind::App => ReplicatedRow::App(
            serde_json::from_str::<apps::Model>(data)
                .map_err(|_| ConfitError::bad_request("bad data format for app row"))?,
        ),
        SyncKind::WebHook => ReplicatedRow::WebHook(
            serde_json::from_str::<web_hooks::Model>(data)
                .map_err(|_| ConfitError::bad_request("bad data format for webhook row"))?,
        ),
        SyncKind::Config => ReplicatedRow::Config(
            serde_json::from_str::<configs::Model>(data)
                .map_err(|_| ConfitError::bad_request("bad data format for config row"))?,
        ),
        SyncKind::Node => ReplicatedRow::Node(
            serde_json::from_str::<NodeInfo>(data)
                .map_err(|_| ConfitError::bad_request("bad data format for node row"))?,
        ),
    };
    Ok(row)
}

// CheckMaster: record the calling slave's state and answer with the
// master's current data version so the slave can decide whether to
// resync.
pub async fn handle_check_master(state: &AppState, data: &str) -> Result<String, ConfitError> {
    if !state.settings.is_master() {
        return Err(ConfitError::bad_request(
            "invalid request type for slave node: CHECKMASTER",
        ));
    }

    let node: NodeInfo = serde_json::from_str(data)
        .map_err(|_| ConfitError::bad_request("bad node row format"))?;

    let node = {
        let _guard = state.shared.write_lock.lock().await;
        node_service::upsert_peer(state, node).await?
    };

    // Let the other slaves learn about this peer; best effort.
    if let Some(tx) = &state.node_sync_tx {
        if tx.try_send(node).is_err() {
            warn!("node fan-out queue full, dropping update");
        }
    }

    Ok(state.shared.data_version().to_json())
}

// SyncMaster: serialize the whole replicated state. Deliberately does not
// take the write lock; a consistent read-lock snapshot is enough and a
// resyncing slave must not be able to stall master writes.
pub async fn handle_sync_master(state: &AppState) -> Result<String, ConfitError> {
    if !state.settings.is_master() {
        return Err(ConfitError::bad_request(
            "invalid request type for slave node: SYNCMASTER",
        ));
    }

    // History lives only in the store; fetch it before touching mem_lock.
    let conf_history = store::all_history(&state.db).await?;

    let full = state.shared.read(|mem| {
        let mut web_hooks = mem.global_webhooks.clone();
        for hooks in mem.app_webhooks.values() {
            web_hooks.extend(hooks.iter().cloned());
        }

        FullState {
            nodes: mem.nodes.clone(),
            users: mem.users.clone(),
            apps: mem.apps.clone(),
            web_hooks,
            configs: mem.raw_configs.clone(),
            conf_history,
            data_version: mem.data_version.clone(),
        }
    });

    serde_json::to_string(&full).map_err(|e| ConfitError::Internal(e.into()))
}

// Master-side background task pushing NODE rows to the other slaves,
// one update event at a time.
pub fn spawn_node_fanout(state: AppState, mut rx: mpsc::Receiver<NodeInfo>) {
    tokio::spawn(async move {
        while let Some(node) = rx.recv().await {
            let ver = state.shared.data_version();
            let row = ReplicatedRow::Node(node);
            let outcomes = pipeline::fan_out(&state, &row, &ver, "").await;
            for outcome in outcomes {
                if let Some(err) = outcome.err {
                    warn!(node = %outcome.node, "node fan-out failed: {}", err);
                }
            }
        }
    });
}
