// Slave-side reconciliation loop. Once a minute the slave reports itself
// to the master; if the data versions disagree it pulls the whole state
// and replaces everything in one transaction. This loop is the
// authoritative convergence mechanism - push replication is only an
// optimization on top of it.

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    model::{common::AppState, node::NodeInfo, replication::FullState},
    now_utc,
    snapshot::MemConf,
    store,
};

// One reconciliation pass. Holds the write lock for the whole pass so no
// SyncSlave can interleave with a state replacement.
pub async fn check_master_once(state: &AppState) -> anyhow::Result<()> {
    let _guard = state.shared.write_lock.lock().await;

    let client_addr = state.settings.client_addr();
    let (local_ver, local_node) = state.shared.read(|mem| {
        (
            mem.data_version.clone(),
            mem.nodes.get(&client_addr).cloned(),
        )
    });
    let mut local_node = local_node.context("local node row missing from snapshot")?;

    let master_ver = state
        .peer
        .check_master(&state.settings.master_node_addr(), &local_node)
        .await?;

    if master_ver.version == local_ver.version && master_ver.sign == local_ver.sign {
        // In sync; just note the successful check.
        local_node.last_check_utc = now_utc();
        store::update_node(&state.db, &local_node.to_row()).await?;
        state
            .shared
            .write(|mem| mem.upsert_node(local_node.clone()));
        return Ok(());
    }

    info!(
        local = local_ver.version,
        master = master_ver.version,
        "data version diverged, pulling full state"
    );

    let full = state
        .peer
        .sync_master(&state.settings.master_node_addr())
        .await?;
    replace_all(state, full, &mut local_node).await?;

    // Second check so the master records the repaired state.
    if let Err(err) = state
        .peer
        .check_master(&state.settings.master_node_addr(), &local_node)
        .await
    {
        warn!("post-resync check failed: {}", err);
    }

    Ok(())
}

// Replaces store and snapshot with the received state. Everything lands
// in a single transaction; on failure the old state stays untouched and
// the next tick retries.
async fn replace_all(
    state: &AppState,
    full: FullState,
    local_node: &mut NodeInfo,
) -> anyhow::Result<()> {
    local_node.data_version = full.data_version.clone();
    local_node.last_check_utc = now_utc();

    let users: Vec<_> = full.users.values().cloned().collect();
    let apps: Vec<_> = full.apps.values().cloned().collect();
    let mut configs: Vec<_> = full.configs.values().cloned().collect();
    configs.sort_by(|a, b| {
        a.created_utc
            .cmp(&b.created_utc)
            .then_with(|| a.key.cmp(&b.key))
    });

    // The master's node map contains this slave too; it is rewritten with
    // the local addresses and the freshly adopted version.
    let mut nodes: Vec<NodeInfo> = full
        .nodes
        .values()
        .filter(|node| node.url != local_node.url)
        .cloned()
        .collect();
    nodes.push(local_node.clone());

    let tx = store::begin(&state.db).await?;
    store::clear_replicated(&tx).await?;
    store::insert_users(&tx, &users).await?;
    store::insert_apps(&tx, &apps).await?;
    store::insert_web_hooks(&tx, &full.web_hooks).await?;
    store::insert_configs(&tx, &configs).await?;
    store::insert_histories(&tx, &full.conf_history).await?;
    let node_rows: Vec<_> = nodes.iter().map(NodeInfo::to_row).collect();
    store::insert_nodes(&tx, &node_rows).await?;
    store::save_data_version(&tx, &full.data_version).await?;
    tx.commit().await?;

    // Commit succeeded; swap the snapshot wholesale.
    let mem = MemConf::rebuild(
        users,
        apps,
        full.web_hooks,
        configs,
        nodes,
        full.data_version.clone(),
    );
    state.shared.replace(mem);

    info!(version = full.data_version.version, "full resync applied");
    Ok(())
}

// The periodic loop, spawned on slaves after the startup check passed.
pub fn spawn(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(state.settings.check_interval_secs());
        loop {
            tokio::time::sleep(interval).await;
            if let Err(err) = check_master_once(&state).await {
                warn!("reconciliation tick failed: {}", err);
            }
        }
    });
}
