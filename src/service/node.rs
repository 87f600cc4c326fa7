// Node bookkeeping outside the version chain: peer upserts from
// CheckMaster and the master's record of how far each slave has applied.

use crate::{
    error::ConfitError,
    model::{common::AppState, common::DataVersion, node::NodeInfo},
    now_utc, store,
};

// Inserts or refreshes a peer's node row. Caller holds `write_lock`.
pub async fn upsert_peer(state: &AppState, mut node: NodeInfo) -> Result<NodeInfo, ConfitError> {
    node.last_check_utc = now_utc();

    let exists = state.shared.read(|mem| mem.nodes.contains_key(&node.url));
    let row = node.to_row();
    if exists {
        store::update_node(&state.db, &row).await?;
    } else {
        store::insert_node(&state.db, &row).await?;
    }

    state.shared.write(|mem| mem.upsert_node(node.clone()));
    Ok(node)
}

// After a successful push the master notes the slave's new version so the
// next fan-out can tell whether the slave is exactly one behind.
pub async fn record_slave_version(
    state: &AppState,
    slave_url: &str,
    ver: &DataVersion,
) -> Result<(), ConfitError> {
    let node = state.shared.write(|mem| {
        if let Some(node) = mem.nodes.get_mut(slave_url) {
            node.data_version = ver.clone();
            node.last_check_utc = now_utc();
            Some(node.clone())
        } else {
            None
        }
    });

    if let Some(node) = node {
        store::update_node(&state.db, &node.to_row()).await?;
    }
    Ok(())
}
