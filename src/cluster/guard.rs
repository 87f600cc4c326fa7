// Startup role validation and state loading. Any failure here is fatal:
// a node that cannot establish a coherent role must not serve.

use anyhow::Context;
use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use crate::{
    model::{
        common::{DataVersion, NodeKind},
        node::NodeInfo,
    },
    now_utc,
    settings::Settings,
    snapshot::{MemConf, Shared},
    store,
};

// Enforces the single-master invariant against whatever the store
// remembers from previous runs.
pub async fn check_node_validity(db: &DatabaseConnection, settings: &Settings) -> anyhow::Result<()> {
    let nodes = store::all_nodes(db).await?;

    for row in nodes {
        let node = NodeInfo::from(row);
        if !node.is_master() {
            continue;
        }

        if settings.is_master() {
            // Only one master in the cluster; a leftover master row with a
            // different address is stale.
            if node.url != settings.client_addr() {
                warn!(stale = %node.url, "removing stale master row");
                store::delete_node(db, &node.url).await?;
                break;
            }
        } else if node.url != settings.master_addr() {
            // This slave was re-attached to a new master. Drop the old
            // master's data; the first reconciliation pulls fresh state
            // before the node serves anything current.
            warn!(old_master = %node.url, new_master = %settings.master_addr(),
                "attached to a new master, clearing replicated data");
            let tx = store::begin(db).await?;
            store::clear_replicated(&tx).await?;
            store::save_data_version(&tx, &DataVersion::default()).await?;
            tx.commit().await?;
            break;
        }
    }

    Ok(())
}

// Makes sure the version singleton exists before anything reads it.
pub async fn ensure_data_version(db: &DatabaseConnection) -> anyhow::Result<DataVersion> {
    if let Some(ver) = store::load_data_version(db).await? {
        return Ok(ver);
    }
    let ver = DataVersion::default();
    store::save_data_version(db, &ver).await?;
    Ok(ver)
}

// Rebuilds the in-memory snapshot from the store.
pub async fn load_mem(db: &DatabaseConnection) -> anyhow::Result<MemConf> {
    let users = store::all_users(db).await?;
    let apps = store::all_apps(db).await?;
    let web_hooks = store::all_web_hooks(db).await?;
    let configs = store::all_configs(db).await?;
    let nodes = store::all_nodes(db)
        .await?
        .into_iter()
        .map(NodeInfo::from)
        .collect();
    let data_version = store::load_data_version(db)
        .await?
        .context("data_version row missing")?;

    Ok(MemConf::rebuild(
        users,
        apps,
        web_hooks,
        configs,
        nodes,
        data_version,
    ))
}

// Ensures the local node row (and, on slaves, the configured master row)
// exists and carries the configured role.
pub async fn init_node_rows(
    db: &DatabaseConnection,
    shared: &Shared,
    settings: &Settings,
) -> anyhow::Result<()> {
    let client_addr = settings.client_addr();
    let existing = shared.read(|mem| mem.nodes.get(&client_addr).cloned());

    match existing {
        None => {
            let node = NodeInfo {
                url: client_addr.clone(),
                node_url: settings.node_addr(),
                r#type: settings.node_kind().as_str().to_string(),
                data_version: shared.data_version(),
                last_check_utc: 0,
                created_utc: now_utc(),
            };
            store::insert_node(db, &node.to_row()).await?;
            shared.write(|mem| mem.upsert_node(node));
            info!(url = %client_addr, "registered local node");
        }
        Some(mut node) => {
            let configured = settings.node_kind().as_str();
            if node.r#type != configured {
                info!(url = %client_addr, from = %node.r#type, to = %configured,
                    "correcting local node role");
                node.r#type = configured.to_string();
                store::update_node(db, &node.to_row()).await?;
                shared.write(|mem| mem.upsert_node(node));
            }
        }
    }

    if settings.is_master() {
        return Ok(());
    }

    let master_addr = settings.master_addr();
    let master_known = shared.read(|mem| mem.nodes.contains_key(&master_addr));
    if !master_known {
        let master = NodeInfo {
            url: master_addr.clone(),
            node_url: settings.master_node_addr(),
            r#type: NodeKind::Master.as_str().to_string(),
            data_version: DataVersion::default(),
            last_check_utc: 0,
            created_utc: now_utc(),
        };
        store::insert_node(db, &master.to_row()).await?;
        shared.write(|mem| mem.upsert_node(master));
        info!(url = %master_addr, "registered configured master node");
    }

    Ok(())
}
