// Integration tests for the replication state machinery that runs the
// same on every node: the version chain, the snapshot, and per-client
// resolution on top of them.

use std::collections::HashMap;

use confit::entity::{apps, configs, users};
use confit::model::client::ClientData;
use confit::model::common::{DataVersion, STATUS_ACTIVE};
use confit::model::node::NodeInfo;
use confit::model::replication::{FullState, ReplicatedRow, SyncOutcome, SyncPayload, SyncKind};
use confit::resolver;
use confit::rules::Value;
use confit::snapshot::{MemConf, Shared};
use confit::version;

fn user(key: &str, name: &str) -> users::Model {
    users::Model {
        key: key.to_string(),
        name: name.to_string(),
        pass_hash: "hash".to_string(),
        role: "admin".to_string(),
        created_utc: 1,
    }
}

fn app(key: &str, sign: &str) -> apps::Model {
    apps::Model {
        key: key.to_string(),
        user_key: "u1".to_string(),
        name: key.to_string(),
        r#type: "ios".to_string(),
        data_sign: sign.to_string(),
        created_utc: 1,
    }
}

fn config(key: &str, app: &str, k: &str, v: &str, v_type: &str, created: i64) -> configs::Model {
    configs::Model {
        key: key.to_string(),
        app_key: app.to_string(),
        k: k.to_string(),
        v: v.to_string(),
        v_type: v_type.to_string(),
        status: STATUS_ACTIVE,
        created_utc: created,
    }
}

// Replays a master's committed writes against a slave-local version the
// way the SyncSlave handler validates them.
#[test]
fn test_version_chain_accepts_in_order_and_rejects_replay() {
    let mut master = DataVersion::default();
    let mut slave = DataVersion::default();

    for ix in 0..10 {
        let row = ReplicatedRow::User(user(&format!("u{}", ix), &format!("user-{}", ix)));
        let descriptor = version::descriptor(&row).unwrap();
        let next = version::advance(&master, &descriptor);

        // In-order update extends the slave's chain.
        assert!(version::chain_extends(&slave, &next));
        slave = next.clone();
        master = next;
    }

    assert_eq!(master, slave);

    // Replaying the last update is rejected.
    assert!(!version::chain_extends(&slave, &master));

    // An update built on a diverged sign is rejected even with the right
    // version number.
    let diverged_base = DataVersion {
        version: master.version,
        sign: "someone-elses-sign".to_string(),
        old_sign: String::new(),
    };
    let diverged = version::advance(&diverged_base, "other-mutation");
    assert_eq!(diverged.version, slave.version + 1);
    assert!(!version::chain_extends(&slave, &diverged));
}

#[test]
fn test_skipped_update_is_rejected_until_resync() {
    let base = DataVersion::default();
    let v1 = version::advance(&base, "m1");
    let v2 = version::advance(&v1, "m2");

    // The slave missed v1; v2 must not apply.
    assert!(!version::chain_extends(&base, &v2));

    // After adopting the master's state wholesale the chain continues.
    let v3 = version::advance(&v2, "m3");
    assert!(version::chain_extends(&v2, &v3));
}

#[test]
fn test_sync_payload_round_trip_preserves_chain_fields() {
    let base = DataVersion::default();
    let row = ReplicatedRow::Config(config("c1", "a1", "port", "8080", "int", 5));
    let next = version::advance(&base, &version::descriptor(&row).unwrap());

    let payload = SyncPayload {
        data_version: next.clone(),
        kind: row.kind(),
        data: row.row_json().unwrap(),
        op_user_key: "u1".to_string(),
    };

    let wire = serde_json::to_string(&payload).unwrap();
    let received: SyncPayload = serde_json::from_str(&wire).unwrap();

    assert_eq!(received.kind, SyncKind::Config);
    assert!(version::chain_extends(&base, &received.data_version));

    let config_row: configs::Model = serde_json::from_str(&received.data).unwrap();
    assert_eq!(config_row.k, "port");
}

// A full-state transfer rebuilt into a snapshot serves the same values
// the master serves (scenario: reconciliation).
#[test]
fn test_full_state_rebuild_matches_source() {
    let source_configs = vec![
        config("c1", "a1", "host", "x.com", "string", 10),
        config("c2", "a1", "feature", r#"(if (== OS_TYPE "ios") 1 0)"#, "code", 20),
    ];

    let master_mem = MemConf::rebuild(
        vec![user("u1", "ada")],
        vec![app("a1", "sign-1")],
        Vec::new(),
        source_configs.clone(),
        vec![NodeInfo {
            url: "m:8080".to_string(),
            node_url: "m:8081".to_string(),
            r#type: "master".to_string(),
            data_version: DataVersion::default(),
            last_check_utc: 0,
            created_utc: 0,
        }],
        DataVersion {
            version: 20,
            sign: "s20".to_string(),
            old_sign: "s19".to_string(),
        },
    );

    // What SyncMaster would serialize.
    let full = FullState {
        nodes: master_mem.nodes.clone(),
        users: master_mem.users.clone(),
        apps: master_mem.apps.clone(),
        web_hooks: Vec::new(),
        configs: master_mem.raw_configs.clone(),
        conf_history: Vec::new(),
        data_version: master_mem.data_version.clone(),
    };
    let wire = serde_json::to_string(&full).unwrap();
    let received: FullState = serde_json::from_str(&wire).unwrap();

    // What the reconciler rebuilds on the slave.
    let mut configs: Vec<_> = received.configs.values().cloned().collect();
    configs.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then_with(|| a.key.cmp(&b.key)));
    let slave_mem = MemConf::rebuild(
        received.users.values().cloned().collect(),
        received.apps.values().cloned().collect(),
        received.web_hooks,
        configs,
        received.nodes.values().cloned().collect(),
        received.data_version.clone(),
    );

    assert_eq!(slave_mem.data_version, master_mem.data_version);
    assert_eq!(slave_mem.users.len(), 1);
    assert_eq!(slave_mem.apps.len(), 1);

    // Both nodes resolve identically for the same client.
    let ios = ClientData {
        app_key: "a1".to_string(),
        os_type: "ios".to_string(),
        ..ClientData::default()
    };
    let master_shared = Shared::new(master_mem);
    let slave_shared = Shared::new(slave_mem);
    let from_master = resolver::resolve(&master_shared, "a1", &ios);
    let from_slave = resolver::resolve(&slave_shared, "a1", &ios);

    assert_eq!(from_master, from_slave);
    assert_eq!(from_master.get("host"), Some(&Value::Str("x.com".to_string())));
    assert_eq!(from_master.get("feature"), Some(&Value::Int(1)));
}

#[test]
fn test_fanout_outcome_wire_shape() {
    let outcomes = vec![
        SyncOutcome::ok("s1:8080"),
        SyncOutcome::failed("s2:8080", "connection refused"),
    ];
    let wire = serde_json::to_string(&outcomes).unwrap();

    // Successful outcomes omit the error field entirely.
    assert!(wire.contains(r#"{"node":"s1:8080"}"#));
    assert!(wire.contains("connection refused"));

    let back: Vec<SyncOutcome> = serde_json::from_str(&wire).unwrap();
    assert!(back[0].err.is_none());
    assert_eq!(back[1].err.as_deref(), Some("connection refused"));
}

// Scenario 1 from the operator handbook: plain literals resolve for any
// client.
#[test]
fn test_literal_resolution_end_to_end() {
    let shared = Shared::new(MemConf::rebuild(
        Vec::new(),
        vec![app("a1", "sign")],
        Vec::new(),
        vec![
            config("c1", "a1", "host", "x.com", "string", 1),
            config("c2", "a1", "port", "8080", "int", 2),
        ],
        Vec::new(),
        DataVersion::default(),
    ));

    let values = resolver::resolve(&shared, "a1", &ClientData::default());
    let mut expected = HashMap::new();
    expected.insert("host".to_string(), Value::Str("x.com".to_string()));
    expected.insert("port".to_string(), Value::Int(8080));
    assert_eq!(values, expected);
}
