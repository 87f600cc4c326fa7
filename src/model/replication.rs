// Wire types of the replication protocol. Payloads travel as JSON text
// nested inside the `{auth, data}` request envelope; handlers decode the
// inner string a second time, keeping the three request kinds uniform.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    entity::{apps, config_update_history, configs, users, web_hooks},
    model::{common::DataVersion, node::NodeInfo},
};

// Peer request kinds, used as the {req_type} path segment.
pub const REQ_SYNC_SLAVE: &str = "SYNCSLAVE";
pub const REQ_CHECK_MASTER: &str = "CHECKMASTER";
pub const REQ_SYNC_MASTER: &str = "SYNCMASTER";

// Outer body of every peer request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRequest {
    pub auth: String,
    #[serde(default)]
    pub data: String,
}

// Kind tag of a replicated row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncKind {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "APP")]
    App,
    #[serde(rename = "WEBHOOK")]
    WebHook,
    #[serde(rename = "CONFIG")]
    Config,
    #[serde(rename = "NODE")]
    Node,
}

// One replicated row with its kind tag. Also the canonical mutation
// descriptor fed to the version oracle: the serialized form is stable
// because field order follows the struct definitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row")]
pub enum ReplicatedRow {
    #[serde(rename = "USER")]
    User(users::Model),
    #[serde(rename = "APP")]
    App(apps::Model),
    #[serde(rename = "WEBHOOK")]
    WebHook(web_hooks::Model),
    #[serde(rename = "CONFIG")]
    Config(configs::Model),
    #[serde(rename = "NODE")]
    Node(NodeInfo),
}

impl ReplicatedRow {
    pub fn kind(&self) -> SyncKind {
        match self {
            ReplicatedRow::User(_) => SyncKind::User,
            ReplicatedRow::App(_) => SyncKind::App,
            ReplicatedRow::WebHook(_) => SyncKind::WebHook,
            ReplicatedRow::Config(_) => SyncKind::Config,
            ReplicatedRow::Node(_) => SyncKind::Node,
        }
    }

    // JSON of the bare row, without the kind tag; this is what travels in
    // SyncPayload.data.
    pub fn row_json(&self) -> anyhow::Result<String> {
        let text = match self {
            ReplicatedRow::User(row) => serde_json::to_string(row)?,
            ReplicatedRow::App(row) => serde_json::to_string(row)?,
            ReplicatedRow::WebHook(row) => serde_json::to_string(row)?,
            ReplicatedRow::Config(row) => serde_json::to_string(row)?,
            ReplicatedRow::Node(row) => serde_json::to_string(row)?,
        };

        Ok(text)
    }
}

// SyncSlave payload: one row plus the version the master assigned to the
// commit that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncPayload {
    pub data_version: DataVersion,
    pub kind: SyncKind,
    pub data: String,
    #[serde(default)]
    pub op_user_key: String,
}

// SyncMaster response: the whole replicated state of the master at the
// moment the request was served.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullState {
    pub nodes: HashMap<String, NodeInfo>,
    pub users: HashMap<String, users::Model>,
    pub apps: HashMap<String, apps::Model>,
    pub web_hooks: Vec<web_hooks::Model>,
    pub configs: HashMap<String, configs::Model>,
    pub conf_history: Vec<config_update_history::Model>,
    pub data_version: DataVersion,
}

// Per-slave outcome of a write fan-out, reported back to the operator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl SyncOutcome {
    pub fn ok(node: &str) -> Self {
        SyncOutcome {
            node: node.to_string(),
            err: None,
        }
    }

    pub fn failed(node: &str, err: impl Into<String>) -> Self {
        SyncOutcome {
            node: node.to_string(),
            err: Some(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> users::Model {
        users::Model {
            key: "u1".to_string(),
            name: "ada".to_string(),
            pass_hash: "h".to_string(),
            role: "admin".to_string(),
            created_utc: 10,
        }
    }

    #[test]
    fn test_sync_kind_wire_names() {
        assert_eq!(serde_json::to_string(&SyncKind::User).unwrap(), "\"USER\"");
        assert_eq!(serde_json::to_string(&SyncKind::Node).unwrap(), "\"NODE\"");
        assert_eq!(
            serde_json::from_str::<SyncKind>("\"CONFIG\"").unwrap(),
            SyncKind::Config
        );
    }

    #[test]
    fn test_replicated_row_tagging() {
        let row = ReplicatedRow::User(sample_user());
        assert_eq!(row.kind(), SyncKind::User);

        let descriptor = serde_json::to_string(&row).unwrap();
        assert!(descriptor.starts_with("{\"kind\":\"USER\""));

        // The bare row JSON has no tag.
        let bare = row.row_json().unwrap();
        assert!(bare.starts_with("{\"key\":\"u1\""));
        let back: users::Model = serde_json::from_str(&bare).unwrap();
        assert_eq!(back, sample_user());
    }

    #[test]
    fn test_descriptor_is_deterministic() {
        let a = serde_json::to_string(&ReplicatedRow::User(sample_user())).unwrap();
        let b = serde_json::to_string(&ReplicatedRow::User(sample_user())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sync_payload_round_trip() {
        let payload = SyncPayload {
            data_version: DataVersion {
                version: 11,
                sign: "s11".to_string(),
                old_sign: "s10".to_string(),
            },
            kind: SyncKind::Config,
            data: "{}".to_string(),
            op_user_key: "u1".to_string(),
        };

        let text = serde_json::to_string(&payload).unwrap();
        let back: SyncPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back.data_version, payload.data_version);
        assert_eq!(back.kind, SyncKind::Config);
    }
}
