// Shared models: the unified response envelope, the data version triple
// and the small string-backed domain enums used for validation.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
};

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    cluster::client::PeerClient, model::node::NodeInfo, settings::Settings, snapshot::Shared,
};

// Config row status values. Deletion is a transition to inactive.
pub const STATUS_ACTIVE: i32 = 1;
pub const STATUS_INACTIVE: i32 = 0;

// Unified response envelope: `code` is empty on success and a stable
// identifier on failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    pub data: Option<T>,
    pub code: String,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Envelope<T> {
        Envelope {
            status: true,
            data: Some(data),
            code: String::new(),
        }
    }

    pub fn failure(code: &str) -> Envelope<T> {
        Envelope {
            status: false,
            data: None,
            code: code.to_string(),
        }
    }
}

impl Envelope<()> {
    pub fn ok() -> Envelope<()> {
        Envelope {
            status: true,
            data: None,
            code: String::new(),
        }
    }
}

// Monotonic version triple identifying a snapshot of replicated state.
// `sign` chains over the previous sign, so a slave can tell whether an
// incoming update extends exactly its current state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersion {
    pub version: i64,
    pub sign: String,
    pub old_sign: String,
}

impl DataVersion {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// Cluster role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    Master,
    #[default]
    Slave,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Master => "master",
            NodeKind::Slave => "slave",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(NodeKind::Master),
            "slave" => Ok(NodeKind::Slave),
            _ => Err(format!("Invalid node type: {}", s)),
        }
    }
}

// Operator roles; admin is required to manage users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserRole {
    Admin,
    #[default]
    Op,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Op => "op",
        }
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "op" => Ok(UserRole::Op),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

// Value types a config row can carry. `Code` rows hold a rule expression
// evaluated per request; `Template` rows reference another app whose
// configs are inlined by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VType {
    Int,
    Float,
    Str,
    Code,
    Template,
}

impl VType {
    pub fn as_str(self) -> &'static str {
        match self {
            VType::Int => "int",
            VType::Float => "float",
            VType::Str => "string",
            VType::Code => "code",
            VType::Template => "template",
        }
    }
}

impl Display for VType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(VType::Int),
            "float" => Ok(VType::Float),
            "string" => Ok(VType::Str),
            "code" => Ok(VType::Code),
            "template" => Ok(VType::Template),
            _ => Err(format!("Invalid value type: {}", s)),
        }
    }
}

// WebHook scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookScope {
    #[default]
    Global,
    App,
}

impl HookScope {
    pub fn as_str(self) -> &'static str {
        match self {
            HookScope::Global => "global",
            HookScope::App => "app",
        }
    }
}

impl FromStr for HookScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(HookScope::Global),
            "app" => Ok(HookScope::App),
            _ => Err(format!("Invalid webhook scope: {}", s)),
        }
    }
}

// Process-wide application state threaded through actix handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub db: DatabaseConnection,
    pub shared: Arc<Shared>,
    pub peer: Arc<PeerClient>,
    // Master only: queue feeding the NODE fan-out task.
    pub node_sync_tx: Option<mpsc::Sender<NodeInfo>>,
}
