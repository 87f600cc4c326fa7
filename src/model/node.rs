// Domain view of a cluster node: the nodes table row with its
// data_version_str column parsed into the version triple. This is also
// the wire shape exchanged in CheckMaster and NODE syncs.

use serde::{Deserialize, Serialize};

use crate::{entity::nodes, model::common::DataVersion};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub url: String,
    pub node_url: String,
    pub r#type: String,
    pub data_version: DataVersion,
    pub last_check_utc: i64,
    pub created_utc: i64,
}

impl NodeInfo {
    pub fn is_master(&self) -> bool {
        self.r#type == "master"
    }

    // Persistable row; the version triple is kept as JSON text.
    pub fn to_row(&self) -> nodes::Model {
        nodes::Model {
            url: self.url.clone(),
            node_url: self.node_url.clone(),
            r#type: self.r#type.clone(),
            data_version_str: self.data_version.to_json(),
            last_check_utc: self.last_check_utc,
            created_utc: self.created_utc,
        }
    }
}

impl From<nodes::Model> for NodeInfo {
    fn from(row: nodes::Model) -> Self {
        // A node row written by an older peer may carry an empty version
        // string; treat it as version zero.
        let data_version =
            serde_json::from_str::<DataVersion>(&row.data_version_str).unwrap_or_default();

        NodeInfo {
            url: row.url,
            node_url: row.node_url,
            r#type: row.r#type,
            data_version,
            last_check_utc: row.last_check_utc,
            created_utc: row.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_round_trip() {
        let info = NodeInfo {
            url: "10.0.0.1:8080".to_string(),
            node_url: "10.0.0.1:8081".to_string(),
            r#type: "slave".to_string(),
            data_version: DataVersion {
                version: 3,
                sign: "s3".to_string(),
                old_sign: "s2".to_string(),
            },
            last_check_utc: 100,
            created_utc: 50,
        };

        let back = NodeInfo::from(info.to_row());
        assert_eq!(back, info);
    }

    #[test]
    fn test_empty_version_string_defaults() {
        let row = nodes::Model {
            url: "a".to_string(),
            node_url: "b".to_string(),
            r#type: "master".to_string(),
            data_version_str: String::new(),
            last_check_utc: 0,
            created_utc: 0,
        };

        let info = NodeInfo::from(row);
        assert_eq!(info.data_version.version, 0);
        assert!(info.is_master());
    }
}
