// Process settings: conf/application.yml plus CLI overrides, with typed
// accessors. Mandatory values are checked once at startup; failures there
// are fatal by design.

use anyhow::Context;
use config::Config;

use crate::model::common::NodeKind;

#[derive(Clone, Debug)]
pub struct Settings {
    config: Config,
}

impl Settings {
    pub fn new(config: Config) -> Self {
        Settings { config }
    }

    // Bind address for client and operator traffic.
    pub fn http_addr(&self) -> String {
        self.config
            .get_string("server.addr")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
    }

    // Bind address for peer traffic.
    pub fn node_bind_addr(&self) -> String {
        self.config
            .get_string("node.addr")
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string())
    }

    // Advertised client-facing address; the node's cluster-wide identity.
    pub fn client_addr(&self) -> String {
        self.config.get_string("node.client_addr").unwrap_or_default()
    }

    // Advertised peer-facing address.
    pub fn node_addr(&self) -> String {
        self.config.get_string("node.node_addr").unwrap_or_default()
    }

    pub fn node_kind(&self) -> NodeKind {
        self.config
            .get_string("node.type")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn is_master(&self) -> bool {
        self.node_kind() == NodeKind::Master
    }

    // The master's client-facing address (its node identity).
    pub fn master_addr(&self) -> String {
        self.config.get_string("node.master_addr").unwrap_or_default()
    }

    // The master's peer-facing address, target of CheckMaster/SyncMaster.
    pub fn master_node_addr(&self) -> String {
        self.config
            .get_string("node.master_node_addr")
            .unwrap_or_default()
    }

    pub fn cluster_secret(&self) -> String {
        self.config.get_string("node.secret").unwrap_or_default()
    }

    pub fn check_interval_secs(&self) -> u64 {
        self.config.get_int("node.check_interval").unwrap_or(60) as u64
    }

    pub fn rpc_timeout_secs(&self) -> u64 {
        self.config.get_int("node.rpc_timeout").unwrap_or(10) as u64
    }

    pub fn db_url(&self) -> anyhow::Result<String> {
        self.config.get_string("db.url").context("db.url is required")
    }

    pub fn db_max_connections(&self) -> u32 {
        self.config.get_int("db.pool.max_connections").unwrap_or(20) as u32
    }

    pub fn db_min_connections(&self) -> u32 {
        self.config.get_int("db.pool.min_connections").unwrap_or(1) as u32
    }

    pub fn db_connect_timeout(&self) -> u64 {
        self.config.get_int("db.pool.connect_timeout").unwrap_or(30) as u64
    }

    // Startup validation; every failure here prevents the node from
    // serving at all.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_addr().is_empty() {
            anyhow::bail!("node.client_addr is required");
        }
        if self.node_addr().is_empty() {
            anyhow::bail!("node.node_addr is required");
        }
        if self.cluster_secret().is_empty() {
            anyhow::bail!("node.secret is required");
        }
        if !self.is_master() {
            if self.master_addr().is_empty() {
                anyhow::bail!("node.master_addr is required on slaves");
            }
            if self.master_node_addr().is_empty() {
                anyhow::bail!("node.master_node_addr is required on slaves");
            }
        }
        self.db_url()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let mut builder = Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Settings::new(builder.build().unwrap())
    }

    fn master_pairs<'a>() -> Vec<(&'a str, &'a str)> {
        vec![
            ("node.type", "master"),
            ("node.client_addr", "127.0.0.1:8080"),
            ("node.node_addr", "127.0.0.1:8081"),
            ("node.secret", "s3cret"),
            ("db.url", "sqlite::memory:"),
        ]
    }

    #[test]
    fn test_master_settings_validate() {
        let settings = settings(&master_pairs());
        assert!(settings.validate().is_ok());
        assert!(settings.is_master());
        assert_eq!(settings.check_interval_secs(), 60);
        assert_eq!(settings.rpc_timeout_secs(), 10);
    }

    #[test]
    fn test_slave_requires_master_addrs() {
        let mut pairs = master_pairs();
        pairs[0] = ("node.type", "slave");
        let incomplete = settings(&pairs);
        assert!(incomplete.validate().is_err());

        pairs.push(("node.master_addr", "127.0.0.1:9080"));
        pairs.push(("node.master_node_addr", "127.0.0.1:9081"));
        let complete = settings(&pairs);
        assert!(complete.validate().is_ok());
        assert!(!complete.is_master());
    }

    #[test]
    fn test_missing_secret_rejected() {
        let pairs: Vec<(&str, &str)> = master_pairs()
            .into_iter()
            .filter(|(key, _)| *key != "node.secret")
            .collect();
        assert!(settings(&pairs).validate().is_err());
    }
}
