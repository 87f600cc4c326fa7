// Authoritative in-memory view of all replicated entities on this node.
//
// Two locks guard it. `mem_lock` is a plain reader/writer lock held only
// for short, non-blocking map reads and assignments; nothing may await or
// touch the store while holding it. `write_lock` serializes every mutating
// workflow (operator writes, replication applies, full resync) and is an
// async mutex because it spans store transactions. Lock order is always
// write_lock then mem_lock, never the reverse.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tokio::sync::Mutex;

use crate::{
    entity::{apps, configs, users, web_hooks},
    model::{
        common::{DataVersion, HookScope},
        node::NodeInfo,
    },
};

#[derive(Clone, Debug, Default)]
pub struct MemConf {
    pub nodes: HashMap<String, NodeInfo>,
    pub users: HashMap<String, users::Model>,
    pub apps: HashMap<String, apps::Model>,
    // Authored order per app; Arc so readers copy a pointer and release
    // the lock before evaluating rules.
    pub configs_by_app: HashMap<String, Arc<Vec<configs::Model>>>,
    pub raw_configs: HashMap<String, configs::Model>,
    pub global_webhooks: Vec<web_hooks::Model>,
    pub app_webhooks: HashMap<String, Vec<web_hooks::Model>>,
    pub data_version: DataVersion,
}

impl MemConf {
    // Builds the whole snapshot from store rows. `configs` must already be
    // in authored order (store::all_configs guarantees it).
    pub fn rebuild(
        users: Vec<users::Model>,
        apps: Vec<apps::Model>,
        web_hooks: Vec<web_hooks::Model>,
        configs: Vec<configs::Model>,
        nodes: Vec<NodeInfo>,
        data_version: DataVersion,
    ) -> Self {
        let mut mem = MemConf {
            data_version,
            ..MemConf::default()
        };

        for user in users {
            mem.users.insert(user.key.clone(), user);
        }
        for app in apps {
            mem.apps.insert(app.key.clone(), app);
        }
        for hook in web_hooks {
            mem.put_webhook(hook);
        }
        for config in configs {
            mem.raw_configs.insert(config.key.clone(), config);
        }
        for node in nodes {
            mem.nodes.insert(node.url.clone(), node);
        }

        let app_keys: Vec<String> = mem.apps.keys().cloned().collect();
        for app_key in app_keys {
            mem.reindex_app_configs(&app_key);
        }

        mem
    }

    pub fn upsert_user(&mut self, row: users::Model) {
        self.users.insert(row.key.clone(), row);
    }

    pub fn upsert_app(&mut self, row: apps::Model) {
        let key = row.key.clone();
        self.apps.insert(key.clone(), row);
        if !self.configs_by_app.contains_key(&key) {
            self.configs_by_app.insert(key, Arc::new(Vec::new()));
        }
    }

    pub fn upsert_config(&mut self, row: configs::Model) {
        let app_key = row.app_key.clone();
        self.raw_configs.insert(row.key.clone(), row);
        self.reindex_app_configs(&app_key);
    }

    pub fn upsert_webhook(&mut self, row: web_hooks::Model) {
        // Webhooks are few; drop any previous version and reinsert.
        self.global_webhooks.retain(|hook| hook.key != row.key);
        for hooks in self.app_webhooks.values_mut() {
            hooks.retain(|hook| hook.key != row.key);
        }
        self.put_webhook(row);
    }

    pub fn upsert_node(&mut self, row: NodeInfo) {
        self.nodes.insert(row.url.clone(), row);
    }

    pub fn configs_for(&self, app_key: &str) -> Option<Arc<Vec<configs::Model>>> {
        self.configs_by_app.get(app_key).cloned()
    }

    pub fn app_data_sign(&self, app_key: &str) -> Option<String> {
        self.apps.get(app_key).map(|app| app.data_sign.clone())
    }

    pub fn node_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.nodes.keys().cloned().collect();
        urls.sort();
        urls
    }

    fn put_webhook(&mut self, hook: web_hooks::Model) {
        match (hook.scope.parse::<HookScope>(), hook.app_key.clone()) {
            (Ok(HookScope::App), Some(app_key)) => {
                self.app_webhooks.entry(app_key).or_default().push(hook);
            }
            _ => self.global_webhooks.push(hook),
        }
    }

    fn reindex_app_configs(&mut self, app_key: &str) {
        let mut list: Vec<configs::Model> = self
            .raw_configs
            .values()
            .filter(|config| config.app_key == app_key)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then_with(|| a.key.cmp(&b.key))
        });
        self.configs_by_app
            .insert(app_key.to_string(), Arc::new(list));
    }
}

// The snapshot plus its guarding locks, shared process-wide.
#[derive(Debug, Default)]
pub struct Shared {
    mem: RwLock<MemConf>,
    pub write_lock: Mutex<()>,
}

impl Shared {
    pub fn new(mem: MemConf) -> Self {
        Shared {
            mem: RwLock::new(mem),
            write_lock: Mutex::new(()),
        }
    }

    // Runs `f` under the shared lock. The closure must not block; copy out
    // what you need and return.
    pub fn read<R>(&self, f: impl FnOnce(&MemConf) -> R) -> R {
        let guard = self.mem.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    // Runs `f` under the exclusive lock; assignments only, no I/O.
    pub fn write<R>(&self, f: impl FnOnce(&mut MemConf) -> R) -> R {
        let mut guard = self.mem.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    // Wholesale replacement after a full resync.
    pub fn replace(&self, mem: MemConf) {
        let mut guard = self.mem.write().unwrap_or_else(|e| e.into_inner());
        *guard = mem;
    }

    pub fn data_version(&self) -> DataVersion {
        self.read(|mem| mem.data_version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::STATUS_ACTIVE;

    fn config(key: &str, app: &str, k: &str, created: i64) -> configs::Model {
        configs::Model {
            key: key.to_string(),
            app_key: app.to_string(),
            k: k.to_string(),
            v: "1".to_string(),
            v_type: "int".to_string(),
            status: STATUS_ACTIVE,
            created_utc: created,
        }
    }

    fn app(key: &str) -> apps::Model {
        apps::Model {
            key: key.to_string(),
            user_key: "u1".to_string(),
            name: key.to_string(),
            r#type: "ios".to_string(),
            data_sign: String::new(),
            created_utc: 1,
        }
    }

    #[test]
    fn test_rebuild_groups_configs_in_authored_order() {
        let mem = MemConf::rebuild(
            Vec::new(),
            vec![app("a1")],
            Vec::new(),
            vec![
                config("c1", "a1", "host", 10),
                config("c2", "a1", "port", 20),
            ],
            Vec::new(),
            DataVersion::default(),
        );

        let list = mem.configs_for("a1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].k, "host");
        assert_eq!(list[1].k, "port");
    }

    #[test]
    fn test_upsert_config_keeps_order() {
        let mut mem = MemConf::default();
        mem.upsert_app(app("a1"));
        mem.upsert_config(config("c2", "a1", "later", 20));
        mem.upsert_config(config("c1", "a1", "earlier", 10));

        let list = mem.configs_for("a1").unwrap();
        assert_eq!(list[0].k, "earlier");
        assert_eq!(list[1].k, "later");

        // Updating a row keeps its slot.
        let mut updated = config("c1", "a1", "earlier", 10);
        updated.v = "2".to_string();
        mem.upsert_config(updated);
        let list = mem.configs_for("a1").unwrap();
        assert_eq!(list[0].v, "2");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_webhook_scopes() {
        let mut mem = MemConf::default();
        mem.upsert_webhook(web_hooks::Model {
            key: "w1".to_string(),
            app_key: None,
            url: "http://x/hook".to_string(),
            scope: "global".to_string(),
            created_utc: 1,
        });
        mem.upsert_webhook(web_hooks::Model {
            key: "w2".to_string(),
            app_key: Some("a1".to_string()),
            url: "http://x/app".to_string(),
            scope: "app".to_string(),
            created_utc: 1,
        });

        assert_eq!(mem.global_webhooks.len(), 1);
        assert_eq!(mem.app_webhooks.get("a1").map(|h| h.len()), Some(1));

        // Re-upserting the same key does not duplicate.
        mem.upsert_webhook(web_hooks::Model {
            key: "w2".to_string(),
            app_key: Some("a1".to_string()),
            url: "http://x/app2".to_string(),
            scope: "app".to_string(),
            created_utc: 1,
        });
        assert_eq!(mem.app_webhooks.get("a1").map(|h| h.len()), Some(1));
    }

    #[test]
    fn test_shared_replace() {
        let shared = Shared::new(MemConf::default());
        assert_eq!(shared.data_version().version, 0);

        let mut mem = MemConf::default();
        mem.data_version = DataVersion {
            version: 9,
            sign: "s".to_string(),
            old_sign: "o".to_string(),
        };
        shared.replace(mem);
        assert_eq!(shared.data_version().version, 9);
    }
}
