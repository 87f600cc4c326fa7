// Per-client config resolution. Reads the snapshot under a short shared
// lock, then evaluates rules with no lock held; a failing rule simply
// contributes nothing for that client.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    entity::configs,
    model::{client::ClientData, common::STATUS_ACTIVE, common::VType},
    rules::{self, Value},
    snapshot::Shared,
};

// Effective scalar values for one app and one client, flat, later entries
// in authored order winning on duplicate keys.
pub fn resolve(shared: &Shared, app_key: &str, client: &ClientData) -> HashMap<String, Value> {
    let Some(list) = shared.read(|mem| mem.configs_for(app_key)) else {
        return HashMap::new();
    };

    let mut values = HashMap::new();
    merge_configs(shared, &list, client, &mut values, true);
    values
}

fn merge_configs(
    shared: &Shared,
    list: &Arc<Vec<configs::Model>>,
    client: &ClientData,
    values: &mut HashMap<String, Value>,
    expand_templates: bool,
) {
    for config in list.iter() {
        if config.status != STATUS_ACTIVE {
            continue;
        }

        let Ok(v_type) = config.v_type.parse::<VType>() else {
            debug!(config = %config.key, v_type = %config.v_type, "unknown value type, skipped");
            continue;
        };

        match v_type {
            VType::Int | VType::Float | VType::Str => {
                if let Some(value) = parse_literal(v_type, &config.v) {
                    values.insert(config.k.clone(), value);
                } else {
                    debug!(config = %config.key, "literal does not parse, skipped");
                }
            }
            VType::Code => match rules::eval_rule(&config.v, client) {
                Ok(value) if value.is_scalar() => {
                    values.insert(config.k.clone(), value);
                }
                Ok(_) => {
                    debug!(config = %config.key, "rule produced a non-scalar, skipped");
                }
                Err(err) => {
                    debug!(config = %config.key, "rule evaluation failed, skipped: {}", err);
                }
            },
            VType::Template => {
                // One level only: a template names another app whose
                // configs are inlined; templates inside that app are
                // ignored to keep the result flat and acyclic.
                if !expand_templates {
                    continue;
                }
                if let Some(inner) = shared.read(|mem| mem.configs_for(&config.v)) {
                    merge_configs(shared, &inner, client, values, false);
                } else {
                    debug!(config = %config.key, template = %config.v, "template app missing, skipped");
                }
            }
        }
    }
}

fn parse_literal(v_type: VType, raw: &str) -> Option<Value> {
    match v_type {
        VType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
        VType::Float => raw.trim().parse::<f64>().ok().map(Value::Float),
        VType::Str => Some(Value::Str(raw.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::apps,
        model::common::{DataVersion, STATUS_INACTIVE},
        snapshot::MemConf,
    };

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

    fn shared_with(configs: Vec<configs::Model>, apps: Vec<apps::Model>) -> Shared {
        Shared::new(MemConf::rebuild(
            Vec::new(),
            apps,
            Vec::new(),
            configs,
            Vec::new(),
            DataVersion::default(),
        ))
    }

    fn client(os_type: &str) -> ClientData {
        ClientData {
            app_key: "a1".to_string(),
            os_type: os_type.to_string(),
            ..ClientData::default()
        }
    }

    #[test]
    fn test_literal_resolve() {
        let shared = shared_with(
            vec![
                config("c1", "a1", "host", "x.com", "string", 1),
                config("c2", "a1", "port", "8080", "int", 2),
            ],
            vec![app("a1")],
        );

        let values = resolve(&shared, "a1", &client("ios"));
        assert_eq!(values.get("host"), Some(&Value::Str("x.com".to_string())));
        assert_eq!(values.get("port"), Some(&Value::Int(8080)));
    }

    #[test]
    fn test_code_resolve_depends_on_client() {
        let shared = shared_with(
            vec![config(
                "c1",
                "a1",
                "feature",
                r#"(if (== OS_TYPE "ios") 1 0)"#,
                "code",
                1,
            )],
            vec![app("a1")],
        );

        assert_eq!(
            resolve(&shared, "a1", &client("ios")).get("feature"),
            Some(&Value::Int(1))
        );
        assert_eq!(
            resolve(&shared, "a1", &client("android")).get("feature"),
            Some(&Value::Int(0))
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let shared = shared_with(
            vec![config("c1", "a1", "port", "80", "int", 1)],
            vec![app("a1")],
        );
        let a = resolve(&shared, "a1", &client("ios"));
        let b = resolve(&shared, "a1", &client("ios"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_failing_rule_is_skipped() {
        let shared = shared_with(
            vec![
                config("c1", "a1", "broken", "(/ 1 0)", "code", 1),
                config("c2", "a1", "ok", "7", "int", 2),
            ],
            vec![app("a1")],
        );

        let values = resolve(&shared, "a1", &client("ios"));
        assert!(!values.contains_key("broken"));
        assert_eq!(values.get("ok"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_later_duplicate_key_wins() {
        let shared = shared_with(
            vec![
                config("c1", "a1", "limit", "10", "int", 1),
                config("c2", "a1", "limit", "20", "int", 2),
            ],
            vec![app("a1")],
        );

        assert_eq!(
            resolve(&shared, "a1", &client("ios")).get("limit"),
            Some(&Value::Int(20))
        );
    }

    #[test]
    fn test_inactive_configs_invisible() {
        let mut dead = config("c1", "a1", "gone", "1", "int", 1);
        dead.status = STATUS_INACTIVE;
        let shared = shared_with(vec![dead], vec![app("a1")]);

        assert!(resolve(&shared, "a1", &client("ios")).is_empty());
    }

    #[test]
    fn test_unknown_app_resolves_empty() {
        let shared = shared_with(Vec::new(), Vec::new());
        assert!(resolve(&shared, "nope", &client("ios")).is_empty());
    }

    #[test]
    fn test_template_inlines_referenced_app() {
        let shared = shared_with(
            vec![
                config("t1", "base", "timeout", "30", "int", 1),
                config("t2", "base", "retries", "3", "int", 2),
                config("c1", "a1", "common", "base", "template", 1),
                config("c2", "a1", "timeout", "60", "int", 2),
            ],
            vec![app("a1"), app("base")],
        );

        let values = resolve(&shared, "a1", &client("ios"));
        // Template entries land flat; the app's own later entry wins.
        assert_eq!(values.get("retries"), Some(&Value::Int(3)));
        assert_eq!(values.get("timeout"), Some(&Value::Int(60)));
        assert!(!values.contains_key("common"));
    }

    #[test]
    fn test_nested_templates_not_expanded() {
        let shared = shared_with(
            vec![
                config("x1", "inner", "deep", "1", "int", 1),
                config("b1", "base", "nested", "inner", "template", 1),
                config("b2", "base", "flat", "2", "int", 2),
                config("c1", "a1", "common", "base", "template", 1),
            ],
            vec![app("a1"), app("base"), app("inner")],
        );

        let values = resolve(&shared, "a1", &client("ios"));
        assert_eq!(values.get("flat"), Some(&Value::Int(2)));
        assert!(!values.contains_key("deep"));
    }
}
