// Operator config management and the app fingerprint.

use crate::{
    entity::configs,
    error::ConfitError,
    generate_key,
    model::{
        common::{AppState, STATUS_ACTIVE, STATUS_INACTIVE, VType},
        replication::{ReplicatedRow, SyncOutcome},
    },
    now_utc,
    rules,
    service::pipeline,
};

// Fingerprint of an app's config set: md5 over the authored-order
// sequence of (k, v, v_type, status). Both master and slaves derive it
// locally, so replicated state converges to the same sign.
pub fn data_sign(configs: &[configs::Model]) -> String {
    let mut buf = String::new();
    for config in configs {
        buf.push_str(&config.k);
        buf.push('\u{1}');
        buf.push_str(&config.v);
        buf.push('\u{1}');
        buf.push_str(&config.v_type);
        buf.push('\u{1}');
        buf.push_str(&config.status.to_string());
        buf.push('\u{2}');
    }
    format!("{:x}", md5::compute(buf))
}

// Rejects values that cannot possibly resolve: unparseable literals and
// rule programs that do not parse. Evaluation errors remain a per-request
// concern for the resolver.
fn check_value(v_type: VType, v: &str) -> Result<(), ConfitError> {
    match v_type {
        VType::Int => v
            .trim()
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| ConfitError::bad_request(format!("'{}' is not an int", v))),
        VType::Float => v
            .trim()
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| ConfitError::bad_request(format!("'{}' is not a float", v))),
        VType::Str => Ok(()),
        VType::Code => rules::parse_program(v)
            .map(|_| ())
            .map_err(|e| ConfitError::bad_request(format!("rule does not parse: {}", e))),
        VType::Template => {
            if v.is_empty() {
                Err(ConfitError::bad_request("template must name an app"))
            } else {
                Ok(())
            }
        }
    }
}

pub async fn create(
    state: &AppState,
    app_key: &str,
    k: &str,
    v: &str,
    v_type: &str,
    op_user_key: &str,
) -> Result<(configs::Model, Vec<SyncOutcome>), ConfitError> {
    if k.is_empty() {
        return Err(ConfitError::bad_request("config key 'k' is required"));
    }
    let parsed_type = v_type.parse::<VType>().map_err(ConfitError::BadRequest)?;
    check_value(parsed_type, v)?;

    let guard = state.shared.write_lock.lock().await;

    let app_exists = state.shared.read(|mem| mem.apps.contains_key(app_key));
    if !app_exists {
        return Err(ConfitError::bad_request(format!(
            "unknown app '{}'",
            app_key
        )));
    }
    if parsed_type == VType::Template {
        let template_exists = state.shared.read(|mem| mem.apps.contains_key(v));
        if !template_exists {
            return Err(ConfitError::bad_request(format!(
                "template app '{}' does not exist",
                v
            )));
        }
    }

    let config = configs::Model {
        key: generate_key(),
        app_key: app_key.to_string(),
        k: k.to_string(),
        v: v.to_string(),
        v_type: parsed_type.as_str().to_string(),
        status: STATUS_ACTIVE,
        created_utc: now_utc(),
    };

    let row = ReplicatedRow::Config(config.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((config, outcomes))
}

pub async fn update(
    state: &AppState,
    key: &str,
    k: Option<&str>,
    v: Option<&str>,
    v_type: Option<&str>,
    status: Option<i32>,
    op_user_key: &str,
) -> Result<(configs::Model, Vec<SyncOutcome>), ConfitError> {
    let guard = state.shared.write_lock.lock().await;

    let mut config = state
        .shared
        .read(|mem| mem.raw_configs.get(key).cloned())
        .ok_or_else(|| ConfitError::bad_request(format!("unknown config '{}'", key)))?;

    if let Some(k) = k {
        if k.is_empty() {
            return Err(ConfitError::bad_request("config key 'k' must not be empty"));
        }
        config.k = k.to_string();
    }
    if let Some(v_type) = v_type {
        config.v_type = v_type
            .parse::<VType>()
            .map_err(ConfitError::BadRequest)?
            .as_str()
            .to_string();
    }
    if let Some(v) = v {
        config.v = v.to_string();
    }
    if let Some(status) = status {
        if status != STATUS_ACTIVE && status != STATUS_INACTIVE {
            return Err(ConfitError::bad_request("status must be 0 or 1"));
        }
        config.status = status;
    }

    // Whatever combination changed, the stored pair must be coherent.
    let parsed_type = config
        .v_type
        .parse::<VType>()
        .map_err(ConfitError::BadRequest)?;
    check_value(parsed_type, &config.v)?;

    let row = ReplicatedRow::Config(config.clone());
    let ver = pipeline::apply_row(state, &row, op_user_key, pipeline::VersionMode::Advance).await?;
    drop(guard);

    let outcomes = pipeline::fan_out(state, &row, &ver, op_user_key).await;
    Ok((config, outcomes))
}

pub fn list_for_app(state: &AppState, app_key: &str) -> Vec<configs::Model> {
    state
        .shared
        .read(|mem| mem.configs_for(app_key))
        .map(|list| list.as_ref().clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(k: &str, v: &str, v_type: &str, status: i32) -> configs::Model {
        configs::Model {
            key: format!("key-{}", k),
            app_key: "a1".to_string(),
            k: k.to_string(),
            v: v.to_string(),
            v_type: v_type.to_string(),
            status,
            created_utc: 0,
        }
    }

    #[test]
    fn test_data_sign_changes_with_content() {
        let a = vec![config("host", "x.com", "string", 1)];
        let b = vec![config("host", "y.com", "string", 1)];
        assert_ne!(data_sign(&a), data_sign(&b));
        assert_eq!(data_sign(&a), data_sign(&a.clone()));
    }

    #[test]
    fn test_data_sign_tracks_status() {
        let active = vec![config("host", "x.com", "string", 1)];
        let inactive = vec![config("host", "x.com", "string", 0)];
        assert_ne!(data_sign(&active), data_sign(&inactive));
    }

    #[test]
    fn test_data_sign_depends_on_order() {
        let ab = vec![config("a", "1", "int", 1), config("b", "2", "int", 1)];
        let ba = vec![config("b", "2", "int", 1), config("a", "1", "int", 1)];
        assert_ne!(data_sign(&ab), data_sign(&ba));
    }

    #[test]
    fn test_check_value() {
        assert!(check_value(VType::Int, "42").is_ok());
        assert!(check_value(VType::Int, "4.2").is_err());
        assert!(check_value(VType::Float, "4.2").is_ok());
        assert!(check_value(VType::Str, "anything").is_ok());
        assert!(check_value(VType::Code, "(+ 1 2)").is_ok());
        assert!(check_value(VType::Code, "(+ 1").is_err());
        assert!(check_value(VType::Template, "").is_err());
        assert!(check_value(VType::Template, "other-app").is_ok());
    }
}
