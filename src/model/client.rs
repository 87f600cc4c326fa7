// Client attributes bound into rule evaluation, taken verbatim from the
// /client/conf query string.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientData {
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub os_type: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub data_sign: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let data: ClientData =
            serde_json::from_str(r#"{"app_key":"a1","os_type":"ios"}"#).unwrap();
        assert_eq!(data.app_key, "a1");
        assert_eq!(data.os_type, "ios");
        assert_eq!(data.lang, "");
    }
}
