use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const AUTH_JSON: &str = "auth.json";

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub schema: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub auth: serde_json::Value,
}

/// OAuth client registration shared by both providers. The redirect URI
/// points at the hosted authentication page that issues manual tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "TimeGrid",
                "timezone": "UTC",
                "pollIntervalSeconds": DEFAULT_POLL_INTERVAL_SECONDS,
                "supportsEmbeddedPopup": false
            }),
        ),
        (
            AUTH_JSON,
            serde_json::json!({
                "schema": 1,
                "clientId": "",
                "redirectUri": ""
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        auth: read_config(&config_dir.join(AUTH_JSON))?,
    })
}

pub fn read_poll_interval_seconds(config_dir: &Path) -> Result<u64, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("pollIntervalSeconds")
        .and_then(serde_json::Value::as_u64)
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS))
}

/// Whether the current shell can host the in-process sign-in popup. False
/// routes every connect through the external-browser manual token path.
pub fn read_supports_embedded_popup(config_dir: &Path) -> Result<bool, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("supportsEmbeddedPopup")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false))
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

pub fn read_auth_settings(config_dir: &Path) -> Result<AuthSettings, InfraError> {
    let auth = read_config(&config_dir.join(AUTH_JSON))?;
    let field = |name: &str| {
        auth.get(name)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .map(ToOwned::to_owned)
            .unwrap_or_default()
    };
    Ok(AuthSettings {
        client_id: field("clientId"),
        redirect_uri: field("redirectUri"),
    })
}
