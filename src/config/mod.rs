// src/config/mod.rs
mod models;

pub use models::*;

use std::path::Path;

pub const ENV_PROXY_PORT: &str = "PROXY_PORT";
pub const ENV_HEALTH_CHECK_INTERVAL: &str = "HEALTH_CHECK_INTERVAL";
pub const ENV_HEALTH_CHECK_TIMEOUT: &str = "HEALTH_CHECK_TIMEOUT";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";

/// Load configuration: optional file (YAML or JSON) as the base, then
/// environment overrides, then validation.
pub async fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let base = match path {
        Some(path) => read_config_file(path).await?,
        None => Config::default(),
    };

    let config = apply_env_overrides(base, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

    parse_config(path, &contents)
}

/// Parse file contents, picking the format from the extension.
pub fn parse_config(path: &Path, contents: &str) -> Result<Config, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str());
    let parsed = if ext == Some("yaml") || ext == Some("yml") {
        serde_yaml::from_str(contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

/// Overlay environment values onto `config`. Values that fail to parse are
/// collected and reported together instead of failing on the first one.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut issues = Vec::new();

    if let Some(port) = parse_env::<u16>(&lookup, ENV_PROXY_PORT, &mut issues) {
        config.proxy_port = port;
    }
    if let Some(ms) = parse_env::<u64>(&lookup, ENV_HEALTH_CHECK_INTERVAL, &mut issues) {
        config.health_check.interval_ms = ms;
    }
    if let Some(ms) = parse_env::<u64>(&lookup, ENV_HEALTH_CHECK_TIMEOUT, &mut issues) {
        config.health_check.timeout_ms = ms;
    }
    if let Some(ms) = parse_env::<u64>(&lookup, ENV_SHUTDOWN_TIMEOUT, &mut issues) {
        config.shutdown.timeout_ms = ms;
    }

    if issues.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Invalid(issues))
    }
}

fn parse_env<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    issues: &mut Vec<ConfigIssue>,
) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            issues.push(ConfigIssue::new(
                key,
                format!("expected an integer, got {raw:?}"),
            ));
            None
        }
    }
}
