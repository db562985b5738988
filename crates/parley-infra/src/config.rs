//! Configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production)
//! and deserializes it into [`ParleyConfig`]. Falls back to defaults when the
//! file is missing or malformed. A few fields can be overridden from the
//! environment, and the API credential is only ever read from it.

use std::path::{Path, PathBuf};

use parley_types::config::ParleyConfig;
use secrecy::SecretString;

/// Errors resolving deployment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API credential not set: export {0}")]
    MissingCredential(String),
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    // Last resort: current directory
    PathBuf::from(".parley")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ParleyConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Out-of-range values are raised to their floors.
pub async fn load_config(data_dir: &Path) -> ParleyConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ParleyConfig::default();
        }
    };

    match toml::from_str::<ParleyConfig>(&content) {
        Ok(config) => config.normalized(),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ParleyConfig::default()
        }
    }
}

/// Apply `PARLEY_*` overrides on top of file configuration.
///
/// `lookup` is usually `|k| std::env::var(k).ok()`. Unparseable numeric
/// values are ignored with a warning.
pub fn apply_env_overrides(
    mut config: ParleyConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ParleyConfig {
    if let Some(model) = lookup("PARLEY_MODEL").filter(|m| !m.trim().is_empty()) {
        config.model_identifier = model;
    }
    if let Some(provider) = lookup("PARLEY_PROVIDER").filter(|p| !p.trim().is_empty()) {
        config.provider = provider;
    }
    if let Some(budget) = parse_override(&lookup, "PARLEY_TOKEN_BUDGET") {
        config.token_budget = budget;
    }
    if let Some(cap) = parse_override(&lookup, "PARLEY_RETRIEVAL_CAP") {
        config.retrieval_cap = cap;
    }
    if let Some(secs) = parse_override(&lookup, "PARLEY_REQUEST_TIMEOUT_SECS") {
        config.request_timeout_secs = secs;
    }
    config.normalized()
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {key}={raw}: not a valid number");
            None
        }
    }
}

/// Read the API credential from the variable named by `config.api_key_env`.
pub fn resolve_api_credential(
    config: &ParleyConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    lookup(&config.api_key_env)
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingCredential(config.api_key_env.clone()))
}
