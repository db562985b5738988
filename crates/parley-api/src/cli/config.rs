//! `parley config`: print the effective configuration.

use std::path::Path;

use anyhow::Result;
use console::style;

use parley_infra::config::resolve_api_credential;
use parley_types::config::ParleyConfig;

/// Print the configuration after file loading and environment overrides.
///
/// The credential is never printed, only whether it is set.
pub fn show_config(config: &ParleyConfig, data_dir: &Path, json: bool) -> Result<()> {
    let credential_set = resolve_api_credential(config, |k| std::env::var(k).ok()).is_ok();

    if json {
        let mut value = serde_json::to_value(config)?;
        value["data_dir"] = serde_json::json!(data_dir.display().to_string());
        value["api_key_set"] = serde_json::json!(credential_set);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let row = |key: &str, value: String| {
        println!("  {:<24} {}", style(key).dim(), value);
    };

    println!();
    row("data_dir", data_dir.display().to_string());
    row("provider", config.provider.clone());
    row("model_identifier", config.model_identifier.clone());
    row("base_url", config.base_url.clone().unwrap_or_else(|| "(default)".into()));
    row(
        "api_key_env",
        format!(
            "{} {}",
            config.api_key_env,
            if credential_set {
                style("(set)").green()
            } else {
                style("(not set)").red()
            }
        ),
    );
    row("token_budget", config.token_budget.to_string());
    row("include_system", config.include_system.to_string());
    row("retrieval_cap", config.retrieval_cap.to_string());
    row("response_history_limit", config.response_history_limit.to_string());
    row("request_timeout_secs", config.request_timeout_secs.to_string());
    row("max_output_tokens", config.max_output_tokens.to_string());
    row(
        "temperature",
        config.temperature.map_or_else(|| "(provider default)".into(), |t| t.to_string()),
    );
    row("default_language", config.default_language.clone());
    row("system_instruction", config.system_instruction.clone());
    println!();
    Ok(())
}
