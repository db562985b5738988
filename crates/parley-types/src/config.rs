//! Configuration types for Parley.
//!
//! `ParleyConfig` is the top-level `config.toml` that selects the completion
//! model and bounds the context window, retrieval depth, and request time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest retrieval cap accepted. A turn always needs its inbound message.
pub const MIN_RETRIEVAL_CAP: usize = 1;

/// Smallest completion timeout accepted, in seconds.
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;

/// Top-level configuration.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
/// The API credential is never stored here; `api_key_env` names the
/// environment variable that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default = "default_model_identifier")]
    pub model_identifier: String,

    /// Provider preset: "gemini", "openai", "mistral", or "custom" (requires `base_url`).
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Token budget for the context window sent to the model.
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    /// Keep a leading system message in the window even when over budget.
    #[serde(default = "default_true")]
    pub include_system: bool,

    /// Persisted messages loaded per turn, independent of the token budget.
    #[serde(default = "default_history_depth")]
    pub retrieval_cap: usize,

    /// Messages returned to the caller after each turn.
    #[serde(default = "default_history_depth")]
    pub response_history_limit: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_model_identifier() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_token_budget() -> u32 {
    2048
}

fn default_true() -> bool {
    true
}

fn default_history_depth() -> usize {
    20
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_system_instruction() -> String {
    "You are an AI assistant. Answer all questions politely.".to_string()
}

fn default_language() -> String {
    "english".to_string()
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            model_identifier: default_model_identifier(),
            provider: default_provider(),
            base_url: None,
            api_key_env: default_api_key_env(),
            token_budget: default_token_budget(),
            include_system: true,
            retrieval_cap: default_history_depth(),
            response_history_limit: default_history_depth(),
            request_timeout_secs: default_request_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: None,
            system_instruction: default_system_instruction(),
            default_language: default_language(),
        }
    }
}

impl ParleyConfig {
    /// Clamp values that would make a turn impossible.
    pub fn normalized(mut self) -> Self {
        self.retrieval_cap = self.retrieval_cap.max(MIN_RETRIEVAL_CAP);
        self.response_history_limit = self.response_history_limit.max(1);
        self.request_timeout_secs = self.request_timeout_secs.max(MIN_REQUEST_TIMEOUT_SECS);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
