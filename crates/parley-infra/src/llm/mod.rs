//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `parley-core`, a provider factory ([`create_provider`])
//! and the [`ProviderBackend`] adapter that the turn orchestrator calls.
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod backend;
pub mod openai_compat;

use secrecy::SecretString;

use parley_types::config::ParleyConfig;
use parley_types::llm::LlmError;

pub use self::backend::ProviderBackend;
use self::openai_compat::config::{defaults_for, OpenAiCompatConfig};
use self::openai_compat::OpenAiCompatibleProvider;

/// Everything needed to reach a completion model.
///
/// Does NOT derive Debug: `api_credential` must never reach logs.
#[derive(Clone)]
pub struct CompletionConfig {
    pub model_identifier: String,
    pub api_credential: SecretString,
    /// Provider family ("gemini", "openai", "mistral").
    pub provider: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
}

impl CompletionConfig {
    pub fn from_config(config: &ParleyConfig, api_credential: SecretString) -> Self {
        Self {
            model_identifier: config.model_identifier.clone(),
            api_credential,
            provider: config.provider.clone(),
            base_url: config.base_url.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

/// Create an [`OpenAiCompatibleProvider`] from a [`CompletionConfig`].
///
/// Well-known providers get their default endpoint. Any other provider name
/// is accepted only together with an explicit `base_url`.
pub fn create_provider(config: &CompletionConfig) -> Result<OpenAiCompatibleProvider, LlmError> {
    let key = config.api_credential.clone();
    let model = config.model_identifier.as_str();

    let oai_config = match (defaults_for(&config.provider, key.clone(), model), &config.base_url) {
        (Some(defaults), Some(base_url)) => defaults.with_base_url(base_url.clone()),
        (Some(defaults), None) => defaults,
        (None, Some(base_url)) => OpenAiCompatConfig {
            provider_name: config.provider.clone(),
            base_url: base_url.clone(),
            api_key: key,
            model: model.to_string(),
        },
        (None, None) => {
            return Err(LlmError::InvalidRequest(format!(
                "unknown provider '{}' (set base_url to use a custom OpenAI-compatible endpoint)",
                config.provider
            )));
        }
    };

    Ok(OpenAiCompatibleProvider::new(oai_config))
}

/// Build the [`ProviderBackend`] the orchestrator uses for generation.
pub fn create_backend(
    config: &CompletionConfig,
) -> Result<ProviderBackend<OpenAiCompatibleProvider>, LlmError> {
    let provider = create_provider(config)?;
    Ok(ProviderBackend::new(provider, config))
}
