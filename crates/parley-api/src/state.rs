//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! `ChatService` is generic over its store and backend traits; AppState pins it
//! to the SQLite stores and the provider-backed completion backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parley_core::chat::{ChatService, ChatSettings};
use parley_infra::config::{apply_env_overrides, load_config, resolve_api_credential, resolve_data_dir};
use parley_infra::llm::openai_compat::OpenAiCompatibleProvider;
use parley_infra::llm::{create_backend, CompletionConfig, ProviderBackend};
use parley_infra::sqlite::checkpoint::SqliteCheckpointStore;
use parley_infra::sqlite::message::SqliteMessageStore;
use parley_infra::sqlite::pool::{database_url, DatabasePool};
use parley_infra::sqlite::thread::SqliteThreadRegistry;
use parley_types::config::ParleyConfig;
use secrecy::SecretString;

/// Concrete type alias for the chat service pinned to infra implementations.
pub type ConcreteChatService = ChatService<
    SqliteMessageStore,
    SqliteThreadRegistry,
    SqliteCheckpointStore,
    ProviderBackend<OpenAiCompatibleProvider>,
>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub config: Arc<ParleyConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve configuration from disk and environment, then wire services.
    ///
    /// When `require_credential` is false a missing API credential is only
    /// warned about; commands that never call the model still work.
    pub async fn init(require_credential: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = apply_env_overrides(load_config(&data_dir).await, |k| std::env::var(k).ok());
        let credential = match resolve_api_credential(&config, |k| std::env::var(k).ok()) {
            Ok(credential) => credential,
            Err(err) if !require_credential => {
                tracing::warn!("{err}; completions will fail");
                SecretString::from(String::new())
            }
            Err(err) => return Err(err.into()),
        };

        Self::open(&data_dir, config, credential).await
    }

    /// Connect to `{data_dir}/parley.db` and build the chat service.
    pub async fn open(
        data_dir: &Path,
        config: ParleyConfig,
        credential: SecretString,
    ) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&database_url(data_dir)).await?;

        let backend = create_backend(&CompletionConfig::from_config(&config, credential))?;
        let chat_service = ChatService::new(
            SqliteMessageStore::new(db_pool.clone()),
            SqliteThreadRegistry::new(db_pool.clone()),
            SqliteCheckpointStore::new(db_pool.clone()),
            backend,
            ChatSettings::from_config(&config),
        );

        tracing::debug!(
            data_dir = %data_dir.display(),
            model = %config.model_identifier,
            provider = %config.provider,
            "application state ready"
        );

        Ok(Self {
            chat_service: Arc::new(chat_service),
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
        })
    }
}
