use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tariffsim_agent::{ControllerSettings, ConversationController, OpenAiChatClient};
use tariffsim_core::config::{AppConfig, ConfigError, LoadOptions};
use tariffsim_core::domain::persona::PersonaCatalog;
use tariffsim_core::domain::tariff::TariffCatalog;
use tariffsim_core::errors::DomainError;

use crate::sessions::SessionStore;
use crate::transcripts::JsonFileTranscriptStore;

pub struct Application {
    pub config: AppConfig,
    pub catalog: TariffCatalog,
    pub personas: PersonaCatalog,
    pub controller: Arc<ConversationController>,
    pub sessions: Arc<SessionStore>,
    pub transcripts: Arc<JsonFileTranscriptStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not prepare transcript directory `{path}`: {source}")]
    TranscriptDir { path: String, source: std::io::Error },
    #[error("could not load tariff catalog: {0}")]
    Catalog(#[source] DomainError),
    #[error("could not build LLM client: {0}")]
    LlmClient(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    tokio::fs::create_dir_all(&config.storage.transcript_dir).await.map_err(|source| {
        BootstrapError::TranscriptDir {
            path: config.storage.transcript_dir.display().to_string(),
            source,
        }
    })?;

    let catalog = match &config.storage.tariffs_file {
        Some(path) => TariffCatalog::load(path).map_err(BootstrapError::Catalog)?,
        None => TariffCatalog::builtin(),
    };
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        plans = catalog.plan_names().len(),
        source = if config.storage.tariffs_file.is_some() { "file" } else { "builtin" },
        "tariff catalog ready"
    );

    let llm = OpenAiChatClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::LlmClient(error.to_string()))?;
    let controller = Arc::new(ConversationController::new(
        Arc::new(llm),
        catalog.clone(),
        ControllerSettings::from(&config.simulation),
    ));

    let sessions = Arc::new(SessionStore::new(Duration::from_secs(
        config.simulation.session_max_age_minutes * 60,
    )));
    sessions.spawn_sweeper(Duration::from_secs(config.simulation.sweep_interval_secs));

    let transcripts = Arc::new(JsonFileTranscriptStore::new(&config.storage.transcript_dir));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        transcript_dir = %config.storage.transcript_dir.display(),
        "application bootstrap complete"
    );

    Ok(Application {
        config,
        catalog,
        personas: PersonaCatalog::builtin(),
        controller,
        sessions,
        transcripts,
    })
}

#[cfg(test)]
mod tests {
    use tariffsim_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_succeeds_with_builtin_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");

        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                transcript_dir: Some(dir.path().join("history")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults");

        assert_eq!(app.catalog.plan_names().len(), 5);
        assert!(!app.personas.is_empty());
        assert!(dir.path().join("history").is_dir());
    }

    #[tokio::test]
    async fn bootstrap_fails_when_transcript_dir_is_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");

        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                transcript_dir: Some(blocker),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }
}
