//! Construction of runtime state from configuration.

use std::sync::Arc;

use anyhow::Context;

use cs_assets::{JsonFileStore, NotificationGate, Notifications};
use cs_domain::config::Config;
use cs_providers::{LlmProvider, OpenAiCompatProvider};

use crate::state::AppState;
use crate::mutator::MirrorEnvelope;

/// Open the JSON file store under `persistence.state_path` and build state
/// over it.
pub fn build_app_state(
    config: Config,
) -> anyhow::Result<(AppState, tokio::sync::mpsc::UnboundedReceiver<MirrorEnvelope>)> {
    let notifications = Arc::new(Notifications::new(Arc::new(NotificationGate::new())));
    let store = JsonFileStore::open(&config.persistence.state_path)
        .with_context(|| {
            format!(
                "opening chat store at {}",
                config.persistence.state_path.display()
            )
        })?
        .with_notifications(notifications.clone());
    tracing::info!(
        path = %config.persistence.state_path.display(),
        coalesce_window_ms = config.persistence.coalesce_window_ms,
        "chat store ready"
    );

    Ok(AppState::new(config, Arc::new(store), notifications))
}

pub fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let provider = OpenAiCompatProvider::from_config(&config.llm)
        .with_context(|| format!("creating provider {}", config.llm.provider_id))?;
    tracing::info!(
        provider = %config.llm.provider_id,
        model = %config.llm.model,
        "provider ready"
    );
    Ok(Arc::new(provider))
}
