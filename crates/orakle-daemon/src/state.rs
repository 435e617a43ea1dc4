//! Process-wide shared state: the configuration snapshot lock, the skill
//! registry, matcher, dispatcher, supervisor, and the shared LLM client.
//!
//! The configuration object is read many / written by one: writers take
//! the `RwLock` write guard only long enough to replace the value; readers
//! clone a snapshot under a read guard rather than holding the lock across
//! an `.await`, per §5's shared-resource policy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::RwLock;

use orakle_core::ai::provider::LLMProvider;
use orakle_core::ai::providers::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use orakle_core::config::{MatcherConfig, OrakleConfig};
use orakle_core::dispatch::Dispatcher;
use orakle_core::matcher::HybridMatcher;
use orakle_core::skills::{HashEmbeddingProvider, LruEmbeddingCache, SkillRegistry};
use orakle_core::supervisor::ServiceSupervisor;

pub struct AppState {
    pub config: RwLock<OrakleConfig>,
    pub config_path: PathBuf,
    pub registry: Arc<SkillRegistry>,
    pub matcher: Arc<HybridMatcher>,
    pub dispatcher: Arc<Dispatcher>,
    pub supervisor: Arc<ServiceSupervisor>,
    pub llm: Arc<dyn LLMProvider>,
    pub http_client: Client,
}

impl AppState {
    /// Build every collaborator from a loaded configuration. The embedding
    /// provider is the teacher-style deterministic hash embedder behind an
    /// LRU cache, used in place of a configured embedding API key — see
    /// `orakle_core::skills::embeddings` for the rationale.
    pub fn build(config: OrakleConfig, config_path: PathBuf) -> Self {
        let http_client = Client::builder().build().unwrap_or_default();

        let llm = build_llm_provider(&config, Duration::from_secs(config.provider.request_timeout_secs));
        let matcher_llm = build_llm_provider(&config, Duration::from_secs(config.provider.matcher_timeout_secs));

        let embeddings = Arc::new(LruEmbeddingCache::new(Box::new(HashEmbeddingProvider::new()), 4096));

        let capabilities_url = format!("{}{}", config.skills_host.base_url, config.skills_host.capabilities_path);
        let registry = Arc::new(SkillRegistry::new(http_client.clone(), capabilities_url, embeddings.clone()));

        let matcher_config: MatcherConfig = config.matcher;
        let matcher = Arc::new(HybridMatcher::new(registry.clone(), embeddings, matcher_llm, matcher_config));

        let dispatcher = Arc::new(Dispatcher::new(
            matcher.clone(),
            http_client.clone(),
            config.skills_host.base_url.clone(),
            Duration::from_secs(config.skills_host.call_timeout_secs),
            llm.clone(),
        ));

        let supervisor = Arc::new(ServiceSupervisor::new(config.service_specs()));

        Self { config: RwLock::new(config), config_path, registry, matcher, dispatcher, supervisor, llm, http_client }
    }

    /// Snapshot the current configuration without holding the lock across
    /// an `.await`.
    pub async fn config_snapshot(&self) -> OrakleConfig {
        self.config.read().await.clone()
    }
}

/// Construct an LLM client against the configured provider with the given
/// timeout. The primary chat stream and the dispatcher's interpretation
/// stream share one instance built from `request_timeout_secs`; the matcher
/// gets its own instance built from `matcher_timeout_secs`, since the
/// timeout is baked into the provider's internal `reqwest::Client` at
/// construction and can't otherwise vary per call site.
pub fn build_llm_provider(config: &OrakleConfig, timeout: Duration) -> Arc<dyn LLMProvider> {
    let mut provider_config = match config.provider.default_id.as_str() {
        "anthropic" => OpenAICompatibleConfig::anthropic(config.provider.api_key.clone()),
        "ollama" => OpenAICompatibleConfig::ollama(),
        "openrouter" => OpenAICompatibleConfig::openrouter(config.provider.api_key.clone()),
        _ => OpenAICompatibleConfig::openai(config.provider.api_key.clone()),
    };
    provider_config.timeout = timeout;

    match OpenAICompatibleProvider::new(provider_config, config.provider.default_id.clone()) {
        Ok(provider) => Arc::new(provider),
        Err(err) => {
            tracing::error!(error = %err, "failed to build configured LLM provider, falling back to ollama");
            Arc::new(
                OpenAICompatibleProvider::new(OpenAICompatibleConfig::ollama(), "ollama")
                    .expect("ollama provider config is always valid"),
            )
        }
    }
}
