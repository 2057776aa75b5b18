//! Backend registry: adapter factories keyed by kind.
//!
//! A configured backend names its `kind`; the registry turns that kind plus
//! the backend's configuration into a live adapter. New providers plug in by
//! registering another factory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_config::BackendConfig;
use parley_core::Backend;
use parley_core::error::Error;
use tracing::debug;

use crate::anthropic::AnthropicBackend;
use crate::http;
use crate::ollama::OllamaBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// Builds an adapter from a backend name, its configuration and an HTTP
/// client whose timeout is already set.
pub type BackendFactory =
    Arc<dyn Fn(&str, &BackendConfig, reqwest::Client) -> Arc<dyn Backend> + Send + Sync>;

/// Registry of adapter factories.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in adapters: `openai`, `anthropic`,
    /// `ollama`, `lmstudio`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("openai", |name, config, client| {
            Arc::new(OpenAiCompatBackend::openai(name, config, client))
        });
        registry.register("lmstudio", |name, config, client| {
            Arc::new(OpenAiCompatBackend::lmstudio(name, config, client))
        });
        registry.register("anthropic", |name, config, client| {
            Arc::new(AnthropicBackend::new(name, config, client))
        });
        registry.register("ollama", |name, config, client| {
            Arc::new(OllamaBackend::new(name, config, client))
        });
        registry
    }

    /// Register (or replace) the factory for a kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &BackendConfig, reqwest::Client) -> Arc<dyn Backend> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "Registered backend kind");
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Build the adapter for a configured backend. Its HTTP requests give up
    /// after `timeout`.
    pub fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn Backend>, Error> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            Error::config(format!(
                "platform '{name}' has unknown kind '{}' (known: {})",
                config.kind,
                self.kinds().join(", ")
            ))
        })?;
        let client = http::client(timeout)?;
        Ok(factory(name, config, client))
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn builtin_kinds() {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(
            registry.kinds(),
            vec!["anthropic", "lmstudio", "ollama", "openai"]
        );
    }

    #[test]
    fn build_uses_kind_not_name() {
        let registry = BackendRegistry::with_builtin();
        let config = BackendConfig::new("ollama", "http://gpu-box:11434", "qwen2.5");
        let backend = registry.build("gpu-box", &config, TIMEOUT).unwrap();
        assert_eq!(backend.name(), "gpu-box");
        assert_eq!(backend.kind(), "ollama");
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let registry = BackendRegistry::with_builtin();
        let config = BackendConfig::new("gemini", "https://example.com", "g");
        let err = registry.build("gemini", &config, TIMEOUT).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("gemini"));
    }

    #[tokio::test]
    async fn built_backend_gives_up_on_silent_server() {
        let url = http::stub::silent().await;
        let registry = BackendRegistry::with_builtin();
        let config = BackendConfig::new("ollama", url, "llama3.2");
        let backend = registry
            .build("ollama", &config, Duration::from_millis(200))
            .unwrap();

        let models = tokio::time::timeout(Duration::from_secs(5), backend.list_models())
            .await
            .expect("list_models should give up on its own");
        assert!(models.is_empty());
    }
}
