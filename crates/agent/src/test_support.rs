//! Shared test helpers: a scripted backend and a router built around it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_config::AppConfig;
use parley_core::backend::{Backend, Completion, CompletionRequest, CompletionResult};
use parley_core::error::BackendError;
use parley_core::message::Role;
use parley_providers::{BackendRegistry, DispatchRouter};

pub const BOT: &str = "@parley:x";

/// A backend that answers every request the same way and records what it
/// was asked.
pub struct ScriptedBackend {
    answer: Result<String, BackendError>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn answering(text: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: BackendError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(error),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    async fn create_chat_completion(&self, request: CompletionRequest) -> CompletionResult {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        self.answer.clone().map(|text| Completion {
            role: Role::Assistant,
            text,
            finish_reason: "stop".into(),
            model,
        })
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["gpt-4o-mini".into(), "scripted-large".into()]
    }
}

/// Default configuration with an OpenAI key set.
pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    if let Some(openai) = config.platforms.get_mut("openai") {
        openai.api_key = Some("sk-test".into());
    }
    config
}

/// A router whose every configured backend is `backend`.
pub fn router_for(config: &AppConfig, backend: Arc<ScriptedBackend>) -> Arc<DispatchRouter> {
    let mut registry = BackendRegistry::new();
    for kind in ["openai", "anthropic", "ollama", "lmstudio"] {
        let backend = backend.clone();
        registry.register(kind, move |_, _, _| backend.clone() as Arc<dyn Backend>);
    }
    Arc::new(DispatchRouter::new(config, &registry).unwrap())
}

pub fn router_with(backend: Arc<ScriptedBackend>) -> Arc<DispatchRouter> {
    router_for(&config(), backend)
}
