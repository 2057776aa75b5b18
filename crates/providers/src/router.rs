//! Dispatch router: owns the active `(backend, model)` selection.
//!
//! Builds every configured backend through the [`BackendRegistry`], answers
//! which backend is active, switches backend or model at runtime, and sends
//! completion requests under a bounded timeout.
//!
//! The selection lives behind a `std::sync::RwLock` that is only held for
//! copying or replacing it, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use parley_config::{AppConfig, BackendConfig, ConfigError};
use parley_core::backend::{Backend, CompletionRequest, CompletionResult};
use parley_core::error::{BackendError, Error};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::PromptContext;
use tracing::{debug, info, warn};

use crate::registry::BackendRegistry;

/// The active selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSelection {
    /// Canonical selector (`openai`, `local_ai#ollama`)
    pub selector: String,
    /// Configured backend name
    pub backend: String,
    pub model: String,
    /// Bumped on every backend switch
    generation: u64,
}

impl ActiveSelection {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A consistent snapshot of the active backend, ready for dispatch.
#[derive(Clone)]
pub struct ResolvedBackend {
    pub selection: ActiveSelection,
    pub config: BackendConfig,
    pub backend: Arc<dyn Backend>,
}

impl ResolvedBackend {
    pub fn name(&self) -> &str {
        &self.selection.backend
    }

    pub fn model(&self) -> &str {
        &self.selection.model
    }
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("selection", &self.selection)
            .field("config", &self.config)
            .field("kind", &self.backend.kind())
            .finish()
    }
}

/// Result of a backend switch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The selection changed. The model is the requested one, or the
    /// backend's default when none was given
    Switched { selector: String, model: String },
    /// A family was named without its sub-kind
    NeedsSubKind(String),
    /// The requested backend is already active
    AlreadyActive(String),
}

/// Routes completion requests to the active backend.
pub struct DispatchRouter {
    config: AppConfig,
    backends: HashMap<String, Arc<dyn Backend>>,
    selection: RwLock<ActiveSelection>,
    timeout: Duration,
    events: Option<Arc<EventBus>>,
}

impl DispatchRouter {
    /// Build every configured backend and select `use_platform`.
    pub fn new(config: &AppConfig, registry: &BackendRegistry) -> Result<Self, Error> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut backends = HashMap::new();
        for (name, backend_config) in &config.platforms {
            backends.insert(name.clone(), registry.build(name, backend_config, timeout)?);
        }

        let resolved = config.resolve(&config.use_platform)?;
        let model = match &config.use_model {
            Some(model) => model.clone(),
            None => config
                .backend(&resolved.name)
                .map(|b| b.model.clone())
                .ok_or_else(|| ConfigError::UnknownPlatform(resolved.name.clone()))?,
        };

        info!(backend = %resolved.name, model = %model, "Active backend selected");

        Ok(Self {
            config: config.clone(),
            backends,
            selection: RwLock::new(ActiveSelection {
                selector: resolved.selector,
                backend: resolved.name,
                model,
                generation: 0,
            }),
            timeout,
            events: None,
        })
    }

    /// Publish switch events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Override the completion timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Copy of the current selection.
    pub fn current(&self) -> ActiveSelection {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot the active backend together with its configuration.
    pub fn resolve_active_backend(&self) -> Result<ResolvedBackend, Error> {
        let selection = self.current();
        let config = self
            .config
            .backend(&selection.backend)
            .cloned()
            .ok_or_else(|| Error::config(format!("not found platform: {}", selection.backend)))?;
        let backend = self
            .backends
            .get(&selection.backend)
            .cloned()
            .ok_or_else(|| Error::config(format!("not found platform: {}", selection.backend)))?;

        Ok(ResolvedBackend {
            selection,
            config,
            backend,
        })
    }

    /// Canonical selectors of all configured backends.
    pub fn platforms(&self) -> Vec<String> {
        self.config.selectors()
    }

    /// Look up a built backend by name.
    pub fn backend(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// Models offered by the active backend.
    pub async fn list_models(&self) -> Vec<String> {
        let Some(backend) = self.backend(&self.current().backend) else {
            return Vec::new();
        };
        backend.list_models().await
    }

    /// Make another backend active. The model becomes `model` when given,
    /// else the backend's configured default.
    ///
    /// A requested model must be offered by the target backend; otherwise
    /// the selection is left alone. Naming the active backend together with
    /// a model switches only the model.
    pub async fn switch_backend(
        &self,
        selector: &str,
        model: Option<&str>,
    ) -> Result<SwitchOutcome, Error> {
        let resolved = match self.config.resolve(selector) {
            Ok(resolved) => resolved,
            Err(ConfigError::NeedsSubKind { help, .. }) => {
                return Ok(SwitchOutcome::NeedsSubKind(help));
            }
            Err(e) => return Err(e.into()),
        };
        let default_model = self
            .config
            .backend(&resolved.name)
            .map(|b| b.model.clone())
            .ok_or_else(|| Error::config(format!("not found platform: {selector}")))?;
        let requested = model.map(str::trim).filter(|m| !m.is_empty());

        let before = self.current();
        if before.backend == resolved.name {
            return match requested {
                Some(model) if model != before.model => {
                    self.switch_model(model).await?;
                    Ok(SwitchOutcome::Switched {
                        selector: before.selector,
                        model: model.to_string(),
                    })
                }
                _ => Ok(SwitchOutcome::AlreadyActive(before.selector)),
            };
        }

        if let Some(model) = requested {
            let backend = self
                .backend(&resolved.name)
                .ok_or_else(|| Error::config(format!("not found platform: {selector}")))?;
            if !backend.list_models().await.iter().any(|m| m == model) {
                debug!(backend = %resolved.name, model, "Rejected unknown model");
                return Err(Error::Selection(format!("not found valid model: {model}")));
            }
        }
        let model = requested.map_or(default_model, String::from);

        {
            let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
            if selection.generation != before.generation {
                warn!(backend = %resolved.name, "Selection changed while validating model");
                return Err(Error::Selection(format!(
                    "platform changed to {} while switching; try again",
                    selection.selector
                )));
            }
            selection.selector = resolved.selector.clone();
            selection.backend = resolved.name.clone();
            selection.model = model.clone();
            selection.generation += 1;
        }

        info!(backend = %resolved.name, model = %model, "Switched backend");
        self.publish(DomainEvent::BackendSwitched {
            backend: resolved.name,
            model: model.clone(),
            timestamp: Utc::now(),
        });

        Ok(SwitchOutcome::Switched {
            selector: resolved.selector,
            model,
        })
    }

    /// Switch the model of the active backend after checking that the
    /// backend offers it.
    pub async fn switch_model(&self, model: &str) -> Result<(), Error> {
        let model = model.trim();
        let before = self.current();
        let Some(backend) = self.backend(&before.backend) else {
            return Err(Error::config(format!("not found platform: {}", before.backend)));
        };

        let available = backend.list_models().await;
        if !available.iter().any(|m| m == model) {
            debug!(backend = %before.backend, model, "Rejected unknown model");
            return Err(Error::Selection(format!("not found valid model: {model}")));
        }

        {
            let mut selection = self.selection.write().unwrap_or_else(PoisonError::into_inner);
            if selection.generation != before.generation {
                warn!(model, "Backend changed while validating model");
                return Err(Error::Selection(format!(
                    "platform changed to {} while switching model; try again",
                    selection.selector
                )));
            }
            selection.model = model.to_string();
        }

        info!(backend = %before.backend, model, "Switched model");
        self.publish(DomainEvent::ModelSwitched {
            backend: before.backend,
            model: model.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Send `context` to the snapshotted backend, bounded by the timeout.
    /// The in-flight request is dropped when the timeout fires.
    pub async fn dispatch(&self, resolved: &ResolvedBackend, context: PromptContext) -> CompletionResult {
        let request = CompletionRequest::new(resolved.model(), context)
            .with_temperature(resolved.config.temperature)
            .with_max_tokens(resolved.config.max_tokens);

        debug!(
            backend = %resolved.name(),
            model = %resolved.model(),
            messages = request.context.len(),
            "Dispatching completion"
        );

        match tokio::time::timeout(self.timeout, resolved.backend.create_chat_completion(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!(
                "{} did not answer within {}s",
                resolved.name(),
                self.timeout.as_secs()
            ))),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
