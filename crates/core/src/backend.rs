//! Backend trait: the abstraction over language-model providers.
//!
//! A Backend turns a [`PromptContext`] into one normalized [`Completion`],
//! hiding each provider's wire protocol (request shape, auth headers,
//! response nesting).
//!
//! Implementations: OpenAI, Anthropic, Ollama, LM Studio.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::{PromptContext, Role};

/// One completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// The assembled prompt
    pub context: PromptContext,

    /// Sampling temperature, provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate, provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, context: PromptContext) -> Self {
        Self {
            model: model.into(),
            context,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A successful, normalized completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Role of the generated message (always assistant in practice)
    pub role: Role,

    /// The generated text
    pub text: String,

    /// Provider-reported stop cause ("stop", "end_turn", "length", ...)
    pub finish_reason: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Outcome of a completion call: a completion, or a typed failure.
pub type CompletionResult = std::result::Result<Completion, BackendError>;

/// The core Backend trait.
///
/// The dispatch router calls `create_chat_completion()` without knowing which
/// provider is behind it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The configured backend name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// The registered adapter kind this backend was built from.
    fn kind(&self) -> &str;

    /// Send the prompt and return the normalized result.
    ///
    /// Every failure (non-success status, timeout, undecodable body) is
    /// reported as `Err(BackendError)`; implementations never panic.
    async fn create_chat_completion(&self, request: CompletionRequest) -> CompletionResult;

    /// List model identifiers this backend can serve.
    ///
    /// Transport failures yield an empty list rather than an error.
    async fn list_models(&self) -> Vec<String>;
}
