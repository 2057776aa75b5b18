//! Language-model backends for Parley.
//!
//! All adapters implement the `parley_core::Backend` trait. The registry
//! builds them by kind and the router selects the active one.

pub mod anthropic;
mod http;
pub mod ollama;
pub mod openai_compat;
pub mod registry;
pub mod router;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use registry::{BackendFactory, BackendRegistry};
pub use router::{ActiveSelection, DispatchRouter, ResolvedBackend, SwitchOutcome};
