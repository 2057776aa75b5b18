//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI and LM Studio's local server, which speaks the same
//! `/chat/completions` protocol under a `/v1` prefix and needs no key.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parley_config::BackendConfig;
use parley_core::backend::{Backend, Completion, CompletionRequest, CompletionResult};
use parley_core::error::BackendError;
use parley_core::message::{PromptContext, Role};
use serde::Deserialize;
use tracing::debug;

use crate::http;

/// An OpenAI-compatible backend.
pub struct OpenAiCompatBackend {
    name: String,
    kind: &'static str,
    /// Base including the API version segment, e.g. `https://api.openai.com/v1`
    api_base: String,
    api_key: Option<String>,
    extra: BTreeMap<String, serde_json::Value>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create an OpenAI backend; `config.url` already carries the `/v1` segment.
    pub fn openai(
        name: impl Into<String>,
        config: &BackendConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            kind: "openai",
            api_base: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            extra: config.extra.clone(),
            client,
        }
    }

    /// Create an LM Studio backend (no auth, `/v1` appended to the server URL).
    pub fn lmstudio(
        name: impl Into<String>,
        config: &BackendConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            kind: "lmstudio",
            api_base: format!("{}/v1", config.url.trim_end_matches('/')),
            api_key: None,
            extra: config.extra.clone(),
            client,
        }
    }

    fn to_api_messages(context: &PromptContext) -> Vec<serde_json::Value> {
        context
            .messages()
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.text }))
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.context),
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        http::merge_extra(&mut body, &self.extra);
        body
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn parse_response(response: ApiResponse) -> CompletionResult {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Backend("No choices in response".into()))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| BackendError::Backend("Response message has no content".into()))?;

        Ok(Completion {
            role: choice
                .message
                .role
                .as_deref()
                .and_then(Role::parse)
                .unwrap_or(Role::Assistant),
            text,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
            model: response.model,
        })
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.kind
    }

    async fn create_chat_completion(&self, request: CompletionRequest) -> CompletionResult {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_body(&request);

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let response: ApiResponse =
            http::send_json(&self.name, self.authorize(self.client.post(&url)).json(&body)).await?;
        Self::parse_response(response)
    }

    async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/models", self.api_base);
        let Some(body) = http::fetch_json(&self.name, self.authorize(self.client.get(&url))).await
        else {
            return Vec::new();
        };

        body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use parley_core::message::ChatMessage;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    fn context() -> PromptContext {
        PromptContext::new(
            vec![ChatMessage::system("You are helpful")],
            vec![ChatMessage::user("@alice:x", "Hello")],
        )
    }

    fn config(url: &str) -> BackendConfig {
        let mut config = BackendConfig::new("openai", url, "gpt-4o-mini");
        config.api_key = Some("sk-test".into());
        config
    }

    #[test]
    fn lmstudio_appends_version_segment() {
        let backend = OpenAiCompatBackend::lmstudio(
            "lmstudio",
            &BackendConfig::new("lmstudio", "http://localhost:1234/", "local-model"),
            stub::client(),
        );
        assert_eq!(backend.api_base, "http://localhost:1234/v1");
        assert_eq!(backend.kind(), "lmstudio");
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn body_carries_options_and_extra() {
        let mut cfg = config("https://api.openai.com/v1");
        cfg.extra.insert("top_p".into(), json!(0.5));
        cfg.extra.insert("model".into(), json!("should-not-win"));
        let backend = OpenAiCompatBackend::openai("openai", &cfg, stub::client());

        let request = CompletionRequest::new("gpt-4o", context())
            .with_temperature(Some(0.3))
            .with_max_tokens(Some(100));
        let body = backend.build_body(&request);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["top_p"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
    }

    #[tokio::test]
    async fn completion_against_stub_server() {
        let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::default();
        let captured = seen.clone();
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    *captured.lock().unwrap() = Some((auth, body));
                    Json(json!({
                        "model": "gpt-4o-mini-2024-07-18",
                        "choices": [{
                            "message": {"role": "assistant", "content": "Hi there!"},
                            "finish_reason": "stop"
                        }]
                    }))
                }
            }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::openai(
            "openai",
            &config(&format!("{base}/v1")),
            stub::client(),
        );
        let completion = backend
            .create_chat_completion(CompletionRequest::new("gpt-4o-mini", context()))
            .await
            .unwrap();

        assert_eq!(completion.text, "Hi there!");
        assert_eq!(completion.role, Role::Assistant);
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");

        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn server_error_maps_to_http_error() {
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::openai(
            "openai",
            &config(&format!("{base}/v1")),
            stub::client(),
        );
        let err = backend
            .create_chat_completion(CompletionRequest::new("gpt-4o-mini", context()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BackendError::Http {
                status_code: 500,
                message: "upstream exploded".into()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"unexpected": true})) }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::openai(
            "openai",
            &config(&format!("{base}/v1")),
            stub::client(),
        );
        let err = backend
            .create_chat_completion(CompletionRequest::new("gpt-4o-mini", context()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_backend_error() {
        let app = axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"model": "m", "choices": []})) }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::openai(
            "openai",
            &config(&format!("{base}/v1")),
            stub::client(),
        );
        let err = backend
            .create_chat_completion(CompletionRequest::new("m", context()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Backend(_)));
    }

    #[tokio::test]
    async fn lmstudio_lists_models_without_auth() {
        let app = axum::Router::new().route(
            "/v1/models",
            get(|headers: HeaderMap| async move {
                assert!(headers.get("authorization").is_none());
                Json(json!({"data": [{"id": "qwen2.5-7b"}, {"id": "phi-3"}]}))
            }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::lmstudio(
            "lmstudio",
            &BackendConfig::new("lmstudio", &base, "x"),
            stub::client(),
        );
        assert_eq!(backend.list_models().await, vec!["qwen2.5-7b", "phi-3"]);
    }

    #[tokio::test]
    async fn list_models_failure_is_empty() {
        let app = axum::Router::new().route(
            "/v1/models",
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = stub::serve(app).await;

        let backend = OpenAiCompatBackend::openai(
            "openai",
            &config(&format!("{base}/v1")),
            stub::client(),
        );
        assert!(backend.list_models().await.is_empty());
    }
}
