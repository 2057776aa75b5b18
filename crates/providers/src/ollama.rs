//! Ollama native backend.
//!
//! Talks to `POST /api/chat` with streaming disabled. Sampling options go in
//! the nested `options` object rather than at the top level.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parley_config::BackendConfig;
use parley_core::backend::{Backend, Completion, CompletionRequest, CompletionResult};
use parley_core::error::BackendError;
use parley_core::message::Role;
use serde::Deserialize;
use tracing::debug;

use crate::http;

pub struct OllamaBackend {
    name: String,
    base_url: String,
    /// Only sent when the server sits behind an authenticating proxy
    api_key: Option<String>,
    extra: BTreeMap<String, serde_json::Value>,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(name: impl Into<String>, config: &BackendConfig, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            extra: config.extra.clone(),
            client,
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .context
            .messages()
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.text }))
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
        });

        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(max) = request.max_tokens {
            options.insert("num_predict".into(), serde_json::json!(max));
        }
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
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
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "ollama"
    }

    async fn create_chat_completion(&self, request: CompletionRequest) -> CompletionResult {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_body(&request);

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let resp: ChatResponse =
            http::send_json(&self.name, self.authorize(self.client.post(&url)).json(&body)).await?;

        if let Some(error) = resp.error {
            return Err(BackendError::Backend(error));
        }
        let message = resp
            .message
            .ok_or_else(|| BackendError::Backend("Ollama response has no message".into()))?;

        Ok(Completion {
            role: Role::parse(&message.role).unwrap_or(Role::Assistant),
            text: message.content,
            finish_reason: resp.done_reason.unwrap_or_else(|| "stop".into()),
            model: resp.model,
        })
    }

    async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let Some(body) = http::fetch_json(&self.name, self.authorize(self.client.get(&url))).await
        else {
            return Vec::new();
        };

        body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    role: String,
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use parley_core::message::{ChatMessage, PromptContext};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    fn request() -> CompletionRequest {
        CompletionRequest::new(
            "llama3.2",
            PromptContext::new(
                vec![ChatMessage::system("You are terse")],
                vec![ChatMessage::user("@a:x", "Why is the sky blue?")],
            ),
        )
    }

    #[test]
    fn options_nested_only_when_set() {
        let backend = OllamaBackend::new(
            "ollama",
            &BackendConfig::new("ollama", "http://localhost:11434", "llama3.2"),
            stub::client(),
        );

        let plain = backend.build_body(&request());
        assert_eq!(plain["stream"], false);
        assert!(plain.get("options").is_none());

        let tuned = backend.build_body(
            &request()
                .with_temperature(Some(0.5))
                .with_max_tokens(Some(512)),
        );
        assert_eq!(tuned["options"]["temperature"], 0.5);
        assert_eq!(tuned["options"]["num_predict"], 512);
        assert!(tuned.get("temperature").is_none());
    }

    #[tokio::test]
    async fn completion_against_stub_server() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let captured = seen.clone();
        let app = axum::Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({
                        "model": "llama3.2",
                        "created_at": "2024-01-01T00:00:00Z",
                        "message": {"role": "assistant", "content": "Rayleigh scattering."},
                        "done": true,
                        "done_reason": "stop"
                    }))
                }
            }),
        );
        let base = stub::serve(app).await;

        let backend = OllamaBackend::new(
            "ollama",
            &BackendConfig::new("ollama", &base, "llama3.2"),
            stub::client(),
        );
        let completion = backend.create_chat_completion(request()).await.unwrap();
        assert_eq!(completion.text, "Rayleigh scattering.");
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.model, "llama3.2");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn missing_model_maps_to_http_error() {
        let app = axum::Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::NOT_FOUND, r#"{"error":"model 'x' not found"}"#) }),
        );
        let base = stub::serve(app).await;

        let backend = OllamaBackend::new(
            "ollama",
            &BackendConfig::new("ollama", &base, "x"),
            stub::client(),
        );
        let err = backend.create_chat_completion(request()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn lists_tags() {
        let app = axum::Router::new().route(
            "/api/tags",
            get(|| async {
                Json(json!({"models": [{"name": "llama3.2:latest"}, {"name": "qwen2.5:7b"}]}))
            }),
        );
        let base = stub::serve(app).await;

        let backend = OllamaBackend::new(
            "ollama",
            &BackendConfig::new("ollama", &base, "x"),
            stub::client(),
        );
        assert_eq!(
            backend.list_models().await,
            vec!["llama3.2:latest", "qwen2.5:7b"]
        );
    }

    #[tokio::test]
    async fn unreachable_server_lists_nothing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = OllamaBackend::new(
            "ollama",
            &BackendConfig::new("ollama", format!("http://{addr}"), "x"),
            stub::client(),
        );
        assert!(backend.list_models().await.is_empty());
    }
}
