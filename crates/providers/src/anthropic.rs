//! Anthropic native backend implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Strict user/assistant alternation: consecutive same-role turns are
//!   merged and the conversation always opens with a user turn

use std::collections::BTreeMap;

use async_trait::async_trait;
use parley_config::BackendConfig;
use parley_core::backend::{Backend, Completion, CompletionRequest, CompletionResult};
use parley_core::error::BackendError;
use parley_core::message::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Models offered by the Messages API. Anthropic has no listing endpoint
/// usable with every key, so the catalog is fixed.
const KNOWN_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-opus-4-20250514",
    "claude-3-7-sonnet-latest",
    "claude-3-5-haiku-latest",
];

/// Anthropic native Messages API backend.
pub struct AnthropicBackend {
    name: String,
    base_url: String,
    api_key: String,
    extra: BTreeMap<String, serde_json::Value>,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(name: impl Into<String>, config: &BackendConfig, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            extra: config.extra.clone(),
            client,
        }
    }

    /// Split system entries out of the conversation.
    /// Anthropic puts the system prompt in a top-level field.
    fn extract_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns: Vec<&ChatMessage> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.text),
                _ => turns.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, turns)
    }

    /// Reshape turns into strict alternation, starting with the user.
    fn to_api_messages(turns: &[&ChatMessage]) -> Vec<AnthropicMessage> {
        let mut result: Vec<AnthropicMessage> = Vec::new();

        for msg in turns.iter().skip_while(|m| m.role == Role::Assistant) {
            let role = msg.role.as_str();
            match result.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&msg.text);
                }
                _ => result.push(AnthropicMessage {
                    role: role.to_string(),
                    content: msg.text.clone(),
                }),
            }
        }

        result
    }

    fn build_body(&self, request: &CompletionRequest) -> Result<serde_json::Value, BackendError> {
        let (system, turns) = Self::extract_system(request.context.messages());
        let messages = Self::to_api_messages(&turns);
        if messages.is_empty() {
            return Err(BackendError::Backend(
                "Conversation has no user turn to answer".into(),
            ));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        http::merge_extra(&mut body, &self.extra);
        Ok(body)
    }

    fn parse_response(resp: AnthropicResponse) -> CompletionResult {
        let texts: Vec<&str> = resp
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Other => None,
            })
            .collect();

        if texts.is_empty() {
            return Err(BackendError::Backend(
                "Anthropic response has no text content".into(),
            ));
        }

        Ok(Completion {
            role: Role::Assistant,
            text: texts.join("\n"),
            finish_reason: resp.stop_reason.unwrap_or_else(|| "end_turn".into()),
            model: resp.model,
        })
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "anthropic"
    }

    async fn create_chat_completion(&self, request: CompletionRequest) -> CompletionResult {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request)?;

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let api_resp: AnthropicResponse = http::send_json(&self.name, builder).await?;
        Self::parse_response(api_resp)
    }

    async fn list_models(&self) -> Vec<String> {
        KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: String,
    content: Vec<ResponseContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use parley_core::message::PromptContext;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    fn backend(url: &str) -> AnthropicBackend {
        let mut config = BackendConfig::new("anthropic", url, "claude-sonnet-4-20250514");
        config.api_key = Some("sk-ant-test".into());
        AnthropicBackend::new("anthropic", &config, stub::client())
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::system("Answer briefly"),
            ChatMessage::user("@a:x", "Hi"),
        ];
        let (system, turns) = AnthropicBackend::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nAnswer briefly"));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn system_extraction_no_system() {
        let messages = vec![ChatMessage::user("@a:x", "Hi")];
        let (system, _) = AnthropicBackend::extract_system(&messages);
        assert!(system.is_none());
    }

    #[test]
    fn leading_assistant_turns_dropped() {
        let a = ChatMessage::assistant("@bot:x", "Earlier answer");
        let u = ChatMessage::user("@a:x", "Question");
        let api = AnthropicBackend::to_api_messages(&[&a, &u]);
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
        assert_eq!(api[0].content, "Question");
    }

    #[test]
    fn consecutive_same_role_turns_merged() {
        let u1 = ChatMessage::user("@a:x", "alice: hi");
        let u2 = ChatMessage::user("@b:x", "bob: hello");
        let a = ChatMessage::assistant("@bot:x", "Hi both");
        let u3 = ChatMessage::user("@a:x", "alice: thanks");
        let api = AnthropicBackend::to_api_messages(&[&u1, &u2, &a, &u3]);

        assert_eq!(api.len(), 3);
        assert_eq!(api[0].content, "alice: hi\n\nbob: hello");
        assert_eq!(api[1].role, "assistant");
        assert_eq!(api[2].role, "user");
    }

    #[test]
    fn only_assistant_turns_is_rejected() {
        let ctx = PromptContext::new(
            vec![ChatMessage::system("sys")],
            vec![ChatMessage::assistant("@bot:x", "hello")],
        );
        let err = backend("http://unused")
            .build_body(&CompletionRequest::new("m", ctx))
            .unwrap_err();
        assert!(matches!(err, BackendError::Backend(_)));
    }

    #[test]
    fn parse_text_response_joins_blocks() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Part one."},
                {"type": "text", "text": "Part two."}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();

        let completion = AnthropicBackend::parse_response(resp).unwrap();
        assert_eq!(completion.text, "Part one.\nPart two.");
        assert_eq!(completion.finish_reason, "end_turn");
    }

    #[tokio::test]
    async fn completion_against_stub_server() {
        let seen: Arc<Mutex<Option<(HeaderMap, Value)>>> = Arc::default();
        let captured = seen.clone();
        let app = axum::Router::new().route(
            "/v1/messages",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some((headers, body));
                    Json(json!({
                        "model": "claude-sonnet-4-20250514",
                        "content": [{"type": "text", "text": "Bonjour!"}],
                        "stop_reason": "end_turn"
                    }))
                }
            }),
        );
        let base = stub::serve(app).await;

        let ctx = PromptContext::new(
            vec![ChatMessage::system("Be nice")],
            vec![ChatMessage::user("@a:x", "Hello")],
        );
        let completion = backend(&base)
            .create_chat_completion(CompletionRequest::new("claude-sonnet-4-20250514", ctx))
            .await
            .unwrap();
        assert_eq!(completion.text, "Bonjour!");

        let (headers, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(headers["x-api-key"], "sk-ant-test");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
        assert_eq!(body["system"], "Be nice");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn overloaded_maps_to_http_error() {
        let app = axum::Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::from_u16(529).unwrap(), "overloaded") }),
        );
        let base = stub::serve(app).await;

        let ctx = PromptContext::new(vec![], vec![ChatMessage::user("@a:x", "Hello")]);
        let err = backend(&base)
            .create_chat_completion(CompletionRequest::new("m", ctx))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(529));
    }

    #[tokio::test]
    async fn list_models_returns_known_models() {
        let models = backend("http://unused").list_models().await;
        assert_eq!(models.len(), KNOWN_MODELS.len());
        assert!(models.iter().all(|m| m.starts_with("claude")));
    }
}
