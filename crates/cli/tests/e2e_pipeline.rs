//! End-to-end tests for the Parley assistant pipeline.
//!
//! These drive an in-memory room through the full pipeline, from an inbound
//! message through policy, context assembly and a real HTTP adapter talking
//! to a stub Ollama server, back to the reply in the room.

use std::sync::{Arc, Mutex};

use axum::Json;
use axum::http::StatusCode;
use axum::routing::{get, post};
use parley_agent::{ACK, Outcome, Pipeline};
use parley_config::AppConfig;
use parley_core::event::{DomainEvent, EventBus};
use parley_providers::{BackendRegistry, DispatchRouter};
use parley_rooms::{MemoryRoom, MessageBuilder};
use serde_json::{Value, json};

const BOT: &str = "@sage:test";
const DM: &str = "!dm:test";
const GROUP: &str = "!group:test";

// ── Stub Ollama ──────────────────────────────────────────────────────────

/// Request bodies received by the stub's chat endpoint.
type Seen = Arc<Mutex<Vec<Value>>>;

async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A stub answering every chat request with `answer`, echoing the model.
async fn ollama_stub(answer: &'static str) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let captured = seen.clone();
    let app = axum::Router::new()
        .route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    let model = body["model"].clone();
                    captured.lock().unwrap().push(body);
                    Json(json!({
                        "model": model,
                        "created_at": "2024-01-01T00:00:00Z",
                        "message": {"role": "assistant", "content": answer},
                        "done": true,
                        "done_reason": "stop"
                    }))
                }
            }),
        )
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({
                    "models": [{"name": "llama3.2"}, {"name": "mistral"}]
                }))
            }),
        );
    (serve(app).await, seen)
}

async fn failing_stub() -> String {
    let app = axum::Router::new().route(
        "/api/chat",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    serve(app).await
}

// ── Harness ──────────────────────────────────────────────────────────────

fn config(url: &str, extra: &str) -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
name = "sage"
use_platform = "local_ai#ollama"
{extra}

[platforms.ollama]
url = "{url}"
model = "llama3.2"

[platforms.openai]
url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
"#
    ))
    .unwrap()
}

fn room() -> Arc<MemoryRoom> {
    let room = MemoryRoom::new(BOT);
    room.create_room(DM, &["@alice:test"]);
    room.create_room(GROUP, &["@alice:test", "@bob:test"]);
    Arc::new(room)
}

async fn pipeline(config: &AppConfig, room: Arc<MemoryRoom>) -> (Pipeline, Arc<EventBus>) {
    config.validate().unwrap();
    let events = Arc::new(EventBus::default());
    let router = Arc::new(
        DispatchRouter::new(config, &BackendRegistry::with_builtin())
            .unwrap()
            .with_events(events.clone()),
    );
    let pipeline = Pipeline::new(config, room, router, events.clone())
        .await
        .unwrap();
    (pipeline, events)
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_direct_message_round_trip() {
    let (url, seen) = ollama_stub("Hello Alice!").await;
    let config = config(&url, "reply_in_thread = false");
    let room = room();
    let (pipeline, _) = pipeline(&config, room.clone()).await;

    room.post(MessageBuilder::text(DM, "@alice:test", "hi there"));
    room.post(MessageBuilder::text(DM, BOT, "Hi! How can I help?"));
    let trigger = room.post(MessageBuilder::text(DM, "@alice:test", "say hello"));

    let outcome = pipeline.handle(&trigger).await;
    assert!(matches!(outcome, Outcome::Replied { .. }), "got {outcome:?}");

    let replies = room.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text, "Hello Alice!");
    assert!(!replies[0].in_thread);

    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let messages = bodies[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[0]["content"].as_str().unwrap().contains("You are sage"));
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "alice: hi there");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[3]["content"], "alice: say hello");
    assert_eq!(bodies[0]["model"], "llama3.2");
    assert_eq!(bodies[0]["stream"], false);
}

#[tokio::test]
async fn e2e_budget_keeps_newest_messages() {
    let (url, seen) = ollama_stub("ok").await;
    let config = config(
        &url,
        "reply_in_thread = false\nenable_multi_user = false\nsystem_prompt = \"Be brief.\"",
    );
    let mut config = config;
    if let Some(ollama) = config.platforms.get_mut("ollama") {
        ollama.max_words = 50;
        ollama.max_context_messages = 5;
    }
    let room = room();
    let (pipeline, _) = pipeline(&config, room.clone()).await;

    let mut trigger = None;
    for i in 0..10 {
        trigger = Some(room.post(MessageBuilder::text(
            DM,
            "@alice:test",
            format!("message number {i} has exactly eight words here"),
        )));
    }
    pipeline.handle(&trigger.unwrap()).await;

    let bodies = seen.lock().unwrap().clone();
    let messages = bodies[0]["messages"].as_array().unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(
        contents,
        vec![
            "Be brief.",
            "message number 6 has exactly eight words here",
            "message number 7 has exactly eight words here",
            "message number 8 has exactly eight words here",
            "message number 9 has exactly eight words here",
        ]
    );
}

#[tokio::test]
async fn e2e_threaded_reply_chain() {
    let (url, seen) = ollama_stub("Threads are neat.").await;
    let config = config(&url, "");
    let room = room();
    let (pipeline, _) = pipeline(&config, room.clone()).await;

    let question = room.post(MessageBuilder::text(GROUP, "@alice:test", "sage: what are threads?"));
    room.post(MessageBuilder::text(GROUP, "@bob:test", "unrelated chatter"));
    pipeline.handle(&question).await;

    let answer = room.replies()[0].clone();
    assert!(answer.in_thread);
    assert_eq!(answer.in_reply_to, question.event_id);

    let follow_up = room.post(
        MessageBuilder::text(GROUP, "@bob:test", "and why use them?")
            .reply_to(&answer.event_id)
            .in_thread(&question.event_id),
    );
    let outcome = pipeline.handle(&follow_up).await;
    assert!(matches!(outcome, Outcome::Replied { .. }));

    let bodies = seen.lock().unwrap().clone();
    let contents: Vec<&str> = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .skip(1)
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        contents,
        vec![
            "alice: sage: what are threads?",
            "sage: Threads are neat.",
            "bob: and why use them?",
        ]
    );
}

#[tokio::test]
async fn e2e_admin_commands_change_model() {
    let (url, seen) = ollama_stub("ok").await;
    let config = config(&url, "reply_in_thread = false");
    let room = room();
    let (pipeline, events) = pipeline(&config, room.clone()).await;
    let mut rx = events.subscribe();

    let list = room.post(MessageBuilder::text(DM, "@alice:test", "!ai model list"));
    assert_eq!(pipeline.handle(&list).await, Outcome::Command);
    assert_eq!(room.replies()[0].text, "- llama3.2\n- mistral");

    let switch = room.post(MessageBuilder::text(DM, "@alice:test", "!ai use mistral"));
    assert_eq!(pipeline.handle(&switch).await, Outcome::Command);
    assert_eq!(room.reactions()[0].key, ACK);
    assert!(matches!(
        rx.try_recv().unwrap().as_ref(),
        DomainEvent::ModelSwitched { model, .. } if model == "mistral"
    ));

    let rejected = room.post(MessageBuilder::text(DM, "@alice:test", "!ai use gpt-5"));
    pipeline.handle(&rejected).await;
    assert_eq!(room.replies()[1].text, "not found valid model: gpt-5");

    let question = room.post(MessageBuilder::text(DM, "@alice:test", "hello"));
    pipeline.handle(&question).await;
    let bodies = seen.lock().unwrap().clone();
    assert_eq!(bodies.last().unwrap()["model"], "mistral");
}

#[tokio::test]
async fn e2e_platform_switch_and_info() {
    let (url, _) = ollama_stub("ok").await;
    let config = config(&url, "");
    let room = room();
    let (pipeline, _) = pipeline(&config, room.clone()).await;

    let bare = room.post(MessageBuilder::text(GROUP, "@bob:test", "!ai switch local_ai"));
    pipeline.handle(&bare).await;
    assert!(room.replies()[0].text.contains("local_ai#"));

    let switch = room.post(MessageBuilder::text(GROUP, "@bob:test", "!ai platform switch openai"));
    assert_eq!(pipeline.handle(&switch).await, Outcome::Command);
    assert_eq!(room.reactions()[0].key, ACK);

    let info = room.post(MessageBuilder::text(GROUP, "@bob:test", "!ai info"));
    pipeline.handle(&info).await;
    let text = &room.replies()[1].text;
    assert!(text.contains("bot name: sage"));
    assert!(text.contains("platform: openai"));
    assert!(text.contains("model: gpt-4o-mini"));
}

#[tokio::test]
async fn e2e_backend_error_is_explained() {
    let url = failing_stub().await;
    let config = config(&url, "");
    let room = room();
    let (pipeline, events) = pipeline(&config, room.clone()).await;
    let mut rx = events.subscribe();

    let trigger = room.post(MessageBuilder::text(DM, "@alice:test", "are you there?"));
    let outcome = pipeline.handle(&trigger).await;
    assert!(matches!(outcome, Outcome::Failed { .. }));

    let replies = room.replies();
    assert!(replies[0].text.starts_with("Something went wrong: "));
    assert!(replies[0].text.contains("500"));
    assert_eq!(
        room.typing_log(),
        vec![(DM.to_string(), true), (DM.to_string(), false)]
    );

    let _received = rx.try_recv().unwrap();
    assert!(matches!(
        rx.try_recv().unwrap().as_ref(),
        DomainEvent::PipelineFailed { .. }
    ));
}
