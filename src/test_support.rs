//! In-process stand-ins for the language model and image providers.

use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::AppConfig;

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub uri: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
pub struct Upstream {
    pub url: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl Upstream {
    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

type Responder = Arc<dyn Fn(usize) -> Response + Send + Sync>;

#[derive(Clone)]
struct StubState {
    log: Arc<Mutex<Vec<Recorded>>>,
    respond: Responder,
    delay: Duration,
}

async fn record(State(state): State<StubState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let index = {
        let mut log = state.log.lock().unwrap();
        log.push(Recorded {
            method: parts.method.to_string(),
            uri: parts.uri.to_string(),
            authorization: parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
        log.len() - 1
    };
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.respond)(index)
}

/// Serves every path; `respond` gets the zero-based index of the request.
pub async fn spawn_upstream<F>(respond: F) -> Upstream
where
    F: Fn(usize) -> Response + Send + Sync + 'static,
{
    spawn_delayed_upstream(Duration::ZERO, respond).await
}

/// Like [`spawn_upstream`], but holds every response back for `delay`.
/// Requests are recorded on arrival.
pub async fn spawn_delayed_upstream<F>(delay: Duration, respond: F) -> Upstream
where
    F: Fn(usize) -> Response + Send + Sync + 'static,
{
    let log = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        log: log.clone(),
        respond: Arc::new(respond),
        delay,
    };
    let router = Router::new().fallback(record).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Upstream { url, log }
}

/// A chat-completion endpoint whose message content is `content`.
pub async fn llm_upstream(content: String) -> Upstream {
    spawn_upstream(move |_| {
        axum::Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
        .into_response()
    })
    .await
}

pub async fn failing_upstream(status: StatusCode, body: &'static str) -> Upstream {
    spawn_upstream(move |_| (status, body).into_response()).await
}

/// Fails the first `failures` requests with 503, then returns PNG bytes.
pub async fn image_upstream(failures: usize) -> Upstream {
    spawn_upstream(move |index| {
        if index < failures {
            (StatusCode::SERVICE_UNAVAILABLE, "model loading").into_response()
        } else {
            ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response()
        }
    })
    .await
}

pub fn story_json(chapters: usize) -> Value {
    let chapters: Vec<Value> = (1..=chapters)
        .map(|i| {
            json!({
                "title": format!("Chapter {i}"),
                "content": format!("Content of chapter {i}."),
                "image_action_prompt": format!("scene {i}")
            })
        })
        .collect();
    json!({
        "title": "The Lantern Fox",
        "moral": "Kindness lights the way.",
        "main_character_visual": "a small red fox with a blue scarf",
        "chapters": chapters
    })
}

/// Configuration pointing at stub upstreams, with all waits disabled.
pub fn config(llm_base: &str, image_base: &str) -> AppConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("LLM_API_URL", format!("{llm_base}/v1/chat/completions")),
        ("LLM_API_KEY", "test-llm-key".to_string()),
        ("LLM_MODEL", "test-model".to_string()),
        ("IMAGE_API_URL", format!("{image_base}/prompt")),
        ("IMAGE_MAX_ATTEMPTS", "3".to_string()),
        ("IMAGE_RETRY_DELAY_MS", "0".to_string()),
        ("IMAGE_PACING_MS", "0".to_string()),
        ("IMAGE_TIMEOUT_SECS", "5".to_string()),
        ("IMAGE_PLACEHOLDER_URL", "https://placehold.test/unavailable.png".to_string()),
        ("SECRET_KEY", "test-secret".to_string()),
    ]);
    AppConfig::from_source(|key| vars.get(key).cloned()).unwrap()
}
