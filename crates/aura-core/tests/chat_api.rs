//! Integration tests for the HTTP surface, driven through the axum router.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use aura_core::config::Config;
use aura_core::error::ProviderError;
use aura_core::provider::LlmProvider;
use aura_core::service::http::{create_router, AppState};
use aura_core::tool::ToolRegistry;
use aura_core::types::{CompletionResponse, ContentPart, FinishReason, Message, Role, TokenUsage, ToolCall};

/// Answers in text unless the latest user message mentions YouTube, in which
/// case it asks for `open_youtube` once and then confirms.
struct KeywordProvider {
    seen: Mutex<Vec<Vec<Message>>>,
}

impl KeywordProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

fn reply(parts: Vec<ContentPart>) -> CompletionResponse {
    CompletionResponse {
        parts,
        finish_reason: FinishReason::Stop,
        usage: TokenUsage::default(),
    }
}

#[async_trait]
impl LlmProvider for KeywordProvider {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[Value]>,
        _model: &str,
        _max_tokens: u32,
        _temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());

        let last = messages.last().expect("at least one message");
        if last.role == Role::Tool {
            return Ok(reply(vec![ContentPart::Text("Opening YouTube now.".into())]));
        }

        let content = last.content.clone().unwrap_or_default();
        if content.to_lowercase().contains("youtube") {
            let query = content
                .split_once(" for ")
                .map(|(_, q)| q.trim_end_matches('.').to_string())
                .unwrap_or_default();
            return Ok(reply(vec![ContentPart::FunctionCall(ToolCall {
                id: "call_yt".into(),
                name: "open_youtube".into(),
                arguments: [("query".to_string(), json!(query))].into_iter().collect(),
            })]));
        }
        if content == "fail" {
            return Err(ProviderError::Api {
                status: 503,
                message: "model overloaded".into(),
            });
        }

        // Echo the history length so concurrent callers can tell replies apart.
        let turns = messages.iter().filter(|m| m.role != Role::System).count();
        Ok(reply(vec![ContentPart::Text(format!("{content} ({turns} turns)"))]))
    }

    fn default_model(&self) -> &str {
        "keyword"
    }
}

fn app(provider: Arc<KeywordProvider>, static_dir: Option<&str>) -> axum::Router {
    let mut cfg = Config::default();
    cfg.provider.api_key = "test-key".into();
    if let Some(dir) = static_dir {
        cfg.server.static_dir = dir.to_string();
    }
    let state = AppState::new(cfg, provider, Arc::new(ToolRegistry::with_directives()));
    create_router(Arc::new(state))
}

fn post_chat(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn plain_text_answer_has_no_directives() {
    let resp = app(KeywordProvider::new(), None)
        .oneshot(post_chat(&json!({"message": "What is Rust?"})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["text"], "What is Rust? (1 turns)");
    assert_eq!(body["directives"], json!([]));
}

#[tokio::test]
async fn youtube_request_yields_one_directive() {
    let provider = KeywordProvider::new();
    let resp = app(provider.clone(), None)
        .oneshot(post_chat(&json!({
            "message": "Search YouTube for never gonna give you up",
            "history": []
        })))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(
        body["directives"],
        json!([{"name": "open_youtube", "args": {"query": "never gonna give you up"}}])
    );
    assert_eq!(body["text"], "Opening YouTube now.");
    assert_eq!(provider.seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn history_is_forwarded_in_order() {
    let provider = KeywordProvider::new();
    let resp = app(provider.clone(), None)
        .oneshot(post_chat(&json!({
            "message": "and now?",
            "history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let seen = provider.seen.lock().unwrap();
    let sent: Vec<(Role, String)> = seen[0]
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| (m.role.clone(), m.content.clone().unwrap_or_default()))
        .collect();
    assert_eq!(
        sent,
        vec![
            (Role::User, "hi".to_string()),
            (Role::Assistant, "hello".to_string()),
            (Role::User, "and now?".to_string()),
        ]
    );
}

#[tokio::test]
async fn non_user_history_roles_reach_the_model_as_model_turns() {
    let provider = KeywordProvider::new();
    let resp = app(provider.clone(), None)
        .oneshot(post_chat(&json!({
            "message": "go on",
            "history": [
                {"role": "system", "content": "be terse"},
                {"role": "User", "content": "shouting"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let seen = provider.seen.lock().unwrap();
    let sent: Vec<(Role, String)> = seen[0]
        .iter()
        .skip(1)
        .map(|m| (m.role.clone(), m.content.clone().unwrap_or_default()))
        .collect();
    assert_eq!(seen[0][0].role, Role::System);
    assert_eq!(
        sent,
        vec![
            (Role::Assistant, "be terse".to_string()),
            (Role::Assistant, "shouting".to_string()),
            (Role::User, "hi".to_string()),
            (Role::User, "go on".to_string()),
        ]
    );
}

#[tokio::test]
async fn missing_message_is_an_error_response() {
    let resp = app(KeywordProvider::new(), None)
        .oneshot(post_chat(&json!({"history": []})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("message"));
}

#[tokio::test]
async fn malformed_body_is_an_error_response() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app(KeywordProvider::new(), None).oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert!(!body["error"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_is_reported() {
    let resp = app(KeywordProvider::new(), None)
        .oneshot(post_chat(&json!({"message": "fail"})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    assert_eq!(
        body["error"],
        "Provider error: API error (503): model overloaded"
    );
}

#[tokio::test]
async fn concurrent_requests_do_not_share_state() {
    let router = app(KeywordProvider::new(), None);

    let a = router.clone().oneshot(post_chat(&json!({
        "message": "alpha",
        "history": [{"role": "user", "content": "a1"}, {"role": "assistant", "content": "a2"}]
    })));
    let b = router.clone().oneshot(post_chat(&json!({"message": "beta"})));
    let c = router.oneshot(post_chat(&json!({"message": "Play on YouTube for lofi"})));

    let (a, b, c) = tokio::join!(a, b, c);
    let (a, b, c) = (
        json_body(a.unwrap()).await,
        json_body(b.unwrap()).await,
        json_body(c.unwrap()).await,
    );

    assert_eq!(a["text"], "alpha (3 turns)");
    assert_eq!(a["directives"], json!([]));
    assert_eq!(b["text"], "beta (1 turns)");
    assert_eq!(b["directives"], json!([]));
    assert_eq!(c["directives"][0]["args"]["query"], "lofi");
}

#[tokio::test]
async fn health_reports_version() {
    let resp = app(KeywordProvider::new(), None)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], aura_core::VERSION);
}

#[tokio::test]
async fn serves_static_front_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>Aura</h1>").unwrap();
    std::fs::write(dir.path().join("index.js"), "console.log('aura');").unwrap();
    let router = app(KeywordProvider::new(), dir.path().to_str());

    let resp = router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<h1>Aura</h1>");

    let resp = router
        .clone()
        .oneshot(Request::builder().uri("/index.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(Request::builder().uri("/missing.css").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/chat")
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let resp = app(KeywordProvider::new(), None).oneshot(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
