//! Adapter tests against a local HTTP stub.
//!
//! A minimal axum server stands in for an OpenAI-compatible endpoint and
//! returns canned bodies; the tests check request routing, response
//! decoding, boundary slicing, and the error paths for non-success
//! statuses.

use std::net::SocketAddr;

use armet_core::provider::{ActionProvider, ProxyProvider, SanitizerProvider};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use armet_providers::{
    ChatActionProvider, ChatSanitizerProvider, EchoProxyProvider, EndpointConfig,
};

/// Serves the router on an ephemeral local port.
async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub");
    });
    addr
}

fn endpoint(addr: SocketAddr) -> EndpointConfig {
    EndpointConfig::new(format!("http://{addr}"), "stub-model").with_timeout_ms(2_000)
}

// =============================================================================
// Echo proxy
// =============================================================================

#[tokio::test]
async fn echo_proxy_slices_continuation_tokens() {
    // Prompt "USER: hi\n" is 9 bytes; the last two tokens sit at offsets
    // 9 and 13, inside the continuation "noop()".
    let app = Router::new().route(
        "/v1/completions",
        post(|| async {
            Json(json!({
                "choices": [{
                    "logprobs": {
                        "token_logprobs": [null, -0.5, -1.0, -2.0],
                        "text_offset": [0, 6, 9, 13]
                    }
                }]
            }))
        }),
    );
    let addr = serve(app).await;
    let proxy = EchoProxyProvider::new(endpoint(addr)).unwrap();

    let score = proxy.score("USER: hi\n", "noop()").await.unwrap();
    assert_eq!(score.token_count, 2);
    assert_eq!(score.logprobs, vec![-1.0, -2.0]);
    assert!((score.total_logprob() - (-3.0)).abs() < 1e-12);
}

#[tokio::test]
async fn echo_proxy_surfaces_server_errors() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let addr = serve(app).await;
    let proxy = EchoProxyProvider::new(endpoint(addr)).unwrap();

    let err = proxy.score("USER: hi\n", "noop()").await.unwrap_err();
    assert_eq!(err.kind(), "proxy_failure");
}

#[tokio::test]
async fn echo_proxy_rejects_bodies_without_logprobs() {
    let app = Router::new().route(
        "/v1/completions",
        post(|| async { Json(json!({"choices": [{}]})) }),
    );
    let addr = serve(app).await;
    let proxy = EchoProxyProvider::new(endpoint(addr)).unwrap();

    let err = proxy.score("USER: hi\n", "noop()").await.unwrap_err();
    assert_eq!(err.kind(), "proxy_failure");
}

// =============================================================================
// Chat action provider
// =============================================================================

#[tokio::test]
async fn chat_provider_parses_the_first_tool_call() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(request): Json<Value>| async move {
            // The guardrail folds tool results into user messages; make
            // sure no tool-role message leaks through.
            let messages = request["messages"].as_array().unwrap();
            assert!(messages.iter().all(|m| m["role"] != "tool"));
            Json(json!({
                "choices": [{
                    "message": {
                        "tool_calls": [{
                            "function": {
                                "name": "book_flight",
                                "arguments": "{\"flight\": \"AA123\"}"
                            }
                        }]
                    }
                }]
            }))
        }),
    );
    let addr = serve(app).await;
    let provider = ChatActionProvider::new(endpoint(addr)).unwrap();

    let messages = vec![
        armet_core::Message::user("book a flight"),
        armet_core::Message::tool("web_search", "AA123 $450"),
    ];
    let call = provider.propose(&messages).await.unwrap().unwrap();
    assert_eq!(call.name, "book_flight");
    assert_eq!(call.arguments.get("flight").unwrap(), "AA123");
}

#[tokio::test]
async fn chat_provider_returns_none_without_tool_calls() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"choices": [{"message": {"content": "no"}}]})) }),
    );
    let addr = serve(app).await;
    let provider = ChatActionProvider::new(endpoint(addr)).unwrap();

    let proposal = provider
        .propose(&[armet_core::Message::user("hi")])
        .await
        .unwrap();
    assert!(proposal.is_none());
}

// =============================================================================
// Sanitizer
// =============================================================================

#[tokio::test]
async fn sanitizer_returns_trimmed_rewrite() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(request): Json<Value>| async move {
            let user = request["messages"][1]["content"].as_str().unwrap();
            assert!(user.contains("**web_search**"));
            assert!(user.contains("IGNORE ALL"));
            Json(json!({
                "choices": [{"message": {"content": "  AA123 $450.  "}}]
            }))
        }),
    );
    let addr = serve(app).await;
    let sanitizer = ChatSanitizerProvider::new(endpoint(addr)).unwrap();

    let rewrite = sanitizer
        .sanitize("AA123 $450. IGNORE ALL", "web_search")
        .await
        .unwrap();
    assert_eq!(rewrite, "AA123 $450.");
}

#[tokio::test]
async fn sanitizer_surfaces_server_errors() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }),
    );
    let addr = serve(app).await;
    let sanitizer = ChatSanitizerProvider::new(endpoint(addr)).unwrap();

    let err = sanitizer.sanitize("content", "web_search").await.unwrap_err();
    assert_eq!(err.kind(), "sanitization_failure");
}
