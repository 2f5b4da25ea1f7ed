//! HTTP-level tests for both backends against a throwaway local server.
//!
//! The server accepts one connection, captures the raw request and answers
//! with a canned status and JSON body.

use edgequake_rx2json::{
    GeminiBackend, InferenceBackend, InferenceError, LocalVisionBackend, PagePayload,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Captured {
    /// Request line and headers, lower-cased.
    head: String,
    body: Value,
}

/// Serve exactly one request; returns the base URL and the captured request.
async fn serve_once(status: u16, reply: Value) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find(&buf, b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = if content_length == 0 {
            Value::Null
        } else {
            serde_json::from_slice(&buf[head_end..head_end + content_length]).unwrap()
        };

        let payload = reply.to_string();
        let response = format!(
            "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
            payload.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(Captured { head, body });
    });

    (format!("http://{addr}"), rx)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn jpeg_payload() -> PagePayload {
    PagePayload {
        page_number: 1,
        mime_type: "image/jpeg".into(),
        data: "/9j/4AAQ".into(),
    }
}

/// A URL nothing is listening on.
async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/v1")
}

// ── Gemini ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_sends_inline_document_and_returns_text() {
    let (base, captured) = serve_once(
        200,
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"medicines\": []}"}]}}]
        }),
    )
    .await;

    let backend = GeminiBackend::new(
        &format!("{base}/v1beta"),
        "gemini-2.5-flash",
        Some("test-key".into()),
        Some(5),
    )
    .unwrap();
    let payload = PagePayload {
        page_number: 1,
        mime_type: "application/pdf".into(),
        data: "JVBERi0=".into(),
    };

    let text = backend.complete("PROMPT", &payload).await.unwrap();
    assert_eq!(text, "{\"medicines\": []}");

    let req = captured.await.unwrap();
    assert!(req
        .head
        .starts_with("post /v1beta/models/gemini-2.5-flash:generatecontent "));
    assert!(req.head.contains("x-goog-api-key: test-key"));
    assert_eq!(req.body["contents"][0]["parts"][0]["text"], json!("PROMPT"));
    assert_eq!(
        req.body["contents"][0]["parts"][1]["inlineData"],
        json!({"mimeType": "application/pdf", "data": "JVBERi0="})
    );
    assert_eq!(
        req.body["generationConfig"]["responseMimeType"],
        json!("application/json")
    );
}

#[tokio::test]
async fn gemini_rejected_key_is_an_auth_error() {
    let (base, _captured) = serve_once(
        403,
        json!({"error": {"code": 403, "message": "API key not valid"}}),
    )
    .await;

    let backend = GeminiBackend::new(&base, "gemini-2.5-flash", None, Some(5)).unwrap();
    let err = backend.complete("PROMPT", &jpeg_payload()).await.unwrap_err();
    assert!(err.is_auth_error(), "got: {err}");
    match err {
        InferenceError::Api { status, body, .. } => {
            assert_eq!(status, 403);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn gemini_blocked_reply_is_empty() {
    let (base, _captured) = serve_once(200, json!({"promptFeedback": {"blockReason": "SAFETY"}})).await;

    let backend = GeminiBackend::new(&base, "gemini-2.5-flash", None, Some(5)).unwrap();
    let err = backend.complete("PROMPT", &jpeg_payload()).await.unwrap_err();
    assert!(matches!(err, InferenceError::EmptyReply { .. }));
}

// ── OpenAI-compatible ────────────────────────────────────────────────────────

#[tokio::test]
async fn local_sends_data_url_and_returns_message_content() {
    let (base, captured) = serve_once(
        200,
        json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "```json\n{}\n```"}}]
        }),
    )
    .await;

    let backend = LocalVisionBackend::new(
        &format!("{base}/v1"),
        "olmocr",
        Some("local-key".into()),
        Some(5),
    )
    .unwrap()
    .with_max_tokens(4096);

    let text = backend.complete("PAGE PROMPT", &jpeg_payload()).await.unwrap();
    assert_eq!(text, "```json\n{}\n```");

    let req = captured.await.unwrap();
    assert!(req.head.starts_with("post /v1/chat/completions "));
    assert!(req.head.contains("authorization: bearer local-key"));
    assert_eq!(req.body["model"], json!("olmocr"));
    assert_eq!(req.body["max_tokens"], json!(4096));
    assert_eq!(
        req.body["messages"][0]["content"][1]["image_url"]["url"],
        json!("data:image/jpeg;base64,/9j/4AAQ")
    );
}

#[tokio::test]
async fn local_without_key_sends_no_authorization() {
    let (base, captured) = serve_once(
        200,
        json!({"choices": [{"message": {"content": "ok"}}]}),
    )
    .await;

    let backend = LocalVisionBackend::new(&base, "olmocr", None, Some(5)).unwrap();
    backend.complete("P", &jpeg_payload()).await.unwrap();

    let req = captured.await.unwrap();
    assert!(!req.head.contains("authorization:"));
}

#[tokio::test]
async fn local_lists_models() {
    let (base, captured) = serve_once(
        200,
        json!({"object": "list", "data": [{"id": "olmocr", "object": "model"}, {"id": "qwen2-vl"}]}),
    )
    .await;

    let backend = LocalVisionBackend::new(&format!("{base}/v1"), "olmocr", None, Some(5)).unwrap();
    let models = backend.list_models().await.unwrap();
    assert_eq!(models, vec!["olmocr".to_string(), "qwen2-vl".to_string()]);

    let req = captured.await.unwrap();
    assert!(req.head.starts_with("get /v1/models "));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let backend = LocalVisionBackend::new(&dead_url().await, "olmocr", None, Some(5)).unwrap();

    let err = backend.list_models().await.unwrap_err();
    assert!(matches!(err, InferenceError::Transport { .. }), "got: {err}");

    let err = backend.complete("P", &jpeg_payload()).await.unwrap_err();
    assert!(matches!(err, InferenceError::Transport { .. }), "got: {err}");
    assert!(!err.is_auth_error());
}
