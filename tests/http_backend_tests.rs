//! HttpBackend against a minimal in-process HTTP stub.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use research_desk::backend::{HttpBackend, ResearchBackend};
use research_desk::error::ClientError;
use research_desk::model::{SessionStatus, SettingsUpdate};

/// One request as seen by the stub.
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    path: String,
    body: String,
}

type Route = fn(&str, &str) -> (u16, String);

/// Serve `route` on an ephemeral port until the test ends.
async fn serve(route: Route) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                handle(stream, route, log).await;
            });
        }
    });
    (format!("http://{addr}"), seen)
}

async fn handle(mut stream: TcpStream, route: Route, log: Arc<Mutex<Vec<Seen>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let (method, path, header_len, content_length) = loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        if let Ok(httparse::Status::Complete(len)) = req.parse(&buf) {
            let content_length = req
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                .and_then(|h| std::str::from_utf8(h.value).ok())
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            break (
                req.method.unwrap_or("").to_string(),
                req.path.unwrap_or("").to_string(),
                len,
                content_length,
            );
        }
    };
    while buf.len() < header_len + content_length {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = (header_len + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_len..end]).to_string();

    let (status, payload) = route(&method, &path);
    log.lock().unwrap().push(Seen { method, path, body });

    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn backend(base: &str) -> HttpBackend {
    HttpBackend::builder(base)
        .request_timeout(Duration::from_secs(5))
        .build()
}

fn research_routes(method: &str, path: &str) -> (u16, String) {
    match (method, path) {
        ("POST", "/api/research/start") => (200, r#"{"chat_id":"abc","query":"q"}"#.into()),
        ("GET", "/api/research/status/abc") => (
            200,
            r#"{"progress":42.6,"message":"Searching","completed":false,
                "references":[{"title":"T","url":"https://example.com"}],
                "search_queries":["q1","q2"]}"#
                .into(),
        ),
        ("POST", "/api/research/stop/abc") => (200, r#"{"status":"stopped"}"#.into()),
        ("GET", "/api/chats") => (
            200,
            r#"[{"_id":"abc","query":"q","status":"completed"},{"_id":"def","query":"r"}]"#.into(),
        ),
        ("GET", "/api/chat/abc") => (
            200,
            r##"{"_id":"abc","query":"q","status":"completed","analysis":"Text [1]",
                "references":[{"title":"T","url":"#"}]}"##
                .into(),
        ),
        ("GET", "/api/chat/missing") => (404, r#"{"error":"Chat not found"}"#.into()),
        ("GET", "/api/settings") => (
            200,
            r#"{"selected_model":"gemma-7b-it","available_models":["gemma-7b-it"]}"#.into(),
        ),
        ("POST", "/api/settings") => (200, r#"{"selected_model":"mixtral-8x7b-32768"}"#.into()),
        _ => (500, "internal".into()),
    }
}

#[tokio::test]
async fn test_start_posts_query() {
    let (base, seen) = serve(research_routes).await;
    let resp = backend(&base).start_research("climate policy").await.unwrap();
    assert_eq!(resp.chat_id, "abc");

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/api/research/start");
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(body["query"], "climate policy");
}

#[tokio::test]
async fn test_status_decodes() {
    let (base, _) = serve(research_routes).await;
    let status = backend(&base).research_status("abc").await.unwrap();
    assert!((status.progress - 42.6).abs() < f64::EPSILON);
    assert_eq!(status.message, "Searching");
    assert!(!status.completed);
    assert_eq!(status.references.unwrap().len(), 1);
    assert_eq!(status.search_queries.unwrap(), vec!["q1", "q2"]);
    assert!(status.analysis.is_none());
}

#[tokio::test]
async fn test_stop_posts_to_chat_path() {
    let (base, seen) = serve(research_routes).await;
    backend(&base).stop_research("abc").await.unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].path, "/api/research/stop/abc");
}

#[tokio::test]
async fn test_list_chats_defaults_missing_status() {
    let (base, _) = serve(research_routes).await;
    let chats = backend(&base).list_chats().await.unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].status, SessionStatus::Completed);
    assert_eq!(chats[1].status, SessionStatus::InProgress);
}

#[tokio::test]
async fn test_get_chat_decodes_record() {
    let (base, _) = serve(research_routes).await;
    let chat = backend(&base).get_chat("abc").await.unwrap();
    assert_eq!(chat.id, "abc");
    assert_eq!(chat.analysis.as_deref(), Some("Text [1]"));
    assert!(!chat.references.unwrap()[0].is_valid());
}

#[tokio::test]
async fn test_http_error_carries_server_message() {
    let (base, _) = serve(research_routes).await;
    let err = backend(&base).get_chat("missing").await.unwrap_err();
    match err {
        ClientError::Http { status, detail, url } => {
            assert_eq!(status, 404);
            assert_eq!(detail.as_deref(), Some("Chat not found"));
            assert!(url.ends_with("/api/chat/missing"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_http_error_without_json_body() {
    let (base, _) = serve(research_routes).await;
    let err = backend(&base).research_status("unknown").await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 500, detail: None, .. }), "{err}");
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let (base, seen) = serve(research_routes).await;
    let backend = backend(&base);

    let current = backend.get_settings().await.unwrap();
    assert_eq!(current.selected_model, "gemma-7b-it");

    let updated = backend
        .update_settings(&SettingsUpdate {
            selected_model: "mixtral-8x7b-32768".into(),
        })
        .await
        .unwrap();
    assert_eq!(updated.selected_model, "mixtral-8x7b-32768");
    assert!(updated.available_models.is_empty());

    let seen = seen.lock().unwrap();
    let body: serde_json::Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body["selected_model"], "mixtral-8x7b-32768");
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    fn garbage(_: &str, _: &str) -> (u16, String) {
        (200, "not json".into())
    }
    let (base, _) = serve(garbage).await;
    let err = backend(&base).list_chats().await.unwrap_err();
    assert!(matches!(err, ClientError::Json { .. }), "{err}");
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let (base, seen) = serve(research_routes).await;
    let backend = backend(&format!("{base}/"));
    backend.list_chats().await.unwrap();
    assert_eq!(seen.lock().unwrap()[0].path, "/api/chats");
}
