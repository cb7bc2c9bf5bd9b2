//! Push listener against an in-process WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use common::MockBackend;
use research_desk::controller::{Applied, Phase, SessionController};
use research_desk::model::Analysis;
use research_desk::updates::{Channel, PushListener};

/// Long enough that the poll loop never fires during a test.
const NEVER: Duration = Duration::from_secs(3600);

/// How the server ends the connection after sending its frames.
#[derive(Clone, Copy)]
enum Ending {
    /// Close handshake.
    Close,
    /// Drop the TCP stream without a close frame.
    Drop,
}

/// Accept one WebSocket client, send `frames`, then end as `ending` says.
async fn serve_frames(frames: Vec<String>, ending: Ending) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(WsMessage::Text(frame)).await.unwrap();
        }
        match ending {
            Ending::Close => {
                let _ = ws.close(None).await;
                while ws.next().await.is_some() {}
            }
            Ending::Drop => drop(ws),
        }
    });
    format!("ws://{addr}/events")
}

fn yes(_: &str) -> bool {
    true
}

async fn next(ctl: &mut SessionController) -> (Channel, Applied) {
    tokio::time::timeout(Duration::from_secs(2), ctl.next_event())
        .await
        .expect("no event within 2s")
        .expect("event channel closed")
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_push_alone_completes_session() {
    let url = serve_frames(
        vec![
            r#"{"event":"research_progress","data":{"chat_id":"42","progress":60,"message":"Analyzing"}}"#.into(),
            r#"{"event":"research_complete","data":{"chat_id":"42","analysis":"Result [1]","references":[{"title":"T","url":"https://example.com/t"}]}}"#.into(),
        ],
        Ending::Close,
    )
    .await;
    let backend = Arc::new(MockBackend::new().with_next_id("42"));
    let mut ctl = SessionController::new(backend.clone(), NEVER);
    ctl.attach_source(Box::new(PushListener::connect(&url).await.unwrap()));

    ctl.start_session("climate policy", &yes).await.unwrap();

    assert_eq!(next(&mut ctl).await, (Channel::Push, Applied::Progress));
    assert_eq!(ctl.session().unwrap().progress, 60);
    assert_eq!(next(&mut ctl).await, (Channel::Push, Applied::Completed));

    assert_eq!(ctl.phase(), Phase::Completed);
    let session = ctl.session().unwrap();
    assert_eq!(session.progress, 100);
    assert_eq!(session.analysis, Analysis::Ready("Result [1]".into()));
    assert_eq!(session.references.len(), 1);
    assert!(!ctl.is_polling());
    assert_eq!(backend.count_calls("status:"), 0);
}

#[tokio::test]
async fn test_follow_driven_by_push() {
    let url = serve_frames(
        vec![
            r#"{"event":"research_progress","data":{"chat_id":"7","progress":30}}"#.into(),
            r#"{"event":"research_stopped","data":{"chat_id":"7"}}"#.into(),
        ],
        Ending::Close,
    )
    .await;
    let backend = Arc::new(MockBackend::new().with_next_id("7"));
    let mut ctl = SessionController::new(backend, NEVER);
    ctl.attach_source(Box::new(PushListener::connect(&url).await.unwrap()));
    ctl.start_session("q", &yes).await.unwrap();

    let mut seen = Vec::new();
    let phase = tokio::time::timeout(
        Duration::from_secs(2),
        ctl.follow(|_, applied| seen.push(applied)),
    )
    .await
    .unwrap();

    assert_eq!(phase, Phase::Stopped);
    assert_eq!(seen, vec![Applied::Progress, Applied::Stopped]);
    assert_eq!(ctl.session().unwrap().progress, 0);
}

#[tokio::test]
async fn test_close_frame_ends_listener() {
    let url = serve_frames(vec![], Ending::Close).await;
    let backend = Arc::new(MockBackend::new());
    let mut ctl = SessionController::new(backend, NEVER);
    ctl.attach_source(Box::new(PushListener::connect(&url).await.unwrap()));

    assert!(wait_until(|| !ctl.has_push()).await, "listener still running");
}

#[tokio::test]
async fn test_dropped_connection_ends_listener_after_delivering_frames() {
    let url = serve_frames(
        vec![
            "not json".into(),
            r#"{"event":"research_stopped","data":{"chat_id":"9"}}"#.into(),
        ],
        Ending::Drop,
    )
    .await;
    let backend = Arc::new(MockBackend::new().with_next_id("9"));
    let mut ctl = SessionController::new(backend, NEVER);
    ctl.attach_source(Box::new(PushListener::connect(&url).await.unwrap()));
    ctl.start_session("q", &yes).await.unwrap();

    // The malformed frame is skipped; the next one still arrives.
    assert_eq!(next(&mut ctl).await, (Channel::Push, Applied::Stopped));
    assert!(wait_until(|| !ctl.has_push()).await, "listener still running");
    assert_eq!(ctl.phase(), Phase::Stopped);
}
