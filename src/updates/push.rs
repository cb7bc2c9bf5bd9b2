//! WebSocket push listener.
//!
//! The backend sends text frames shaped `{"event": <name>, "data": {...}}`
//! where `data` mirrors the status payload plus `chat_id`.

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Channel, Delivered, UpdateSource};
use crate::error::{ClientError, Result};
use crate::model::{ResearchStatus, UpdateEvent};

pub const EVENT_STARTED: &str = "research_started";
pub const EVENT_PROGRESS: &str = "research_progress";
pub const EVENT_COMPLETE: &str = "research_complete";
pub const EVENT_STOPPED: &str = "research_stopped";

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    chat_id: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(flatten)]
    status: ResearchStatus,
}

/// Decode one push frame. Unknown event names and malformed frames yield
/// `None`.
pub fn parse_push_message(text: &str) -> Option<UpdateEvent> {
    let envelope: PushEnvelope = serde_json::from_str(text).ok()?;
    let payload: PushPayload = serde_json::from_value(envelope.data).ok()?;
    let PushPayload {
        chat_id,
        query,
        mut status,
    } = payload;

    let event = match envelope.event.as_str() {
        EVENT_STARTED => UpdateEvent::Started {
            session_id: chat_id,
            query: query.unwrap_or_default(),
        },
        EVENT_PROGRESS => {
            status.completed = false;
            UpdateEvent::from_status(&chat_id, status)
        }
        EVENT_COMPLETE => UpdateEvent::Completed {
            session_id: chat_id,
            analysis: status.analysis,
            references: status.references,
        },
        EVENT_STOPPED => UpdateEvent::Stopped { session_id: chat_id },
        other => {
            debug!(event = other, "ignoring unknown push event");
            return None;
        }
    };
    Some(event)
}

/// An open push connection, ready to be spawned as an [`UpdateSource`].
pub struct PushListener {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushListener {
    /// Open the WebSocket. Failure means push is unavailable and the caller
    /// should rely on polling alone.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _resp) = connect_async(url).await.map_err(|e| ClientError::Push {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        info!(%url, "push channel connected");
        Ok(Self {
            url: url.to_string(),
            stream,
        })
    }

    async fn run(mut self, tx: UnboundedSender<Delivered>) {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    let Some(event) = parse_push_message(&text) else {
                        continue;
                    };
                    debug!(chat_id = event.session_id(), kind = event.kind(), "push event");
                    if tx
                        .send(Delivered {
                            channel: Channel::Push,
                            event,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, url = %self.url, "push channel error");
                    break;
                }
            }
        }
        warn!(url = %self.url, "push channel closed, continuing with polling only");
    }
}

impl UpdateSource for PushListener {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn spawn(self: Box<Self>, tx: UnboundedSender<Delivered>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }
}
