//! Recurring status poll for one session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{Channel, Delivered, UpdateSource};
use crate::backend::ResearchBackend;
use crate::model::UpdateEvent;

/// Consecutive failures after which poll errors are logged at error level.
const LOUD_FAILURE_THRESHOLD: u32 = 5;

/// Polls `GET /api/research/status/{id}` every `interval`.
///
/// The first request goes out one interval after start. The loop ends by
/// itself after delivering a completion, or when the receiver is gone;
/// otherwise it runs until its [`SourceHandle`](super::SourceHandle) is
/// dropped.
pub struct PollLoop {
    backend: Arc<dyn ResearchBackend>,
    chat_id: String,
    interval: Duration,
}

impl PollLoop {
    pub fn new(backend: Arc<dyn ResearchBackend>, chat_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            backend,
            chat_id: chat_id.into(),
            interval,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn run(self, tx: UnboundedSender<Delivered>) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut consecutive_failures: u32 = 0;

        loop {
            ticker.tick().await;

            match self.backend.research_status(&self.chat_id).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    if let Some(err) = status.error.as_deref() {
                        warn!(chat_id = %self.chat_id, error = err, "backend reported research failure");
                    }
                    let event = UpdateEvent::from_status(&self.chat_id, status);
                    let done = matches!(event, UpdateEvent::Completed { .. });
                    debug!(chat_id = %self.chat_id, kind = event.kind(), "poll response");

                    if tx
                        .send(Delivered {
                            channel: Channel::Poll,
                            event,
                        })
                        .is_err()
                    {
                        break;
                    }
                    if done {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);

                    if consecutive_failures >= LOUD_FAILURE_THRESHOLD {
                        error!(
                            error = %e,
                            chat_id = %self.chat_id,
                            consecutive_failures,
                            "status poll failed repeatedly, will retry next tick"
                        );
                    } else {
                        warn!(
                            error = %e,
                            chat_id = %self.chat_id,
                            "status poll failed, will retry next tick"
                        );
                    }
                }
            }
        }
    }
}

impl UpdateSource for PollLoop {
    fn channel(&self) -> Channel {
        Channel::Poll
    }

    fn spawn(self: Box<Self>, tx: UnboundedSender<Delivered>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }
}
