//! Update sources: the poll loop and the optional push listener.
//!
//! Both run as tokio tasks that only send [`Delivered`] events into the
//! controller's channel; neither touches session state. The controller
//! applies events one at a time and discards stale ones.

pub mod poll;
pub mod push;

pub use poll::PollLoop;
pub use push::{parse_push_message, PushListener};

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::model::UpdateEvent;

/// Which channel produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Poll,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Push => write!(f, "push"),
            Channel::Poll => write!(f, "poll"),
        }
    }
}

/// An event together with the channel that delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub channel: Channel,
    pub event: UpdateEvent,
}

/// Something that produces update events in the background.
pub trait UpdateSource: Send {
    fn channel(&self) -> Channel;

    /// Start producing events into `tx`. The task ends on its own when the
    /// source is exhausted or `tx` is closed.
    fn spawn(self: Box<Self>, tx: UnboundedSender<Delivered>) -> JoinHandle<()>;
}

/// Owned handle to a running source. Dropping it aborts the task.
#[derive(Debug)]
pub struct SourceHandle {
    channel: Channel,
    handle: JoinHandle<()>,
}

impl SourceHandle {
    pub fn start(source: Box<dyn UpdateSource>, tx: UnboundedSender<Delivered>) -> Self {
        let channel = source.channel();
        Self {
            channel,
            handle: source.spawn(tx),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
