//! Session lifecycle controller.
//!
//! Owns the single "current session" and drives it through
//! `Idle → Starting → Active → Completed | Stopped`, whichever channel
//! (push or poll) delivers the relevant event.
//!
//! ## Concurrency
//! The controller is a plain owned struct driven through `&mut self`.
//! Update sources run as tokio tasks that only send into one unbounded
//! channel; [`SessionController::next_event`] applies them one at a time.
//! Every event is checked against the current session id and phase before it
//! may mutate anything, so responses still in flight after a stop or a
//! session switch are discarded when they arrive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::backend::ResearchBackend;
use crate::error::Result;
use crate::model::{
    Analysis, ChatRecord, ChatSummary, Reference, Session, SessionStatus, UpdateEvent, MSG_COMPLETED,
    MSG_STOPPED,
};
use crate::state::StateStore;
use crate::updates::{Channel, Delivered, PollLoop, SourceHandle, UpdateSource};

/// Controller state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A start request has been issued but not acknowledged.
    Starting,
    Active,
    Completed,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Starting => write!(f, "starting"),
            Phase::Active => write!(f, "active"),
            Phase::Completed => write!(f, "completed"),
            Phase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Yes/no decision asked before abandoning a running session.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub const PROMPT_REPLACE_RUNNING: &str =
    "Research is already in progress. Do you want to stop it and start a new one?";
pub const PROMPT_NEW_CHAT: &str =
    "Research is in progress. Do you want to stop it and start a new chat?";
pub const PROMPT_SWITCH_SESSION: &str =
    "Research is in progress. Loading another chat will cancel the current research. Continue?";

/// Why an event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// The event is for a session other than the current one.
    Stale,
    /// The event is for the current session, which no longer accepts updates.
    Inactive,
}

/// Result of applying one update event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Started,
    Progress,
    Completed,
    Stopped,
    Ignored(Ignored),
}

impl Applied {
    pub fn is_ignored(self) -> bool {
        matches!(self, Applied::Ignored(_))
    }
}

pub struct SessionController {
    backend: Arc<dyn ResearchBackend>,
    poll_interval: Duration,
    phase: Phase,
    current_id: Option<String>,
    session: Option<Session>,
    /// Query of a start request awaiting acknowledgement.
    pending_query: Option<String>,
    history: Vec<ChatSummary>,
    state: StateStore,
    events_tx: UnboundedSender<Delivered>,
    events_rx: UnboundedReceiver<Delivered>,
    poller: Option<(String, SourceHandle)>,
    push: Option<SourceHandle>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn ResearchBackend>, poll_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            poll_interval,
            phase: Phase::Idle,
            current_id: None,
            session: None,
            pending_query: None,
            history: Vec::new(),
            state: StateStore::in_memory(),
            events_tx,
            events_rx,
            poller: None,
            push: None,
        }
    }

    /// Persist the current chat id through `state`.
    pub fn with_state(mut self, state: StateStore) -> Self {
        self.state = state;
        self
    }

    // -- accessors ----------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &[ChatSummary] {
        &self.history
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Id the poll loop is running for, if one is running.
    pub fn polling_for(&self) -> Option<&str> {
        self.poller
            .as_ref()
            .filter(|(_, handle)| handle.is_running())
            .map(|(id, _)| id.as_str())
    }

    pub fn is_polling(&self) -> bool {
        self.polling_for().is_some()
    }

    pub fn has_push(&self) -> bool {
        self.push.as_ref().is_some_and(SourceHandle::is_running)
    }

    /// Sender into the event channel, for additional sources.
    pub fn events_sender(&self) -> UnboundedSender<Delivered> {
        self.events_tx.clone()
    }

    fn active_id(&self) -> Option<String> {
        match self.phase {
            Phase::Active => self.current_id.clone(),
            _ => None,
        }
    }

    // -- update sources -----------------------------------------------------

    /// Attach a long-lived source such as the push listener. Replaces any
    /// previously attached one.
    pub fn attach_source(&mut self, source: Box<dyn UpdateSource>) {
        let handle = SourceHandle::start(source, self.events_tx.clone());
        info!(channel = %handle.channel(), "update source attached");
        self.push = Some(handle);
    }

    fn start_polling(&mut self, chat_id: &str) {
        self.stop_polling();
        let source = PollLoop::new(Arc::clone(&self.backend), chat_id, self.poll_interval);
        debug!(chat_id = source.chat_id(), interval = ?self.poll_interval, "poll loop started");
        let handle = SourceHandle::start(Box::new(source), self.events_tx.clone());
        self.poller = Some((chat_id.to_string(), handle));
    }

    fn stop_polling(&mut self) {
        if let Some((chat_id, handle)) = self.poller.take() {
            handle.cancel();
            debug!(chat_id = %chat_id, "poll loop cancelled");
        }
    }

    fn persist_active(&mut self, chat_id: &str) {
        if let Err(e) = self.state.set_active(chat_id) {
            warn!(error = %e, "could not persist active chat");
        }
    }

    // -- commands -----------------------------------------------------------

    /// Start a research session for `query`.
    ///
    /// Returns the new session id, or `None` when nothing happened (blank
    /// query, or the user declined to abandon a running session). On a failed
    /// start request the previous phase is restored and the error returned.
    pub async fn start_session(&mut self, query: &str, confirm: &dyn Confirm) -> Result<Option<String>> {
        let query = query.trim();
        if query.is_empty() {
            debug!("empty query, not starting research");
            return Ok(None);
        }

        if self.phase == Phase::Active {
            if !confirm.confirm(PROMPT_REPLACE_RUNNING) {
                return Ok(None);
            }
            if let Err(e) = self.stop_session().await {
                warn!(error = %e, "could not stop previous research, starting anyway");
            }
        }

        let previous = self.phase;
        self.phase = Phase::Starting;
        self.pending_query = Some(query.to_string());
        info!(query, "starting research");

        let resp = match self.backend.start_research(query).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "research start failed");
                self.phase = previous;
                self.pending_query = None;
                return Err(e);
            }
        };

        self.activate(Session::started(resp.chat_id.clone(), query));
        Ok(Some(resp.chat_id))
    }

    /// Stop the running session. Returns `false` when there was nothing to stop.
    ///
    /// On failure the session stays `Active`.
    pub async fn stop_session(&mut self) -> Result<bool> {
        let Some(chat_id) = self.active_id() else {
            return Ok(false);
        };
        if let Err(e) = self.backend.stop_research(&chat_id).await {
            warn!(error = %e, chat_id = %chat_id, "research stop failed");
            return Err(e);
        }
        self.mark_stopped();
        Ok(true)
    }

    /// Make `chat_id` the current session, fetching its full state once.
    ///
    /// A running session is resumed with polling; a finished one is shown as
    /// is. Reloading the running session refreshes it in place. Returns
    /// `false` when the user declined to abandon a running session.
    pub async fn load_session(&mut self, chat_id: &str, confirm: &dyn Confirm) -> Result<bool> {
        if let Some(active) = self.active_id() {
            if active != chat_id {
                if !confirm.confirm(PROMPT_SWITCH_SESSION) {
                    return Ok(false);
                }
                if let Err(e) = self.stop_session().await {
                    warn!(error = %e, "could not stop previous research before switching");
                }
            }
        }

        let record = self.backend.get_chat(chat_id).await?;

        if self.active_id().as_deref() == Some(chat_id) && record.status.is_running() {
            self.refresh_active(record);
            return Ok(true);
        }

        self.stop_polling();
        self.pending_query = None;
        let session = Session::from_record(record);
        info!(chat_id = %session.id, status = %session.status, "session loaded");

        if session.status.is_running() {
            self.activate(session);
        } else {
            self.phase = match session.status {
                SessionStatus::Stopped => Phase::Stopped,
                _ => Phase::Completed,
            };
            self.current_id = Some(session.id.clone());
            self.persist_active(&session.id);
            self.session = Some(session);
        }
        Ok(true)
    }

    /// Force `Idle`: forget the current session and halt reception.
    pub fn reset(&mut self) {
        self.stop_polling();
        self.phase = Phase::Idle;
        self.current_id = None;
        self.session = None;
        self.pending_query = None;
        if let Err(e) = self.state.clear_active() {
            warn!(error = %e, "could not clear active chat");
        }
    }

    /// Begin a fresh chat context, stopping a running session after
    /// confirmation. Returns `false` when the user declined.
    pub async fn new_chat(&mut self, confirm: &dyn Confirm) -> bool {
        if self.phase == Phase::Active {
            if !confirm.confirm(PROMPT_NEW_CHAT) {
                return false;
            }
            if let Err(e) = self.stop_session().await {
                warn!(error = %e, "could not stop research before new chat");
            }
        }
        self.reset();
        true
    }

    /// Refresh the chat history from the backend.
    pub async fn refresh_history(&mut self) -> Result<&[ChatSummary]> {
        self.history = self.backend.list_chats().await?;
        Ok(&self.history)
    }

    // -- events -------------------------------------------------------------

    /// Wait for the next delivered event and apply it.
    pub async fn next_event(&mut self) -> Option<(Channel, Applied)> {
        let delivered = self.events_rx.recv().await?;
        let applied = self.on_update_event(delivered.event).await;
        if applied.is_ignored() {
            debug!(channel = %delivered.channel, ?applied, "event discarded");
        }
        Some((delivered.channel, applied))
    }

    /// Apply events until the session leaves `Active`, calling `observer`
    /// after each applied (non-ignored) event.
    pub async fn follow<F>(&mut self, mut observer: F) -> Phase
    where
        F: FnMut(&Session, Applied),
    {
        while self.phase == Phase::Active {
            let Some((_, applied)) = self.next_event().await else {
                break;
            };
            if applied.is_ignored() {
                continue;
            }
            if let Some(session) = &self.session {
                observer(session, applied);
            }
        }
        self.phase
    }

    /// Apply one update event to the current session.
    pub async fn on_update_event(&mut self, event: UpdateEvent) -> Applied {
        if let UpdateEvent::Started { session_id, query } = event {
            return self.apply_started(session_id, query);
        }

        if self.current_id.as_deref() != Some(event.session_id()) {
            return Applied::Ignored(Ignored::Stale);
        }
        if self.phase != Phase::Active {
            return Applied::Ignored(Ignored::Inactive);
        }

        match event {
            UpdateEvent::Progress {
                percent,
                message,
                references,
                analysis,
                search_queries,
                ..
            } => {
                if let Some(session) = self.session.as_mut() {
                    apply_progress(session, percent, message, references, analysis, search_queries);
                }
                Applied::Progress
            }
            UpdateEvent::Completed {
                session_id,
                analysis,
                references,
            } => {
                self.complete(&session_id, analysis, references).await;
                Applied::Completed
            }
            UpdateEvent::Stopped { .. } => {
                self.mark_stopped();
                Applied::Stopped
            }
            UpdateEvent::Started { .. } => Applied::Ignored(Ignored::Stale),
        }
    }

    fn apply_started(&mut self, session_id: String, query: String) -> Applied {
        // Starting outlives start_session only when its future was dropped
        // before the acknowledgement arrived; the push channel then decides.
        if self.phase == Phase::Starting {
            let query = self.pending_query.take().unwrap_or(query);
            self.activate(Session::started(session_id, query));
            return Applied::Started;
        }
        if self.current_id.as_deref() == Some(session_id.as_str()) {
            return Applied::Ignored(Ignored::Inactive);
        }
        Applied::Ignored(Ignored::Stale)
    }

    // -- transitions --------------------------------------------------------

    fn activate(&mut self, session: Session) {
        let chat_id = session.id.clone();
        info!(chat_id = %chat_id, "session active");
        self.phase = Phase::Active;
        self.pending_query = None;
        self.current_id = Some(chat_id.clone());
        self.remember_in_history(&session);
        self.session = Some(session);
        self.persist_active(&chat_id);
        self.start_polling(&chat_id);
    }

    /// Fold a re-fetched record of the running session into the one already
    /// held, so progress and gathered fields never go backwards.
    fn refresh_active(&mut self, record: ChatRecord) {
        let fetched = Session::from_record(record);
        if let Some(session) = self.session.as_mut() {
            apply_progress(
                session,
                fetched.progress,
                String::new(),
                Some(fetched.references),
                fetched.analysis.text().map(str::to_string),
                Some(fetched.search_queries),
            );
            debug!(chat_id = %session.id, progress = session.progress, "running session refreshed");
        }
        if self.polling_for() != Some(fetched.id.as_str()) {
            self.start_polling(&fetched.id);
        }
    }

    async fn complete(&mut self, chat_id: &str, analysis: Option<String>, references: Option<Vec<Reference>>) {
        self.stop_polling();

        let mut analysis = Analysis::from_option(analysis);
        let mut references = references.filter(|r| !r.is_empty());

        if analysis == Analysis::Pending {
            if let Some(text) = self.session.as_ref().and_then(|s| s.analysis.text()) {
                analysis = Analysis::Ready(text.to_string());
            }
        }
        if analysis == Analysis::Pending {
            // One fallback fetch of the full record before giving up.
            match self.backend.get_chat(chat_id).await {
                Ok(record) => {
                    analysis = Analysis::from_option(record.analysis);
                    if references.is_none() {
                        references = record.references.filter(|r| !r.is_empty());
                    }
                }
                Err(e) => warn!(error = %e, chat_id, "analysis fallback fetch failed"),
            }
        }
        if analysis == Analysis::Pending {
            warn!(chat_id, "research completed without analysis");
            analysis = Analysis::Unavailable;
        }

        if let Some(session) = self.session.as_mut() {
            session.status = SessionStatus::Completed;
            session.progress = 100;
            session.message = MSG_COMPLETED.to_string();
            session.analysis = analysis;
            if let Some(refs) = references {
                session.references = refs;
            }
        }
        self.phase = Phase::Completed;
        self.set_history_status(chat_id, SessionStatus::Completed);
        info!(chat_id, "research completed");
    }

    fn mark_stopped(&mut self) {
        self.stop_polling();
        self.phase = Phase::Stopped;
        if let Some(session) = self.session.as_mut() {
            session.status = SessionStatus::Stopped;
            session.progress = 0;
            session.message = MSG_STOPPED.to_string();
        }
        if let Some(chat_id) = self.current_id.clone() {
            self.set_history_status(&chat_id, SessionStatus::Stopped);
            info!(chat_id = %chat_id, "research stopped");
        }
    }

    fn remember_in_history(&mut self, session: &Session) {
        if self.history.iter().any(|c| c.id == session.id) {
            return;
        }
        self.history.insert(
            0,
            ChatSummary {
                id: session.id.clone(),
                query: session.query.clone(),
                status: session.status,
            },
        );
    }

    fn set_history_status(&mut self, chat_id: &str, status: SessionStatus) {
        if let Some(entry) = self.history.iter_mut().find(|c| c.id == chat_id) {
            entry.status = status;
        }
    }
}

/// Fold a progress update into `session`. Percent regressions within one
/// session are ignored; message, references and analysis always take the
/// latest non-empty value.
fn apply_progress(
    session: &mut Session,
    percent: u8,
    message: String,
    references: Option<Vec<Reference>>,
    analysis: Option<String>,
    search_queries: Option<Vec<String>>,
) {
    if percent >= session.progress {
        session.progress = percent;
    } else {
        debug!(chat_id = %session.id, from = session.progress, to = percent, "ignoring progress regression");
    }
    if !message.is_empty() {
        session.message = message;
    }
    if let Some(refs) = references.filter(|r| !r.is_empty()) {
        session.references = refs;
    }
    if let Some(queries) = search_queries.filter(|q| !q.is_empty()) {
        session.search_queries = queries;
    }
    if let Analysis::Ready(text) = Analysis::from_option(analysis) {
        session.analysis = Analysis::Ready(text);
    }
}
