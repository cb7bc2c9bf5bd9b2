//! Wire types for the research backend and the client-side session record.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

/// Persisted status of a chat as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    #[default]
    InProgress,
    Completed,
    Stopped,
}

impl SessionStatus {
    /// Statuses for which the backend may still produce updates.
    pub fn is_running(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::InProgress)
    }

    /// Short label for history listings.
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Pending => "Pending",
            SessionStatus::InProgress => "In progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::InProgress => write!(f, "in_progress"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Placeholder url the research agent emits when a source has no link.
pub const PLACEHOLDER_URL: &str = "#";
/// Substring that marks a url built from a missing value.
pub const UNDEFINED_SENTINEL: &str = "undefined";

/// One source gathered during research.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Reference {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
        }
    }

    /// A reference is linkable only when its url is present and non-empty, is
    /// not the placeholder and does not contain the `undefined` sentinel.
    pub fn is_valid(&self) -> bool {
        match self.url.as_deref() {
            Some(url) => {
                !url.is_empty() && url != PLACEHOLDER_URL && !url.contains(UNDEFINED_SENTINEL)
            }
            None => false,
        }
    }

    /// The url when [`is_valid`](Self::is_valid), otherwise `None`.
    pub fn link(&self) -> Option<&str> {
        if self.is_valid() {
            self.url.as_deref()
        } else {
            None
        }
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => "Untitled",
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StartRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    pub chat_id: String,
    #[serde(default)]
    pub query: Option<String>,
}

/// Body of `GET /api/research/status/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchStatus {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub references: Option<Vec<Reference>>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub search_queries: Option<Vec<String>>,
    /// Set by the backend when the research workflow raised.
    #[serde(default)]
    pub error: Option<String>,
}

/// One entry of `GET /api/chats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub status: SessionStatus,
}

/// Body of `GET /api/chat/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub references: Option<Vec<Reference>>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub search_queries: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub selected_model: String,
    #[serde(default)]
    pub available_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsUpdate {
    pub selected_model: String,
}

// ---------------------------------------------------------------------------
// Update events
// ---------------------------------------------------------------------------

/// A state change for one session, delivered by the push channel or
/// synthesised from a poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    Started {
        session_id: String,
        query: String,
    },
    Progress {
        session_id: String,
        percent: u8,
        message: String,
        references: Option<Vec<Reference>>,
        analysis: Option<String>,
        search_queries: Option<Vec<String>>,
    },
    Completed {
        session_id: String,
        analysis: Option<String>,
        references: Option<Vec<Reference>>,
    },
    Stopped {
        session_id: String,
    },
}

impl UpdateEvent {
    pub fn session_id(&self) -> &str {
        match self {
            UpdateEvent::Started { session_id, .. }
            | UpdateEvent::Progress { session_id, .. }
            | UpdateEvent::Completed { session_id, .. }
            | UpdateEvent::Stopped { session_id } => session_id,
        }
    }

    /// Event tag as used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateEvent::Started { .. } => "started",
            UpdateEvent::Progress { .. } => "progress",
            UpdateEvent::Completed { .. } => "completed",
            UpdateEvent::Stopped { .. } => "stopped",
        }
    }

    /// Convert a poll response into the event it represents.
    ///
    /// `completed = true` wins over everything else. A status carrying an
    /// `error` becomes a progress event whose message is the failure text.
    pub fn from_status(session_id: &str, status: ResearchStatus) -> Self {
        if status.completed {
            return UpdateEvent::Completed {
                session_id: session_id.to_string(),
                analysis: status.analysis,
                references: status.references,
            };
        }
        let message = match status.error {
            Some(err) if status.message.is_empty() => format!("Research failed: {err}"),
            _ => status.message,
        };
        UpdateEvent::Progress {
            session_id: session_id.to_string(),
            percent: clamp_percent(status.progress),
            message,
            references: status.references,
            analysis: status.analysis,
            search_queries: status.search_queries,
        }
    }
}

/// Round a wire progress value into `0..=100`; non-finite values become 0.
pub fn clamp_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Client-side session record
// ---------------------------------------------------------------------------

/// Progress shown right after the backend accepts a start request.
pub const START_PROGRESS: u8 = 5;
/// Progress shown for a running session loaded from history.
pub const RESUMED_PROGRESS: u8 = 50;

pub const MSG_STARTING: &str = "Starting research...";
pub const MSG_IN_PROGRESS: &str = "Research in progress...";
pub const MSG_COMPLETED: &str = "Research completed";
pub const MSG_STOPPED: &str = "Research stopped";

/// Analysis text as far as the client knows it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Analysis {
    /// Not produced yet.
    #[default]
    Pending,
    Ready(String),
    /// The session completed but neither the completion payload nor the
    /// fallback fetch carried any analysis.
    Unavailable,
}

impl Analysis {
    pub fn text(&self) -> Option<&str> {
        match self {
            Analysis::Ready(text) => Some(text),
            _ => None,
        }
    }

    /// `Ready` for non-blank text, `Pending` otherwise.
    pub fn from_option(text: Option<String>) -> Self {
        match text {
            Some(t) if !t.trim().is_empty() => Analysis::Ready(t),
            _ => Analysis::Pending,
        }
    }
}

/// The one research session the controller is tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub query: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub message: String,
    pub references: Vec<Reference>,
    pub search_queries: Vec<String>,
    pub analysis: Analysis,
}

impl Session {
    /// A session the backend has just accepted.
    pub fn started(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            status: SessionStatus::InProgress,
            progress: START_PROGRESS,
            message: MSG_STARTING.to_string(),
            references: Vec::new(),
            search_queries: Vec::new(),
            analysis: Analysis::Pending,
        }
    }

    /// A session rebuilt from its persisted record.
    pub fn from_record(record: ChatRecord) -> Self {
        let (progress, message) = match record.status {
            SessionStatus::Pending | SessionStatus::InProgress => (RESUMED_PROGRESS, MSG_IN_PROGRESS),
            SessionStatus::Completed => (100, MSG_COMPLETED),
            SessionStatus::Stopped => (0, MSG_STOPPED),
        };
        let analysis = match (record.status, Analysis::from_option(record.analysis)) {
            (SessionStatus::Completed, Analysis::Pending) => Analysis::Unavailable,
            (_, analysis) => analysis,
        };
        Self {
            id: record.id,
            query: record.query,
            status: record.status,
            progress,
            message: message.to_string(),
            references: record.references.unwrap_or_default(),
            search_queries: record.search_queries.unwrap_or_default(),
            analysis,
        }
    }

    /// Number of references that can be rendered as links.
    pub fn valid_reference_count(&self) -> usize {
        self.references.iter().filter(|r| r.is_valid()).count()
    }
}
