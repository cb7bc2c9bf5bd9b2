//! Persisted client state: the last active chat id.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub active_chat_id: Option<String>,
}

/// JSON-file backed [`ClientState`]. Without a path it lives in memory only.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: ClientState,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing file is an empty state; an
    /// unreadable or corrupt one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match read_state(&path) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable client state");
                ClientState::default()
            }
        };
        Self {
            path: Some(path),
            state,
        }
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.state.active_chat_id.as_deref()
    }

    pub fn set_active(&mut self, chat_id: &str) -> Result<()> {
        if self.active_chat_id() == Some(chat_id) {
            return Ok(());
        }
        self.state.active_chat_id = Some(chat_id.to_string());
        self.save()
    }

    pub fn clear_active(&mut self) -> Result<()> {
        if self.state.active_chat_id.take().is_none() {
            return Ok(());
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let err = |detail: String| ClientError::State {
            path: path.display().to_string(),
            detail,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| err(e.to_string()))
    }
}

fn read_state(path: &Path) -> Result<ClientState> {
    let err = |detail: String| ClientError::State {
        path: path.display().to_string(),
        detail,
    };
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| err(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientState::default()),
        Err(e) => Err(err(e.to_string())),
    }
}
