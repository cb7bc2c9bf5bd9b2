//! Shared test doubles: a scripted in-memory research backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use research_desk::backend::ResearchBackend;
use research_desk::error::{ClientError, Result};
use research_desk::model::{
    ChatRecord, ChatSummary, Reference, ResearchStatus, SessionStatus, Settings, SettingsUpdate,
    StartResponse,
};

#[derive(Default)]
pub struct MockBackend {
    /// Ids handed out by start_research, in order. A random id when empty.
    pub next_ids: Mutex<VecDeque<String>>,
    /// Scripted poll responses per chat id.
    pub statuses: Mutex<HashMap<String, VecDeque<ResearchStatus>>>,
    pub chats: Mutex<HashMap<String, ChatRecord>>,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    pub settings: Mutex<Option<Settings>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next_id(self, id: &str) -> Self {
        self.next_ids.lock().unwrap().push_back(id.to_string());
        self
    }

    pub fn with_chat(self, record: ChatRecord) -> Self {
        self.chats.lock().unwrap().insert(record.id.clone(), record);
        self
    }

    pub fn script(&self, chat_id: &str, statuses: Vec<ResearchStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), statuses.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn record(id: &str, query: &str, status: SessionStatus) -> ChatRecord {
    ChatRecord {
        id: id.to_string(),
        query: query.to_string(),
        status,
        references: None,
        analysis: None,
        search_queries: None,
    }
}

pub fn progress(percent: f64, message: &str) -> ResearchStatus {
    ResearchStatus {
        progress: percent,
        message: message.to_string(),
        ..Default::default()
    }
}

pub fn completed(analysis: Option<&str>, references: Vec<Reference>) -> ResearchStatus {
    ResearchStatus {
        progress: 100.0,
        message: "Research completed".to_string(),
        completed: true,
        analysis: analysis.map(str::to_string),
        references: Some(references),
        ..Default::default()
    }
}

fn http(status: u16, url: &str, detail: &str) -> ClientError {
    ClientError::Http {
        status,
        url: url.to_string(),
        detail: Some(detail.to_string()),
    }
}

#[async_trait]
impl ResearchBackend for MockBackend {
    async fn start_research(&self, query: &str) -> Result<StartResponse> {
        self.record(format!("start:{query}"));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ClientError::Connect {
                url: "mock/api/research/start".into(),
                detail: "connection refused".into(),
            });
        }
        let id = self
            .next_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.chats
            .lock()
            .unwrap()
            .insert(id.clone(), record(&id, query, SessionStatus::InProgress));
        Ok(StartResponse {
            chat_id: id,
            query: Some(query.to_string()),
        })
    }

    async fn research_status(&self, chat_id: &str) -> Result<ResearchStatus> {
        self.record(format!("status:{chat_id}"));
        let next = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(chat_id)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| progress(10.0, "Researching")))
    }

    async fn stop_research(&self, chat_id: &str) -> Result<()> {
        self.record(format!("stop:{chat_id}"));
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(http(500, "mock/api/research/stop", "boom"));
        }
        if let Some(chat) = self.chats.lock().unwrap().get_mut(chat_id) {
            chat.status = SessionStatus::Stopped;
        }
        Ok(())
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>> {
        self.record("list".to_string());
        let mut chats: Vec<ChatSummary> = self
            .chats
            .lock()
            .unwrap()
            .values()
            .map(|c| ChatSummary {
                id: c.id.clone(),
                query: c.query.clone(),
                status: c.status,
            })
            .collect();
        chats.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatRecord> {
        self.record(format!("chat:{chat_id}"));
        self.chats
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| http(404, "mock/api/chat", "Chat not found"))
    }

    async fn get_settings(&self) -> Result<Settings> {
        self.record("settings".to_string());
        Ok(self.settings.lock().unwrap().clone().unwrap_or(Settings {
            selected_model: "llama-3.3-70b-versatile".into(),
            available_models: vec![],
        }))
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        self.record(format!("settings:{}", update.selected_model));
        let settings = Settings {
            selected_model: update.selected_model.clone(),
            available_models: vec![],
        };
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(settings)
    }
}
