// SPDX-License-Identifier: MIT

//! Session persistence interface
//!
//! Sessions run entirely in memory. When a [`SessionStore`] is attached, the
//! session reports every successful mutation to it; store failures are
//! logged and never fail an action.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::orchestrator::HistoryEntry;
use crate::model::error::StoreError;
use crate::model::state::State;

/// Full persisted form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub workflow: String,
    pub current_stage: String,
    pub global: State,
    /// Local state per stage name
    pub locals: BTreeMap<String, State>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State change reported after a tool call or a state transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    /// Stage whose local state changed
    pub stage: String,
    pub local: State,
    pub global: State,
}

/// Listing entry returned by [`SessionStore::list_sessions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub workflow: String,
    pub current_stage: String,
    pub history_length: usize,
    pub updated_at: DateTime<Utc>,
}

/// Key-value persistence for sessions, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError>;

    async fn update_state(&self, session_id: &str, patch: StatePatch) -> Result<(), StoreError>;

    async fn update_current_stage(&self, session_id: &str, stage: &str) -> Result<(), StoreError>;

    async fn append_history(&self, session_id: &str, entry: HistoryEntry) -> Result<(), StoreError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;
}

/// In-process [`SessionStore`]
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, session_id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&record.session_id) {
            return Err(StoreError::AlreadyExists(record.session_id));
        }
        sessions.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn update_state(&self, session_id: &str, patch: StatePatch) -> Result<(), StoreError> {
        self.modify(session_id, |record| {
            record.locals.insert(patch.stage, patch.local);
            record.global = patch.global;
        })
        .await
    }

    async fn update_current_stage(&self, session_id: &str, stage: &str) -> Result<(), StoreError> {
        self.modify(session_id, |record| record.current_stage = stage.to_string())
            .await
    }

    async fn append_history(&self, session_id: &str, entry: HistoryEntry) -> Result<(), StoreError> {
        self.modify(session_id, |record| record.history.push(entry)).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|r| SessionSummary {
                session_id: r.session_id.clone(),
                workflow: r.workflow.clone(),
                current_stage: r.current_stage.clone(),
                history_length: r.history.len(),
                updated_at: r.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(summaries)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::action::ActionKind;
    use crate::engine::orchestrator::Outcome;
    use serde_json::json;

    fn record(id: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: id.to_string(),
            workflow: "stock".to_string(),
            current_stage: "browse".to_string(),
            global: State::new(),
            locals: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        store.create_session(record("s1")).await.unwrap();

        let loaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded.current_stage, "browse");
        assert!(store.get_session("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryStore::new();
        store.create_session(record("s1")).await.unwrap();
        let err = store.create_session(record("s1")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "s1"));
    }

    #[tokio::test]
    async fn test_updates() {
        let store = MemoryStore::new();
        store.create_session(record("s1")).await.unwrap();

        store
            .update_state(
                "s1",
                StatePatch {
                    stage: "browse".to_string(),
                    local: State::new().set("last_search", "AAPL"),
                    global: State::new().set("user", "u1"),
                },
            )
            .await
            .unwrap();
        store.update_current_stage("s1", "portfolio").await.unwrap();
        store
            .append_history(
                "s1",
                HistoryEntry {
                    action: ActionKind::StageTransition,
                    stage: "browse".to_string(),
                    args: json!({"stage": "portfolio"}),
                    outcome: Outcome::Success(json!({"from": "browse", "to": "portfolio"})),
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();

        let loaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded.current_stage, "portfolio");
        assert_eq!(loaded.locals["browse"].get("last_search"), Some(&json!("AAPL")));
        assert_eq!(loaded.global.get("user"), Some(&json!("u1")));
        assert_eq!(loaded.history.len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_session() {
        let store = MemoryStore::new();
        let err = store.update_current_stage("ghost", "browse").await.unwrap_err();
        assert_eq!(err.to_string(), "Session 'ghost' not found in store");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemoryStore::new();
        store.create_session(record("b")).await.unwrap();
        store.create_session(record("a")).await.unwrap();

        let ids: Vec<String> = store
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(store.delete_session("a").await.unwrap());
        assert!(!store.delete_session("a").await.unwrap());
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }
}
