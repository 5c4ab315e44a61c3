// SPDX-License-Identifier: MIT

//! Registries for tools, workflows and live sessions
//!
//! All three are cheap to clone and share their contents between clones.

use serde::Deserialize;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::config::EngineConfig;
use super::language::LanguageEngine;
use super::orchestrator::Session;
use super::render::{render_handshake, render_stage};
use super::store::SessionStore;
use crate::model::error::{ConciergeError, StoreError};
use crate::model::tool::Tool;
use crate::model::workflow::{generate_session_id, Workflow};

/// Tools addressable by name from workflow definitions
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a tool, replacing any tool of the same name
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        tools.insert(tool.name().to_string(), tool);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<String> = tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built workflows, keyed by name
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: Arc<RwLock<BTreeMap<String, Arc<Workflow>>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow, replacing any workflow of the same name
    pub async fn register(&self, workflow: Workflow) -> Arc<Workflow> {
        let workflow = Arc::new(workflow);
        let mut workflows = self.workflows.write().await;
        if workflows
            .insert(workflow.name().to_string(), Arc::clone(&workflow))
            .is_some()
        {
            log::warn!("Workflow '{}' replaced", workflow.name());
        }
        workflow
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.read().await.get(name).cloned()
    }

    /// All workflows, ordered by name
    pub async fn list(&self) -> Vec<Arc<Workflow>> {
        self.workflows.read().await.values().cloned().collect()
    }
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum HandshakeAction {
    SelectWorkflow { workflow_id: String },
}

/// Live sessions, each behind its own lock
#[derive(Clone)]
pub struct SessionRegistry {
    workflows: WorkflowRegistry,
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
    store: Option<Arc<dyn SessionStore>>,
    config: EngineConfig,
}

impl SessionRegistry {
    pub fn new(workflows: WorkflowRegistry, config: EngineConfig) -> Self {
        Self {
            workflows,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store: None,
            config,
        }
    }

    /// Persist every session created from now on
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session of `workflow`; a fresh id is generated when none is given
    pub async fn create_session(
        &self,
        workflow: &str,
        session_id: Option<String>,
    ) -> Result<Arc<Mutex<Session>>, ConciergeError> {
        let workflow = self
            .workflows
            .get(workflow)
            .await
            .ok_or_else(|| ConciergeError::workflow_not_found(workflow))?;
        let id = session_id.unwrap_or_else(generate_session_id);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(ConciergeError::DuplicateSession { id });
        }

        let mut session = workflow.create_session(Some(id.clone())).with_config(&self.config);
        if let Some(store) = &self.store {
            session = session.with_store(Arc::clone(store));
        }
        let session = Arc::new(Mutex::new(session));
        // Other callers wait on the session lock until the record is stored.
        let guard = session.lock().await;
        sessions.insert(id.clone(), Arc::clone(&session));
        drop(sessions);

        guard.persist_created().await;
        drop(guard);

        log::info!("Created session {} for workflow '{}'", id, workflow.name());
        Ok(session)
    }

    /// Bring a stored session back into memory
    pub async fn resume_session(&self, session_id: &str) -> Result<Arc<Mutex<Session>>, ConciergeError> {
        if let Some(session) = self.get_session(session_id).await {
            return Ok(session);
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        let record = store
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        let workflow = self
            .workflows
            .get(&record.workflow)
            .await
            .ok_or_else(|| ConciergeError::workflow_not_found(&record.workflow))?;

        let session = Session::restore(workflow, record)?
            .with_config(&self.config)
            .with_store(Arc::clone(store));

        match self.sessions.write().await.entry(session_id.to_string()) {
            Entry::Occupied(live) => Ok(Arc::clone(live.get())),
            Entry::Vacant(slot) => {
                log::info!("Resumed session {}", session_id);
                Ok(Arc::clone(slot.insert(Arc::new(Mutex::new(session)))))
            }
        }
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Text engine for a live session
    pub async fn engine(&self, session_id: &str) -> Option<LanguageEngine> {
        self.get_session(session_id)
            .await
            .map(|session| LanguageEngine::shared(session).with_presentation(self.config.presentation))
    }

    /// Drop a session from memory. Stored records are kept.
    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Live session ids, sorted
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every live session
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        log::info!("Closing {} sessions", sessions.len());
        sessions.clear();
    }

    /// Welcome message listing the registered workflows
    pub async fn handshake(&self) -> String {
        let workflows = self.workflows.list().await;
        render_handshake(&self.config, workflows.iter().map(|wf| wf.as_ref()))
    }

    /// Answer to the handshake: start a session of the selected workflow.
    ///
    /// Returns the new session id and the description of its first stage.
    pub async fn select_workflow(&self, raw: &Value) -> Result<(String, String), ConciergeError> {
        let action: HandshakeAction = serde_json::from_value(raw.clone())?;
        let HandshakeAction::SelectWorkflow { workflow_id } = action;
        let session = self.create_session(&workflow_id, None).await?;

        let session = session.lock().await;
        let message = render_stage(session.workflow(), session.current_stage(), &session.state());
        Ok((session.id().to_string(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::orchestrator::HistoryEntry;
    use crate::engine::render::Presentation;
    use crate::engine::store::{MemoryStore, SessionRecord, SessionSummary, StatePatch};
    use crate::model::stage::Stage;
    use crate::model::tool::FnTool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Memory store with slow reads and creates
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn create_session(&self, record: SessionRecord) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.create_session(record).await
        }

        async fn update_state(&self, session_id: &str, patch: StatePatch) -> Result<(), StoreError> {
            self.inner.update_state(session_id, patch).await
        }

        async fn update_current_stage(&self, session_id: &str, stage: &str) -> Result<(), StoreError> {
            self.inner.update_current_stage(session_id, stage).await
        }

        async fn append_history(&self, session_id: &str, entry: HistoryEntry) -> Result<(), StoreError> {
            self.inner.append_history(session_id, entry).await
        }

        async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_session(session_id).await
        }

        async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
            self.inner.list_sessions().await
        }

        async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
            self.inner.delete_session(session_id).await
        }
    }

    fn slow_store(millis: u64) -> Arc<SlowStore> {
        Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(millis),
        })
    }

    fn mock_tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, format!("Mock tool: {}", name), |scope, _| {
            Ok((json!({"result": "mock"}), scope))
        }))
    }

    fn workflow(name: &str) -> Workflow {
        let stage = Stage::builder("start")
            .description("First stage")
            .shared_tool(mock_tool("ping"))
            .build()
            .unwrap();
        Workflow::builder(name)
            .description(format!("{} workflow", name))
            .stage(stage)
            .build()
            .unwrap()
    }

    async fn sessions() -> SessionRegistry {
        let workflows = WorkflowRegistry::new();
        workflows.register(workflow("stock")).await;
        SessionRegistry::new(workflows, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_register_and_get_tool() {
        let registry = ToolRegistry::new();
        registry.register(mock_tool("test_tool")).await;

        let retrieved = registry.get("test_tool").await;
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name(), "test_tool");
        assert!(registry.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_registry_is_clone() {
        let registry = ToolRegistry::new();
        registry.register(mock_tool("tool1")).await;

        let cloned = registry.clone();
        assert!(cloned.get("tool1").await.is_some());

        cloned.register(mock_tool("tool2")).await;
        assert_eq!(registry.names().await, vec!["tool1", "tool2"]);
    }

    #[tokio::test]
    async fn test_workflow_registry_lists_by_name() {
        let registry = WorkflowRegistry::new();
        registry.register(workflow("zeta")).await;
        registry.register(workflow("alpha")).await;

        let names: Vec<String> = registry
            .list()
            .await
            .iter()
            .map(|wf| wf.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(registry.get("alpha").await.is_some());
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let registry = sessions().await;
        let session = registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .unwrap();
        assert_eq!(session.lock().await.id(), "s-1");

        assert!(registry.get_session("s-1").await.is_some());
        assert!(registry.get_session("s-2").await.is_none());
        assert_eq!(registry.session_ids().await, vec!["s-1"]);
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown() {
        let registry = sessions().await;
        registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .unwrap();

        let err = registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConciergeError::DuplicateSession { .. }));

        let err = registry.create_session("missing", None).await.err().unwrap();
        assert_eq!(err.to_string(), "Workflow 'missing' not found");
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let registry = sessions().await;
        for _ in 0..10 {
            registry.create_session("stock", None).await.unwrap();
        }
        assert_eq!(registry.len().await, 10);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_handshake_and_select_workflow() {
        let registry = sessions().await;

        let welcome = registry.handshake().await;
        assert!(welcome.contains("Available workflows (1):\n- stock: stock workflow"));

        let (id, message) = registry
            .select_workflow(&json!({"action": "select_workflow", "workflow_id": "stock"}))
            .await
            .unwrap();
        assert!(registry.get_session(&id).await.is_some());
        assert!(message.starts_with("Workflow: stock\nStage: start (step 1 of 1)"));

        assert!(registry
            .select_workflow(&json!({"action": "select_workflow"}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_resume_from_store() {
        let store = Arc::new(MemoryStore::new());
        let registry = sessions().await.with_store(store.clone());
        registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .unwrap();
        let engine = registry.engine("s-1").await.unwrap();
        engine
            .process(&json!({"action": "method_call", "tool": "ping"}))
            .await;

        assert!(registry.remove_session("s-1").await);
        assert!(registry.get_session("s-1").await.is_none());

        let session = registry.resume_session("s-1").await.unwrap();
        assert_eq!(session.lock().await.history().len(), 1);

        let err = registry.resume_session("ghost").await.err().unwrap();
        assert!(matches!(err, ConciergeError::Store(StoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_resume_shares_one_session() {
        let store = slow_store(50);
        let registry = sessions().await.with_store(store.clone());
        registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .unwrap();
        registry.remove_session("s-1").await;

        let (first, second) = tokio::join!(
            registry.resume_session("s-1"),
            registry.resume_session("s-1")
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &registry.get_session("s-1").await.unwrap()));
    }

    #[tokio::test]
    async fn test_slow_store_does_not_block_other_sessions() {
        let store = slow_store(200);
        let registry = sessions().await.with_store(store.clone());

        let lookup = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tokio::time::timeout(Duration::from_millis(100), registry.session_ids()).await
        };
        let (created, ids) = tokio::join!(
            registry.create_session("stock", Some("s-1".to_string())),
            lookup
        );

        assert!(created.is_ok());
        assert_eq!(ids.unwrap(), vec!["s-1"]);
        assert!(store.inner.get_session("s-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_engine_uses_configured_presentation() {
        let workflows = WorkflowRegistry::new();
        workflows.register(workflow("stock")).await;
        let config = EngineConfig::default().with_presentation(Presentation::Brief);
        let registry = SessionRegistry::new(workflows, config);
        registry
            .create_session("stock", Some("s-1".to_string()))
            .await
            .unwrap();

        let engine = registry.engine("s-1").await.unwrap();
        assert_eq!(engine.presentation(), Presentation::Brief);
        let reply = engine
            .process(&json!({"action": "method_call", "tool": "ping"}))
            .await;
        assert!(reply.ends_with("Current stage: start\nState: {}\nAvailable tools: ping\nAvailable transitions: none"));
    }
}
