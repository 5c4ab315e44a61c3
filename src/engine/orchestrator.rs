// SPDX-License-Identifier: MIT

//! Session orchestration
//!
//! A [`Session`] is one run of a [`Workflow`]: it tracks the current stage,
//! the global state, a local state per stage and the action history. Every
//! controller action goes through [`Session::process_action`], which
//! validates it against the current stage, executes it and returns exactly
//! one [`ActionResult`]. Failures never escape as `Err`.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use super::action::{Action, ActionKind, ActionResult, ToolResult, TransitionResult};
use super::config::EngineConfig;
use super::store::{SessionRecord, SessionStore, StatePatch};
use crate::model::error::{ActionError, StoreError};
use crate::model::stage::Stage;
use crate::model::state::State;
use crate::model::tool::{panic_message, Scope, Tool, ToolOutput};
use crate::model::workflow::{generate_session_id, Workflow};

/// How a recorded action ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// One entry of the append-only session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: ActionKind,
    /// Stage the session was in when the action arrived
    pub stage: String,
    /// Action payload: `{"tool", "args"}` or `{"stage"}`
    pub args: Value,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of a session for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub workflow: String,
    pub current_stage: String,
    pub available_tools: Vec<String>,
    pub can_transition_to: Vec<String>,
    /// Size of each local state value (length for strings, lists and objects)
    pub state_summary: BTreeMap<String, usize>,
    pub history_length: usize,
}

/// A single run of a workflow
pub struct Session {
    id: String,
    workflow: Arc<Workflow>,
    current: usize,
    global: State,
    locals: HashMap<String, State>,
    history: Vec<HistoryEntry>,
    store: Option<Arc<dyn SessionStore>>,
    tool_timeout: Duration,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Start a session at the workflow's initial stage with empty state
    pub fn new(workflow: Arc<Workflow>, id: impl Into<String>) -> Self {
        let locals = workflow
            .stages()
            .iter()
            .map(|s| (s.name().to_string(), State::new()))
            .collect();
        Self {
            id: id.into(),
            current: workflow.initial_position(),
            workflow,
            global: State::new(),
            locals,
            history: Vec::new(),
            store: None,
            tool_timeout: EngineConfig::default().tool_timeout,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a session from a stored record
    pub fn restore(workflow: Arc<Workflow>, record: SessionRecord) -> Result<Self, StoreError> {
        if record.workflow != workflow.name() {
            return Err(StoreError::Incompatible(format!(
                "session '{}' belongs to workflow '{}', not '{}'",
                record.session_id,
                record.workflow,
                workflow.name()
            )));
        }
        let current = workflow.position(&record.current_stage).ok_or_else(|| {
            StoreError::Incompatible(format!("unknown stage '{}'", record.current_stage))
        })?;
        if let Some(unknown) = record.locals.keys().find(|s| workflow.stage(s).is_none()) {
            return Err(StoreError::Incompatible(format!(
                "state stored for unknown stage '{}'",
                unknown
            )));
        }

        let mut session = Self::new(workflow, record.session_id);
        session.current = current;
        session.global = record.global;
        session.locals.extend(record.locals);
        session.history = record.history;
        session.created_at = record.created_at;
        Ok(session)
    }

    /// Report mutations to `store`
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.with_tool_timeout(config.tool_timeout)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn current_stage(&self) -> &Stage {
        &self.workflow.stages()[self.current]
    }

    pub fn current_stage_name(&self) -> &str {
        self.current_stage().name()
    }

    /// Local state of the current stage
    pub fn state(&self) -> State {
        self.local_state(self.current_stage_name())
    }

    pub fn global_state(&self) -> &State {
        &self.global
    }

    /// Local state of any stage (empty for unknown names)
    pub fn local_state(&self, stage: &str) -> State {
        self.locals.get(stage).cloned().unwrap_or_default()
    }

    /// Scope a tool of the current stage would receive
    pub fn scope(&self) -> Scope {
        Scope::new(self.state(), self.global.clone())
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Persisted form of the session
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.id.clone(),
            workflow: self.workflow.name().to_string(),
            current_stage: self.current_stage_name().to_string(),
            global: self.global.clone(),
            locals: self
                .locals
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            history: self.history.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Write the initial record to the attached store, if any
    pub async fn persist_created(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.create_session(self.record()).await {
                log::warn!("Failed to store new session {}: {}", self.id, e);
            }
        }
    }

    pub fn session_info(&self) -> SessionInfo {
        let stage = self.current_stage();
        let state = self.state();
        let state_summary = state
            .as_map()
            .iter()
            .map(|(k, v)| {
                let size = match v {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    _ => 1,
                };
                (k.clone(), size)
            })
            .collect();

        SessionInfo {
            session_id: self.id.clone(),
            workflow: self.workflow.name().to_string(),
            current_stage: stage.name().to_string(),
            available_tools: stage.tool_names(),
            can_transition_to: stage.transitions().to_vec(),
            state_summary,
            history_length: self.history.len(),
        }
    }

    /// Parse and process a raw JSON action.
    ///
    /// Unknown or malformed actions produce an error result and leave no
    /// history entry.
    pub async fn process(&mut self, raw: &Value) -> ActionResult {
        match Action::parse(raw) {
            Ok(action) => self.process_action(action).await,
            Err(err) => {
                log::debug!("Session {} rejected action: {}", self.id, err);
                err.into()
            }
        }
    }

    pub async fn process_action(&mut self, action: Action) -> ActionResult {
        match action {
            Action::MethodCall { tool, args } => self.execute_method_call(&tool, args).await,
            Action::StageTransition { stage } => self.execute_stage_transition(&stage).await,
            Action::Elicit { field, message } => {
                let message = message.unwrap_or_else(|| format!("Please provide: {}", field));
                ActionResult::Elicit { field, message }
            }
            Action::Respond { message } => ActionResult::Respond { message },
        }
    }

    async fn execute_method_call(&mut self, tool_name: &str, args: Value) -> ActionResult {
        let args = if args.is_null() { json!({}) } else { args };
        let payload = json!({"tool": tool_name, "args": args.clone()});
        let workflow = Arc::clone(&self.workflow);
        let stage = &workflow.stages()[self.current];

        let Some(tool) = stage.tool(tool_name) else {
            let err = ActionError::ToolNotFound {
                tool: tool_name.to_string(),
                stage: stage.name().to_string(),
                available: stage.tool_names(),
            };
            self.record_history(
                ActionKind::MethodCall,
                stage.name(),
                payload,
                Outcome::Failure(err.to_string()),
            )
            .await;
            return err.into();
        };

        log::debug!(
            "Session {} calling tool '{}' in stage '{}'",
            self.id,
            tool_name,
            stage.name()
        );

        match self.run_tool(tool, self.scope(), args).await {
            Ok((outcome, scope)) => {
                self.locals.insert(stage.name().to_string(), scope.local);
                self.global = scope.global;
                self.persist_state(stage.name()).await;
                self.record_history(
                    ActionKind::MethodCall,
                    stage.name(),
                    payload,
                    Outcome::Success(outcome.clone()),
                )
                .await;
                ActionResult::Tool(ToolResult {
                    tool_name: tool_name.to_string(),
                    result: outcome,
                })
            }
            Err(message) => {
                log::warn!(
                    "Tool '{}' failed in session {}: {}",
                    tool_name,
                    self.id,
                    message
                );
                let err = ActionError::tool_execution(tool_name, message);
                self.record_history(
                    ActionKind::MethodCall,
                    stage.name(),
                    payload,
                    Outcome::Failure(err.to_string()),
                )
                .await;
                err.into()
            }
        }
    }

    /// Run a tool, turning errors, panics, time-outs and invalid outcomes
    /// into a failure message
    async fn run_tool(
        &self,
        tool: &Arc<dyn Tool>,
        scope: Scope,
        args: Value,
    ) -> Result<ToolOutput, String> {
        let call = AssertUnwindSafe(tool.execute(scope, args)).catch_unwind();
        let (outcome, scope) = match tokio::time::timeout(self.tool_timeout, call).await {
            Err(_) => return Err(format!("timed out after {:?}", self.tool_timeout)),
            Ok(Err(panic)) => return Err(format!("panicked: {}", panic_message(panic.as_ref()))),
            Ok(Ok(Err(err))) => return Err(err.to_string()),
            Ok(Ok(Ok(output))) => output,
        };

        if let Some(construct) = tool.output() {
            construct
                .validate(&outcome)
                .map_err(|e| format!("invalid output: {}", e))?;
        }
        Ok((outcome, scope))
    }

    async fn execute_stage_transition(&mut self, target: &str) -> ActionResult {
        let from = self.current_stage_name().to_string();
        let result = self.try_transition(target).await;

        let outcome = match &result {
            Ok(_) => Outcome::Success(json!({"from": from, "to": target})),
            Err(err) => Outcome::Failure(err.to_string()),
        };
        self.record_history(
            ActionKind::StageTransition,
            &from,
            json!({"stage": target}),
            outcome,
        )
        .await;

        match result {
            Ok(transition) => ActionResult::Transition(transition),
            Err(err) => err.into(),
        }
    }

    async fn try_transition(&mut self, target: &str) -> Result<TransitionResult, ActionError> {
        let workflow = Arc::clone(&self.workflow);
        let current = &workflow.stages()[self.current];

        if !current.can_transition_to(target) {
            return Err(ActionError::TransitionNotAllowed {
                from: current.name().to_string(),
                to: target.to_string(),
                allowed: current.transitions().to_vec(),
            });
        }
        let position = workflow
            .position(target)
            .ok_or_else(|| ActionError::TargetStageNotFound(target.to_string()))?;
        let next = &workflow.stages()[position];

        let entering = self.entering_state(current.name(), target);
        let missing =
            next.get_missing_prerequisites(&Scope::new(entering.clone(), self.global.clone()));
        if !missing.is_empty() {
            return Err(ActionError::MissingPrerequisites {
                stage: target.to_string(),
                missing,
            });
        }

        let transferred = workflow.transfer_for(current.name(), target).is_some();
        self.locals.insert(target.to_string(), entering.clone());
        self.current = position;
        log::info!(
            "Session {} moved from '{}' to '{}'",
            self.id,
            current.name(),
            target
        );

        if transferred {
            self.persist_state(target).await;
        }
        self.persist_stage().await;

        Ok(TransitionResult {
            from_stage: current.name().to_string(),
            to_stage: target.to_string(),
            prompt: next.generate_prompt(&entering),
        })
    }

    /// Local state `to` will hold after a transition from `from`
    fn entering_state(&self, from: &str, to: &str) -> State {
        let existing = self.local_state(to);
        match self.workflow.transfer_for(from, to) {
            Some(transfer) => existing.merge(&transfer.apply(&self.local_state(from))),
            None => existing,
        }
    }

    async fn record_history(&mut self, action: ActionKind, stage: &str, args: Value, outcome: Outcome) {
        let entry = HistoryEntry {
            action,
            stage: stage.to_string(),
            args,
            outcome,
            timestamp: Utc::now(),
        };
        if let Some(store) = &self.store {
            if let Err(e) = store.append_history(&self.id, entry.clone()).await {
                log::warn!("Failed to store history for session {}: {}", self.id, e);
            }
        }
        self.history.push(entry);
    }

    async fn persist_state(&self, stage: &str) {
        if let Some(store) = &self.store {
            let patch = StatePatch {
                stage: stage.to_string(),
                local: self.local_state(stage),
                global: self.global.clone(),
            };
            if let Err(e) = store.update_state(&self.id, patch).await {
                log::warn!("Failed to store state for session {}: {}", self.id, e);
            }
        }
    }

    async fn persist_stage(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store
                .update_current_stage(&self.id, self.current_stage_name())
                .await
            {
                log::warn!("Failed to store stage for session {}: {}", self.id, e);
            }
        }
    }
}

impl Workflow {
    /// Start a new session positioned at the initial stage.
    ///
    /// A fresh UUID v4 is used when no id is given.
    pub fn create_session(self: &Arc<Self>, session_id: Option<String>) -> Session {
        let id = session_id.unwrap_or_else(generate_session_id);
        Session::new(Arc::clone(self), id)
    }
}
