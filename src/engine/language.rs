// SPDX-License-Identifier: MIT

//! Language engine: the text front door of a session
//!
//! Takes a raw JSON action, runs it through the [`Session`] and renders the
//! result for the controller in the engine's [`Presentation`].

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::orchestrator::Session;
use super::render::{render_error, render_stage, Presentation};
use crate::model::error::ActionError;

/// Renders session results as text
#[derive(Clone)]
pub struct LanguageEngine {
    session: Arc<Mutex<Session>>,
    presentation: Presentation,
}

impl LanguageEngine {
    pub fn new(session: Session) -> Self {
        Self::shared(Arc::new(Mutex::new(session)))
    }

    /// Wrap a session already shared through a registry
    pub fn shared(session: Arc<Mutex<Session>>) -> Self {
        Self {
            session,
            presentation: Presentation::default(),
        }
    }

    pub fn with_presentation(mut self, presentation: Presentation) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn session(&self) -> &Arc<Mutex<Session>> {
        &self.session
    }

    /// Process one action and render the reply.
    ///
    /// Holds the session lock for the whole action, so concurrent calls for
    /// the same session run one after the other.
    pub async fn process(&self, raw: &Value) -> String {
        let mut session = self.session.lock().await;
        let result = session.process(raw).await;
        self.presentation.render(
            &result,
            session.workflow(),
            session.current_stage(),
            &session.state(),
        )
    }

    /// Like [`LanguageEngine::process`] for a JSON string; invalid JSON
    /// renders as an error
    pub async fn process_str(&self, raw: &str) -> String {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.process(&value).await,
            Err(e) => {
                let err = ActionError::InvalidAction {
                    kind: "json".to_string(),
                    reason: e.to_string(),
                };
                render_error(&err.into())
            }
        }
    }

    /// Description of the current stage, as shown after a tool call
    pub async fn describe(&self) -> String {
        let session = self.session.lock().await;
        render_stage(session.workflow(), session.current_stage(), &session.state())
    }
}
