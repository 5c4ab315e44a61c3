// SPDX-License-Identifier: MIT

//! Typed error handling for concierge-rs
//!
//! Build-time problems (malformed workflows, bad schemas, bad configuration)
//! surface as `Result` errors. Runtime problems inside a session are
//! described by [`ActionError`] and are always converted into an error
//! result for the controller instead of being propagated.

use thiserror::Error;

use super::state::FieldType;

/// Top-level error type for concierge-rs
#[derive(Debug, Error)]
pub enum ConciergeError {
    /// Workflow construction errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// State encoding/decoding errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Construct validation errors
    #[error("Construct error: {0}")]
    Construct(#[from] ConstructError),

    /// Session persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors (invalid env values)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tool referenced by a definition but never registered
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// Workflow not present in the registry
    #[error("Workflow '{name}' not found")]
    WorkflowNotFound { name: String },

    /// Session id already in use
    #[error("Session '{id}' already exists")]
    DuplicateSession { id: String },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while assembling stages and workflows
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow '{0}' has no stages")]
    NoStages(String),

    #[error("Stage name must not be empty")]
    EmptyStageName,

    #[error("Stage '{0}' registered more than once")]
    DuplicateStage(String),

    #[error("Tool '{tool}' registered more than once in stage '{stage}'")]
    DuplicateTool { stage: String, tool: String },

    /// A transition points at a stage the workflow does not contain
    #[error("Stage '{stage}' declares a transition to unknown stage '{target}'")]
    UnknownTransitionTarget { stage: String, target: String },

    #[error("Initial stage '{0}' is not registered")]
    UnknownInitialStage(String),

    #[error("Stage '{stage}' declares unknown substage '{substage}'")]
    UnknownSubstage { stage: String, substage: String },

    #[error("Stage '{substage}' is claimed as a substage by both '{first}' and '{second}'")]
    MultipleParents {
        substage: String,
        first: String,
        second: String,
    },

    #[error("Stage '{0}' is nested inside itself through substages")]
    SubstageCycle(String),

    #[error("State transfer from '{from}' to '{to}' references an unknown stage")]
    UnknownTransferStage { from: String, to: String },

    #[error("Stage '{stage}' requires unknown construct '{construct}'")]
    UnknownConstruct { stage: String, construct: String },

    #[error("Invalid state transfer '{0}': expected 'all' or a list of keys")]
    InvalidTransfer(String),

    /// File not found when loading a workflow definition
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

/// Errors raised by [`State`](super::state::State) conversions
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Construct validation failures
#[derive(Debug, Error, PartialEq)]
pub enum ConstructError {
    #[error("{construct} expects an object, got {found}")]
    NotAnObject { construct: String, found: String },

    #[error("{construct} is missing required field '{field}'")]
    MissingField { construct: String, field: String },

    #[error("{construct}.{field} should be {expected}, got {found}")]
    TypeMismatch {
        construct: String,
        field: String,
        expected: FieldType,
        found: String,
    },
}

/// Session persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session '{0}' not found in store")]
    SessionNotFound(String),

    #[error("Session '{0}' already stored")]
    AlreadyExists(String),

    /// A stored record does not fit the workflow it is restored into
    #[error("Stored session is incompatible: {0}")]
    Incompatible(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Failures while processing a single controller action.
///
/// The display string of each variant is the message shown to the
/// controller after `Error: `.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Invalid '{kind}' action: {reason}")]
    InvalidAction { kind: String, reason: String },

    /// `available` lists the stage's tools; it is not part of the message
    #[error("Tool '{tool}' not found in stage '{stage}'")]
    ToolNotFound {
        tool: String,
        stage: String,
        available: Vec<String>,
    },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Cannot transition from '{from}' to '{to}'")]
    TransitionNotAllowed {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("Stage '{0}' not found")]
    TargetStageNotFound(String),

    #[error("Stage '{stage}' requires: {}", missing.join(", "))]
    MissingPrerequisites { stage: String, missing: Vec<String> },
}

impl ActionError {
    /// Create a tool execution error
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Options the controller may pick instead, if the error has any
    pub fn allowed(&self) -> Option<Vec<String>> {
        match self {
            Self::TransitionNotAllowed { allowed, .. } => Some(allowed.clone()),
            Self::MissingPrerequisites { missing, .. } => Some(missing.clone()),
            _ => None,
        }
    }

    /// Tools of the stage, for a call to a tool it does not have
    pub fn available_tools(&self) -> Option<Vec<String>> {
        match self {
            Self::ToolNotFound { available, .. } => Some(available.clone()),
            _ => None,
        }
    }
}

impl ConciergeError {
    /// Create a tool not found error
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a workflow not found error
    pub fn workflow_not_found(name: impl Into<String>) -> Self {
        Self::WorkflowNotFound { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_prerequisites_message() {
        let err = ActionError::MissingPrerequisites {
            stage: "transact".to_string(),
            missing: vec!["symbol".to_string(), "quantity".to_string()],
        };
        assert_eq!(err.to_string(), "Stage 'transact' requires: symbol, quantity");
        assert_eq!(
            err.allowed(),
            Some(vec!["symbol".to_string(), "quantity".to_string()])
        );
    }

    #[test]
    fn test_tool_not_found_message() {
        let err = ActionError::ToolNotFound {
            tool: "nonexistent_tool".to_string(),
            stage: "browse".to_string(),
            available: vec!["search".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Tool 'nonexistent_tool' not found in stage 'browse'"
        );
        assert!(err.allowed().is_none());
        assert_eq!(err.available_tools(), Some(vec!["search".to_string()]));
    }

    #[test]
    fn test_unknown_action_has_no_allowed_options() {
        let err = ActionError::UnknownAction("dance".to_string());
        assert_eq!(err.to_string(), "Unknown action type: dance");
        assert!(err.allowed().is_none());
    }

    #[test]
    fn test_workflow_error_wraps_into_top_level() {
        let err: ConciergeError = WorkflowError::DuplicateStage("browse".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Workflow error: Stage 'browse' registered more than once"
        );
    }
}
