// SPDX-License-Identifier: MIT

//! Controller actions and their results
//!
//! Actions arrive as JSON objects tagged by their `action` field:
//!
//! ```json
//! {"action": "method_call", "tool": "search", "args": {"symbol": "AAPL"}}
//! {"action": "stage_transition", "stage": "portfolio"}
//! {"action": "elicit", "field": "email", "message": "What is your email?"}
//! {"action": "respond", "message": "All done"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::model::error::ActionError;

/// A parsed controller action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Call a tool of the current stage
    MethodCall {
        tool: String,
        #[serde(default = "empty_args")]
        args: Value,
    },
    /// Move to another stage
    StageTransition { stage: String },
    /// Ask the end user for a field
    Elicit {
        field: String,
        #[serde(default)]
        message: Option<String>,
    },
    /// End the turn with a free-text reply
    Respond {
        #[serde(default)]
        message: String,
    },
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

/// Action discriminant, as written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MethodCall,
    StageTransition,
    Elicit,
    Respond,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MethodCall => "method_call",
            ActionKind::StageTransition => "stage_transition",
            ActionKind::Elicit => "elicit",
            ActionKind::Respond => "respond",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        match name {
            "method_call" => Some(ActionKind::MethodCall),
            "stage_transition" => Some(ActionKind::StageTransition),
            "elicit" => Some(ActionKind::Elicit),
            "respond" => Some(ActionKind::Respond),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    /// Parse a raw JSON action.
    ///
    /// An unrecognised `action` field gives `UnknownAction`; a recognised one
    /// with missing or mistyped fields gives `InvalidAction`.
    pub fn parse(raw: &Value) -> Result<Action, ActionError> {
        let kind = match raw.get("action") {
            Some(Value::String(name)) => ActionKind::from_wire(name)
                .ok_or_else(|| ActionError::UnknownAction(name.clone()))?,
            Some(other) => return Err(ActionError::UnknownAction(other.to_string())),
            None => return Err(ActionError::UnknownAction("none".to_string())),
        };

        serde_json::from_value(raw.clone()).map_err(|e| ActionError::InvalidAction {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::MethodCall { .. } => ActionKind::MethodCall,
            Action::StageTransition { .. } => ActionKind::StageTransition,
            Action::Elicit { .. } => ActionKind::Elicit,
            Action::Respond { .. } => ActionKind::Respond,
        }
    }
}

/// Successful tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub result: Value,
}

/// Successful stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub from_stage: String,
    pub to_stage: String,
    /// Prompt for the stage just entered
    pub prompt: String,
}

/// Category of an [`ErrorResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    UnknownAction,
    InvalidAction,
    ToolNotFound,
    ToolExecution,
    TransitionNotAllowed,
    TargetStageNotFound,
    MissingPrerequisites,
}

/// Failed action, as reported to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub kind: ActionErrorKind,
    pub message: String,
    /// Tool names, transition targets or missing fields the controller can act on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Tools of the current stage when the called one does not exist.
    /// Never rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,
}

impl From<ActionError> for ErrorResult {
    fn from(err: ActionError) -> Self {
        let kind = match &err {
            ActionError::UnknownAction(_) => ActionErrorKind::UnknownAction,
            ActionError::InvalidAction { .. } => ActionErrorKind::InvalidAction,
            ActionError::ToolNotFound { .. } => ActionErrorKind::ToolNotFound,
            ActionError::ToolExecution { .. } => ActionErrorKind::ToolExecution,
            ActionError::TransitionNotAllowed { .. } => ActionErrorKind::TransitionNotAllowed,
            ActionError::TargetStageNotFound(_) => ActionErrorKind::TargetStageNotFound,
            ActionError::MissingPrerequisites { .. } => ActionErrorKind::MissingPrerequisites,
        };
        Self {
            kind,
            message: err.to_string(),
            allowed: err.allowed(),
            available_tools: err.available_tools(),
        }
    }
}

/// Exactly one result is produced per processed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionResult {
    Tool(ToolResult),
    Transition(TransitionResult),
    Elicit { field: String, message: String },
    Respond { message: String },
    Error(ErrorResult),
}

impl ActionResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error(_))
    }

    pub fn as_error(&self) -> Option<&ErrorResult> {
        match self {
            ActionResult::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ActionError> for ActionResult {
    fn from(err: ActionError) -> Self {
        ActionResult::Error(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_method_call() {
        let action = Action::parse(&json!({
            "action": "method_call",
            "tool": "search",
            "args": {"symbol": "AAPL"}
        }))
        .unwrap();

        assert_eq!(
            action,
            Action::MethodCall {
                tool: "search".to_string(),
                args: json!({"symbol": "AAPL"}),
            }
        );
        assert_eq!(action.kind(), ActionKind::MethodCall);
    }

    #[test]
    fn test_parse_method_call_defaults_args() {
        let action = Action::parse(&json!({"action": "method_call", "tool": "view_holdings"})).unwrap();
        assert_eq!(
            action,
            Action::MethodCall {
                tool: "view_holdings".to_string(),
                args: json!({}),
            }
        );
    }

    #[test]
    fn test_parse_transition_elicit_respond() {
        assert_eq!(
            Action::parse(&json!({"action": "stage_transition", "stage": "portfolio"})).unwrap(),
            Action::StageTransition {
                stage: "portfolio".to_string()
            }
        );
        assert_eq!(
            Action::parse(&json!({"action": "elicit", "field": "email"})).unwrap(),
            Action::Elicit {
                field: "email".to_string(),
                message: None
            }
        );
        assert_eq!(
            Action::parse(&json!({"action": "respond", "message": "bye"})).unwrap(),
            Action::Respond {
                message: "bye".to_string()
            }
        );
    }

    #[test]
    fn test_parse_unknown_action() {
        let err = Action::parse(&json!({"action": "invalid_action", "data": "whatever"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action type: invalid_action");

        let err = Action::parse(&json!({"tool": "search"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action type: none");
    }

    #[test]
    fn test_parse_malformed_known_action() {
        let err = Action::parse(&json!({"action": "stage_transition"})).unwrap_err();
        match err {
            ActionError::InvalidAction { kind, reason } => {
                assert_eq!(kind, "stage_transition");
                assert!(reason.contains("stage"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_result_from_action_error() {
        let result: ErrorResult = ActionError::TransitionNotAllowed {
            from: "browse".to_string(),
            to: "checkout".to_string(),
            allowed: vec!["portfolio".to_string()],
        }
        .into();

        assert_eq!(result.kind, ActionErrorKind::TransitionNotAllowed);
        assert_eq!(result.message, "Cannot transition from 'browse' to 'checkout'");
        assert_eq!(result.allowed, Some(vec!["portfolio".to_string()]));
    }

    #[test]
    fn test_action_result_serializes_with_type_tag() {
        let result = ActionResult::Tool(ToolResult {
            tool_name: "search".to_string(),
            result: json!({"price": 150.0}),
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "tool");
        assert_eq!(value["tool_name"], "search");
        assert!(!result.is_error());
    }
}
