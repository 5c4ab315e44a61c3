// SPDX-License-Identifier: MIT

//! Text rendering of action results
//!
//! Every reply the controller sees comes from one of the fixed templates in
//! this module. The output only depends on the workflow, the current stage
//! and its state, so the same situation always renders the same bytes.
//!
//! A [`Presentation`] picks how much context surrounds each reply.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::action::{ActionResult, ErrorResult, ToolResult, TransitionResult};
use super::config::EngineConfig;
use crate::model::stage::Stage;
use crate::model::state::State;
use crate::model::workflow::Workflow;

const NEXT_STEPS: &str = r#"What would you like to do?
1. Call a tool: {"action": "method_call", "tool": "tool_name", "args": {...}}
2. Transition: {"action": "stage_transition", "stage": "stage_name"}"#;

/// Describe `stage` of `workflow` with the given local state
pub fn render_stage(workflow: &Workflow, stage: &Stage, state: &State) -> String {
    let index = workflow.stage_index(stage.name()).unwrap_or_default();
    format!(
        "Workflow: {}\nStage: {} (step {} of {})\nDescription: {}\n\n\
         Available tools: {}\nNext stages: {}\nPrevious stages: {}\n\n\
         Current state:\n{}\n\n{}",
        workflow.name(),
        stage.name(),
        index,
        workflow.len(),
        stage.description(),
        stage.tool_names().join(", "),
        stage.transitions().join(", "),
        stage.parent().unwrap_or_default(),
        pretty(&state.to_value()),
        NEXT_STEPS
    )
}

pub fn render_tool_result(result: &ToolResult, stage_message: &str) -> String {
    format!("{}\n\n{}", tool_summary(result), stage_message)
}

pub fn render_transition(result: &TransitionResult, stage_message: &str) -> String {
    format!("{}\n\n{}", transition_summary(result), stage_message)
}

fn tool_summary(result: &ToolResult) -> String {
    let rendered = match &result.result {
        Value::Object(_) => pretty(&result.result),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "Tool '{}' executed successfully.\n\nResult:\n{}",
        result.tool_name, rendered
    )
}

fn transition_summary(result: &TransitionResult) -> String {
    format!(
        "Successfully transitioned from '{}' to '{}'.",
        result.from_stage, result.to_stage
    )
}

pub fn render_error(result: &ErrorResult) -> String {
    let context = match &result.allowed {
        Some(options) if !options.is_empty() => {
            format!("Allowed options: {}", options.join(", "))
        }
        _ => String::new(),
    };
    format!("Error: {}\n\n{}", result.message, context)
}

/// Render any result; tool and transition results are followed by the
/// description of the (possibly new) current stage
pub fn render_result(result: &ActionResult, workflow: &Workflow, stage: &Stage, state: &State) -> String {
    match result {
        ActionResult::Tool(tool) => {
            render_tool_result(tool, &render_stage(workflow, stage, state))
        }
        ActionResult::Transition(transition) => {
            render_transition(transition, &render_stage(workflow, stage, state))
        }
        ActionResult::Elicit { message, .. } => message.clone(),
        ActionResult::Respond { message } => message.clone(),
        ActionResult::Error(error) => render_error(error),
    }
}

/// How much context surrounds each reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    /// Result followed by the stage description
    #[default]
    Standard,
    /// Result plus a four-line status, for token-tight controllers
    Brief,
    /// Result plus the workflow layout and a ready-to-send call per tool
    /// and transition
    Comprehensive,
}

impl Presentation {
    pub fn render(
        self,
        result: &ActionResult,
        workflow: &Workflow,
        stage: &Stage,
        state: &State,
    ) -> String {
        match self {
            Presentation::Standard => render_result(result, workflow, stage, state),
            Presentation::Brief => render_brief(&result_summary(result), stage, state),
            Presentation::Comprehensive => {
                render_comprehensive(&result_summary(result), workflow, stage, state)
            }
        }
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Presentation::Standard => "standard",
            Presentation::Brief => "brief",
            Presentation::Comprehensive => "comprehensive",
        };
        f.write_str(name)
    }
}

impl FromStr for Presentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Presentation::Standard),
            "brief" => Ok(Presentation::Brief),
            "comprehensive" => Ok(Presentation::Comprehensive),
            other => Err(format!(
                "unknown presentation '{}', expected standard, brief or comprehensive",
                other
            )),
        }
    }
}

/// The result alone, without any stage description
fn result_summary(result: &ActionResult) -> String {
    match result {
        ActionResult::Tool(tool) => tool_summary(tool),
        ActionResult::Transition(transition) => transition_summary(transition),
        ActionResult::Elicit { message, .. } => message.clone(),
        ActionResult::Respond { message } => message.clone(),
        ActionResult::Error(error) => render_error(error),
    }
}

pub fn render_brief(content: &str, stage: &Stage, state: &State) -> String {
    format!(
        "{}\n\nCurrent stage: {}\nState: {}\nAvailable tools: {}\nAvailable transitions: {}",
        content,
        stage.name(),
        state.to_value(),
        or_none(stage.tool_names().as_slice()),
        or_none(stage.transitions())
    )
}

pub fn render_comprehensive(content: &str, workflow: &Workflow, stage: &Stage, state: &State) -> String {
    let rule = "=".repeat(80);
    let structure: Vec<String> = workflow
        .stage_names()
        .iter()
        .map(|name| format!("  - {}", name))
        .collect();

    let mut tools = Vec::new();
    for tool in stage.tools() {
        let schema = tool.to_schema();
        let call = json!({
            "action": "method_call",
            "tool": tool.name(),
            "args": example_args(&schema["input_schema"]),
        });
        tools.push(format!(
            "  Tool: {}\n    Description: {}\n    Call Format:\n{}\n",
            tool.name(),
            tool.description(),
            indent(&pretty(&call), 6)
        ));
    }
    if tools.is_empty() {
        tools.push("  No tools available".to_string());
    }

    let mut transitions = Vec::new();
    for target in stage.transitions() {
        let call = json!({"action": "stage_transition", "stage": target});
        transitions.push(format!("  Transition to: {}\n    {}\n", target, call));
    }
    if transitions.is_empty() {
        transitions.push("  No transitions available".to_string());
    }

    [
        rule.clone(),
        "RESPONSE:".to_string(),
        content.to_string(),
        String::new(),
        rule.clone(),
        "ADDITIONAL CONTEXT:".to_string(),
        String::new(),
        format!("WORKFLOW: {}", workflow.name()),
        format!("Description: {}", workflow.description()),
        String::new(),
        "STRUCTURE:".to_string(),
        structure.join("\n"),
        String::new(),
        format!("CURRENT POSITION: {}", stage.name()),
        String::new(),
        "CURRENT STATE:".to_string(),
        pretty(&state.to_value()),
        String::new(),
        "YOU MAY CHOOSE THE FOLLOWING ACTIONS:".to_string(),
        String::new(),
        "1. ACTION CALLS (Tools):".to_string(),
        tools.join("\n"),
        String::new(),
        "2. STAGE CALLS (Transitions):".to_string(),
        transitions.join("\n"),
        String::new(),
        "You must ONLY respond with a single JSON object in one of the formats above. \
         Do not add comments or extra text."
            .to_string(),
        rule,
    ]
    .join("\n")
}

/// Placeholder arguments for each property of a JSON input schema
pub fn example_args(schema: &Value) -> Value {
    let mut args = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Value::Object(args);
    };
    for (name, property) in properties {
        let example = match property_type(property) {
            Some("integer") => json!(0),
            Some("number") => json!(0.0),
            Some("boolean") => json!(true),
            Some("array") => json!([]),
            Some("object") => json!({}),
            _ => json!(format!("<{}>", name)),
        };
        args.insert(name.clone(), example);
    }
    Value::Object(args)
}

/// Declared type of a schema property; the first non-null one for unions
fn property_type(property: &Value) -> Option<&str> {
    match property.get("type")? {
        Value::String(t) => Some(t.as_str()),
        Value::Array(types) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

fn or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Welcome message listing the workflows a client can pick from
pub fn render_handshake<'a, I>(config: &EngineConfig, workflows: I) -> String
where
    I: IntoIterator<Item = &'a Workflow>,
{
    let lines: Vec<String> = workflows
        .into_iter()
        .map(|wf| {
            if wf.description().is_empty() {
                format!("- {}", wf.name())
            } else {
                format!("- {}: {}", wf.name(), wf.description())
            }
        })
        .collect();

    format!(
        "Welcome to {} powered by Concierge.\n{}\n\n\
         Available workflows ({}):\n{}\n\n\
         What would you like to do?\nRespond with JSON:\n{{\n  \"action\": \"select_workflow\",\n  \"workflow_id\": \"workflow_name\"\n}}",
        config.app_name,
        config.app_description,
        lines.len(),
        lines.join("\n")
    )
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
