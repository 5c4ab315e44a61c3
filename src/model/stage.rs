// SPDX-License-Identifier: MIT

//! Stages: nodes of the workflow graph
//!
//! A stage owns a set of tools, the names of the stages it may transition to,
//! and the prerequisites that must hold before it can be entered.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::WorkflowError;
use super::state::{Construct, FieldType, State};
use super::tool::{Scope, Tool};

/// Which state a prerequisite is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrerequisiteScope {
    /// The target stage's local state, as it will be after entry
    #[default]
    Local,
    /// The session-wide state
    Global,
}

/// A field that must be present before a stage can be entered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    pub field: String,
    #[serde(default)]
    pub scope: PrerequisiteScope,
    /// When set, a present value of another type counts as missing
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
}

impl Prerequisite {
    pub fn local(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            scope: PrerequisiteScope::Local,
            field_type: None,
        }
    }

    pub fn global(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            scope: PrerequisiteScope::Global,
            field_type: None,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Check the prerequisite against the state it is scoped to
    pub fn is_satisfied_by(&self, scope: &Scope) -> bool {
        let state = match self.scope {
            PrerequisiteScope::Local => &scope.local,
            PrerequisiteScope::Global => &scope.global,
        };
        match (state.get(&self.field), self.field_type) {
            (None, _) | (Some(serde_json::Value::Null), _) => false,
            (Some(value), Some(field_type)) => field_type.matches(value),
            (Some(_), None) => true,
        }
    }
}

/// A node in the workflow graph
pub struct Stage {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) tools: Vec<Arc<dyn Tool>>,
    pub(crate) tool_index: HashMap<String, usize>,
    pub(crate) transitions: Vec<String>,
    pub(crate) prerequisites: Vec<Prerequisite>,
    pub(crate) substages: Vec<String>,
    /// Set by the owning workflow when another stage lists this one as a substage
    pub(crate) parent: Option<String>,
}

impl Stage {
    pub fn builder(name: impl Into<String>) -> StageBuilder {
        StageBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Tools in registration order
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tool_index.get(name).map(|&i| &self.tools[i])
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn transitions(&self) -> &[String] {
        &self.transitions
    }

    pub fn prerequisites(&self) -> &[Prerequisite] {
        &self.prerequisites
    }

    pub fn substages(&self) -> &[String] {
        &self.substages
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Tools callable in the given state. Every tool is always available.
    pub fn get_available_tools(&self, _state: &State) -> Vec<&Arc<dyn Tool>> {
        self.tools.iter().collect()
    }

    /// Check if a transition to `target` is declared
    pub fn can_transition_to(&self, target: &str) -> bool {
        self.transitions.iter().any(|t| t == target)
    }

    /// Prerequisite fields of this stage not satisfied by `scope`, in
    /// declaration order and without duplicates
    pub fn get_missing_prerequisites(&self, scope: &Scope) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for prereq in &self.prerequisites {
            if !prereq.is_satisfied_by(scope) && !missing.contains(&prereq.field) {
                missing.push(prereq.field.clone());
            }
        }
        missing
    }

    /// Render the stage as a prompt for a model.
    ///
    /// The output only depends on the stage and `state`.
    pub fn generate_prompt(&self, state: &State) -> String {
        let mut parts = vec![
            format!("You are in the '{}' stage.", self.name),
            format!("Description: {}", self.description),
            String::new(),
        ];

        let entries: Vec<String> = state
            .as_map()
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| format!("  {}: {}", k, v))
            .collect();
        if !entries.is_empty() {
            parts.push("Current State:".to_string());
            parts.extend(entries);
            parts.push(String::new());
        }

        if !self.tools.is_empty() {
            parts.push("Available Tools:".to_string());
            for tool in &self.tools {
                parts.push(format!("  - {}: {}", tool.name(), tool.description()));
            }
            parts.push(String::new());
            parts.push("To use a tool, respond with:".to_string());
            parts.push(
                r#"{"action": "method_call", "tool": "tool_name", "args": {...}}"#.to_string(),
            );
            parts.push(String::new());
        }

        if !self.transitions.is_empty() {
            parts.push(format!(
                "You can transition to: {}",
                self.transitions.join(", ")
            ));
            parts.push(
                r#"To transition: {"action": "stage_transition", "stage": "stage_name"}"#
                    .to_string(),
            );
            parts.push(String::new());
        }

        parts.push("Need user input? Respond with:".to_string());
        parts.push(
            r#"{"action": "elicit", "field": "field_name", "message": "Your question"}"#
                .to_string(),
        );
        parts.push(String::new());

        parts.push("To respond to user:".to_string());
        parts.push(r#"{"action": "respond", "message": "Your response"}"#.to_string());

        parts.join("\n")
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("tools", &self.tool_names())
            .field("transitions", &self.transitions)
            .field("prerequisites", &self.prerequisites)
            .field("substages", &self.substages)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Builder for [`Stage`]. Tool name collisions fail at `build()`.
pub struct StageBuilder {
    name: String,
    description: String,
    tools: Vec<Arc<dyn Tool>>,
    transitions: Vec<String>,
    prerequisites: Vec<Prerequisite>,
    substages: Vec<String>,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tools: Vec::new(),
            transitions: Vec::new(),
            prerequisites: Vec::new(),
            substages: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn tool(self, tool: impl Tool + 'static) -> Self {
        self.shared_tool(Arc::new(tool))
    }

    /// Add a tool that is shared with other stages
    pub fn shared_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn transition(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !self.transitions.contains(&target) {
            self.transitions.push(target);
        }
        self
    }

    pub fn transitions<I, S>(self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        targets.into_iter().fold(self, |b, t| b.transition(t))
    }

    pub fn prerequisite(mut self, prerequisite: Prerequisite) -> Self {
        self.prerequisites.push(prerequisite);
        self
    }

    /// Require every required field of `construct`, typed, in `scope`
    pub fn requires(mut self, construct: &Construct, scope: PrerequisiteScope) -> Self {
        for field in construct.required_fields() {
            self.prerequisites.push(Prerequisite {
                field: field.name.clone(),
                scope,
                field_type: Some(field.field_type),
            });
        }
        self
    }

    /// Annotate another stage of the workflow as a child of this one
    pub fn substage(mut self, name: impl Into<String>) -> Self {
        self.substages.push(name.into());
        self
    }

    pub fn build(self) -> Result<Stage, WorkflowError> {
        if self.name.is_empty() {
            return Err(WorkflowError::EmptyStageName);
        }

        let mut tool_index = HashMap::new();
        for (i, tool) in self.tools.iter().enumerate() {
            if tool_index.insert(tool.name().to_string(), i).is_some() {
                return Err(WorkflowError::DuplicateTool {
                    stage: self.name,
                    tool: tool.name().to_string(),
                });
            }
        }

        Ok(Stage {
            name: self.name,
            description: self.description,
            tools: self.tools,
            tool_index,
            transitions: self.transitions,
            prerequisites: self.prerequisites,
            substages: self.substages,
            parent: None,
        })
    }
}
