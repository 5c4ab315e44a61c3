// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing

use super::types::WorkflowDefinition;
use crate::model::error::{ConciergeError, WorkflowError};
use std::fs;
use std::path::Path;

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, ConciergeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, ConciergeError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransferKeys;
    use crate::model::stage::PrerequisiteScope;
    use crate::model::state::FieldType;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
name: hello
stages:
  - name: greet
    tools: [echo]
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "hello");
        assert!(def.description.is_empty());
        assert!(def.initial.is_none());
        assert_eq!(def.stages.len(), 1);
        assert_eq!(def.stages[0].tools, vec!["echo"]);
        assert!(def.stages[0].transitions.is_empty());
    }

    #[test]
    fn test_parse_full_workflow() {
        let yaml = r#"
name: stock
description: "Trade stocks"
initial: browse
constructs:
  - name: Order
    fields:
      - { name: symbol, type: string }
      - { name: quantity, type: integer }
      - { name: note, required: false }
stages:
  - name: browse
    description: "Browse stocks"
    tools: [store]
    transitions: [transact]
  - name: transact
    description: "Buy shares"
    tools: [publish]
    prerequisites:
      - field: user
        scope: global
        type: string
    requires:
      - construct: Order
    substages: [confirm]
  - name: confirm
    description: "Confirm the order"
transfers:
  - { from: browse, to: transact, keys: [symbol, quantity] }
  - { from: transact, to: confirm }
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.initial.as_deref(), Some("browse"));

        let order = &def.constructs[0];
        assert_eq!(order.fields.len(), 3);
        assert_eq!(order.fields[1].field_type, FieldType::Integer);
        assert_eq!(order.fields[2].field_type, FieldType::Any);
        assert!(!order.fields[2].required);

        let transact = &def.stages[1];
        assert_eq!(transact.prerequisites[0].scope, PrerequisiteScope::Global);
        assert_eq!(transact.prerequisites[0].field_type, Some(FieldType::String));
        assert_eq!(transact.requires[0].construct, "Order");
        assert_eq!(transact.requires[0].scope, PrerequisiteScope::Local);
        assert_eq!(transact.substages, vec!["confirm"]);

        assert_eq!(
            def.transfers[0].keys,
            TransferKeys::Keys(vec!["symbol".to_string(), "quantity".to_string()])
        );
        assert_eq!(def.transfers[1].keys, TransferKeys::default());
    }

    #[test]
    fn test_missing_file() {
        let err = WorkflowLoader::new()
            .load_workflow("does/not/exist.yaml")
            .unwrap_err();
        assert!(matches!(
            err,
            ConciergeError::Workflow(WorkflowError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let yaml = r#"
name:
  - invalid structure
"#;
        let result = WorkflowLoader::parse_yaml(yaml);
        assert!(result.is_err());
    }
}
