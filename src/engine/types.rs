// SPDX-License-Identifier: MIT

//! YAML schema types for declarative workflow definitions
//!
//! ```yaml
//! name: stock
//! description: Trade stocks
//! constructs:
//!   - name: Order
//!     fields:
//!       - { name: symbol, type: string }
//!       - { name: quantity, type: integer }
//! stages:
//!   - name: browse
//!     description: Browse stocks
//!     tools: [store]
//!     transitions: [transact]
//!   - name: transact
//!     description: Buy shares
//!     tools: [publish]
//!     requires:
//!       - construct: Order
//! transfers:
//!   - { from: browse, to: transact, keys: [symbol, quantity] }
//! ```

use serde::{Deserialize, Serialize};

use crate::model::error::WorkflowError;
use crate::model::stage::{Prerequisite, PrerequisiteScope};
use crate::model::state::Construct;
use crate::model::workflow::StateTransfer;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Initial stage; the first stage when omitted
    pub initial: Option<String>,
    /// Record schemas stages can require
    #[serde(default)]
    pub constructs: Vec<Construct>,
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub transfers: Vec<TransferDefinition>,
}

/// A stage; tools are referenced by registry name
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Constructs whose required fields must be present on entry
    #[serde(default)]
    pub requires: Vec<RequirementDefinition>,
    #[serde(default)]
    pub substages: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequirementDefinition {
    pub construct: String,
    #[serde(default)]
    pub scope: PrerequisiteScope,
}

/// Local keys carried from one stage to another on transition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransferDefinition {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub keys: TransferKeys,
}

/// `all` or a list of key names
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TransferKeys {
    Named(String),
    Keys(Vec<String>),
}

impl Default for TransferKeys {
    fn default() -> Self {
        TransferKeys::Named("all".to_string())
    }
}

impl TransferKeys {
    pub fn to_transfer(&self) -> Result<StateTransfer, WorkflowError> {
        match self {
            TransferKeys::Named(name) if name == "all" => Ok(StateTransfer::All),
            TransferKeys::Named(other) => Err(WorkflowError::InvalidTransfer(other.clone())),
            TransferKeys::Keys(keys) => Ok(StateTransfer::Keys(keys.clone())),
        }
    }
}
