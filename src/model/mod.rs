// SPDX-License-Identifier: MIT

//! Workflow data model
//!
//! - `state` - immutable versioned state and construct schemas
//! - `tool` - the `Tool` trait and closure-backed tools
//! - `stage` - graph nodes with tools, transitions and prerequisites
//! - `workflow` - validated stage graphs and session factory
//! - `error` - error taxonomy

pub mod error;
pub mod stage;
pub mod state;
pub mod tool;
pub mod workflow;

pub use error::{ActionError, ConciergeError, WorkflowError};
pub use stage::{Prerequisite, PrerequisiteScope, Stage, StageBuilder};
pub use state::{Construct, FieldType, State};
pub use tool::{FnTool, Scope, Tool, ToolError, ToolOutput};
pub use workflow::{StateTransfer, Workflow, WorkflowBuilder};
