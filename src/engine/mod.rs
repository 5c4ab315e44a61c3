// SPDX-License-Identifier: MIT

//! Session runtime
//!
//! - `action` - controller action protocol and results
//! - `orchestrator` - `Session`, the per-session state machine
//! - `render` / `language` - text replies for the controller
//! - `registry` - tool, workflow and session registries
//! - `store` - session persistence interface
//! - `types` / `loader` / `builder` - declarative YAML workflows
//! - `builtin` - generic tools for declarative workflows
//! - `config` - environment configuration

pub mod action;
pub mod builder;
pub mod builtin;
pub mod config;
pub mod language;
pub mod loader;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod store;
pub mod types;

pub use action::{Action, ActionErrorKind, ActionKind, ActionResult, ErrorResult};
pub use config::EngineConfig;
pub use language::LanguageEngine;
pub use orchestrator::{HistoryEntry, Outcome, Session, SessionInfo};
pub use registry::{SessionRegistry, ToolRegistry, WorkflowRegistry};
pub use render::Presentation;
pub use store::{MemoryStore, SessionRecord, SessionStore};
