// SPDX-License-Identifier: MIT

//! State management for workflow sessions
//!
//! This module provides:
//! - `State` - immutable, versioned key/value snapshot
//! - `Construct` - named record schema used for tool outputs and prerequisites
//! - `FieldType` - value types a construct field may declare

mod schema;
mod store;

pub use schema::{Construct, ConstructField, FieldType};
pub use store::State;
