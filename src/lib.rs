// SPDX-License-Identifier: MIT

//! Stage-graph workflow engine
//!
//! A [`Workflow`](model::Workflow) is a directed graph of stages, each with
//! its own tools. A [`Session`](engine::Session) walks the graph one
//! controller action at a time and answers every action with a rendered
//! description of where it stands.

pub mod engine;
pub mod model;
