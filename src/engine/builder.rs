// SPDX-License-Identifier: MIT

//! Workflow builder - compiles YAML definitions into workflows
//!
//! Tool names in a definition are resolved against a [`ToolRegistry`];
//! every other check is left to [`WorkflowBuilder::build`].

use std::path::Path;

use super::loader::WorkflowLoader;
use super::registry::ToolRegistry;
use super::types::{StageDefinition, WorkflowDefinition};
use crate::model::error::{ConciergeError, WorkflowError};
use crate::model::stage::Stage;
use crate::model::state::Construct;
use crate::model::workflow::{Workflow, WorkflowBuilder};

/// High-level builder for constructing workflows from YAML definitions
pub struct Builder {
    loader: WorkflowLoader,
    registry: ToolRegistry,
}

impl Builder {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            registry,
        }
    }

    /// Build a workflow from a YAML file path
    pub async fn build_workflow<P: AsRef<Path>>(&self, path: P) -> Result<Workflow, ConciergeError> {
        let def = self.loader.load_workflow(path)?;
        self.build_from_def(&def).await
    }

    /// Build a workflow from a parsed definition
    pub async fn build_from_def(&self, def: &WorkflowDefinition) -> Result<Workflow, ConciergeError> {
        let mut builder = WorkflowBuilder::new(&def.name).description(&def.description);

        for stage_def in &def.stages {
            let stage = self.build_stage(stage_def, &def.constructs).await?;
            builder = builder.stage(stage);
        }
        if let Some(initial) = &def.initial {
            builder = builder.initial_stage(initial);
        }
        for transfer in &def.transfers {
            builder = builder.transfer(&transfer.from, &transfer.to, transfer.keys.to_transfer()?);
        }

        let workflow = builder.build()?;
        log::info!(
            "Built workflow '{}' with {} stages",
            workflow.name(),
            workflow.len()
        );
        Ok(workflow)
    }

    async fn build_stage(
        &self,
        def: &StageDefinition,
        constructs: &[Construct],
    ) -> Result<Stage, ConciergeError> {
        let mut stage = Stage::builder(&def.name)
            .description(&def.description)
            .transitions(def.transitions.iter().cloned());

        for name in &def.tools {
            let tool = self
                .registry
                .get(name)
                .await
                .ok_or_else(|| ConciergeError::tool_not_found(name))?;
            stage = stage.shared_tool(tool);
        }
        for prerequisite in &def.prerequisites {
            stage = stage.prerequisite(prerequisite.clone());
        }
        for requirement in &def.requires {
            let construct = constructs
                .iter()
                .find(|c| c.name == requirement.construct)
                .ok_or_else(|| WorkflowError::UnknownConstruct {
                    stage: def.name.clone(),
                    construct: requirement.construct.clone(),
                })?;
            stage = stage.requires(construct, requirement.scope);
        }
        for substage in &def.substages {
            stage = stage.substage(substage);
        }

        Ok(stage.build()?)
    }
}
