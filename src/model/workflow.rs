// SPDX-License-Identifier: MIT

//! Workflow: the immutable graph of stages a session runs through

use std::collections::HashMap;

use super::error::WorkflowError;
use super::stage::Stage;
use super::state::State;

/// Which local keys follow the controller from one stage into the next
#[derive(Debug, Clone, PartialEq)]
pub enum StateTransfer {
    /// Carry the whole local state
    All,
    /// Carry only these keys
    Keys(Vec<String>),
}

impl StateTransfer {
    /// The part of `source` that is carried over
    pub fn apply(&self, source: &State) -> State {
        match self {
            StateTransfer::All => source.clone(),
            StateTransfer::Keys(keys) => source.subset(keys),
        }
    }
}

/// A validated, immutable workflow definition.
///
/// Built with [`WorkflowBuilder`]; shared between sessions through `Arc`.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    description: String,
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
    initial: usize,
    transfers: HashMap<(String, String), StateTransfer>,
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stages in registration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 1-based position of a stage in registration order
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|i| i + 1)
    }

    /// 0-based position of a stage, used to index [`Workflow::stages`]
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn initial_position(&self) -> usize {
        self.initial
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn initial_stage(&self) -> &Stage {
        &self.stages[self.initial]
    }

    pub fn transfer_for(&self, from: &str, to: &str) -> Option<&StateTransfer> {
        self.transfers.get(&(from.to_string(), to.to_string()))
    }
}

/// Generate a collision-free session id
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builder for [`Workflow`]; validation happens in [`WorkflowBuilder::build`]
pub struct WorkflowBuilder {
    name: String,
    description: String,
    stages: Vec<Stage>,
    initial: Option<String>,
    transfers: Vec<(String, String, StateTransfer)>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            stages: Vec::new(),
            initial: None,
            transfers: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a stage. The first stage added is initial unless another
    /// stage is added with `initial = true`.
    pub fn add_stage(mut self, stage: Stage, initial: bool) -> Self {
        if initial || self.initial.is_none() {
            self.initial = Some(stage.name().to_string());
        }
        self.stages.push(stage);
        self
    }

    pub fn stage(self, stage: Stage) -> Self {
        self.add_stage(stage, false)
    }

    /// Make a stage registered (or to be registered) the initial one
    pub fn initial_stage(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Carry local state from `from` into `to` on transition
    pub fn transfer(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        transfer: StateTransfer,
    ) -> Self {
        self.transfers.push((from.into(), to.into(), transfer));
        self
    }

    /// Validate and freeze the workflow
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.stages.is_empty() {
            return Err(WorkflowError::NoStages(self.name));
        }

        let mut stages = self.stages;
        let mut index = HashMap::new();
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.name().to_string(), i).is_some() {
                return Err(WorkflowError::DuplicateStage(stage.name().to_string()));
            }
        }

        for stage in &stages {
            if let Some(target) = stage.transitions().iter().find(|t| !index.contains_key(*t)) {
                return Err(WorkflowError::UnknownTransitionTarget {
                    stage: stage.name().to_string(),
                    target: target.clone(),
                });
            }
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        for stage in &stages {
            for substage in stage.substages() {
                if !index.contains_key(substage) {
                    return Err(WorkflowError::UnknownSubstage {
                        stage: stage.name().to_string(),
                        substage: substage.clone(),
                    });
                }
                if let Some(first) = parents.insert(substage.clone(), stage.name().to_string()) {
                    return Err(WorkflowError::MultipleParents {
                        substage: substage.clone(),
                        first,
                        second: stage.name().to_string(),
                    });
                }
            }
        }
        for stage in &stages {
            let start = stage.name();
            let mut current = start;
            for _ in 0..stages.len() {
                match parents.get(current) {
                    Some(parent) if parent == start => {
                        return Err(WorkflowError::SubstageCycle(start.to_string()));
                    }
                    Some(parent) => current = parent.as_str(),
                    None => break,
                }
            }
        }
        for (child, parent) in parents {
            stages[index[&child]].parent = Some(parent);
        }

        let initial_name = self.initial.unwrap_or_else(|| stages[0].name().to_string());
        let initial = *index
            .get(&initial_name)
            .ok_or(WorkflowError::UnknownInitialStage(initial_name.clone()))?;

        let mut transfers = HashMap::new();
        for (from, to, transfer) in self.transfers {
            if !index.contains_key(&from) || !index.contains_key(&to) {
                return Err(WorkflowError::UnknownTransferStage { from, to });
            }
            transfers.insert((from, to), transfer);
        }

        log::debug!(
            "Built workflow '{}' with {} stages (initial: {})",
            self.name,
            stages.len(),
            initial_name
        );

        Ok(Workflow {
            name: self.name,
            description: self.description,
            stages,
            index,
            initial,
            transfers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, transitions: &[&str]) -> Stage {
        Stage::builder(name)
            .description(format!("{} stage", name))
            .transitions(transitions.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_stage_is_initial() {
        let wf = Workflow::builder("stock")
            .stage(stage("browse", &["portfolio"]))
            .stage(stage("portfolio", &["browse"]))
            .build()
            .unwrap();

        assert_eq!(wf.initial_stage().name(), "browse");
        assert_eq!(wf.stage_index("portfolio"), Some(2));
        assert_eq!(wf.stage_names(), vec!["browse", "portfolio"]);
        assert_eq!(wf.len(), 2);
    }

    #[test]
    fn test_explicit_initial_stage() {
        let wf = Workflow::builder("stock")
            .stage(stage("browse", &[]))
            .add_stage(stage("portfolio", &[]), true)
            .build()
            .unwrap();
        assert_eq!(wf.initial_stage().name(), "portfolio");
    }

    #[test]
    fn test_unknown_transition_target_rejected() {
        let err = Workflow::builder("stock")
            .stage(stage("browse", &["checkout"]))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::UnknownTransitionTarget {
                stage: "browse".to_string(),
                target: "checkout".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let err = Workflow::builder("empty").build().unwrap_err();
        assert_eq!(err, WorkflowError::NoStages("empty".to_string()));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = Workflow::builder("stock")
            .stage(stage("browse", &[]))
            .stage(stage("browse", &[]))
            .build()
            .unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateStage("browse".to_string()));
    }

    #[test]
    fn test_unknown_initial_stage_rejected() {
        let err = Workflow::builder("stock")
            .stage(stage("browse", &[]))
            .initial_stage("nowhere")
            .build()
            .unwrap_err();
        assert_eq!(err, WorkflowError::UnknownInitialStage("nowhere".to_string()));
    }

    #[test]
    fn test_substages_get_parent() {
        let checkout = Stage::builder("checkout")
            .substage("payment")
            .transition("payment")
            .build()
            .unwrap();
        let wf = Workflow::builder("shop")
            .stage(checkout)
            .stage(stage("payment", &[]))
            .build()
            .unwrap();

        assert_eq!(wf.stage("payment").unwrap().parent(), Some("checkout"));
        assert_eq!(wf.stage("checkout").unwrap().parent(), None);
    }

    #[test]
    fn test_substage_with_two_parents_rejected() {
        let a = Stage::builder("a").substage("c").build().unwrap();
        let b = Stage::builder("b").substage("c").build().unwrap();
        let err = Workflow::builder("wf")
            .stage(a)
            .stage(b)
            .stage(stage("c", &[]))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MultipleParents { .. }));
    }

    #[test]
    fn test_substage_cycles_rejected() {
        let own = Stage::builder("a").substage("a").build().unwrap();
        let err = Workflow::builder("wf").stage(own).build().unwrap_err();
        assert_eq!(err, WorkflowError::SubstageCycle("a".to_string()));

        let a = Stage::builder("a").substage("b").build().unwrap();
        let b = Stage::builder("b").substage("c").build().unwrap();
        let c = Stage::builder("c").substage("a").build().unwrap();
        let err = Workflow::builder("wf").stage(a).stage(b).stage(c).build().unwrap_err();
        assert_eq!(err, WorkflowError::SubstageCycle("a".to_string()));
    }

    #[test]
    fn test_transfer_validation_and_lookup() {
        let err = Workflow::builder("stock")
            .stage(stage("browse", &[]))
            .transfer("browse", "ghost", StateTransfer::All)
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownTransferStage { .. }));

        let wf = Workflow::builder("stock")
            .stage(stage("browse", &["transact"]))
            .stage(stage("transact", &[]))
            .transfer("browse", "transact", StateTransfer::Keys(vec!["symbol".into()]))
            .build()
            .unwrap();
        assert!(wf.transfer_for("browse", "transact").is_some());
        assert!(wf.transfer_for("transact", "browse").is_none());
    }

    #[test]
    fn test_state_transfer_apply() {
        let source = State::new().set("symbol", "AAPL").set("quantity", 5).set("tmp", 1);

        let all = StateTransfer::All.apply(&source);
        assert_eq!(all, source);

        let keys = StateTransfer::Keys(vec!["symbol".into(), "quantity".into()]).apply(&source);
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec!["symbol", "quantity"]);
    }

    #[test]
    fn test_generated_session_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
