//! Research pipeline wiring: `search-authorities ─► build-argument-memo`.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::stages::keys::{ARGUMENT_MEMO, AUTHORITIES, FILTERS, QUERY, key_names};
use crate::stages::model::SearchFilters;
use crate::stages::research::{BuildArgumentMemoStage, SearchAuthoritiesStage, SharedAuthoritySource};
use crate::stages::StageDeps;
use crate::workflow::{PipelineDefinition, WorkflowState};

pub const NAME: &str = "research";

pub const OUTPUTS: &[&str] = key_names!(AUTHORITIES, ARGUMENT_MEMO);

pub fn build(deps: &StageDeps, source: SharedAuthoritySource) -> Result<PipelineDefinition, PipelineError> {
    PipelineDefinition::builder(NAME)
        .add_stage(Arc::new(SearchAuthoritiesStage::new(deps.clone(), source)))
        .add_stage(Arc::new(BuildArgumentMemoStage::new(deps.clone())))
        .set_entry(SearchAuthoritiesStage::ID)
        .add_edge(SearchAuthoritiesStage::ID, BuildArgumentMemoStage::ID)
        .set_finish(&[BuildArgumentMemoStage::ID])
        .require_inputs(&[QUERY.name()])
        .build()
}

pub fn initial_state(query: &str, filters: Option<&SearchFilters>) -> Result<WorkflowState, PipelineError> {
    let mut state = WorkflowState::new();
    state.set(&QUERY, &query.to_string())?;
    if let Some(filters) = filters {
        state.set(&FILTERS, filters)?;
    }
    Ok(state)
}
