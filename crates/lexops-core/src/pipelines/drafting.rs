//! Drafting pipeline wiring.
//!
//! ```text
//! plan-issues ─► select-template ─┬─ Primary ───► draft-primary ─► generate-companion ─┐
//!                                 └─ Secondary ─► draft-secondary ─────────────────────┴─► quality-check
//! ```
//!
//! The branch reads the `templateLanguage` tag written by `select-template`.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::stages::drafting::{
    DraftPrimaryStage, DraftSecondaryStage, GenerateCompanionStage, PlanIssuesStage,
    QualityCheckStage, SelectTemplateStage,
};
use crate::stages::keys::{
    CASE_SNAPSHOT, ISSUES_SELECTED, PLANNED_ISSUES, PRAYERS_SELECTED, PRIMARY_DRAFT, QA_REPORT,
    SECONDARY_DRAFT, TEMPLATE_ID, TEMPLATE_INFO, TEMPLATE_LANGUAGE, key_names,
};
use crate::stages::model::{CaseSnapshot, Issue, Prayer, TemplateLanguage};
use crate::stages::StageDeps;
use crate::workflow::{PipelineDefinition, WorkflowState};

pub const NAME: &str = "drafting";

pub const OUTPUTS: &[&str] = key_names!(
    PLANNED_ISSUES,
    TEMPLATE_INFO,
    TEMPLATE_LANGUAGE,
    PRIMARY_DRAFT,
    SECONDARY_DRAFT,
    QA_REPORT,
);

/// Branch taken after template selection. An absent tag routes to the
/// primary path.
pub fn route(state: &WorkflowState) -> TemplateLanguage {
    state
        .read_opt(&TEMPLATE_LANGUAGE)
        .ok()
        .flatten()
        .unwrap_or(TemplateLanguage::Primary)
}

pub fn build(deps: &StageDeps) -> Result<PipelineDefinition, PipelineError> {
    PipelineDefinition::builder(NAME)
        .add_stage(Arc::new(PlanIssuesStage::new(deps.clone())))
        .add_stage(Arc::new(SelectTemplateStage::new(deps.clone())))
        .add_stage(Arc::new(DraftPrimaryStage::new(deps.clone())))
        .add_stage(Arc::new(GenerateCompanionStage::new(deps.clone())))
        .add_stage(Arc::new(DraftSecondaryStage::new(deps.clone())))
        .add_stage(Arc::new(QualityCheckStage::new(deps.clone())))
        .set_entry(PlanIssuesStage::ID)
        .add_edge(PlanIssuesStage::ID, SelectTemplateStage::ID)
        .add_conditional_edge(
            SelectTemplateStage::ID,
            route,
            [
                (TemplateLanguage::Primary, DraftPrimaryStage::ID),
                (TemplateLanguage::Secondary, DraftSecondaryStage::ID),
            ],
        )
        .add_edge(DraftPrimaryStage::ID, GenerateCompanionStage::ID)
        .add_edge(GenerateCompanionStage::ID, QualityCheckStage::ID)
        .add_edge(DraftSecondaryStage::ID, QualityCheckStage::ID)
        .set_finish(&[QualityCheckStage::ID])
        .require_inputs(&[CASE_SNAPSHOT.name()])
        .build()
}

/// `template_id`, `issues` and `prayers` are optional; empty lists are left
/// out so `plan-issues` fills them.
pub fn initial_state(
    case_snapshot: &CaseSnapshot,
    template_id: Option<&str>,
    issues: &[Issue],
    prayers: &[Prayer],
) -> Result<WorkflowState, PipelineError> {
    let mut state = WorkflowState::new();
    state.set(&CASE_SNAPSHOT, case_snapshot)?;
    if let Some(id) = template_id {
        state.set(&TEMPLATE_ID, &id.to_string())?;
    }
    if !issues.is_empty() {
        state.set(&ISSUES_SELECTED, &issues.to_vec())?;
    }
    if !prayers.is_empty() {
        state.set(&PRAYERS_SELECTED, &prayers.to_vec())?;
    }
    Ok(state)
}
