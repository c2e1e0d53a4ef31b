//! Evidence pipeline wiring.
//!
//! ```text
//! certify-translations ─► build-evidence-index ─► prepare-hearing-materials
//! ```

use std::sync::Arc;

use crate::error::PipelineError;
use crate::stages::evidence::{BuildEvidenceIndexStage, CertifyTranslationsStage, PrepareHearingStage};
use crate::stages::keys::{
    CASE_ID, DOCUMENTS, EVIDENCE_INDEX, HEARING_BUNDLE, TRANSLATION_CERTIFICATE, key_names,
};
use crate::stages::model::EvidenceDocument;
use crate::stages::StageDeps;
use crate::workflow::{PipelineDefinition, WorkflowState};

pub const NAME: &str = "evidence";

pub const OUTPUTS: &[&str] = key_names!(TRANSLATION_CERTIFICATE, EVIDENCE_INDEX, HEARING_BUNDLE);

pub fn build(deps: &StageDeps) -> Result<PipelineDefinition, PipelineError> {
    PipelineDefinition::builder(NAME)
        .add_stage(Arc::new(CertifyTranslationsStage::new(deps.clone())))
        .add_stage(Arc::new(BuildEvidenceIndexStage::new(deps.clone())))
        .add_stage(Arc::new(PrepareHearingStage::new(deps.clone())))
        .set_entry(CertifyTranslationsStage::ID)
        .add_edge(CertifyTranslationsStage::ID, BuildEvidenceIndexStage::ID)
        .add_edge(BuildEvidenceIndexStage::ID, PrepareHearingStage::ID)
        .set_finish(&[PrepareHearingStage::ID])
        .require_inputs(&[CASE_ID.name(), DOCUMENTS.name()])
        .build()
}

pub fn initial_state(case_id: &str, documents: &[EvidenceDocument]) -> Result<WorkflowState, PipelineError> {
    let mut state = WorkflowState::new();
    state.set(&CASE_ID, &case_id.to_string())?;
    state.set(&DOCUMENTS, &documents.to_vec())?;
    Ok(state)
}
