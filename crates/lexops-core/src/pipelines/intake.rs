//! Intake pipeline wiring.
//!
//! ```text
//! collect ─► extract-text ─► normalize-bilingual-text ─► structure-case-facts ─► score-risk
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::stages::intake::{
    CollectStage, ExtractTextStage, NormalizeTextStage, ScoreRiskStage, SharedExtractor,
    StructureFactsStage,
};
use crate::stages::keys::{
    CASE_ID, CASE_SNAPSHOT, DOCUMENT_MANIFEST, DUPLICATES, FILES, METADATA, PAGE_COUNT, RISK_SCORES,
    SEGMENTS, SOURCE_TYPE, key_names,
};
use crate::stages::model::InputFile;
use crate::stages::StageDeps;
use crate::workflow::{PipelineDefinition, WorkflowState};

pub const NAME: &str = "intake";

/// Keys reported back to the caller.
pub const OUTPUTS: &[&str] = key_names!(
    DOCUMENT_MANIFEST,
    DUPLICATES,
    SEGMENTS,
    PAGE_COUNT,
    CASE_SNAPSHOT,
    RISK_SCORES,
);

pub fn build(deps: &StageDeps, extractor: SharedExtractor) -> Result<PipelineDefinition, PipelineError> {
    PipelineDefinition::builder(NAME)
        .add_stage(Arc::new(CollectStage::new(deps.clone())))
        .add_stage(Arc::new(ExtractTextStage::new(deps.clone(), extractor)))
        .add_stage(Arc::new(NormalizeTextStage::new(deps.clone())))
        .add_stage(Arc::new(StructureFactsStage::new(deps.clone())))
        .add_stage(Arc::new(ScoreRiskStage::new(deps.clone())))
        .set_entry(CollectStage::ID)
        .add_edge(CollectStage::ID, ExtractTextStage::ID)
        .add_edge(ExtractTextStage::ID, NormalizeTextStage::ID)
        .add_edge(NormalizeTextStage::ID, StructureFactsStage::ID)
        .add_edge(StructureFactsStage::ID, ScoreRiskStage::ID)
        .set_finish(&[ScoreRiskStage::ID])
        .require_inputs(&[FILES.name(), SOURCE_TYPE.name(), CASE_ID.name()])
        .build()
}

pub fn initial_state(
    files: &[InputFile],
    source_type: &str,
    metadata: Map<String, Value>,
    case_id: &str,
) -> Result<WorkflowState, PipelineError> {
    let mut state = WorkflowState::new();
    state.set(&FILES, &files.to_vec())?;
    state.set(&SOURCE_TYPE, &source_type.to_string())?;
    state.set(&METADATA, &metadata)?;
    state.set(&CASE_ID, &case_id.to_string())?;
    Ok(state)
}
