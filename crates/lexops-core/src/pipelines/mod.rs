//! The four legal pipelines and the engine that runs them.
//!
//! [`LegalOpsEngine`] builds every pipeline definition once, with the same
//! injected collaborators, and exposes one entry point per pipeline. Each
//! call gets a private [`WorkflowState`], so one engine can serve any number
//! of concurrent runs.

pub mod drafting;
pub mod evidence;
pub mod intake;
pub mod research;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::generation::SharedGenerator;
use crate::stages::intake::{NoOcrExtractor, SharedExtractor};
use crate::stages::model::{
    ArgumentMemo, Authority, CaseSnapshot, EvidenceDocument, InputFile, Issue, Prayer, SearchFilters,
};
use crate::stages::research::{
    BuildArgumentMemoStage, FileAuthoritySource, NoAuthorities, SharedAuthoritySource,
};
use crate::stages::StageDeps;
use crate::workflow::{
    ConfidenceGate, PipelineDefinition, PipelineDescription, PipelineRunner, RunResult,
    StageRecord, WorkflowState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

/// What a pipeline call reports back: status, the pipeline's output keys
/// that were written, and the failure if there was one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub workflow_status: WorkflowStatus,
    #[serde(flatten)]
    pub outputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    pub human_review_required: bool,
    pub run_id: String,
    pub trace: Vec<StageRecord>,
}

impl PipelineOutcome {
    /// Project a run onto the output keys of its pipeline. Failed runs keep
    /// whatever outputs the partial state already holds.
    pub fn from_run(result: RunResult, output_keys: &[&str]) -> Self {
        let human_review_required = result.human_review_required();
        let run_id = result.run_id().to_string();
        let trace = result.trace().to_vec();
        let failure = result
            .failure()
            .map(|(stage, error)| (stage.to_string(), error.to_string()));
        let state = result.into_state();

        let outputs = output_keys
            .iter()
            .filter_map(|k| state.get(k).map(|v| (k.to_string(), v.clone())))
            .collect();

        let (workflow_status, failed_stage, error) = match failure {
            Some((stage, error)) => (WorkflowStatus::Failed, Some(stage), Some(error)),
            None => (WorkflowStatus::Completed, None, None),
        };
        Self {
            workflow_status,
            outputs,
            error,
            failed_stage,
            human_review_required,
            run_id,
            trace,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.workflow_status == WorkflowStatus::Completed
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key)
    }
}

/// All four pipelines, built once over shared collaborators.
pub struct LegalOpsEngine {
    deps: StageDeps,
    runner: PipelineRunner,
    intake: PipelineDefinition,
    drafting: PipelineDefinition,
    research: PipelineDefinition,
    evidence: PipelineDefinition,
}

impl LegalOpsEngine {
    /// Engine over the configured generator, gate and authority file.
    pub fn new(config: &EngineConfig) -> Result<Self, PipelineError> {
        let generator = config.build_generator()?;
        let source: SharedAuthoritySource = match &config.research.authorities_file {
            Some(path) => Arc::new(FileAuthoritySource::new(path.clone())),
            None => Arc::new(NoAuthorities),
        };
        Self::from_parts(StageDeps::new(generator, config.gate()), Arc::new(NoOcrExtractor), source)
    }

    /// Engine over `generator` with no OCR and no authority database.
    pub fn with_generator(generator: SharedGenerator, gate: ConfidenceGate) -> Result<Self, PipelineError> {
        Self::from_parts(
            StageDeps::new(generator, gate),
            Arc::new(NoOcrExtractor),
            Arc::new(NoAuthorities),
        )
    }

    pub fn from_parts(
        deps: StageDeps,
        extractor: SharedExtractor,
        source: SharedAuthoritySource,
    ) -> Result<Self, PipelineError> {
        let engine = Self {
            intake: intake::build(&deps, extractor)?,
            drafting: drafting::build(&deps)?,
            research: research::build(&deps, source)?,
            evidence: evidence::build(&deps)?,
            runner: PipelineRunner::new(),
            deps,
        };
        tracing::info!(
            "[Engine] pipelines ready (review threshold {})",
            engine.deps.gate.threshold()
        );
        Ok(engine)
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        match name {
            intake::NAME => Some(&self.intake),
            drafting::NAME => Some(&self.drafting),
            research::NAME => Some(&self.research),
            evidence::NAME => Some(&self.evidence),
            _ => None,
        }
    }

    /// Graph description of every pipeline.
    pub fn describe(&self) -> Vec<PipelineDescription> {
        [&self.intake, &self.drafting, &self.research, &self.evidence]
            .iter()
            .map(|p| p.describe())
            .collect()
    }

    pub async fn run_intake(
        &self,
        files: &[InputFile],
        source_type: &str,
        metadata: Map<String, Value>,
        case_id: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        let state = intake::initial_state(files, source_type, metadata, case_id)?;
        Ok(self.run_state(&self.intake, intake::OUTPUTS, state).await)
    }

    pub async fn run_drafting(
        &self,
        case_snapshot: &CaseSnapshot,
        template_id: Option<&str>,
        issues: &[Issue],
        prayers: &[Prayer],
    ) -> Result<PipelineOutcome, PipelineError> {
        let state = drafting::initial_state(case_snapshot, template_id, issues, prayers)?;
        Ok(self.run_state(&self.drafting, drafting::OUTPUTS, state).await)
    }

    pub async fn run_research(
        &self,
        query: &str,
        filters: Option<&SearchFilters>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let state = research::initial_state(query, filters)?;
        Ok(self.run_state(&self.research, research::OUTPUTS, state).await)
    }

    pub async fn run_evidence(
        &self,
        case_id: &str,
        documents: &[EvidenceDocument],
    ) -> Result<PipelineOutcome, PipelineError> {
        let state = evidence::initial_state(case_id, documents)?;
        Ok(self.run_state(&self.evidence, evidence::OUTPUTS, state).await)
    }

    /// Run the named pipeline from a caller-built state, e.g. one read
    /// from a JSON request file.
    pub async fn run_named(&self, name: &str, state: WorkflowState) -> Result<PipelineOutcome, PipelineError> {
        let outputs = match name {
            intake::NAME => intake::OUTPUTS,
            drafting::NAME => drafting::OUTPUTS,
            research::NAME => research::OUTPUTS,
            evidence::NAME => evidence::OUTPUTS,
            other => return Err(PipelineError::Build(format!("unknown pipeline '{}'", other))),
        };
        let Some(pipeline) = self.pipeline(name) else {
            return Err(PipelineError::Build(format!("unknown pipeline '{}'", name)));
        };
        Ok(self.run_state(pipeline, outputs, state).await)
    }

    /// Argument memo for known authorities and issues, without searching.
    pub async fn build_argument_only(
        &self,
        authorities: &[Authority],
        issues: &[Issue],
        query: &str,
    ) -> ArgumentMemo {
        BuildArgumentMemoStage::new(self.deps.clone())
            .memo(query, issues, authorities)
            .await
    }

    async fn run_state(
        &self,
        pipeline: &PipelineDefinition,
        outputs: &[&str],
        state: WorkflowState,
    ) -> PipelineOutcome {
        let result = self.runner.run(pipeline, state).await;
        PipelineOutcome::from_run(result, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OfflineGenerator;
    use serde_json::json;

    fn engine() -> LegalOpsEngine {
        LegalOpsEngine::with_generator(Arc::new(OfflineGenerator), ConfidenceGate::default()).unwrap()
    }

    #[test]
    fn test_describe_lists_all_pipelines() {
        let names: Vec<_> = engine().describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["intake", "drafting", "research", "evidence"]);
    }

    #[test]
    fn test_drafting_graph_has_one_branch() {
        let engine = engine();
        let d = engine.pipeline("drafting").unwrap().describe();
        assert_eq!(d.branches.len(), 1);
        assert_eq!(d.branches[0].from, "select-template");
        assert_eq!(d.branches[0].routes["primary"], "draft-primary");
        assert_eq!(d.branches[0].routes["secondary"], "draft-secondary");
        assert_eq!(d.finish, vec!["quality-check"]);
    }

    #[test]
    fn test_every_output_is_guaranteed_by_a_stage() {
        let engine = engine();
        for (name, outputs) in [
            (intake::NAME, intake::OUTPUTS),
            (drafting::NAME, drafting::OUTPUTS),
            (research::NAME, research::OUTPUTS),
            (evidence::NAME, evidence::OUTPUTS),
        ] {
            let def = engine.pipeline(name).unwrap();
            let guaranteed: Vec<&str> = def
                .describe()
                .stages
                .iter()
                .flat_map(|id| def.stage(id).unwrap().guaranteed_keys().to_vec())
                .collect();
            for key in outputs {
                assert!(guaranteed.contains(key), "{name}: no stage guarantees '{key}'");
            }
        }
    }

    #[tokio::test]
    async fn test_outcome_serialises_flat() {
        let outcome = engine().run_evidence("CASE-1", &[]).await.unwrap();
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["workflowStatus"], "completed");
        assert_eq!(v["evidenceIndex"]["totalItems"], 0);
        assert!(v.get("error").is_none());
        assert_eq!(v["trace"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_rejected() {
        let mut state = WorkflowState::new();
        state.insert_value("query", json!("x"));
        assert!(engine().run_named("billing", state).await.is_err());
    }
}
