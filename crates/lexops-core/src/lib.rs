//! LexOps Core — transport-agnostic pipeline engine for bilingual
//! (Malay/English) legal workflows.
//!
//! The crate holds the engine (stage contract, workflow state, graph
//! builder, runner, confidence gate), the concrete stages of the intake,
//! drafting, research and evidence pipelines, and the text-generation
//! boundary they call out to. It has no HTTP server or storage dependency,
//! making it suitable for use in:
//!
//! - the `lexops` CLI
//! - an HTTP service that owns persistence and auth
//! - batch jobs over exported matters
//!
//! ```text
//! EngineConfig ──► LegalOpsEngine ──► run_intake / run_drafting / run_research / run_evidence
//!                        │
//!                        └──► PipelineRunner ──► Stage::process ──► StageEnvelope
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod pipelines;
pub mod stages;
pub mod text;
pub mod workflow;

// Convenience re-exports
pub use config::EngineConfig;
pub use error::{PipelineError, StageError, StateError};
pub use generation::{SharedGenerator, TextGenerator};
pub use pipelines::{LegalOpsEngine, PipelineOutcome, WorkflowStatus};
pub use stages::StageDeps;
pub use workflow::{
    ConfidenceGate, PipelineDefinition, PipelineRunner, RunResult, Stage, StageEnvelope,
    WorkflowState,
};
