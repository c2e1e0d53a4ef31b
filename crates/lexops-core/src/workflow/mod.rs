//! Pipeline engine — stage contract, state, graph and runner.
//!
//! # Architecture
//!
//! ```text
//! PipelineBuilder ──► PipelineDefinition (DAG, built once, shared)
//!                              │
//! initial WorkflowState ──► PipelineRunner ──► Stage::process ──► StageEnvelope
//!                              │                                       │
//!                              ◄──────── merge data, OR review flag ◄──┘
//!                              │
//!                         RunResult::{Completed, Failed}
//! ```

pub mod confidence;
pub mod envelope;
pub mod graph;
pub mod retry;
pub mod runner;
pub mod stage;
pub mod state;

pub use confidence::{should_escalate, ConfidenceGate, DEFAULT_THRESHOLD};
pub use envelope::{format_output, SourceReference, StageEnvelope, StageMetadata, StageStatus};
pub use graph::{Branch, PipelineBuilder, PipelineDefinition, PipelineDescription};
pub use retry::RetryPolicy;
pub use runner::{PipelineRunner, RunResult, StageRecord};
pub use stage::{validate_input, SharedStage, Stage};
pub use state::{StateKey, WorkflowState};
