//! Concrete stages of the four legal pipelines.
//!
//! ```text
//! intake    collect ─► extract-text ─► normalize-bilingual-text ─► structure-case-facts ─► score-risk
//! drafting  plan-issues ─► select-template ─► {draft-primary ─► generate-companion | draft-secondary} ─► quality-check
//! research  search-authorities ─► build-argument-memo
//! evidence  certify-translations ─► build-evidence-index ─► prepare-hearing-materials
//! ```
//!
//! Stages receive their collaborators (generator, extractor, authority
//! source, confidence gate) at construction and keep no per-run state.
//! Soft problems lower a stage's confidence instead of setting the review
//! flag directly, so the flag always follows the gate.

pub mod drafting;
pub mod evidence;
pub mod intake;
pub mod keys;
pub mod model;
pub mod research;

use serde_json::{Map, Value};

use crate::error::{StageError, StateError};
use crate::generation::{GenerationError, GenerationRequest, SharedGenerator};
use crate::workflow::{ConfidenceGate, StateKey};

/// Collaborators every stage may need.
#[derive(Clone)]
pub struct StageDeps {
    pub generator: SharedGenerator,
    pub gate: ConfidenceGate,
}

impl StageDeps {
    pub fn new(generator: SharedGenerator, gate: ConfidenceGate) -> Self {
        Self { generator, gate }
    }

    pub(crate) async fn ask(&self, system: &str, prompt: String) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(prompt).with_system(system);
        Ok(self.generator.generate(&request).await?.content)
    }
}

/// Accumulates a stage's `data` map through typed keys.
#[derive(Debug, Default)]
pub(crate) struct Output {
    data: Map<String, Value>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: serde::Serialize>(mut self, key: &StateKey<T>, value: &T) -> Result<Self, StageError> {
        let value = serde_json::to_value(value).map_err(|e| StateError::Type {
            key: key.name().to_string(),
            message: e.to_string(),
        })?;
        self.data.insert(key.name().to_string(), value);
        Ok(self)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
