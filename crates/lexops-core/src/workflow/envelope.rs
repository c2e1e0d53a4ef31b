//! Stage envelope — the uniform result every stage hands back to the runner.
//!
//! ```json
//! {
//!   "status": "success",
//!   "data": { "caseSnapshot": { ... } },
//!   "confidence": 0.82,
//!   "humanReviewRequired": false,
//!   "metadata": {
//!     "stageId": "structure-case-facts",
//!     "timestamp": "2025-01-01T00:00:00Z",
//!     "versionTag": "1.0",
//!     "humanReviewed": false
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::confidence::ConfidenceGate;

pub const VERSION_TAG: &str = "1.0";

/// Outcome reported by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Success,
    /// The stage could not do its work; the runner fails the run.
    Error,
    /// Usable but degraded output; merged and flagged for review.
    PartialError,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Error => write!(f, "error"),
            StageStatus::PartialError => write!(f, "partial_error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetadata {
    pub stage_id: String,
    pub timestamp: DateTime<Utc>,
    pub version_tag: String,
    pub human_reviewed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
}

impl StageMetadata {
    pub fn new(stage_id: &str) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            timestamp: Utc::now(),
            version_tag: VERSION_TAG.to_string(),
            human_reviewed: false,
            reviewer_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEnvelope {
    pub status: StageStatus,
    /// Output fields; merged into the workflow state by the runner.
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub human_review_required: bool,
    pub metadata: StageMetadata,
}

/// Build a stage envelope. This is the only construction path, so every
/// envelope carries fresh metadata for `stage_id`.
///
/// `human_review_required` ends up true when the caller asks for it or when
/// the gate escalates `confidence`.
pub fn format_output(
    stage_id: &str,
    data: Map<String, Value>,
    confidence: Option<f64>,
    human_review_required: bool,
    status: StageStatus,
    gate: &ConfidenceGate,
) -> StageEnvelope {
    let escalated = confidence.map(|c| gate.escalate(c)).unwrap_or(false);
    StageEnvelope {
        status,
        data,
        confidence,
        human_review_required: human_review_required || escalated,
        metadata: StageMetadata::new(stage_id),
    }
}

/// Traceability record attached to extracted facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SourceReference {
    pub fn document(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            segment_id: None,
            page: None,
            confidence: None,
        }
    }

    pub fn segment(doc_id: impl Into<String>, segment_id: impl Into<String>, page: u32) -> Self {
        Self {
            doc_id: doc_id.into(),
            segment_id: Some(segment_id.into()),
            page: Some(page),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_output_escalates_low_confidence() {
        let gate = ConfidenceGate::default();
        let env = format_output("risk", Map::new(), Some(0.5), false, StageStatus::Success, &gate);
        assert!(env.human_review_required);
        assert_eq!(env.metadata.stage_id, "risk");
        assert_eq!(env.metadata.version_tag, VERSION_TAG);

        let env = format_output("risk", Map::new(), Some(0.9), false, StageStatus::Success, &gate);
        assert!(!env.human_review_required);
    }

    #[test]
    fn test_format_output_without_confidence_keeps_flag() {
        let gate = ConfidenceGate::default();
        let env = format_output("x", Map::new(), None, false, StageStatus::Success, &gate);
        assert!(!env.human_review_required);
        let env = format_output("x", Map::new(), None, true, StageStatus::PartialError, &gate);
        assert!(env.human_review_required);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let gate = ConfidenceGate::default();
        let mut data = Map::new();
        data.insert("k".into(), Value::from(1));
        let env = format_output("collect", data, Some(0.95), false, StageStatus::Success, &gate);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["humanReviewRequired"], false);
        assert_eq!(json["metadata"]["stageId"], "collect");
        assert!(json["metadata"].get("reviewerId").is_none());
    }

    #[test]
    fn test_source_reference_omits_empty_fields() {
        let r = SourceReference::segment("DOC-1", "SEG-1", 2).with_confidence(0.9);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["docId"], "DOC-1");
        assert_eq!(json["page"], 2);
        let bare = serde_json::to_value(SourceReference::document("DOC-2")).unwrap();
        assert!(bare.get("segmentId").is_none());
    }
}
