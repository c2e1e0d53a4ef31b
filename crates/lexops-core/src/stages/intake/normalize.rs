//! normalize-bilingual-text — segments become parallel-text records.
//!
//! No translation engine is wired in yet, so the source text is mirrored as
//! both the literal and idiomatic target with full alignment.

use async_trait::async_trait;

use crate::error::StageError;
use crate::stages::keys::{PARALLEL_TEXTS, SEGMENTS, key_names};
use crate::stages::model::ParallelText;
use crate::stages::{Output, StageDeps};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

pub struct NormalizeTextStage {
    deps: StageDeps,
}

impl NormalizeTextStage {
    pub const ID: &'static str = "normalize-bilingual-text";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for NormalizeTextStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(SEGMENTS)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(PARALLEL_TEXTS)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let segments = inputs.read(&SEGMENTS)?;
        let parallel: Vec<ParallelText> = segments
            .into_iter()
            .filter(|s| s.error.is_none())
            .map(|s| ParallelText {
                tgt_literal: s.text.clone(),
                tgt_idiom: s.text.clone(),
                src: s.text,
                src_lang: s.lang,
                segment_id: s.segment_id,
                doc_id: s.doc_id,
                page: s.page,
                alignment_score: 1.0,
                ocr_confidence: s.ocr_confidence,
            })
            .collect();

        let data = Output::new().put(&PARALLEL_TEXTS, &parallel)?.into_map();
        Ok(self.envelope(data, Some(1.0), &self.deps.gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OfflineGenerator;
    use crate::workflow::ConfidenceGate;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mirrors_segments_and_skips_errors() {
        let mut state = WorkflowState::new();
        state.insert_value(
            "segments",
            json!([
                {"segmentId": "S0", "docId": "D", "page": 1, "sequence": 0, "text": "Notis tuntutan.",
                 "lang": "ms", "langConfidence": 0.9, "ocrConfidence": 1.0},
                {"segmentId": "S1", "docId": "E", "page": 1, "sequence": 0, "text": "",
                 "lang": "unknown", "langConfidence": 0.0, "ocrConfidence": 0.0, "error": "no OCR"}
            ]),
        );
        let stage = NormalizeTextStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()));
        let env = stage.process(&state).await.unwrap();
        let texts = env.data["parallelTexts"].as_array().unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0]["tgtLiteral"], "Notis tuntutan.");
        assert_eq!(texts[0]["srcLang"], "ms");
        assert_eq!(env.confidence, Some(1.0));
    }
}
