//! extract-text — per-page text, sentence language detection, segments.
//!
//! Plain-text files are decoded directly (form feeds separate pages). Every
//! other type goes through the injected [`TextExtractor`]; a failed
//! extraction becomes an error segment with zero OCR confidence rather than
//! failing the run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::StageError;
use crate::stages::keys::{DOCUMENT_MANIFEST, FILES, PAGE_COUNT, SEGMENTS, key_names};
use crate::stages::model::{DocumentEntry, Segment};
use crate::stages::{Output, StageDeps};
use crate::text::{detect_language, split_sentences, Lang};
use crate::workflow::confidence::clamp;
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub page: u32,
    pub text: String,
    pub ocr_confidence: f64,
}

/// OCR / binary text extraction boundary.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, entry: &DocumentEntry, bytes: &[u8]) -> Result<Vec<ExtractedPage>, StageError>;
}

pub type SharedExtractor = Arc<dyn TextExtractor>;

/// Used when no OCR engine is configured; refuses every binary document.
#[derive(Debug, Clone, Default)]
pub struct NoOcrExtractor;

#[async_trait]
impl TextExtractor for NoOcrExtractor {
    async fn extract(&self, entry: &DocumentEntry, _bytes: &[u8]) -> Result<Vec<ExtractedPage>, StageError> {
        Err(StageError::Failed(format!(
            "no OCR engine configured for {} ({})",
            entry.filename, entry.mime_type
        )))
    }
}

pub struct ExtractTextStage {
    deps: StageDeps,
    extractor: SharedExtractor,
}

impl ExtractTextStage {
    pub const ID: &'static str = "extract-text";

    pub fn new(deps: StageDeps, extractor: SharedExtractor) -> Self {
        Self { deps, extractor }
    }
}

#[async_trait]
impl Stage for ExtractTextStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(FILES, DOCUMENT_MANIFEST)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(SEGMENTS, PAGE_COUNT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let files = inputs.read(&FILES)?;
        let manifest = inputs.read(&DOCUMENT_MANIFEST)?;
        let by_hash: HashMap<&str, &DocumentEntry> =
            manifest.iter().map(|d| (d.sha256.as_str(), d)).collect();

        let mut segments = Vec::new();
        let mut page_count = 0u32;
        let mut done: Vec<&str> = Vec::new();

        for file in &files {
            let bytes = file.bytes()?;
            let sha256 = hex::encode(Sha256::digest(&bytes));
            let Some(entry) = by_hash.get(sha256.as_str()).copied() else {
                continue;
            };
            if done.contains(&entry.doc_id.as_str()) {
                continue;
            }
            done.push(&entry.doc_id);

            let pages = if file.is_plain_text() {
                Ok(text_pages(&String::from_utf8_lossy(&bytes)))
            } else {
                self.extractor.extract(entry, &bytes).await
            };

            match pages {
                Ok(pages) => {
                    page_count += pages.len() as u32;
                    for page in &pages {
                        segments.extend(segment_page(&entry.doc_id, page, entry.language_hint));
                    }
                }
                Err(e) => {
                    tracing::warn!("[Intake] extraction failed for {}: {}", entry.doc_id, e);
                    page_count += 1;
                    segments.push(Segment {
                        segment_id: format!("SEG-{}-p1-s0", entry.doc_id),
                        doc_id: entry.doc_id.clone(),
                        page: 1,
                        sequence: 0,
                        text: String::new(),
                        lang: Lang::Unknown,
                        lang_confidence: 0.0,
                        ocr_confidence: 0.0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let confidence = if segments.is_empty() {
            0.0
        } else {
            clamp(segments.iter().map(|s| s.ocr_confidence).sum::<f64>() / segments.len() as f64)
        };
        tracing::debug!(
            "[Intake] {} segment(s) over {} page(s), mean OCR confidence {:.2}",
            segments.len(),
            page_count,
            confidence
        );

        let data = Output::new()
            .put(&SEGMENTS, &segments)?
            .put(&PAGE_COUNT, &page_count)?
            .into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn text_pages(text: &str) -> Vec<ExtractedPage> {
    text.split('\u{c}')
        .enumerate()
        .map(|(i, page)| ExtractedPage {
            page: i as u32 + 1,
            text: page.to_string(),
            ocr_confidence: 1.0,
        })
        .collect()
}

/// Merge consecutive sentences of the same language into segments.
fn segment_page(doc_id: &str, page: &ExtractedPage, hint: Option<Lang>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    for sentence in split_sentences(&page.text) {
        let (mut lang, mut lang_confidence) = detect_language(&sentence);
        if lang == Lang::Unknown {
            if let Some(hint) = hint {
                lang = hint;
                lang_confidence = 0.6;
            }
        }
        match out.last_mut() {
            Some(last) if last.lang == lang => {
                last.text.push(' ');
                last.text.push_str(&sentence);
                last.lang_confidence = last.lang_confidence.min(lang_confidence);
            }
            _ => {
                let sequence = out.len() as u32;
                out.push(Segment {
                    segment_id: format!("SEG-{}-p{}-s{}", doc_id, page.page, sequence),
                    doc_id: doc_id.to_string(),
                    page: page.page,
                    sequence,
                    text: sentence,
                    lang,
                    lang_confidence,
                    ocr_confidence: clamp(page.ocr_confidence),
                    error: None,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OfflineGenerator;
    use crate::workflow::ConfidenceGate;
    use serde_json::json;

    struct FixedOcr;

    #[async_trait]
    impl TextExtractor for FixedOcr {
        async fn extract(&self, _entry: &DocumentEntry, _bytes: &[u8]) -> Result<Vec<ExtractedPage>, StageError> {
            Ok(vec![ExtractedPage {
                page: 1,
                text: "The defendant has failed to pay the sum.".into(),
                ocr_confidence: 0.7,
            }])
        }
    }

    /// Reports OCR confidence as a percentage.
    struct PercentOcr;

    #[async_trait]
    impl TextExtractor for PercentOcr {
        async fn extract(&self, _entry: &DocumentEntry, _bytes: &[u8]) -> Result<Vec<ExtractedPage>, StageError> {
            Ok(vec![ExtractedPage {
                page: 1,
                text: "The defendant has failed to pay the sum.".into(),
                ocr_confidence: 97.0,
            }])
        }
    }

    fn deps() -> StageDeps {
        StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default())
    }

    fn entry(content: &[u8], mime: &str) -> serde_json::Value {
        json!({
            "docId": "DOC-1",
            "filename": "f",
            "mimeType": mime,
            "sizeBytes": content.len(),
            "sha256": hex::encode(Sha256::digest(content)),
            "sourceType": "upload",
            "receivedAt": "2024-01-01T00:00:00Z",
            "ocrNeeded": false,
            "confidence": 0.95
        })
    }

    fn state(file: serde_json::Value, entry: serde_json::Value) -> WorkflowState {
        let mut s = WorkflowState::new();
        s.insert_value("files", json!([file]));
        s.insert_value("documentManifest", json!([entry]));
        s
    }

    #[tokio::test]
    async fn test_segments_plain_text_by_language() {
        let text = "Plaintif telah membuat tuntutan terhadap defendan. Defendan tidak membayar jumlah yang terhutang.\u{c}The plaintiff claims the outstanding sum from the defendant.";
        let s = state(
            json!({"filename": "f", "content": text}),
            entry(text.as_bytes(), "text/plain"),
        );
        let env = ExtractTextStage::new(deps(), Arc::new(NoOcrExtractor))
            .process(&s)
            .await
            .unwrap();
        let segments: Vec<Segment> = serde_json::from_value(env.data["segments"].clone()).unwrap();
        assert_eq!(env.data["pageCount"], 2);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].lang, Lang::Ms);
        assert_eq!(segments[0].segment_id, "SEG-DOC-1-p1-s0");
        assert!(segments[0].text.contains("Defendan"));
        assert_eq!(segments[1].page, 2);
        assert_eq!(env.confidence, Some(1.0));
    }

    #[tokio::test]
    async fn test_binary_without_ocr_yields_error_segment() {
        let s = state(
            json!({"filename": "f", "mimeType": "application/pdf", "content": "AAEC", "encoding": "base64"}),
            entry(&[0, 1, 2], "application/pdf"),
        );
        let env = ExtractTextStage::new(deps(), Arc::new(NoOcrExtractor))
            .process(&s)
            .await
            .unwrap();
        assert_eq!(env.data["segments"][0]["ocrConfidence"], 0.0);
        assert!(env.data["segments"][0]["error"].as_str().unwrap().contains("no OCR"));
        assert_eq!(env.confidence, Some(0.0));
        assert!(env.human_review_required);
    }

    #[tokio::test]
    async fn test_injected_extractor_confidence_flows_through() {
        let s = state(
            json!({"filename": "f", "mimeType": "image/png", "content": "AAEC", "encoding": "base64"}),
            entry(&[0, 1, 2], "image/png"),
        );
        let env = ExtractTextStage::new(deps(), Arc::new(FixedOcr))
            .process(&s)
            .await
            .unwrap();
        assert_eq!(env.confidence, Some(0.7));
        assert!(!env.human_review_required);
    }

    #[tokio::test]
    async fn test_out_of_range_ocr_confidence_is_clamped() {
        let s = state(
            json!({"filename": "f", "mimeType": "image/png", "content": "AAEC", "encoding": "base64"}),
            entry(&[0, 1, 2], "image/png"),
        );
        let env = ExtractTextStage::new(deps(), Arc::new(PercentOcr))
            .process(&s)
            .await
            .unwrap();
        assert_eq!(env.data["segments"][0]["ocrConfidence"], 1.0);
        assert_eq!(env.confidence, Some(1.0));
    }
}
