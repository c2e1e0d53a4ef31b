//! score-risk — four 1–5 risk dimensions and a weighted composite.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::error::StageError;
use crate::stages::keys::{
    CASE_SNAPSHOT, DOCUMENT_MANIFEST, RISK_SCORES, SEGMENTS, USER_DEADLINE, key_names,
};
use crate::stages::model::{CaseSnapshot, DocumentEntry, RiskScores, Segment};
use crate::stages::{round2, Output, StageDeps};
use crate::text::Lang;
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

const WEIGHTS: [f64; 4] = [0.25, 0.30, 0.20, 0.25];
const LOW_OCR: f64 = 0.8;
const FOREIGN_MARKERS: &[&str] = &["singapore", "indonesia", "brunei", "thailand", "pte ltd", "luar negara", "foreign"];

pub struct ScoreRiskStage {
    deps: StageDeps,
}

impl ScoreRiskStage {
    pub const ID: &'static str = "score-risk";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for ScoreRiskStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT, DOCUMENT_MANIFEST, SEGMENTS)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(RISK_SCORES)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let manifest = inputs.read(&DOCUMENT_MANIFEST)?;
        let segments = inputs.read(&SEGMENTS)?;
        let deadline = inputs.read_opt(&USER_DEADLINE)?;

        let today = Utc::now().date_naive();
        let scores = score(&snapshot, &manifest, &segments, deadline.as_deref(), today);

        let confidence = if scores.composite_score >= 4.0 || scores.language_complexity >= 4 {
            0.6
        } else {
            0.85
        };
        tracing::info!(
            "[Intake] risk composite {:.2} (J{} L{} V{} T{})",
            scores.composite_score,
            scores.jurisdictional_complexity,
            scores.language_complexity,
            scores.volume_risk,
            scores.time_pressure
        );

        let data = Output::new().put(&RISK_SCORES, &scores)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

pub fn score(
    snapshot: &CaseSnapshot,
    manifest: &[DocumentEntry],
    segments: &[Segment],
    deadline: Option<&str>,
    today: NaiveDate,
) -> RiskScores {
    let mut rationale = Vec::new();

    // Jurisdiction
    let court = snapshot.court.as_deref().unwrap_or("").to_lowercase();
    let mut jurisdictional = 1u8;
    if court.contains("federal") || court.contains("appeal") {
        jurisdictional += 2;
        rationale.push(format!("Appellate forum ({})", snapshot.court_name()));
    } else if court.contains("high") {
        jurisdictional += 1;
    }
    let corpus = segments
        .iter()
        .map(|s| s.text.to_lowercase())
        .chain(snapshot.parties.iter().map(|p| p.name.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ");
    if FOREIGN_MARKERS.iter().any(|m| corpus.contains(m)) {
        jurisdictional += 1;
        rationale.push("Foreign party or address involved".to_string());
    }

    // Language
    let mut language = 1u8;
    let has = |lang: Lang| segments.iter().any(|s| s.lang == lang);
    if has(Lang::Mixed) {
        language += 1;
    }
    if has(Lang::Ms) && has(Lang::En) {
        language += 1;
        rationale.push("Documents in both Malay and English".to_string());
    }
    let mut worst_ocr: HashMap<&str, f64> = HashMap::new();
    for s in segments {
        let e = worst_ocr.entry(s.doc_id.as_str()).or_insert(1.0);
        *e = e.min(s.ocr_confidence);
    }
    let low = worst_ocr.values().filter(|c| **c < LOW_OCR).count();
    if !worst_ocr.is_empty() && low as f64 / worst_ocr.len() as f64 > 0.3 {
        language += 2;
        rationale.push(format!("{} of {} documents have low OCR confidence", low, worst_ocr.len()));
    } else if low > 0 {
        language += 1;
    }

    // Volume
    let mut volume = 1u8;
    let docs = manifest.len();
    if docs > 50 {
        volume += 2;
    } else if docs > 20 {
        volume += 1;
    }
    let words = snapshot.volume_estimate;
    if words > 100_000 {
        volume += 2;
    } else if words > 50_000 {
        volume += 1;
    }
    if snapshot.estimated_pages > 100 {
        volume += 1;
    }
    if volume >= 3 {
        rationale.push(format!("High volume: {} documents, ~{} words", docs, words));
    }

    // Time pressure
    let days = deadline
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .map(|d| (d - today).num_days());
    let time = match days {
        Some(d) if d < 7 => 5,
        Some(d) if d < 14 => 4,
        Some(d) if d < 30 => 3,
        Some(d) if d < 60 => 2,
        Some(_) => 1,
        None => 2,
    };
    if let Some(d) = days.filter(|d| *d < 14) {
        rationale.push(format!("Deadline in {} day(s)", d));
    }

    let dims = [jurisdictional.min(5), language.min(5), volume.min(5), time];
    let composite = round2(
        dims.iter()
            .zip(WEIGHTS)
            .map(|(s, w)| f64::from(*s) * w)
            .sum::<f64>(),
    );

    let mut next_steps = Vec::new();
    if dims[1] >= 3 {
        next_steps.push("Engage a certified translator for the bilingual bundle".to_string());
    }
    if dims[3] >= 4 {
        next_steps.push("Prioritise filing; confirm the deadline with the client".to_string());
    }
    if dims[0] >= 3 {
        next_steps.push("Assign a senior associate to review jurisdiction".to_string());
    }
    if dims[2] >= 3 {
        next_steps.push("Plan document review in batches".to_string());
    }
    if next_steps.is_empty() {
        next_steps.push("Proceed with standard drafting workflow".to_string());
    }
    if rationale.is_empty() {
        rationale.push("No elevated risk factors detected".to_string());
    }

    RiskScores {
        jurisdictional_complexity: dims[0],
        language_complexity: dims[1],
        volume_risk: dims[2],
        time_pressure: dims[3],
        composite_score: composite,
        rationale,
        next_steps,
    }
}
