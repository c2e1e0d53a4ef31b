//! structure-case-facts — turn segment text into a [`CaseSnapshot`].
//!
//! The generator is asked for a JSON snapshot first. If it is unavailable or
//! answers with something unparsable, a pattern-based extractor fills in the
//! parties, court and dates it can find.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::StageError;
use crate::stages::keys::{
    CASE_ID, CASE_SNAPSHOT, DOCUMENT_MANIFEST, PAGE_COUNT, SEGMENTS, key_names,
};
use crate::stages::model::{CaseSnapshot, KeyDate, Party};
use crate::stages::{round2, Output, StageDeps};
use crate::text::{cached_regex, extract_json_object};
use crate::workflow::{SourceReference, Stage, StageEnvelope, WorkflowState};

const SYSTEM_PROMPT: &str = "You are a Malaysian litigation paralegal. Extract the case facts from \
the documents and answer with a single JSON object with keys: title, parties (array of {name, role} \
where role is plaintiff or defendant), court, jurisdiction, caseType, keyDates (array of {date, \
description}), issues (array of strings), remedies (array of strings). No prose.";

const MAX_PROMPT_CHARS: usize = 12_000;

const COURTS: &[(&[&str], &str)] = &[
    (&["mahkamah persekutuan", "federal court"], "Federal Court"),
    (&["mahkamah rayuan", "court of appeal"], "Court of Appeal"),
    (&["mahkamah tinggi", "high court"], "High Court"),
    (&["mahkamah sesyen", "sessions court"], "Sessions Court"),
    (&["mahkamah majistret", "magistrate"], "Magistrates Court"),
];

const CASE_TYPES: &[(&[&str], &str)] = &[
    (&["contract", "kontrak", "perjanjian", "agreement"], "contract"),
    (&["negligence", "kecuaian", "tort"], "tort"),
    (&["employment", "pekerjaan", "dismissal", "pembuangan kerja"], "employment"),
    (&["land", "tanah", "tenancy", "sewa"], "property"),
];

pub struct StructureFactsStage {
    deps: StageDeps,
}

impl StructureFactsStage {
    pub const ID: &'static str = "structure-case-facts";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

/// What the generator is asked to return.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GeneratedFacts {
    title: String,
    parties: Vec<Party>,
    court: Option<String>,
    jurisdiction: Option<String>,
    case_type: Option<String>,
    key_dates: Vec<KeyDate>,
    issues: Vec<String>,
    remedies: Vec<String>,
}

#[async_trait]
impl Stage for StructureFactsStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(SEGMENTS, DOCUMENT_MANIFEST, CASE_ID)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let segments = inputs.read(&SEGMENTS)?;
        let manifest = inputs.read(&DOCUMENT_MANIFEST)?;
        let case_id = inputs.read(&CASE_ID)?;
        let page_count = inputs.read_opt(&PAGE_COUNT)?;

        let text = segments
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Case reference: {}\n\nDocuments:\n{}",
            case_id,
            crate::generation::truncate(&text, MAX_PROMPT_CHARS)
        );
        let facts = match self.deps.ask(SYSTEM_PROMPT, prompt).await {
            Ok(answer) => extract_json_object(&answer)
                .and_then(|v| serde_json::from_value::<GeneratedFacts>(v).ok()),
            Err(e) => {
                tracing::warn!("[Intake] fact generation unavailable, using pattern extraction: {}", e);
                None
            }
        };
        let facts = match facts {
            Some(f) => f,
            None => pattern_facts(&text),
        };

        let mut snapshot = CaseSnapshot {
            title: facts.title.trim().to_string(),
            parties: facts.parties,
            court: facts.court.filter(|c| !c.trim().is_empty()),
            jurisdiction: facts.jurisdiction.filter(|j| !j.trim().is_empty()),
            case_type: facts
                .case_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| case_type(&text).to_string()),
            key_dates: facts.key_dates,
            issues: facts.issues,
            remedies: facts.remedies,
            volume_estimate: text.split_whitespace().count(),
            estimated_pages: page_count.unwrap_or(text.len() as u32 / 3000 + 1),
            source_references: manifest
                .iter()
                .map(|d| SourceReference::document(&d.doc_id).with_confidence(d.confidence))
                .collect(),
        };
        if snapshot.title.is_empty() {
            snapshot.title = match (snapshot.party("plaintiff"), snapshot.party("defendant")) {
                (Some(p), Some(d)) => format!("{} lwn {}", p, d),
                _ => format!("Perkara {}", case_id),
            };
        }

        let confidence = completeness(&snapshot);
        tracing::info!(
            "[Intake] snapshot '{}' ({} parties, court {:?}), completeness {:.2}",
            snapshot.title,
            snapshot.parties.len(),
            snapshot.court,
            confidence
        );

        let data = Output::new().put(&CASE_SNAPSHOT, &snapshot)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn pattern_facts(text: &str) -> GeneratedFacts {
    let mut facts = GeneratedFacts::default();

    let between = cached_regex!(
        r"(?i)(?:ANTARA|BETWEEN)[:\s]+(.+?)\s+(?:DAN|AND|V\.?|vs\.?)\s+(.+?)(?:\n|$)"
    );
    let versus = cached_regex!(r"([A-Z][\w&.' ]+?)\s+(?:v\.?|vs\.?|lwn\.?)\s+([A-Z][\w&.' ]+)");
    let parties = between
        .and_then(|re| re.captures(text))
        .or_else(|| versus.and_then(|re| re.captures(text)));
    if let Some(caps) = parties {
        let clean = |s: &str| s.trim().trim_end_matches(['.', ',', ';']).trim().to_string();
        let (p, d) = (clean(&caps[1]), clean(&caps[2]));
        facts.title = format!("{} lwn {}", p, d);
        facts.parties = vec![
            Party { name: p, role: "plaintiff".into() },
            Party { name: d, role: "defendant".into() },
        ];
    }

    let lower = text.to_lowercase();
    facts.court = COURTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, name)| name.to_string());
    if ["sabah", "sarawak", "kota kinabalu", "kuching"]
        .iter()
        .any(|n| lower.contains(n))
    {
        facts.jurisdiction = Some("Sabah and Sarawak".to_string());
    }

    let iso = cached_regex!(r"\b\d{4}-\d{2}-\d{2}\b");
    let dmy = cached_regex!(r"\b\d{1,2}/\d{1,2}/\d{4}\b");
    facts.key_dates = [iso, dmy]
        .into_iter()
        .flatten()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .take(3)
        .map(|date| KeyDate {
            date,
            description: "Date mentioned in documents".to_string(),
        })
        .collect();

    facts
}

fn case_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    CASE_TYPES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, t)| *t)
        .unwrap_or("general")
}

/// Weighted share of snapshot fields that were found.
fn completeness(s: &CaseSnapshot) -> f64 {
    let mut score = 0.0;
    if !s.title.is_empty() {
        score += 0.15;
    }
    score += match s.parties.len() {
        0 => 0.0,
        1 => 0.15,
        _ => 0.25,
    };
    if s.court.is_some() {
        score += 0.15;
    }
    if s.case_type != "general" {
        score += 0.10;
    }
    if !s.key_dates.is_empty() {
        score += 0.15;
    }
    if !s.issues.is_empty() {
        score += 0.10;
    }
    if !s.remedies.is_empty() {
        score += 0.10;
    }
    round2(score).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generation, GenerationError, GenerationRequest, OfflineGenerator, TextGenerator};
    use crate::workflow::ConfidenceGate;
    use serde_json::json;
    use std::sync::Arc;

    struct Canned(&'static str);

    #[async_trait]
    impl TextGenerator for Canned {
        async fn generate(&self, _r: &GenerationRequest) -> Result<Generation, GenerationError> {
            Ok(Generation {
                content: self.0.to_string(),
                model: "canned".into(),
                usage: None,
            })
        }
    }

    fn state(text: &str) -> WorkflowState {
        let mut s = WorkflowState::new();
        s.insert_value("caseId", json!("CASE-9"));
        s.insert_value("documentManifest", json!([]));
        s.insert_value(
            "segments",
            json!([{
                "segmentId": "SEG-1", "docId": "DOC-1", "page": 1, "sequence": 0,
                "text": text, "lang": "en", "langConfidence": 0.9, "ocrConfidence": 1.0
            }]),
        );
        s
    }

    #[tokio::test]
    async fn test_pattern_fallback_finds_parties_court_and_dates() {
        let stage = StructureFactsStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()));
        let text = "DALAM MAHKAMAH TINGGI MALAYA DI KUALA LUMPUR\nANTARA Syarikat Maju Sdn Bhd DAN Tan Ah Kow\nPerjanjian bertarikh 2023-04-01 dan notis 15/6/2023";
        let env = stage.process(&state(text)).await.unwrap();
        let snap: CaseSnapshot = serde_json::from_value(env.data["caseSnapshot"].clone()).unwrap();
        assert_eq!(snap.title, "Syarikat Maju Sdn Bhd lwn Tan Ah Kow");
        assert_eq!(snap.court.as_deref(), Some("High Court"));
        assert_eq!(snap.case_type, "contract");
        assert_eq!(snap.key_dates.len(), 2);
        assert_eq!(snap.estimated_pages, 1);
        // title, two parties, court, case type, dates
        assert_eq!(env.confidence, Some(0.8));
    }

    #[tokio::test]
    async fn test_title_is_never_empty() {
        let stage = StructureFactsStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()));
        let env = stage.process(&state("nothing useful here")).await.unwrap();
        assert_eq!(env.data["caseSnapshot"]["title"], "Perkara CASE-9");
        assert!(env.human_review_required);
    }

    #[tokio::test]
    async fn test_generated_json_is_used() {
        let answer = r#"Here it is: {"title": "Ali lwn Abu", "parties": [{"name": "Ali", "role": "plaintiff"}, {"name": "Abu", "role": "defendant"}], "court": "Sessions Court", "caseType": "contract", "keyDates": [{"date": "2024-01-02", "description": "invoice"}], "issues": ["non-payment"], "remedies": ["RM 10,000"]}"#;
        let stage = StructureFactsStage::new(StageDeps::new(Arc::new(Canned(answer)), ConfidenceGate::default()));
        let env = stage.process(&state("irrelevant")).await.unwrap();
        assert_eq!(env.data["caseSnapshot"]["court"], "Sessions Court");
        assert_eq!(env.confidence, Some(1.0));
    }
}
