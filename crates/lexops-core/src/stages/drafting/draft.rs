//! Pleading drafting: the Malay primary draft, its English companion, and
//! the English-only path for templates authored in the companion language.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StageError;
use crate::stages::keys::{
    CASE_SNAPSHOT, ISSUES_SELECTED, PRAYERS_SELECTED, PRIMARY_DRAFT, SECONDARY_DRAFT, TEMPLATE_INFO,
    key_names,
};
use crate::stages::model::{
    AlignedPair, CaseSnapshot, Divergence, Draft, DraftParagraph, Issue, Prayer, TemplateInfo,
};
use crate::stages::{round2, Output, StageDeps};
use crate::text::{numbered_paragraphs, numbers, uppercase_term, Lang};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

const PRIMARY_SYSTEM: &str = "Anda peguam litigasi Malaysia. Draf Pernyataan Tuntutan dalam Bahasa \
Malaysia dengan perenggan bernombor (1., 2., ...). Gunakan istilah PLAINTIF dan DEFENDAN. \
Jawab dengan teks pliding sahaja.";

const COMPANION_SYSTEM: &str = "You are a certified legal translator. Translate the Malay pleading \
into formal English. Keep every paragraph number and every figure exactly as in the source. Use \
PLAINTIFF and DEFENDANT. Answer with the translated pleading only.";

const SECONDARY_SYSTEM: &str = "You are a Malaysian litigator. Draft a Statement of Claim in formal \
English with numbered paragraphs (1., 2., ...). Use PLAINTIFF and DEFENDANT. Answer with the \
pleading text only.";

const DIVERGENCE_THRESHOLD: f64 = 0.7;

fn court_ms(court: &str) -> &'static str {
    let c = court.to_lowercase();
    if c.contains("federal") {
        "PERSEKUTUAN"
    } else if c.contains("appeal") {
        "RAYUAN"
    } else if c.contains("sessions") {
        "SESYEN"
    } else if c.contains("magistrate") {
        "MAJISTRET"
    } else {
        "TINGGI"
    }
}

fn party_names(snapshot: &CaseSnapshot) -> (String, String) {
    (
        snapshot.party("plaintiff").unwrap_or("____").to_uppercase(),
        snapshot.party("defendant").unwrap_or("____").to_uppercase(),
    )
}

fn header(lang: Lang, snapshot: &CaseSnapshot, court: &str) -> String {
    let (p, d) = party_names(snapshot);
    match lang {
        Lang::Ms => format!(
            "DALAM MAHKAMAH {} MALAYA\nGUAMAN SIVIL NO: ____\n\nANTARA\n\n{} ... PLAINTIF\n\nDAN\n\n{} ... DEFENDAN\n\nPERNYATAAN TUNTUTAN\n\n",
            court_ms(court),
            p,
            d
        ),
        _ => format!(
            "IN THE {} OF MALAYA\nCIVIL SUIT NO: ____\n\nBETWEEN\n\n{} ... PLAINTIFF\n\nAND\n\n{} ... DEFENDANT\n\nSTATEMENT OF CLAIM\n\n",
            court.to_uppercase(),
            p,
            d
        ),
    }
}

/// Uppercase the defined party terms and make sure the court header leads.
fn normalise(text: &str, lang: Lang, snapshot: &CaseSnapshot, court: &str) -> String {
    let (marker, terms): (&str, &[(&str, &str)]) = match lang {
        Lang::Ms => ("DALAM MAHKAMAH", &[("plaintif", "PLAINTIF"), ("defendan", "DEFENDAN")]),
        _ => ("IN THE", &[("plaintiff", "PLAINTIFF"), ("defendant", "DEFENDANT")]),
    };
    let mut out = text.trim().to_string();
    for (word, upper) in terms {
        out = uppercase_term(&out, word, upper);
    }
    if !out.to_uppercase().starts_with(marker) {
        out = format!("{}{}", header(lang, snapshot, court), out);
    }
    out
}

fn assemble(text: String, lang: Lang, template_id: &str, snapshot: &CaseSnapshot) -> Draft {
    let paragraphs = numbered_paragraphs(&text)
        .into_iter()
        .map(|p| DraftParagraph {
            number: p.number,
            text: p.text,
            source_references: snapshot.source_references.clone(),
        })
        .collect();
    Draft {
        language: lang,
        template_id: template_id.to_string(),
        text,
        paragraphs,
        aligned_pairs: Vec::new(),
        divergences: Vec::new(),
    }
}

fn drafting_prompt(snapshot: &CaseSnapshot, template: &TemplateInfo, issues: &[Issue], prayers: &[Prayer]) -> String {
    let issues = issues
        .iter()
        .map(|i| format!("- {} ({})", i.title, i.legal_basis.join("; ")))
        .collect::<Vec<_>>()
        .join("\n");
    let prayers = prayers
        .iter()
        .map(|p| format!("- {}", p.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Template: {} ({})\nCase snapshot:\n{}\n\nIssues:\n{}\n\nPrayers:\n{}",
        template.name,
        template.template_id,
        serde_json::to_string_pretty(snapshot).unwrap_or_default(),
        issues,
        prayers
    )
}

fn draft_confidence(draft: &Draft, full: f64) -> f64 {
    if draft.paragraphs.is_empty() {
        0.65
    } else {
        full
    }
}

// ── draft-primary ───────────────────────────────────────────────────────

pub struct DraftPrimaryStage {
    deps: StageDeps,
}

impl DraftPrimaryStage {
    pub const ID: &'static str = "draft-primary";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for DraftPrimaryStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT, TEMPLATE_INFO)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(PRIMARY_DRAFT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let template = inputs.read(&TEMPLATE_INFO)?;
        let issues = inputs.read_or_default(&ISSUES_SELECTED)?;
        let prayers = inputs.read_or_default(&PRAYERS_SELECTED)?;

        let raw = self
            .deps
            .ask(PRIMARY_SYSTEM, drafting_prompt(&snapshot, &template, &issues, &prayers))
            .await?;
        let text = normalise(&raw, Lang::Ms, &snapshot, &template.court);
        let draft = assemble(text, Lang::Ms, &template.template_id, &snapshot);
        tracing::info!("[Drafting] primary draft: {} paragraph(s)", draft.paragraphs.len());

        let confidence = draft_confidence(&draft, 0.92);
        let data = Output::new().put(&PRIMARY_DRAFT, &draft)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

// ── generate-companion ──────────────────────────────────────────────────

pub struct GenerateCompanionStage {
    deps: StageDeps,
}

impl GenerateCompanionStage {
    pub const ID: &'static str = "generate-companion";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for GenerateCompanionStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(PRIMARY_DRAFT, CASE_SNAPSHOT, TEMPLATE_INFO)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(SECONDARY_DRAFT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let primary = inputs.read(&PRIMARY_DRAFT)?;
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let template = inputs.read(&TEMPLATE_INFO)?;

        let raw = self.deps.ask(COMPANION_SYSTEM, primary.text.clone()).await?;
        let text = normalise(&raw, Lang::En, &snapshot, &template.court);
        let mut companion = assemble(text, Lang::En, &primary.template_id, &snapshot);
        let (pairs, divergences) = align(&primary.paragraphs, &companion.paragraphs);
        companion.aligned_pairs = pairs;
        companion.divergences = divergences;

        let confidence = if companion.divergences.is_empty() {
            draft_confidence(&companion, 0.88)
        } else {
            0.65
        };
        tracing::info!(
            "[Drafting] companion draft: {} aligned pair(s), {} divergence(s)",
            companion.aligned_pairs.len(),
            companion.divergences.len()
        );

        let data = Output::new().put(&SECONDARY_DRAFT, &companion)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

/// Pair paragraphs by number and score each pair.
pub fn align(primary: &[DraftParagraph], secondary: &[DraftParagraph]) -> (Vec<AlignedPair>, Vec<Divergence>) {
    let by_number: BTreeMap<&str, &DraftParagraph> =
        secondary.iter().map(|p| (p.number.as_str(), p)).collect();
    let mut pairs = Vec::new();
    let mut divergences = Vec::new();

    for p in primary {
        let Some(s) = by_number.get(p.number.as_str()) else {
            divergences.push(Divergence {
                number: p.number.clone(),
                reason: "paragraph missing from companion".to_string(),
            });
            continue;
        };
        let score = pair_score(&p.text, &s.text);
        if score < DIVERGENCE_THRESHOLD {
            divergences.push(Divergence {
                number: p.number.clone(),
                reason: if numbers(&p.text) != numbers(&s.text) {
                    "figures differ between versions".to_string()
                } else {
                    "paragraph lengths diverge".to_string()
                },
            });
        }
        pairs.push(AlignedPair {
            number: p.number.clone(),
            primary: p.text.clone(),
            secondary: s.text.clone(),
            alignment_score: score,
        });
    }
    for s in secondary {
        if !primary.iter().any(|p| p.number == s.number) {
            divergences.push(Divergence {
                number: s.number.clone(),
                reason: "paragraph missing from primary".to_string(),
            });
        }
    }
    (pairs, divergences)
}

fn pair_score(a: &str, b: &str) -> f64 {
    if numbers(a) != numbers(b) {
        return 0.6;
    }
    let (la, lb) = (a.chars().count() as f64, b.chars().count() as f64);
    let longer = la.max(lb);
    if longer == 0.0 {
        return 1.0;
    }
    round2(la.min(lb) / longer * 0.7 + 0.3)
}

// ── draft-secondary ─────────────────────────────────────────────────────

pub struct DraftSecondaryStage {
    deps: StageDeps,
}

impl DraftSecondaryStage {
    pub const ID: &'static str = "draft-secondary";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for DraftSecondaryStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT, TEMPLATE_INFO)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(PRIMARY_DRAFT, SECONDARY_DRAFT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let template = inputs.read(&TEMPLATE_INFO)?;
        let issues = inputs.read_or_default(&ISSUES_SELECTED)?;
        let prayers = inputs.read_or_default(&PRAYERS_SELECTED)?;

        let raw = self
            .deps
            .ask(SECONDARY_SYSTEM, drafting_prompt(&snapshot, &template, &issues, &prayers))
            .await?;
        let text = normalise(&raw, Lang::En, &snapshot, &template.court);
        let draft = assemble(text, Lang::En, &template.template_id, &snapshot);
        tracing::info!(
            "[Drafting] English-template draft: {} paragraph(s), written to both draft slots",
            draft.paragraphs.len()
        );

        // Quality check always compares two drafts; both slots carry the
        // English text on this path.
        let confidence = draft_confidence(&draft, 0.9);
        let data = Output::new()
            .put(&PRIMARY_DRAFT, &draft)?
            .put(&SECONDARY_DRAFT, &draft)?
            .into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
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
                content: self.0.into(),
                model: "canned".into(),
                usage: None,
            })
        }
    }

    fn deps(text: &'static str) -> StageDeps {
        StageDeps::new(Arc::new(Canned(text)), ConfidenceGate::default())
    }

    fn state() -> WorkflowState {
        let mut s = WorkflowState::new();
        s.insert_value(
            "caseSnapshot",
            json!({"title": "Ali lwn Abu", "parties": [{"name": "Ali", "role": "plaintiff"}, {"name": "Abu", "role": "defendant"}]}),
        );
        s.insert_value(
            "templateInfo",
            json!({"templateId": "TPL-HighCourt-MS-v2", "name": "PT", "court": "High Court", "language": "primary",
                   "jurisdiction": "Peninsular Malaysia", "version": "2.0", "complianceWarnings": []}),
        );
        s
    }

    fn para(n: &str, text: &str) -> DraftParagraph {
        DraftParagraph {
            number: n.into(),
            text: text.into(),
            source_references: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_primary_draft_normalises_terms_and_adds_header() {
        let stage = DraftPrimaryStage::new(deps("1. Plaintif ialah syarikat.\n2. Defendan berhutang RM 5,000."));
        let env = stage.process(&state()).await.unwrap();
        let draft: Draft = serde_json::from_value(env.data["primaryDraft"].clone()).unwrap();
        assert!(draft.text.starts_with("DALAM MAHKAMAH TINGGI MALAYA"));
        assert!(draft.text.contains("ALI ... PLAINTIF"));
        assert_eq!(draft.paragraphs.len(), 2);
        assert_eq!(draft.paragraphs[0].text, "PLAINTIF ialah syarikat.");
        assert_eq!(draft.language, Lang::Ms);
        assert_eq!(env.confidence, Some(0.92));
    }

    #[tokio::test]
    async fn test_primary_draft_propagates_generation_failure() {
        let stage = DraftPrimaryStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()));
        let err = stage.process(&state()).await.unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
    }

    #[tokio::test]
    async fn test_secondary_draft_fills_both_slots_in_english() {
        let stage = DraftSecondaryStage::new(deps("1. The plaintiff is a company.\n2. The defendant owes RM 5,000."));
        let env = stage.process(&state()).await.unwrap();
        assert_eq!(env.data["primaryDraft"], env.data["secondaryDraft"]);
        assert_eq!(env.data["primaryDraft"]["language"], "en");
        assert!(env.data["primaryDraft"]["text"].as_str().unwrap().starts_with("IN THE HIGH COURT"));
    }

    #[test]
    fn test_alignment_scores_and_divergences() {
        let primary = [para("1", "PLAINTIF ialah syarikat."), para("2", "Jumlah RM 5,000."), para("3", "Kos.")];
        let secondary = [para("1", "PLAINTIFF is a company."), para("2", "Sum of RM 6,000."), para("4", "Extra.")];
        let (pairs, divergences) = align(&primary, &secondary);
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].alignment_score > 0.9);
        assert_eq!(pairs[1].alignment_score, 0.6);
        let numbers: Vec<_> = divergences.iter().map(|d| d.number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "3", "4"]);
    }
}
