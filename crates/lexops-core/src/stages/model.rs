//! Records stages exchange through the workflow state.
//!
//! Everything here is camelCase on the wire. Records a caller may hand in
//! (snapshots, issues, authorities, documents) are lenient: missing fields
//! take their defaults.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::text::Lang;
use crate::workflow::{Branch, SourceReference};

// ── Intake ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Text,
    Base64,
}

/// A file handed to the intake pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    pub filename: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
}

fn default_mime_type() -> String {
    "text/plain".to_string()
}

impl InputFile {
    pub fn text(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: default_mime_type(),
            content: content.into(),
            encoding: ContentEncoding::Text,
        }
    }

    /// Plain-text MIME types whose bytes are valid UTF-8 travel as text,
    /// everything else as base64.
    pub fn from_bytes(filename: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let mut file = Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: String::new(),
            encoding: ContentEncoding::Base64,
        };
        match std::str::from_utf8(bytes) {
            Ok(text) if file.is_plain_text() => {
                file.content = text.to_string();
                file.encoding = ContentEncoding::Text;
            }
            _ => file.content = base64::engine::general_purpose::STANDARD.encode(bytes),
        }
        file
    }

    pub fn bytes(&self) -> Result<Vec<u8>, StageError> {
        match self.encoding {
            ContentEncoding::Text => Ok(self.content.as_bytes().to_vec()),
            ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(self.content.trim())
                .map_err(|e| StageError::InvalidInput {
                    key: "files".to_string(),
                    message: format!("{}: invalid base64 content: {}", self.filename, e),
                }),
        }
    }

    pub fn is_plain_text(&self) -> bool {
        let mime = self.mime_type.to_ascii_lowercase();
        mime.starts_with("text/") || mime == "application/json" || mime == "application/xml"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMeta {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub timestamp: String,
    pub sender: String,
    pub text: String,
}

/// One accepted document in the intake manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub doc_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub sha256: String,
    pub source_type: String,
    pub received_at: String,
    pub ocr_needed: bool,
    #[serde(default)]
    pub language_hint: Option<Lang>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateFile {
    pub filename: String,
    pub duplicate_of: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub segment_id: String,
    pub doc_id: String,
    pub page: u32,
    pub sequence: u32,
    pub text: String,
    pub lang: Lang,
    pub lang_confidence: f64,
    pub ocr_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelText {
    pub segment_id: String,
    pub doc_id: String,
    pub page: u32,
    pub src: String,
    pub src_lang: Lang,
    pub tgt_literal: String,
    pub tgt_idiom: String,
    pub alignment_score: f64,
    pub ocr_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Party {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyDate {
    pub date: String,
    pub description: String,
}

/// Structured facts of a matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseSnapshot {
    pub title: String,
    pub parties: Vec<Party>,
    pub court: Option<String>,
    pub jurisdiction: Option<String>,
    pub case_type: String,
    pub key_dates: Vec<KeyDate>,
    pub issues: Vec<String>,
    pub remedies: Vec<String>,
    pub volume_estimate: usize,
    pub estimated_pages: u32,
    pub source_references: Vec<SourceReference>,
}

impl Default for CaseSnapshot {
    fn default() -> Self {
        Self {
            title: String::new(),
            parties: Vec::new(),
            court: None,
            jurisdiction: None,
            case_type: "general".to_string(),
            key_dates: Vec::new(),
            issues: Vec::new(),
            remedies: Vec::new(),
            volume_estimate: 0,
            estimated_pages: 0,
            source_references: Vec::new(),
        }
    }
}

impl CaseSnapshot {
    pub fn party(&self, role: &str) -> Option<&str> {
        self.parties
            .iter()
            .find(|p| p.role.eq_ignore_ascii_case(role))
            .map(|p| p.name.as_str())
    }

    pub fn court_name(&self) -> &str {
        self.court.as_deref().unwrap_or("High Court")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScores {
    pub jurisdictional_complexity: u8,
    pub language_complexity: u8,
    pub volume_risk: u8,
    pub time_pressure: u8,
    pub composite_score: f64,
    pub rationale: Vec<String>,
    pub next_steps: Vec<String>,
}

// ── Drafting ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub legal_basis: Vec<String>,
    pub theory: Option<String>,
    pub confidence: Option<f64>,
    pub likely_evidence_required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Prayer {
    pub id: String,
    pub text: String,
    pub template_id: Option<String>,
    pub text_ms: Option<String>,
    pub text_en: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePlan {
    pub issues: Vec<Issue>,
    pub prayers: Vec<Prayer>,
    pub generated: bool,
}

/// Language a pleading template is authored in. Primary is Malay (the
/// court language); secondary is the English companion language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateLanguage {
    Primary,
    Secondary,
}

impl TemplateLanguage {
    pub fn lang(&self) -> Lang {
        match self {
            TemplateLanguage::Primary => Lang::Ms,
            TemplateLanguage::Secondary => Lang::En,
        }
    }
}

impl Branch for TemplateLanguage {
    fn variants() -> &'static [Self] {
        &[TemplateLanguage::Primary, TemplateLanguage::Secondary]
    }

    fn label(&self) -> &'static str {
        match self {
            TemplateLanguage::Primary => "primary",
            TemplateLanguage::Secondary => "secondary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub template_id: String,
    pub name: String,
    pub court: String,
    pub language: TemplateLanguage,
    pub jurisdiction: String,
    pub version: String,
    pub compliance_warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftParagraph {
    pub number: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_references: Vec<SourceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignedPair {
    pub number: String,
    pub primary: String,
    pub secondary: String,
    pub alignment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub number: String,
    pub reason: String,
}

/// A pleading draft in one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub language: Lang,
    pub template_id: String,
    pub text: String,
    pub paragraphs: Vec<DraftParagraph>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aligned_pairs: Vec<AlignedPair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<Divergence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaCheck {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaReport {
    pub checks: Vec<QaCheck>,
    pub suggestions: Vec<String>,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub block_for_human: bool,
}

// ── Research ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Authority {
    pub citation: String,
    pub case_name: String,
    pub court: String,
    pub year: Option<i32>,
    pub binding: bool,
    pub summary: String,
    pub subject_areas: Vec<String>,
    pub relevance: Option<f64>,
    pub url: Option<String>,
}

impl Authority {
    /// Reported in the Malayan Law Journal or Current Law Journal.
    pub fn is_local_report(&self) -> bool {
        let c = self.citation.to_ascii_uppercase();
        c.contains("MLJ") || c.contains("CLJ")
    }

    pub fn label(&self) -> &str {
        if self.citation.is_empty() {
            &self.case_name
        } else {
            &self.citation
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub court: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub binding_only: bool,
    pub limit: Option<usize>,
}

impl SearchFilters {
    pub fn admits(&self, authority: &Authority) -> bool {
        if let Some(court) = &self.court {
            if !authority
                .court
                .to_lowercase()
                .contains(&court.to_lowercase())
            {
                return false;
            }
        }
        if let Some(from) = self.year_from {
            if authority.year.is_some_and(|y| y < from) {
                return false;
            }
        }
        if let Some(to) = self.year_to {
            if authority.year.is_some_and(|y| y > to) {
                return false;
            }
        }
        !self.binding_only || authority.binding
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    pub issue_id: String,
    pub issue_title: String,
    pub analysis_en: String,
    pub analysis_ms: String,
    pub binding_authorities: Vec<String>,
    pub persuasive_authorities: Vec<String>,
    pub suggested_wording_en: String,
    pub suggested_wording_ms: String,
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentMemo {
    pub query: String,
    pub memo_en: String,
    pub memo_ms: String,
    pub arguments: Vec<Argument>,
    pub total_issues: usize,
    pub authorities_considered: usize,
}

// ── Evidence ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvidenceDocument {
    pub doc_id: String,
    pub filename: String,
    pub language: Option<Lang>,
    pub pages: Option<u32>,
    pub ocr_confidence: Option<f64>,
    pub created_at: Option<String>,
}

impl EvidenceDocument {
    pub fn label(&self) -> &str {
        if self.filename.is_empty() {
            &self.doc_id
        } else {
            &self.filename
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pleading {
    pub id: String,
    pub pleading_type: String,
    pub version: u32,
    pub has_english_text: bool,
    pub created_at: Option<String>,
}

/// A certified translation or translator affidavit already on file for a
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FiledRecord {
    pub doc_id: String,
    pub by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationCertificate {
    pub case_id: String,
    pub target_lang: Lang,
    pub working_translation: String,
    pub checklist: Vec<String>,
    pub warnings: Vec<String>,
    pub affidavit_draft: String,
    pub documents: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexItemKind {
    Pleading,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexItem {
    pub tab: String,
    pub kind: IndexItemKind,
    pub description: String,
    pub file_id: String,
    pub language: Lang,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_tab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affidavit_tab: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSection {
    pub name: String,
    pub tabs: Vec<String>,
    pub page_start: u32,
    pub page_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketPlan {
    pub bundle_name: String,
    pub sections: Vec<BundleSection>,
    pub total_estimated_pages: u32,
    pub assembly_instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub timestamp: String,
    pub event_type: String,
    pub entity_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceIndex {
    pub case_id: String,
    pub created_at: String,
    pub items: Vec<IndexItem>,
    pub packet_plan: PacketPlan,
    pub version_history: Vec<HistoryEvent>,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearingEntry {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearingTab {
    pub tab: String,
    pub section: String,
    pub entries: Vec<HearingEntry>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JudgeQuestion {
    pub question: String,
    pub answer_ms: String,
    pub answer_en: String,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HearingBundle {
    pub case_id: String,
    pub tabs: Vec<HearingTab>,
    pub oral_script_ms: String,
    pub oral_script_en_notes: String,
    pub if_judge_asks: Vec<JudgeQuestion>,
    pub generated: bool,
}
