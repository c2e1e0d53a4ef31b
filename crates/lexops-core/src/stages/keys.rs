//! Typed catalogue of workflow state keys.

use serde_json::{Map, Value};

use crate::stages::model::*;
use crate::text::Lang;
use crate::workflow::StateKey;

/// Names of the given keys as a `&'static [&'static str]`, for stage contracts
/// and pipeline output lists.
macro_rules! key_names {
    ($($key:expr),+ $(,)?) => {{
        const NAMES: &[&str] = &[$($key.name()),+];
        NAMES
    }};
}
pub(crate) use key_names;

// Intake
pub const FILES: StateKey<Vec<InputFile>> = StateKey::new("files");
pub const SOURCE_TYPE: StateKey<String> = StateKey::new("sourceType");
pub const METADATA: StateKey<Map<String, Value>> = StateKey::new("metadata");
pub const CASE_ID: StateKey<String> = StateKey::new("caseId");
pub const DOCUMENT_MANIFEST: StateKey<Vec<DocumentEntry>> = StateKey::new("documentManifest");
pub const DUPLICATES: StateKey<Vec<DuplicateFile>> = StateKey::new("duplicates");
pub const SEGMENTS: StateKey<Vec<Segment>> = StateKey::new("segments");
pub const PAGE_COUNT: StateKey<u32> = StateKey::new("pageCount");
pub const PARALLEL_TEXTS: StateKey<Vec<ParallelText>> = StateKey::new("parallelTexts");
pub const CASE_SNAPSHOT: StateKey<CaseSnapshot> = StateKey::new("caseSnapshot");
pub const RISK_SCORES: StateKey<RiskScores> = StateKey::new("riskScores");
pub const USER_DEADLINE: StateKey<String> = StateKey::new("userDeadline");

// Drafting
pub const TEMPLATE_ID: StateKey<String> = StateKey::new("templateId");
pub const ISSUES_SELECTED: StateKey<Vec<Issue>> = StateKey::new("issuesSelected");
pub const PRAYERS_SELECTED: StateKey<Vec<Prayer>> = StateKey::new("prayersSelected");
pub const PLANNED_ISSUES: StateKey<IssuePlan> = StateKey::new("plannedIssues");
pub const TEMPLATE_INFO: StateKey<TemplateInfo> = StateKey::new("templateInfo");
pub const TEMPLATE_LANGUAGE: StateKey<TemplateLanguage> = StateKey::new("templateLanguage");
pub const PRIMARY_DRAFT: StateKey<Draft> = StateKey::new("primaryDraft");
pub const SECONDARY_DRAFT: StateKey<Draft> = StateKey::new("secondaryDraft");
pub const QA_REPORT: StateKey<QaReport> = StateKey::new("qaReport");

// Research
pub const QUERY: StateKey<String> = StateKey::new("query");
pub const FILTERS: StateKey<SearchFilters> = StateKey::new("filters");
pub const AUTHORITIES: StateKey<Vec<Authority>> = StateKey::new("authorities");
pub const ARGUMENT_MEMO: StateKey<ArgumentMemo> = StateKey::new("argumentMemo");

// Evidence
pub const DOCUMENTS: StateKey<Vec<EvidenceDocument>> = StateKey::new("documents");
pub const PLEADINGS: StateKey<Vec<Pleading>> = StateKey::new("pleadings");
pub const TRANSLATIONS: StateKey<Vec<FiledRecord>> = StateKey::new("translations");
pub const AFFIDAVITS: StateKey<Vec<FiledRecord>> = StateKey::new("affidavits");
pub const TARGET_LANG: StateKey<Lang> = StateKey::new("targetLang");
pub const TRANSLATOR_NAME: StateKey<String> = StateKey::new("translatorName");
pub const TRANSLATION_CERTIFICATE: StateKey<TranslationCertificate> =
    StateKey::new("translationCertificate");
pub const EVIDENCE_INDEX: StateKey<EvidenceIndex> = StateKey::new("evidenceIndex");
pub const HEARING_BUNDLE: StateKey<HearingBundle> = StateKey::new("hearingBundle");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_follow_the_catalogue() {
        let names: &[&str] = key_names!(CASE_SNAPSHOT, QA_REPORT, TRANSLATION_CERTIFICATE);
        assert_eq!(names, ["caseSnapshot", "qaReport", "translationCertificate"]);
    }
}
