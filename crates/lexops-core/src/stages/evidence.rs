//! Evidence stages: translation certification, the tabbed evidence index,
//! and hearing materials.

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StageError;
use crate::stages::keys::{
    AFFIDAVITS, ARGUMENT_MEMO, AUTHORITIES, CASE_ID, CASE_SNAPSHOT, DOCUMENTS, EVIDENCE_INDEX,
    HEARING_BUNDLE, ISSUES_SELECTED, PLEADINGS, TARGET_LANG, TRANSLATIONS, TRANSLATION_CERTIFICATE,
    TRANSLATOR_NAME, key_names,
};
use crate::stages::model::{
    Authority, BundleSection, CaseSnapshot, EvidenceDocument, EvidenceIndex, HearingBundle,
    HearingEntry, HearingTab, HistoryEvent, IndexItem, IndexItemKind, Issue, JudgeQuestion,
    PacketPlan, TranslationCertificate,
};
use crate::stages::{Output, StageDeps};
use crate::text::{extract_json_array, Lang};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

const LOW_OCR: f64 = 0.8;

const CERTIFICATION_CHECKLIST: [&str; 12] = [
    "Verify translator qualifications (sworn translator or equivalent)",
    "Confirm source documents match originals exactly",
    "Review the working translation for accuracy",
    "Correct any errors or mistranslations",
    "Ensure legal terminology is accurate",
    "Preserve formatting and structure",
    "Verify all numbers, dates and names are identical",
    "Check defined terms are consistent",
    "Sign and date the certified translation",
    "Prepare the translator's affidavit",
    "Attach copies of the translator's credentials",
    "File with the court as required",
];

// ── certify-translations ────────────────────────────────────────────────

pub struct CertifyTranslationsStage {
    deps: StageDeps,
}

impl CertifyTranslationsStage {
    pub const ID: &'static str = "certify-translations";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for CertifyTranslationsStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_ID, DOCUMENTS)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(TRANSLATION_CERTIFICATE)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let case_id = inputs.read(&CASE_ID)?;
        let documents = inputs.read(&DOCUMENTS)?;
        let target = inputs.read_opt(&TARGET_LANG)?.unwrap_or(Lang::En);
        let translator = inputs
            .read_opt(&TRANSLATOR_NAME)?
            .unwrap_or_else(|| "[TRANSLATOR NAME]".to_string());

        let warnings: Vec<String> = documents
            .iter()
            .filter(|d| d.ocr_confidence.is_some_and(|c| c < LOW_OCR))
            .map(|d| format!("Document '{}' has low OCR confidence - verify against original", d.label()))
            .collect();
        let mut checklist: Vec<String> = CERTIFICATION_CHECKLIST.iter().map(|s| s.to_string()).collect();
        checklist.extend(warnings.iter().cloned());

        let certificate = TranslationCertificate {
            working_translation: working_translation(&documents, target),
            affidavit_draft: affidavit(&documents, target, &translator),
            case_id,
            target_lang: target,
            checklist,
            documents: documents.len(),
            warnings,
        };
        let confidence = if certificate.warnings.is_empty() { 0.9 } else { 0.65 };
        tracing::info!(
            "[Evidence] certification pack for {} document(s), {} warning(s)",
            certificate.documents,
            certificate.warnings.len()
        );

        let data = Output::new().put(&TRANSLATION_CERTIFICATE, &certificate)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn lang_name(lang: Option<Lang>) -> &'static str {
    lang.map(|l| l.code()).unwrap_or("unknown")
}

fn working_translation(documents: &[EvidenceDocument], target: Lang) -> String {
    let mut out = format!(
        "WORKING TRANSLATION SUMMARY\nTarget Language: {}\nDate: {}\n",
        target.code().to_uppercase(),
        Utc::now().format("%Y-%m-%d")
    );
    for (i, doc) in documents.iter().enumerate() {
        out.push_str(&format!(
            "\nDocument {}: {}\nSource Language: {}\nPages: {}\n\n[Working translation - requires certified translator review]\n\n---\n",
            i + 1,
            doc.label(),
            lang_name(doc.language),
            doc.pages.map(|p| p.to_string()).unwrap_or_else(|| "N/A".to_string())
        ));
    }
    out
}

fn affidavit(documents: &[EvidenceDocument], target: Lang, translator: &str) -> String {
    let list = documents
        .iter()
        .enumerate()
        .map(|(i, d)| format!("   {}. {} ({} -> {})", i + 1, d.label(), lang_name(d.language), target.code()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "AFFIDAVIT OF TRANSLATOR\n\nIN THE [COURT NAME]\n\n[CASE TITLE]\n\nAFFIDAVIT OF {t}\n\n\
I, {t}, of [ADDRESS], do solemnly and sincerely declare as follows:\n\n\
1. I am a sworn translator duly qualified to translate documents into {lang}.\n\n\
2. I have translated the following documents in this matter:\n{list}\n\n\
3. The translations exhibited hereto are true and accurate translations of the original documents.\n\n\
4. All numerical values, dates, names and citations in the translations match the original documents exactly.\n\n\
5. I make this affidavit conscientiously believing it to be true and in accordance with the Statutory Declarations Act 1960.\n\n\
DECLARED at [LOCATION] this [DAY] day of [MONTH] [YEAR]\n\n\
Before me,\n\n______________________\nCommissioner for Oaths\n",
        t = translator,
        lang = target.code().to_uppercase(),
        list = if list.is_empty() { "   (none)".to_string() } else { list },
    )
}

// ── build-evidence-index ────────────────────────────────────────────────

pub struct BuildEvidenceIndexStage {
    deps: StageDeps,
}

impl BuildEvidenceIndexStage {
    pub const ID: &'static str = "build-evidence-index";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for BuildEvidenceIndexStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_ID, DOCUMENTS)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(EVIDENCE_INDEX)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let case_id = inputs.read(&CASE_ID)?;
        let documents = inputs.read(&DOCUMENTS)?;
        let pleadings = inputs.read_or_default(&PLEADINGS)?;
        let translations = inputs.read_or_default(&TRANSLATIONS)?;
        let affidavits = inputs.read_or_default(&AFFIDAVITS)?;

        let mut items = Vec::with_capacity(pleadings.len() + documents.len());
        for (i, p) in pleadings.iter().enumerate() {
            let tab = format!("A{}", i + 1);
            items.push(IndexItem {
                translation_tab: p.has_english_text.then(|| format!("{}(EN)", tab)),
                affidavit_tab: None,
                tab,
                kind: IndexItemKind::Pleading,
                description: format!(
                    "{} (Malay)",
                    if p.pleading_type.is_empty() { "Pleading" } else { p.pleading_type.as_str() }
                ),
                file_id: p.id.clone(),
                language: Lang::Ms,
            });
        }
        for (i, d) in documents.iter().enumerate() {
            let tab = format!("B{}", i + 1);
            let translated = translations.iter().any(|t| t.doc_id == d.doc_id);
            let sworn = affidavits.iter().any(|a| a.doc_id == d.doc_id);
            items.push(IndexItem {
                translation_tab: translated.then(|| format!("{}(T)", tab)),
                affidavit_tab: sworn.then(|| format!("{}(A)", tab)),
                tab,
                kind: IndexItemKind::Document,
                description: d.label().to_string(),
                file_id: d.doc_id.clone(),
                language: d.language.unwrap_or_default(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let mut history: Vec<HistoryEvent> = documents
            .iter()
            .map(|d| HistoryEvent {
                timestamp: d.created_at.clone().unwrap_or_else(|| now.clone()),
                event_type: "document_added".to_string(),
                entity_id: d.doc_id.clone(),
                description: format!("Document '{}' added to matter", d.label()),
            })
            .chain(pleadings.iter().map(|p| HistoryEvent {
                timestamp: p.created_at.clone().unwrap_or_else(|| now.clone()),
                event_type: "pleading_created".to_string(),
                entity_id: p.id.clone(),
                description: format!("Pleading '{}' version {} created", p.pleading_type, p.version.max(1)),
            }))
            .collect();
        history.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let index = EvidenceIndex {
            packet_plan: packet_plan(&case_id, &items),
            total_items: items.len(),
            case_id,
            created_at: now,
            items,
            version_history: history,
        };
        tracing::info!(
            "[Evidence] index {}: {} item(s), ~{} page(s)",
            index.case_id,
            index.total_items,
            index.packet_plan.total_estimated_pages
        );

        let data = Output::new().put(&EVIDENCE_INDEX, &index)?.into_map();
        Ok(self.envelope(data, Some(0.88), &self.deps.gate))
    }
}

/// Court bundle sections with estimated page ranges.
pub fn packet_plan(case_id: &str, items: &[IndexItem]) -> PacketPlan {
    let groups: [(&str, Vec<String>, u32); 4] = [
        (
            "Pleadings",
            items
                .iter()
                .filter(|i| i.kind == IndexItemKind::Pleading)
                .map(|i| i.tab.clone())
                .collect(),
            10,
        ),
        (
            "Documents",
            items
                .iter()
                .filter(|i| i.kind == IndexItemKind::Document)
                .map(|i| i.tab.clone())
                .collect(),
            5,
        ),
        (
            "Certified Translations",
            items.iter().filter_map(|i| i.translation_tab.clone()).collect(),
            5,
        ),
        (
            "Translator Affidavits",
            items.iter().filter_map(|i| i.affidavit_tab.clone()).collect(),
            3,
        ),
    ];

    let mut sections = Vec::new();
    let mut page = 0u32;
    for (name, tabs, per_tab) in groups {
        if tabs.is_empty() {
            continue;
        }
        let start = page + 1;
        page += tabs.len() as u32 * per_tab;
        sections.push(BundleSection {
            name: name.to_string(),
            tabs,
            page_start: start,
            page_end: page,
        });
    }

    PacketPlan {
        bundle_name: format!("Evidence Bundle - {}", case_id),
        sections,
        total_estimated_pages: page,
        assembly_instructions: [
            "Print all documents single-sided on A4 paper",
            "Insert tab dividers at each section",
            "Number pages consecutively",
            "Bind with treasury tags or ring binder",
            "Prepare cover page with case details",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

// ── prepare-hearing-materials ───────────────────────────────────────────

const SCRIPT_SYSTEM_MS: &str = "Anda peguam Malaysia. Sediakan skrip hujahan lisan formal dalam Bahasa \
Malaysia: mulakan dengan \"Yang Arif\", nyatakan kes secara ringkas, tangani setiap isu, rujuk \
autoriti, dan akhiri dengan permohonan relif. Jawab dengan skrip sahaja.";

const SCRIPT_SYSTEM_EN: &str = "Write English speaking notes that let counsel follow a Malay oral \
submission: key legal points, argument summaries, and translations of key Malay legal terms. \
Answer with the notes only.";

const FAQ_SYSTEM: &str = "You are a Malaysian legal expert preparing for a hearing. Answer with a \
JSON array of 5 objects {\"question\", \"answerMs\" (starting \"Yang Arif, ...\"), \"answerEn\" \
(starting \"Your Honour, ...\"), \"authority\"}. No prose.";

pub struct PrepareHearingStage {
    deps: StageDeps,
}

impl PrepareHearingStage {
    pub const ID: &'static str = "prepare-hearing-materials";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for PrepareHearingStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_ID, EVIDENCE_INDEX)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(HEARING_BUNDLE)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let case_id = inputs.read(&CASE_ID)?;
        let index = inputs.read(&EVIDENCE_INDEX)?;
        let snapshot = inputs.read_opt(&CASE_SNAPSHOT)?;
        let authorities = inputs.read_or_default(&AUTHORITIES)?;
        let issues = inputs.read_or_default(&ISSUES_SELECTED)?;
        let has_memo = inputs.contains(ARGUMENT_MEMO.name());

        let tabs = hearing_tabs(&index, &authorities, has_memo);
        let context = hearing_context(&case_id, snapshot.as_ref(), &issues, &authorities);

        let (script_ms, script_en, faqs) = tokio::join!(
            self.deps.ask(SCRIPT_SYSTEM_MS, context.clone()),
            self.deps.ask(SCRIPT_SYSTEM_EN, context.clone()),
            self.deps.ask(FAQ_SYSTEM, context)
        );
        let questions = faqs
            .ok()
            .and_then(|answer| extract_json_array(&answer))
            .and_then(|v| serde_json::from_value::<Vec<JudgeQuestion>>(v).ok())
            .filter(|q| !q.is_empty());

        let title = snapshot.as_ref().map(|s| s.title.as_str()).unwrap_or(case_id.as_str());
        let bundle = match (script_ms, script_en, questions) {
            (Ok(ms), Ok(en), Some(questions)) => HearingBundle {
                case_id: case_id.clone(),
                tabs,
                oral_script_ms: ms,
                oral_script_en_notes: en,
                if_judge_asks: questions,
                generated: true,
            },
            (ms, en, questions) => {
                tracing::warn!("[Evidence] hearing materials partly templated for {}", case_id);
                HearingBundle {
                    case_id: case_id.clone(),
                    tabs,
                    oral_script_ms: ms.unwrap_or_else(|_| fallback_script_ms(title, &issues)),
                    oral_script_en_notes: en.unwrap_or_else(|_| fallback_script_en(title, &issues)),
                    if_judge_asks: questions.unwrap_or_else(fallback_questions),
                    generated: false,
                }
            }
        };
        let confidence = if bundle.generated { 0.85 } else { 0.6 };

        let data = Output::new().put(&HEARING_BUNDLE, &bundle)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn hearing_tabs(index: &EvidenceIndex, authorities: &[Authority], has_memo: bool) -> Vec<HearingTab> {
    let pleadings = index
        .items
        .iter()
        .filter(|i| i.kind == IndexItemKind::Pleading)
        .map(|i| HearingEntry {
            description: i.description.clone(),
            reference: Some(i.tab.clone()),
        })
        .collect();
    let submissions = if has_memo {
        vec![HearingEntry {
            description: "Written submissions (from argument memo)".to_string(),
            reference: None,
        }]
    } else {
        vec![HearingEntry {
            description: "Written submissions (to be prepared)".to_string(),
            reference: None,
        }]
    };
    let authorities = authorities
        .iter()
        .enumerate()
        .map(|(i, a)| HearingEntry {
            description: format!(
                "Authority {}: {} ({})",
                i + 1,
                a.label(),
                if a.binding { "Binding" } else { "Persuasive" }
            ),
            reference: a.url.clone(),
        })
        .collect();
    let translations = index
        .items
        .iter()
        .filter_map(|i| {
            i.translation_tab.as_ref().map(|t| HearingEntry {
                description: format!("Translation of {}", i.description),
                reference: Some(t.clone()),
            })
        })
        .collect();

    vec![
        HearingTab { tab: "1".into(), section: "Pleadings".into(), entries: pleadings },
        HearingTab { tab: "2".into(), section: "Submissions".into(), entries: submissions },
        HearingTab { tab: "3".into(), section: "Bundle of Authorities".into(), entries: authorities },
        HearingTab { tab: "4".into(), section: "Translations".into(), entries: translations },
    ]
}

fn hearing_context(case_id: &str, snapshot: Option<&CaseSnapshot>, issues: &[Issue], authorities: &[Authority]) -> String {
    let (title, case_type, plaintiff, defendant) = match snapshot {
        Some(s) => (
            s.title.as_str(),
            s.case_type.as_str(),
            s.party("plaintiff").unwrap_or("Plaintif"),
            s.party("defendant").unwrap_or("Defendan"),
        ),
        None => (case_id, "civil", "Plaintif", "Defendan"),
    };
    let issues = if issues.is_empty() {
        "General civil dispute".to_string()
    } else {
        issues
            .iter()
            .enumerate()
            .map(|(i, x)| format!("{}. {}", i + 1, x.title))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let cases = if authorities.is_empty() {
        "No specific authorities cited".to_string()
    } else {
        authorities
            .iter()
            .take(3)
            .map(|a| format!("- {}: {}", a.label(), crate::generation::truncate(&a.summary, 100)))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Case: {}\nType: {}\nPlaintif: {}\nDefendan: {}\n\nLegal issues:\n{}\n\nAuthorities:\n{}",
        title, case_type, plaintiff, defendant, issues, cases
    )
}

fn issue_titles(issues: &[Issue]) -> Vec<&str> {
    issues.iter().map(|i| i.title.as_str()).collect()
}

fn fallback_script_ms(title: &str, issues: &[Issue]) -> String {
    let mut s = format!(
        "Yang Arif, saya mewakili pihak Plaintif dalam kes {}.\n\nIsu-isu yang akan dihujahkan:\n",
        title
    );
    for (i, t) in issue_titles(issues).iter().enumerate() {
        s.push_str(&format!("{}. {}\n", i + 1, t));
    }
    s.push_str("\nOleh itu, Plaintif memohon agar tuntutan dibenarkan dengan kos. Sekian, terima kasih Yang Arif.\n");
    s
}

fn fallback_script_en(title: &str, issues: &[Issue]) -> String {
    let mut s = format!(
        "Speaking notes for {}.\n\nOpen with \"Yang Arif\" and introduce counsel for the Plaintiff.\nIssues to address:\n",
        title
    );
    for (i, t) in issue_titles(issues).iter().enumerate() {
        s.push_str(&format!("{}. {}\n", i + 1, t));
    }
    s.push_str("\nClose with the prayer for relief (\"memohon agar tuntutan dibenarkan dengan kos\").\n");
    s
}

fn fallback_questions() -> Vec<JudgeQuestion> {
    [
        (
            "Why is this court the appropriate forum?",
            "Yang Arif, Mahkamah ini mempunyai bidang kuasa kerana kausa tindakan berbangkit dalam bidang kuasanya.",
            "Your Honour, this Court has jurisdiction because the cause of action arose within its territorial limits.",
        ),
        (
            "What is the basis of the quantum claimed?",
            "Yang Arif, jumlah tuntutan adalah berdasarkan dokumen yang terdapat dalam ikatan dokumen.",
            "Your Honour, the quantum is supported by the documents in the agreed bundle.",
        ),
        (
            "Are the translations certified?",
            "Yang Arif, terjemahan telah disahkan oleh penterjemah bertauliah.",
            "Your Honour, the translations have been certified by a sworn translator.",
        ),
    ]
    .into_iter()
    .map(|(q, ms, en)| JudgeQuestion {
        question: q.to_string(),
        answer_ms: ms.to_string(),
        answer_en: en.to_string(),
        authority: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generation, GenerationError, GenerationRequest, OfflineGenerator, TextGenerator};
    use crate::workflow::ConfidenceGate;
    use serde_json::json;
    use std::sync::Arc;

    struct Scripted;

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, r: &GenerationRequest) -> Result<Generation, GenerationError> {
            let content = if r.system.contains("JSON array") {
                r#"[{"question": "Q?", "answerMs": "Yang Arif, ...", "answerEn": "Your Honour, ..."}]"#.to_string()
            } else {
                "Yang Arif, ...".to_string()
            };
            Ok(Generation {
                content,
                model: "scripted".into(),
                usage: None,
            })
        }
    }

    fn deps(g: Arc<dyn TextGenerator>) -> StageDeps {
        StageDeps::new(g, ConfidenceGate::default())
    }

    fn seeded(documents: serde_json::Value) -> WorkflowState {
        let mut s = WorkflowState::new();
        s.insert_value("caseId", json!("CASE-7"));
        s.insert_value("documents", documents);
        s
    }

    #[tokio::test]
    async fn test_certificate_warns_on_low_ocr() {
        let s = seeded(json!([
            {"docId": "D1", "filename": "invoice.pdf", "language": "ms", "ocrConfidence": 0.62},
            {"docId": "D2", "filename": "letter.txt", "language": "en"}
        ]));
        let env = CertifyTranslationsStage::new(deps(Arc::new(OfflineGenerator)))
            .process(&s)
            .await
            .unwrap();
        let cert: TranslationCertificate =
            serde_json::from_value(env.data["translationCertificate"].clone()).unwrap();
        assert_eq!(cert.checklist.len(), 13);
        assert_eq!(cert.warnings.len(), 1);
        assert!(cert.affidavit_draft.contains("invoice.pdf (ms -> en)"));
        assert_eq!(env.confidence, Some(0.65));
        assert!(env.human_review_required);
    }

    #[tokio::test]
    async fn test_index_tabs_and_packet_plan() {
        let mut s = seeded(json!([{"docId": "D1", "filename": "a.pdf"}, {"docId": "D2", "filename": "b.pdf"}]));
        s.insert_value("pleadings", json!([{"id": "P1", "pleadingType": "Statement of Claim", "hasEnglishText": true}]));
        s.insert_value("translations", json!([{"docId": "D2"}]));
        s.insert_value("affidavits", json!([{"docId": "D2"}]));
        let env = BuildEvidenceIndexStage::new(deps(Arc::new(OfflineGenerator)))
            .process(&s)
            .await
            .unwrap();
        let index: EvidenceIndex = serde_json::from_value(env.data["evidenceIndex"].clone()).unwrap();
        assert_eq!(index.total_items, 3);
        let tabs: Vec<_> = index.items.iter().map(|i| i.tab.as_str()).collect();
        assert_eq!(tabs, vec!["A1", "B1", "B2"]);
        assert_eq!(index.items[2].translation_tab.as_deref(), Some("B2(T)"));
        let sections: Vec<_> = index
            .packet_plan
            .sections
            .iter()
            .map(|s| (s.name.as_str(), s.page_start, s.page_end))
            .collect();
        assert_eq!(
            sections,
            vec![
                ("Pleadings", 1, 10),
                ("Documents", 11, 20),
                ("Certified Translations", 21, 30),
                ("Translator Affidavits", 31, 33)
            ]
        );
        assert_eq!(index.version_history.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_documents_make_an_empty_index() {
        let env = BuildEvidenceIndexStage::new(deps(Arc::new(OfflineGenerator)))
            .process(&seeded(json!([])))
            .await
            .unwrap();
        assert_eq!(env.data["evidenceIndex"]["totalItems"], 0);
        assert_eq!(env.data["evidenceIndex"]["packetPlan"]["totalEstimatedPages"], 0);
    }

    #[tokio::test]
    async fn test_hearing_bundle_generated_and_fallback() {
        let mut s = seeded(json!([]));
        s.insert_value(
            "evidenceIndex",
            serde_json::to_value(EvidenceIndex {
                case_id: "CASE-7".into(),
                created_at: "2024-01-01T00:00:00Z".into(),
                items: Vec::new(),
                packet_plan: packet_plan("CASE-7", &[]),
                version_history: Vec::new(),
                total_items: 0,
            })
            .unwrap(),
        );

        let env = PrepareHearingStage::new(deps(Arc::new(Scripted))).process(&s).await.unwrap();
        assert_eq!(env.data["hearingBundle"]["generated"], true);
        assert_eq!(env.data["hearingBundle"]["tabs"].as_array().unwrap().len(), 4);
        assert_eq!(env.data["hearingBundle"]["ifJudgeAsks"][0]["question"], "Q?");
        assert_eq!(env.confidence, Some(0.85));

        let env = PrepareHearingStage::new(deps(Arc::new(OfflineGenerator))).process(&s).await.unwrap();
        assert_eq!(env.data["hearingBundle"]["generated"], false);
        assert!(env.data["hearingBundle"]["oralScriptMs"].as_str().unwrap().starts_with("Yang Arif"));
        assert_eq!(env.confidence, Some(0.6));
        assert!(env.human_review_required);
    }
}
