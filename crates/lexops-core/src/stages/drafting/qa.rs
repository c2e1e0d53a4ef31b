//! quality-check — compare the primary and secondary drafts.
//!
//! Five checks, each with a severity. Any failed high-severity check blocks
//! the draft for human review (by dropping the stage confidence below the
//! gate); medium ones only produce suggestions.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::StageError;
use crate::stages::keys::{PRIMARY_DRAFT, QA_REPORT, SECONDARY_DRAFT, key_names};
use crate::stages::model::{Draft, QaCheck, QaReport, Severity};
use crate::stages::{Output, StageDeps};
use crate::text::{cached_regex, count_term, numbers, Lang};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

pub struct QualityCheckStage {
    deps: StageDeps,
}

impl QualityCheckStage {
    pub const ID: &'static str = "quality-check";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for QualityCheckStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(PRIMARY_DRAFT, SECONDARY_DRAFT)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(QA_REPORT)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let primary = inputs.read(&PRIMARY_DRAFT)?;
        let secondary = inputs.read(&SECONDARY_DRAFT)?;

        let report = review(&primary, &secondary);
        let confidence = if report.block_for_human { 0.6 } else { 0.92 };
        tracing::info!(
            "[Drafting] QA {}/{} checks passed{}",
            report.passed_checks,
            report.checks.len(),
            if report.block_for_human { ", blocked for review" } else { "" }
        );

        let data = Output::new().put(&QA_REPORT, &report)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

pub fn review(primary: &Draft, secondary: &Draft) -> QaReport {
    let checks = vec![
        missing_paragraphs(primary, secondary),
        defined_terms(primary, secondary),
        numbers_and_dates(primary, secondary),
        citations(primary, secondary),
        alignment_quality(secondary),
    ];
    let suggestions = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| suggestion(&c.name).to_string())
        .collect();
    let passed = checks.iter().filter(|c| c.passed).count();
    let block = checks.iter().any(|c| !c.passed && c.severity == Severity::High);
    QaReport {
        failed_checks: checks.len() - passed,
        passed_checks: passed,
        checks,
        suggestions,
        block_for_human: block,
    }
}

fn check(name: &str, severity: Severity, findings: Vec<String>) -> QaCheck {
    QaCheck {
        name: name.to_string(),
        passed: findings.is_empty(),
        severity,
        findings,
    }
}

fn suggestion(name: &str) -> &'static str {
    match name {
        "missing_paragraphs" => "Regenerate the companion so every numbered paragraph has a counterpart",
        "defined_terms" => "Use the defined party terms consistently in both versions",
        "numbers_and_dates" => "Reconcile amounts and dates between the two versions",
        "citations" => "Carry every case citation across unchanged",
        _ => "Review low-alignment paragraph pairs with a translator",
    }
}

fn missing_paragraphs(primary: &Draft, secondary: &Draft) -> QaCheck {
    let a: BTreeSet<&str> = primary.paragraphs.iter().map(|p| p.number.as_str()).collect();
    let b: BTreeSet<&str> = secondary.paragraphs.iter().map(|p| p.number.as_str()).collect();
    let findings = a
        .symmetric_difference(&b)
        .map(|n| format!("paragraph {} appears in only one version", n))
        .collect();
    check("missing_paragraphs", Severity::High, findings)
}

fn party_terms(lang: Lang) -> [&'static str; 2] {
    match lang {
        Lang::Ms => ["PLAINTIF", "DEFENDAN"],
        _ => ["PLAINTIFF", "DEFENDANT"],
    }
}

fn defined_terms(primary: &Draft, secondary: &Draft) -> QaCheck {
    let findings = party_terms(primary.language)
        .iter()
        .zip(party_terms(secondary.language))
        .filter_map(|(a, b)| {
            let (ca, cb) = (count_term(&primary.text, a), count_term(&secondary.text, b));
            (ca != cb).then(|| format!("{} used {} time(s) but {} used {} time(s)", a, ca, b, cb))
        })
        .collect();
    check("defined_terms", Severity::Medium, findings)
}

fn numbers_and_dates(primary: &Draft, secondary: &Draft) -> QaCheck {
    let (a, b) = (numbers(&primary.text), numbers(&secondary.text));
    let findings = a
        .symmetric_difference(&b)
        .map(|n| format!("figure {} appears in only one version", n))
        .collect();
    check("numbers_and_dates", Severity::High, findings)
}

fn citation_set(text: &str) -> BTreeSet<String> {
    match cached_regex!(r"\[\d{4}\]\s+\d+\s+[A-Z]+\s+\d+") {
        Some(re) => re.find_iter(text).map(|m| m.as_str().to_string()).collect(),
        None => BTreeSet::new(),
    }
}

fn citations(primary: &Draft, secondary: &Draft) -> QaCheck {
    let (a, b) = (citation_set(&primary.text), citation_set(&secondary.text));
    let findings = a
        .symmetric_difference(&b)
        .map(|c| format!("citation {} appears in only one version", c))
        .collect();
    check("citations", Severity::Medium, findings)
}

fn alignment_quality(secondary: &Draft) -> QaCheck {
    if secondary.aligned_pairs.is_empty() {
        return check("alignment_quality", Severity::Low, Vec::new());
    }
    let mean = secondary
        .aligned_pairs
        .iter()
        .map(|p| p.alignment_score)
        .sum::<f64>()
        / secondary.aligned_pairs.len() as f64;
    let (severity, findings) = if mean < 0.6 {
        (Severity::High, vec![format!("mean alignment {:.2} is below 0.6", mean)])
    } else if mean < 0.8 {
        (Severity::Medium, vec![format!("mean alignment {:.2} is below 0.8", mean)])
    } else {
        (Severity::Low, Vec::new())
    };
    check("alignment_quality", severity, findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::model::{AlignedPair, DraftParagraph};

    fn draft(lang: Lang, text: &str) -> Draft {
        Draft {
            language: lang,
            template_id: "T".into(),
            text: text.into(),
            paragraphs: crate::text::numbered_paragraphs(text)
                .into_iter()
                .map(|p| DraftParagraph {
                    number: p.number,
                    text: p.text,
                    source_references: Vec::new(),
                })
                .collect(),
            aligned_pairs: Vec::new(),
            divergences: Vec::new(),
        }
    }

    #[test]
    fn test_identical_drafts_pass() {
        let d = draft(Lang::En, "1. The PLAINTIFF relies on [2019] 3 MLJ 45.\n2. RM 5,000 is due.");
        let report = review(&d, &d);
        assert_eq!(report.passed_checks, 5);
        assert!(!report.block_for_human);
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_divergent_drafts_block() {
        let ms = draft(Lang::Ms, "1. PLAINTIF merujuk [2019] 3 MLJ 45.\n2. RM 5,000 terhutang.\n3. Kos.");
        let mut en = draft(Lang::En, "1. The PLAINTIFF relies on the case.\n2. RM 6,000 is due.");
        en.aligned_pairs = vec![AlignedPair {
            number: "1".into(),
            primary: String::new(),
            secondary: String::new(),
            alignment_score: 0.5,
        }];
        let report = review(&ms, &en);
        let failed: Vec<_> = report.checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["missing_paragraphs", "numbers_and_dates", "citations", "alignment_quality"]);
        assert!(report.block_for_human);
        assert_eq!(report.failed_checks, 4);
        assert_eq!(report.suggestions.len(), 4);
    }
}
