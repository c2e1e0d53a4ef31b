//! plan-issues — propose issues to plead and prayers for relief.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::StageError;
use crate::stages::keys::{
    CASE_SNAPSHOT, ISSUES_SELECTED, PLANNED_ISSUES, PRAYERS_SELECTED, key_names,
};
use crate::stages::model::{CaseSnapshot, Issue, IssuePlan, Prayer};
use crate::stages::{round2, Output, StageDeps};
use crate::text::extract_json_object;
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

const SYSTEM_PROMPT: &str = "You are a Malaysian civil litigator planning a statement of claim. \
Answer with one JSON object: {\"issues\": [{\"id\", \"title\", \"legalBasis\": [..], \"theory\", \
\"confidence\", \"likelyEvidenceRequired\": [..]}], \"prayers\": [{\"id\", \"text\", \"templateId\", \
\"textMs\", \"textEn\"}]}. No prose.";

const FALLBACK_CONFIDENCE: f64 = 0.5;

pub struct PlanIssuesStage {
    deps: StageDeps,
}

impl PlanIssuesStage {
    pub const ID: &'static str = "plan-issues";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratedPlan {
    issues: Vec<Issue>,
    prayers: Vec<Prayer>,
}

#[async_trait]
impl Stage for PlanIssuesStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(PLANNED_ISSUES, ISSUES_SELECTED, PRAYERS_SELECTED)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let selected_issues = inputs.read_or_default(&ISSUES_SELECTED)?;
        let selected_prayers = inputs.read_or_default(&PRAYERS_SELECTED)?;

        let prompt = format!(
            "Case snapshot:\n{}",
            serde_json::to_string_pretty(&snapshot).unwrap_or_default()
        );
        let generated = match self.deps.ask(SYSTEM_PROMPT, prompt).await {
            Ok(answer) => extract_json_object(&answer)
                .and_then(|v| serde_json::from_value::<GeneratedPlan>(v).ok())
                .filter(|p| !p.issues.is_empty() || !p.prayers.is_empty()),
            Err(e) => {
                tracing::warn!("[Drafting] issue planning unavailable, deriving from snapshot: {}", e);
                None
            }
        };

        let (plan, confidence) = match generated {
            Some(p) => {
                let confidence = plan_confidence(&p.issues, &p.prayers);
                let plan = IssuePlan {
                    issues: numbered(p.issues, "ISS"),
                    prayers: numbered_prayers(p.prayers),
                    generated: true,
                };
                (plan, confidence)
            }
            None => (fallback_plan(&snapshot), FALLBACK_CONFIDENCE),
        };

        let issues = if selected_issues.is_empty() {
            plan.issues.clone()
        } else {
            selected_issues
        };
        let prayers = if selected_prayers.is_empty() {
            plan.prayers.clone()
        } else {
            selected_prayers
        };
        tracing::info!(
            "[Drafting] planned {} issue(s), {} prayer(s); pleading {} / {}",
            plan.issues.len(),
            plan.prayers.len(),
            issues.len(),
            prayers.len()
        );

        let data = Output::new()
            .put(&PLANNED_ISSUES, &plan)?
            .put(&ISSUES_SELECTED, &issues)?
            .put(&PRAYERS_SELECTED, &prayers)?
            .into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn plan_confidence(issues: &[Issue], prayers: &[Prayer]) -> f64 {
    let mut c = 0.0;
    if !issues.is_empty() {
        c += 0.4;
        if issues.iter().all(|i| !i.legal_basis.is_empty()) {
            c += 0.2;
        }
    }
    if !prayers.is_empty() {
        c += 0.3;
        if prayers.iter().all(|p| p.template_id.is_some()) {
            c += 0.1;
        }
    }
    round2(c)
}

fn numbered(issues: Vec<Issue>, prefix: &str) -> Vec<Issue> {
    issues
        .into_iter()
        .enumerate()
        .map(|(i, mut issue)| {
            if issue.id.is_empty() {
                issue.id = format!("{}-{}", prefix, i + 1);
            }
            issue
        })
        .collect()
}

fn numbered_prayers(prayers: Vec<Prayer>) -> Vec<Prayer> {
    prayers
        .into_iter()
        .enumerate()
        .map(|(i, mut p)| {
            if p.id.is_empty() {
                p.id = format!("PRY-{}", i + 1);
            }
            p
        })
        .collect()
}

fn fallback_plan(snapshot: &CaseSnapshot) -> IssuePlan {
    let titles: Vec<String> = if snapshot.issues.is_empty() {
        match snapshot.case_type.as_str() {
            "contract" => vec!["Breach of contract".to_string()],
            "tort" => vec!["Negligence".to_string()],
            _ => vec![format!("Liability of the defendant in {}", snapshot.title)],
        }
    } else {
        snapshot.issues.clone()
    };
    let issues = titles
        .into_iter()
        .enumerate()
        .map(|(i, title)| Issue {
            id: format!("ISS-{}", i + 1),
            title,
            ..Default::default()
        })
        .collect();

    let reliefs: Vec<(String, Option<&str>)> = if snapshot.remedies.is_empty() {
        vec![
            ("Damages to be assessed".to_string(), Some("Ganti rugi untuk ditaksir")),
            ("Interest at 5% per annum from the date of judgment".to_string(), Some("Faedah pada kadar 5% setahun dari tarikh penghakiman")),
            ("Costs".to_string(), Some("Kos")),
        ]
    } else {
        snapshot.remedies.iter().map(|r| (r.clone(), None)).collect()
    };
    let prayers = reliefs
        .into_iter()
        .enumerate()
        .map(|(i, (text, ms))| Prayer {
            id: format!("PRY-{}", i + 1),
            text_en: Some(text.clone()),
            text_ms: ms.map(str::to_string),
            text,
            template_id: None,
        })
        .collect();

    IssuePlan {
        issues,
        prayers,
        generated: false,
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

    fn state() -> WorkflowState {
        let mut s = WorkflowState::new();
        s.insert_value("caseSnapshot", json!({"title": "Ali lwn Abu", "caseType": "contract"}));
        s
    }

    #[tokio::test]
    async fn test_generated_plan_scores_by_completeness() {
        let answer = r#"{"issues": [{"title": "Breach", "legalBasis": ["Contracts Act 1950 s.74"]}], "prayers": [{"text": "Damages"}]}"#;
        let stage = PlanIssuesStage::new(StageDeps::new(Arc::new(Canned(answer)), ConfidenceGate::default()));
        let env = stage.process(&state()).await.unwrap();
        assert_eq!(env.confidence, Some(0.9));
        assert_eq!(env.data["issuesSelected"][0]["id"], "ISS-1");
        assert_eq!(env.data["prayersSelected"][0]["id"], "PRY-1");
        assert_eq!(env.data["plannedIssues"]["generated"], true);
    }

    #[tokio::test]
    async fn test_fallback_plan_and_caller_selection_wins() {
        let mut s = state();
        s.insert_value("issuesSelected", json!([{"id": "X", "title": "Caller issue"}]));
        let stage = PlanIssuesStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()));
        let env = stage.process(&s).await.unwrap();
        assert_eq!(env.confidence, Some(FALLBACK_CONFIDENCE));
        assert!(env.human_review_required);
        assert_eq!(env.data["plannedIssues"]["issues"][0]["title"], "Breach of contract");
        assert_eq!(env.data["issuesSelected"][0]["id"], "X");
        assert_eq!(env.data["prayersSelected"].as_array().unwrap().len(), 3);
    }
}
