//! select-template — pick a pleading template and record its language.
//!
//! The template's language is stored as a [`TemplateLanguage`] so the
//! drafting pipeline can route on it without inspecting template ids.

use async_trait::async_trait;

use crate::error::StageError;
use crate::stages::keys::{CASE_SNAPSHOT, TEMPLATE_ID, TEMPLATE_INFO, TEMPLATE_LANGUAGE, key_names};
use crate::stages::model::{CaseSnapshot, TemplateInfo, TemplateLanguage};
use crate::stages::{Output, StageDeps};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

#[derive(Debug, Clone, Copy)]
pub struct TemplateSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub court: &'static str,
    pub language: TemplateLanguage,
    pub jurisdiction: &'static str,
    pub version: &'static str,
}

pub const TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        id: "TPL-HighCourt-MS-v2",
        name: "Pernyataan Tuntutan (Mahkamah Tinggi)",
        court: "High Court",
        language: TemplateLanguage::Primary,
        jurisdiction: "Peninsular Malaysia",
        version: "2.0",
    },
    TemplateSpec {
        id: "TPL-HighCourt-EN-v2",
        name: "Statement of Claim (High Court, Sabah and Sarawak)",
        court: "High Court",
        language: TemplateLanguage::Secondary,
        jurisdiction: "Sabah and Sarawak",
        version: "2.0",
    },
    TemplateSpec {
        id: "TPL-SessionsCourt-MS-v1",
        name: "Pernyataan Tuntutan (Mahkamah Sesyen)",
        court: "Sessions Court",
        language: TemplateLanguage::Primary,
        jurisdiction: "Peninsular Malaysia",
        version: "1.0",
    },
];

pub fn find_template(id: &str) -> Option<&'static TemplateSpec> {
    TEMPLATES.iter().find(|t| t.id == id)
}

pub struct SelectTemplateStage {
    deps: StageDeps,
}

impl SelectTemplateStage {
    pub const ID: &'static str = "select-template";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for SelectTemplateStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(CASE_SNAPSHOT)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(TEMPLATE_INFO, TEMPLATE_LANGUAGE)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let snapshot = inputs.read(&CASE_SNAPSHOT)?;
        let requested = inputs.read_opt(&TEMPLATE_ID)?;

        let mut warnings = Vec::new();
        let spec = match requested.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => match find_template(id) {
                Some(spec) => spec,
                None => {
                    let spec = infer_template(&snapshot);
                    warnings.push(format!("Unknown template '{}'; using {}", id, spec.id));
                    spec
                }
            },
            None => infer_template(&snapshot),
        };
        warnings.extend(compliance_warnings(spec, &snapshot));

        let info = TemplateInfo {
            template_id: spec.id.to_string(),
            name: spec.name.to_string(),
            court: spec.court.to_string(),
            language: spec.language,
            jurisdiction: spec.jurisdiction.to_string(),
            version: spec.version.to_string(),
            compliance_warnings: warnings,
        };
        let confidence = if info.compliance_warnings.is_empty() { 0.95 } else { 0.65 };
        tracing::info!(
            "[Drafting] template {} ({:?}), {} warning(s)",
            info.template_id,
            info.language,
            info.compliance_warnings.len()
        );

        let data = Output::new()
            .put(&TEMPLATE_INFO, &info)?
            .put(&TEMPLATE_LANGUAGE, &info.language)?
            .into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

fn is_east_malaysia(snapshot: &CaseSnapshot) -> bool {
    snapshot.jurisdiction.as_deref().is_some_and(|j| {
        let j = j.to_lowercase();
        j.contains("sabah") || j.contains("sarawak")
    })
}

fn infer_template(snapshot: &CaseSnapshot) -> &'static TemplateSpec {
    let court = snapshot.court_name().to_lowercase();
    let id = if court.contains("sessions") || court.contains("magistrate") {
        "TPL-SessionsCourt-MS-v1"
    } else if is_east_malaysia(snapshot) {
        "TPL-HighCourt-EN-v2"
    } else {
        "TPL-HighCourt-MS-v2"
    };
    find_template(id).unwrap_or(&TEMPLATES[0])
}

fn compliance_warnings(spec: &TemplateSpec, snapshot: &CaseSnapshot) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(court) = &snapshot.court {
        if !court.to_lowercase().contains(&spec.court.to_lowercase()) {
            warnings.push(format!(
                "Template is for the {} but the matter is before the {}",
                spec.court, court
            ));
        }
    }
    if snapshot.parties.len() < 2 {
        warnings.push("Fewer than two parties identified".to_string());
    }
    if spec.language == TemplateLanguage::Secondary && !is_east_malaysia(snapshot) {
        warnings.push("English pleading outside Sabah and Sarawak requires leave".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OfflineGenerator;
    use crate::workflow::ConfidenceGate;
    use serde_json::json;
    use std::sync::Arc;

    fn stage() -> SelectTemplateStage {
        SelectTemplateStage::new(StageDeps::new(Arc::new(OfflineGenerator), ConfidenceGate::default()))
    }

    fn snapshot(court: &str, jurisdiction: Option<&str>) -> serde_json::Value {
        json!({
            "title": "A lwn B",
            "parties": [{"name": "A", "role": "plaintiff"}, {"name": "B", "role": "defendant"}],
            "court": court,
            "jurisdiction": jurisdiction,
        })
    }

    #[tokio::test]
    async fn test_infers_from_court_and_jurisdiction() {
        let mut s = WorkflowState::new();
        s.insert_value("caseSnapshot", snapshot("Sessions Court", None));
        let env = stage().process(&s).await.unwrap();
        assert_eq!(env.data["templateInfo"]["templateId"], "TPL-SessionsCourt-MS-v1");
        assert_eq!(env.data["templateLanguage"], "primary");
        assert_eq!(env.confidence, Some(0.95));

        let mut s = WorkflowState::new();
        s.insert_value("caseSnapshot", snapshot("High Court", Some("Sabah and Sarawak")));
        let env = stage().process(&s).await.unwrap();
        assert_eq!(env.data["templateLanguage"], "secondary");
        assert!(!env.human_review_required);
    }

    #[tokio::test]
    async fn test_requested_template_is_honoured_with_warnings() {
        let mut s = WorkflowState::new();
        s.insert_value("caseSnapshot", snapshot("High Court", None));
        s.insert_value("templateId", json!("TPL-HighCourt-EN-v2"));
        let env = stage().process(&s).await.unwrap();
        assert_eq!(env.data["templateLanguage"], "secondary");
        assert_eq!(env.confidence, Some(0.65));
        assert!(env.human_review_required);

        s.insert_value("templateId", json!("TPL-Nope"));
        let env = stage().process(&s).await.unwrap();
        assert_eq!(env.data["templateInfo"]["templateId"], "TPL-HighCourt-MS-v2");
        assert!(env.data["templateInfo"]["complianceWarnings"][0]
            .as_str()
            .unwrap()
            .contains("Unknown template"));
    }
}
