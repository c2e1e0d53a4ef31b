//! Research stages: authority search and the bilingual argument memo.
//!
//! ```text
//! query + filters ──► search-authorities ──► authorities ──► build-argument-memo ──► argumentMemo
//!                          │                                      │
//!                   caller list or                        one generator pair per
//!                   AuthoritySource                       issue, run concurrently
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::StageError;
use crate::stages::keys::{ARGUMENT_MEMO, AUTHORITIES, FILTERS, ISSUES_SELECTED, QUERY, key_names};
use crate::stages::model::{Argument, ArgumentMemo, Authority, Issue, SearchFilters};
use crate::stages::{round2, Output, StageDeps};
use crate::workflow::{Stage, StageEnvelope, WorkflowState};

const DEFAULT_LIMIT: usize = 10;
const AUTHORITIES_PER_ISSUE: usize = 3;

/// Case-law lookup boundary.
#[async_trait]
pub trait AuthoritySource: Send + Sync {
    async fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<Authority>, StageError>;
}

pub type SharedAuthoritySource = Arc<dyn AuthoritySource>;

/// No case-law database configured.
#[derive(Debug, Clone, Default)]
pub struct NoAuthorities;

#[async_trait]
impl AuthoritySource for NoAuthorities {
    async fn search(&self, _query: &str, _filters: &SearchFilters) -> Result<Vec<Authority>, StageError> {
        Ok(Vec::new())
    }
}

/// Authorities from a JSON array on disk, ranked by term overlap with the
/// query.
#[derive(Debug, Clone)]
pub struct FileAuthoritySource {
    path: PathBuf,
}

impl FileAuthoritySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuthoritySource for FileAuthoritySource {
    async fn search(&self, query: &str, _filters: &SearchFilters) -> Result<Vec<Authority>, StageError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            StageError::Failed(format!("cannot read authorities file {}: {}", self.path.display(), e))
        })?;
        let authorities: Vec<Authority> = serde_json::from_str(&raw).map_err(|e| {
            StageError::Failed(format!("invalid authorities file {}: {}", self.path.display(), e))
        })?;

        let terms = query_terms(query);
        let mut ranked: Vec<Authority> = authorities
            .into_iter()
            .filter_map(|mut a| {
                let score = relevance(&terms, &a);
                (terms.is_empty() || score > 0.0).then(|| {
                    a.relevance = Some(score);
                    a
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.relevance
                .unwrap_or(0.0)
                .total_cmp(&a.relevance.unwrap_or(0.0))
        });
        Ok(ranked)
    }
}

fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn relevance(terms: &[String], authority: &Authority) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {} {}",
        authority.case_name,
        authority.summary,
        authority.subject_areas.join(" ")
    )
    .to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    round2(hits as f64 / terms.len() as f64)
}

// ── search-authorities ──────────────────────────────────────────────────

pub struct SearchAuthoritiesStage {
    deps: StageDeps,
    source: SharedAuthoritySource,
}

impl SearchAuthoritiesStage {
    pub const ID: &'static str = "search-authorities";

    pub fn new(deps: StageDeps, source: SharedAuthoritySource) -> Self {
        Self { deps, source }
    }
}

#[async_trait]
impl Stage for SearchAuthoritiesStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(QUERY)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(AUTHORITIES)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let query = inputs.read(&QUERY)?;
        let filters = inputs.read_or_default(&FILTERS)?;

        let candidates = match inputs.read_opt(&AUTHORITIES)? {
            Some(supplied) => supplied,
            None => self.source.search(&query, &filters).await?,
        };
        let results: Vec<Authority> = candidates
            .into_iter()
            .filter(|a| filters.admits(a))
            .take(filters.limit.unwrap_or(DEFAULT_LIMIT))
            .collect();

        tracing::info!("[Research] '{}': {} authorit(ies)", query, results.len());
        let confidence = if results.is_empty() { 0.0 } else { 0.85 };
        let data = Output::new().put(&AUTHORITIES, &results)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

// ── build-argument-memo ─────────────────────────────────────────────────

const ARGUMENT_SYSTEM_EN: &str = "You are a Malaysian litigator. Write a concise legal argument \
(2-3 paragraphs) in English with inline citations. Answer with the argument only.";

const ARGUMENT_SYSTEM_MS: &str = "Anda peguam litigasi Malaysia. Tulis hujah undang-undang yang \
ringkas (2-3 perenggan) dalam Bahasa Malaysia dengan petikan kes. Jawab dengan hujah sahaja.";

pub struct BuildArgumentMemoStage {
    deps: StageDeps,
}

impl BuildArgumentMemoStage {
    pub const ID: &'static str = "build-argument-memo";

    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }

    async fn argue(&self, issue: &Issue, authorities: &[Authority]) -> Argument {
        let relevant = relevant_authorities(issue, authorities);
        let cited = relevant
            .iter()
            .map(|a| format!("- {}: {}", a.label(), crate::generation::truncate(&a.summary, 200)))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "ISSUE: {}\nLEGAL BASIS: {}\n\nRELEVANT CASES:\n{}",
            issue.title,
            issue.legal_basis.join(", "),
            if cited.is_empty() { "None supplied" } else { cited.as_str() }
        );

        let (en, ms) = tokio::join!(
            self.deps.ask(ARGUMENT_SYSTEM_EN, prompt.clone()),
            self.deps.ask(ARGUMENT_SYSTEM_MS, prompt)
        );
        let generated = en.is_ok() && ms.is_ok();
        let analysis_en = en.unwrap_or_else(|e| {
            tracing::warn!("[Research] argument for '{}' not generated: {}", issue.title, e);
            format!("Analysis for {} pending.", issue.title)
        });
        let analysis_ms = ms.unwrap_or_else(|e| {
            tracing::warn!("[Research] Malay argument for '{}' not generated: {}", issue.title, e);
            format!("[Analisis dalam Bahasa Melayu untuk {}]", issue.title)
        });

        let (binding, persuasive): (Vec<&Authority>, Vec<&Authority>) =
            relevant.iter().copied().partition(|a| a.is_local_report());
        Argument {
            issue_id: issue.id.clone(),
            issue_title: issue.title.clone(),
            analysis_en,
            analysis_ms,
            binding_authorities: binding.iter().map(|a| a.label().to_string()).collect(),
            persuasive_authorities: persuasive.iter().map(|a| a.label().to_string()).collect(),
            suggested_wording_en: format!("The {} is well-founded in law.", issue.title),
            suggested_wording_ms: format!("Tuntutan {} adalah berasas dalam undang-undang.", issue.title),
            generated,
        }
    }

    /// Build the memo for `issues` against `authorities`.
    pub async fn memo(&self, query: &str, issues: &[Issue], authorities: &[Authority]) -> ArgumentMemo {
        let arguments = join_all(issues.iter().map(|i| self.argue(i, authorities))).await;
        ArgumentMemo {
            query: query.to_string(),
            memo_en: compile_memo(query, &arguments, false),
            memo_ms: compile_memo(query, &arguments, true),
            total_issues: arguments.len(),
            authorities_considered: authorities.len(),
            arguments,
        }
    }
}

/// Authorities whose subject areas meet the issue's legal basis; without
/// any such match, the leading authorities overall.
fn relevant_authorities<'a>(issue: &Issue, authorities: &'a [Authority]) -> Vec<&'a Authority> {
    let basis: Vec<String> = issue.legal_basis.iter().map(|b| b.to_lowercase()).collect();
    let matching: Vec<&Authority> = authorities
        .iter()
        .filter(|a| {
            a.subject_areas
                .iter()
                .any(|area| basis.contains(&area.to_lowercase()))
        })
        .take(AUTHORITIES_PER_ISSUE)
        .collect();
    if matching.is_empty() {
        authorities.iter().take(AUTHORITIES_PER_ISSUE).collect()
    } else {
        matching
    }
}

fn compile_memo(query: &str, arguments: &[Argument], malay: bool) -> String {
    let mut memo = if malay {
        format!("MEMO ISU UNDANG-UNDANG\n\nPertanyaan: {}\n", query)
    } else {
        format!("LEGAL ISSUE MEMO\n\nQuery: {}\n", query)
    };
    for (i, arg) in arguments.iter().enumerate() {
        let body = if malay { &arg.analysis_ms } else { &arg.analysis_en };
        memo.push_str(&format!("\n{}. {}\n\n{}\n", i + 1, arg.issue_title, body));
        let cited: Vec<&str> = arg
            .binding_authorities
            .iter()
            .chain(&arg.persuasive_authorities)
            .map(String::as_str)
            .collect();
        if !cited.is_empty() {
            memo.push_str(&format!(
                "{}: {}\n",
                if malay { "Autoriti" } else { "Authorities" },
                cited.join("; ")
            ));
        }
    }
    memo
}

#[async_trait]
impl Stage for BuildArgumentMemoStage {
    fn id(&self) -> &str {
        Self::ID
    }

    fn required_keys(&self) -> &[&'static str] {
        key_names!(QUERY)
    }

    fn guaranteed_keys(&self) -> &[&'static str] {
        key_names!(ARGUMENT_MEMO)
    }

    async fn process(&self, inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
        let query = inputs.read(&QUERY)?;
        let authorities = inputs.read_or_default(&AUTHORITIES)?;
        let issues = inputs.read_or_default(&ISSUES_SELECTED)?;

        let memo = self.memo(&query, &issues, &authorities).await;
        let confidence = if memo.arguments.iter().all(|a| a.generated) { 0.82 } else { 0.6 };
        tracing::info!(
            "[Research] memo: {} issue(s), {} authorit(ies) considered",
            memo.total_issues,
            memo.authorities_considered
        );

        let data = Output::new().put(&ARGUMENT_MEMO, &memo)?.into_map();
        Ok(self.envelope(data, Some(confidence), &self.deps.gate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generation, GenerationError, GenerationRequest, OfflineGenerator, TextGenerator};
    use crate::workflow::ConfidenceGate;
    use serde_json::json;
    use std::io::Write;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, r: &GenerationRequest) -> Result<Generation, GenerationError> {
            let lang = if r.system.starts_with("Anda") { "ms" } else { "en" };
            Ok(Generation {
                content: format!("[{}] {}", lang, r.prompt.lines().next().unwrap_or_default()),
                model: "echo".into(),
                usage: None,
            })
        }
    }

    /// Answers in English, fails every Malay request.
    struct EnglishOnly;

    #[async_trait]
    impl TextGenerator for EnglishOnly {
        async fn generate(&self, r: &GenerationRequest) -> Result<Generation, GenerationError> {
            if r.system.starts_with("Anda") {
                return Err(GenerationError::Status { status: 400, body: "unsupported".into() });
            }
            Echo.generate(r).await
        }
    }

    fn deps(generator: Arc<dyn TextGenerator>) -> StageDeps {
        StageDeps::new(generator, ConfidenceGate::default())
    }

    fn authorities() -> serde_json::Value {
        json!([
            {"citation": "[2019] 3 MLJ 1", "caseName": "Maju v Tan", "court": "Federal Court", "year": 2019,
             "binding": true, "summary": "Breach of contract damages", "subjectAreas": ["contract"]},
            {"citation": "[1854] EWHC J70", "caseName": "Hadley v Baxendale", "court": "Court of Exchequer", "year": 1854,
             "binding": false, "summary": "Remoteness of damage in contract", "subjectAreas": ["contract"]},
            {"citation": "[2001] 2 CLJ 9", "caseName": "Lim v Wong", "court": "High Court", "year": 2001,
             "binding": true, "summary": "Negligent misstatement", "subjectAreas": ["tort"]}
        ])
    }

    #[tokio::test]
    async fn test_search_filters_supplied_authorities() {
        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        s.insert_value("authorities", authorities());
        s.insert_value("filters", json!({"yearFrom": 1900, "limit": 1}));
        let stage = SearchAuthoritiesStage::new(deps(Arc::new(OfflineGenerator)), Arc::new(NoAuthorities));
        let env = stage.process(&s).await.unwrap();
        let found = env.data["authorities"].as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["caseName"], "Maju v Tan");
        assert_eq!(env.confidence, Some(0.85));
    }

    #[tokio::test]
    async fn test_empty_search_has_zero_confidence() {
        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        let stage = SearchAuthoritiesStage::new(deps(Arc::new(OfflineGenerator)), Arc::new(NoAuthorities));
        let env = stage.process(&s).await.unwrap();
        assert_eq!(env.data["authorities"], json!([]));
        assert_eq!(env.confidence, Some(0.0));
        assert!(env.human_review_required);
    }

    #[tokio::test]
    async fn test_file_source_ranks_by_query_terms() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", authorities()).unwrap();
        let source = FileAuthoritySource::new(file.path());
        let found = source
            .search("negligent misstatement", &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].case_name, "Lim v Wong");
        assert_eq!(found[0].relevance, Some(1.0));

        let missing = FileAuthoritySource::new("/nonexistent/authorities.json");
        assert!(missing.search("x", &SearchFilters::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_memo_splits_binding_and_persuasive() {
        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        s.insert_value("authorities", authorities());
        s.insert_value(
            "issuesSelected",
            json!([{"id": "ISS-1", "title": "Breach", "legalBasis": ["contract"]}, {"id": "ISS-2", "title": "Costs"}]),
        );
        let env = BuildArgumentMemoStage::new(deps(Arc::new(Echo))).process(&s).await.unwrap();
        let memo: ArgumentMemo = serde_json::from_value(env.data["argumentMemo"].clone()).unwrap();
        assert_eq!(memo.total_issues, 2);
        assert_eq!(memo.arguments[0].binding_authorities, vec!["[2019] 3 MLJ 1"]);
        assert_eq!(memo.arguments[0].persuasive_authorities, vec!["[1854] EWHC J70"]);
        assert!(memo.arguments[0].analysis_ms.starts_with("[ms]"));
        assert_eq!(memo.arguments[1].binding_authorities.len(), 2);
        assert!(memo.memo_en.contains("1. Breach"));
        assert_eq!(env.confidence, Some(0.82));
    }

    #[tokio::test]
    async fn test_memo_without_issues_or_generator() {
        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        s.insert_value("issuesSelected", json!([{"id": "ISS-1", "title": "Breach"}]));
        let env = BuildArgumentMemoStage::new(deps(Arc::new(OfflineGenerator)))
            .process(&s)
            .await
            .unwrap();
        assert_eq!(env.data["argumentMemo"]["arguments"][0]["analysisEn"], "Analysis for Breach pending.");
        assert_eq!(env.confidence, Some(0.6));

        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        let env = BuildArgumentMemoStage::new(deps(Arc::new(OfflineGenerator)))
            .process(&s)
            .await
            .unwrap();
        assert_eq!(env.data["argumentMemo"]["totalIssues"], 0);
    }

    #[tokio::test]
    async fn test_memo_with_missing_malay_argument_needs_review() {
        let mut s = WorkflowState::new();
        s.insert_value("query", json!("breach of contract"));
        s.insert_value("issuesSelected", json!([{"id": "ISS-1", "title": "Breach"}]));
        let env = BuildArgumentMemoStage::new(deps(Arc::new(EnglishOnly)))
            .process(&s)
            .await
            .unwrap();
        let argument = &env.data["argumentMemo"]["arguments"][0];
        assert!(argument["analysisEn"].as_str().unwrap().starts_with("[en]"));
        assert_eq!(argument["analysisMs"], "[Analisis dalam Bahasa Melayu untuk Breach]");
        assert_eq!(argument["generated"], false);
        assert_eq!(env.confidence, Some(0.6));
        assert!(env.human_review_required);
    }
}
