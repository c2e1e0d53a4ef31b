//! Pipeline definition and its builder.
//!
//! A pipeline is a static DAG of stages with one entry, unconditional edges,
//! conditional edges routed by a typed [`Branch`] value, and one or more
//! finish stages:
//!
//! ```text
//! plan-issues ──► select-template ──┬─(primary)──► draft-primary ──► generate-companion ──┐
//!                                   │                                                     ├──► quality-check
//!                                   └─(secondary)► draft-secondary ──────────────────────┘
//! ```
//!
//! Every structural problem is reported by [`PipelineBuilder::build`], so a
//! built [`PipelineDefinition`] can be shared by any number of runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::PipelineError;
use crate::workflow::stage::SharedStage;
use crate::workflow::state::WorkflowState;

/// A closed set of branch labels a conditional edge can produce.
pub trait Branch: Copy + Eq + Send + Sync + 'static {
    /// Every value the predicate may return.
    fn variants() -> &'static [Self];

    fn label(&self) -> &'static str;
}

type Router = Arc<dyn Fn(&WorkflowState) -> &'static str + Send + Sync>;

struct ConditionalEdge {
    router: Router,
    branches: BTreeMap<&'static str, String>,
}

/// Immutable pipeline graph.
pub struct PipelineDefinition {
    name: String,
    entry: String,
    order: Vec<String>,
    stages: HashMap<String, SharedStage>,
    edges: HashMap<String, String>,
    conditional_edges: HashMap<String, ConditionalEdge>,
    finish: HashSet<String>,
    required_inputs: Vec<&'static str>,
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("stages", &self.order)
            .finish()
    }
}

impl PipelineDefinition {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn stage(&self, id: &str) -> Option<&SharedStage> {
        self.stages.get(id)
    }

    pub fn stage_ids(&self) -> &[String] {
        &self.order
    }

    pub fn is_finish(&self, id: &str) -> bool {
        self.finish.contains(id)
    }

    /// Keys the caller must supply: the declared pipeline inputs followed by
    /// any entry-stage requirement not already listed.
    pub fn required_inputs(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.required_inputs.clone();
        if let Some(entry) = self.stages.get(&self.entry) {
            for k in entry.required_keys() {
                if !keys.contains(k) {
                    keys.push(k);
                }
            }
        }
        keys
    }

    /// Successor of `current` given the state accumulated so far.
    /// `None` means `current` is a finish stage.
    pub fn next_stage(&self, current: &str, state: &WorkflowState) -> Result<Option<&str>, PipelineError> {
        if let Some(cond) = self.conditional_edges.get(current) {
            let label = (cond.router)(state);
            return cond
                .branches
                .get(label)
                .map(|s| Some(s.as_str()))
                .ok_or_else(|| PipelineError::Contract {
                    stage: current.to_string(),
                    message: format!("branch '{}' has no mapped stage", label),
                });
        }
        Ok(self.edges.get(current).map(String::as_str))
    }

    fn successors(&self, id: &str) -> Vec<&str> {
        if let Some(cond) = self.conditional_edges.get(id) {
            cond.branches.values().map(String::as_str).collect()
        } else {
            self.edges.get(id).map(|s| vec![s.as_str()]).unwrap_or_default()
        }
    }

    /// Serializable description of the graph.
    pub fn describe(&self) -> PipelineDescription {
        let mut edges: Vec<EdgeDescription> = self
            .order
            .iter()
            .filter_map(|from| {
                self.edges.get(from).map(|to| EdgeDescription {
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect();
        edges.sort_by(|a, b| a.from.cmp(&b.from));

        let branches = self
            .order
            .iter()
            .filter_map(|from| {
                self.conditional_edges.get(from).map(|c| BranchDescription {
                    from: from.clone(),
                    routes: c
                        .branches
                        .iter()
                        .map(|(label, to)| (label.to_string(), to.clone()))
                        .collect(),
                })
            })
            .collect();

        let mut finish: Vec<String> = self.finish.iter().cloned().collect();
        finish.sort();

        PipelineDescription {
            name: self.name.clone(),
            entry: self.entry.clone(),
            required_inputs: self.required_inputs().iter().map(|s| s.to_string()).collect(),
            stages: self.order.clone(),
            edges,
            branches,
            finish,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDescription {
    pub name: String,
    pub entry: String,
    pub required_inputs: Vec<String>,
    pub stages: Vec<String>,
    pub edges: Vec<EdgeDescription>,
    pub branches: Vec<BranchDescription>,
    pub finish: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeDescription {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchDescription {
    pub from: String,
    pub routes: BTreeMap<String, String>,
}

struct PendingConditional {
    from: String,
    router: Router,
    expected: Vec<&'static str>,
    branches: Vec<(&'static str, String)>,
}

/// Assembles a [`PipelineDefinition`]; all checks happen in [`build`](Self::build).
pub struct PipelineBuilder {
    name: String,
    stages: Vec<SharedStage>,
    entry: Option<String>,
    edges: Vec<(String, String)>,
    conditionals: Vec<PendingConditional>,
    finish: Vec<String>,
    required_inputs: Vec<&'static str>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            entry: None,
            edges: Vec::new(),
            conditionals: Vec::new(),
            finish: Vec::new(),
            required_inputs: Vec::new(),
        }
    }

    pub fn add_stage(mut self, stage: SharedStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn set_entry(mut self, id: &str) -> Self {
        self.entry = Some(id.to_string());
        self
    }

    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push((from.to_string(), to.to_string()));
        self
    }

    /// Route out of `from` by evaluating `predicate` once against the state.
    /// Every variant of `B` must be mapped.
    pub fn add_conditional_edge<B, F, I>(mut self, from: &str, predicate: F, branches: I) -> Self
    where
        B: Branch,
        F: Fn(&WorkflowState) -> B + Send + Sync + 'static,
        I: IntoIterator<Item = (B, &'static str)>,
    {
        self.conditionals.push(PendingConditional {
            from: from.to_string(),
            router: Arc::new(move |state| predicate(state).label()),
            expected: B::variants().iter().map(|b| b.label()).collect(),
            branches: branches
                .into_iter()
                .map(|(b, to)| (b.label(), to.to_string()))
                .collect(),
        });
        self
    }

    pub fn set_finish(mut self, ids: &[&str]) -> Self {
        self.finish.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    /// Keys the caller must provide in the initial state.
    pub fn require_inputs(mut self, keys: &[&'static str]) -> Self {
        self.required_inputs.extend_from_slice(keys);
        self
    }

    pub fn build(self) -> Result<PipelineDefinition, PipelineError> {
        let name = self.name;
        let fail = |msg: String| Err(PipelineError::Build(format!("{}: {}", name, msg)));

        let mut order = Vec::with_capacity(self.stages.len());
        let mut stages: HashMap<String, SharedStage> = HashMap::new();
        for stage in self.stages {
            let id = stage.id().to_string();
            if stages.contains_key(&id) {
                return fail(format!("duplicate stage '{}'", id));
            }
            order.push(id.clone());
            stages.insert(id, stage);
        }

        let entry = match self.entry {
            Some(e) if stages.contains_key(&e) => e,
            Some(e) => return fail(format!("entry stage '{}' is not defined", e)),
            None => return fail("no entry stage set".to_string()),
        };

        if self.finish.is_empty() {
            return fail("no finish stage set".to_string());
        }
        let mut finish = HashSet::new();
        for f in self.finish {
            if !stages.contains_key(&f) {
                return fail(format!("finish stage '{}' is not defined", f));
            }
            finish.insert(f);
        }

        let mut edges = HashMap::new();
        for (from, to) in self.edges {
            for id in [&from, &to] {
                if !stages.contains_key(id) {
                    return fail(format!("edge {} -> {} references unknown stage '{}'", from, to, id));
                }
            }
            if edges.insert(from.clone(), to).is_some() {
                return fail(format!("stage '{}' has more than one unconditional edge", from));
            }
        }

        let mut conditional_edges = HashMap::new();
        for pending in self.conditionals {
            let from = pending.from;
            if !stages.contains_key(&from) {
                return fail(format!("conditional edge from unknown stage '{}'", from));
            }
            if edges.contains_key(&from) || conditional_edges.contains_key(&from) {
                return fail(format!("stage '{}' has more than one outgoing route", from));
            }
            let mut branches = BTreeMap::new();
            for (label, to) in pending.branches {
                if !stages.contains_key(&to) {
                    return fail(format!("branch '{}' from '{}' targets unknown stage '{}'", label, from, to));
                }
                branches.insert(label, to);
            }
            for label in &pending.expected {
                if !branches.contains_key(label) {
                    return fail(format!("branch label '{}' from '{}' is not mapped", label, from));
                }
            }
            conditional_edges.insert(
                from,
                ConditionalEdge {
                    router: pending.router,
                    branches,
                },
            );
        }

        let def = PipelineDefinition {
            name: name.clone(),
            entry,
            order,
            stages,
            edges,
            conditional_edges,
            finish,
            required_inputs: self.required_inputs,
        };

        for id in &def.order {
            let has_out = !def.successors(id).is_empty();
            match (def.finish.contains(id), has_out) {
                (true, true) => return fail(format!("finish stage '{}' has an outgoing edge", id)),
                (false, false) => return fail(format!("stage '{}' has no outgoing edge and is not a finish stage", id)),
                _ => {}
            }
        }

        def.check_acyclic_and_reachable()
            .map_err(|m| PipelineError::Build(format!("{}: {}", def.name, m)))?;
        Ok(def)
    }
}

impl PipelineDefinition {
    fn check_acyclic_and_reachable(&self) -> Result<(), String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            def: &'a PipelineDefinition,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), String> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(format!("cycle through stage '{}'", id)),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            for next in def.successors(id) {
                visit(def, next, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        visit(self, &self.entry, &mut marks)?;

        if let Some(orphan) = self.order.iter().find(|id| !marks.contains_key(id.as_str())) {
            return Err(format!("stage '{}' is unreachable from the entry", orphan));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::workflow::confidence::ConfidenceGate;
    use crate::workflow::envelope::StageEnvelope;
    use crate::workflow::stage::Stage;
    use async_trait::async_trait;
    use serde_json::Map;

    struct Noop(&'static str);

    #[async_trait]
    impl Stage for Noop {
        fn id(&self) -> &str {
            self.0
        }

        fn required_keys(&self) -> &[&'static str] {
            &["seed"]
        }

        async fn process(&self, _inputs: &WorkflowState) -> Result<StageEnvelope, StageError> {
            Ok(self.envelope(Map::new(), None, &ConfidenceGate::default()))
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Side {
        Left,
        Right,
    }

    impl Branch for Side {
        fn variants() -> &'static [Self] {
            &[Side::Left, Side::Right]
        }

        fn label(&self) -> &'static str {
            match self {
                Side::Left => "left",
                Side::Right => "right",
            }
        }
    }

    fn stage(id: &'static str) -> SharedStage {
        Arc::new(Noop(id))
    }

    fn diamond() -> PipelineBuilder {
        PipelineDefinition::builder("diamond")
            .add_stage(stage("a"))
            .add_stage(stage("l"))
            .add_stage(stage("r"))
            .add_stage(stage("z"))
            .set_entry("a")
            .add_edge("l", "z")
            .add_edge("r", "z")
            .set_finish(&["z"])
    }

    #[test]
    fn test_builds_branching_pipeline() {
        let def = diamond()
            .add_conditional_edge(
                "a",
                |s: &WorkflowState| if s.contains("go_right") { Side::Right } else { Side::Left },
                [(Side::Left, "l"), (Side::Right, "r")],
            )
            .build()
            .unwrap();

        let mut state = WorkflowState::new();
        assert_eq!(def.next_stage("a", &state).unwrap(), Some("l"));
        state.insert_value("go_right", serde_json::json!(true));
        assert_eq!(def.next_stage("a", &state).unwrap(), Some("r"));
        assert_eq!(def.next_stage("z", &state).unwrap(), None);
        assert_eq!(def.required_inputs(), vec!["seed"]);

        let desc = def.describe();
        assert_eq!(desc.branches.len(), 1);
        assert_eq!(desc.branches[0].routes["right"], "r");
        assert_eq!(desc.finish, vec!["z"]);
    }

    #[test]
    fn test_rejects_unmapped_branch_label() {
        let err = diamond()
            .add_conditional_edge("a", |_: &WorkflowState| Side::Left, [(Side::Left, "l")])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'right'"), "{err}");
    }

    #[test]
    fn test_rejects_cycles() {
        let err = PipelineDefinition::builder("loop")
            .add_stage(stage("a"))
            .add_stage(stage("b"))
            .add_stage(stage("c"))
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("b", "a")
            .add_edge("c", "c")
            .set_finish(&["c"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("outgoing edge") || err.to_string().contains("cycle"), "{err}");

        let err = PipelineDefinition::builder("loop")
            .add_stage(stage("a"))
            .add_stage(stage("b"))
            .add_stage(stage("z"))
            .set_entry("a")
            .add_edge("a", "b")
            .add_conditional_edge(
                "b",
                |_: &WorkflowState| Side::Left,
                [(Side::Left, "a"), (Side::Right, "z")],
            )
            .set_finish(&["z"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("loop: cycle through stage"), "{err}");
    }

    #[test]
    fn test_rejects_structural_mistakes() {
        let no_entry = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .set_finish(&["a"])
            .build();
        assert!(no_entry.is_err());

        let unknown_target = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .set_entry("a")
            .add_edge("a", "ghost")
            .set_finish(&["a"])
            .build();
        assert!(unknown_target.is_err());

        let dangling = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .add_stage(stage("b"))
            .set_entry("a")
            .set_finish(&["b"])
            .build();
        assert!(dangling.unwrap_err().to_string().contains("no outgoing edge"));

        let duplicate = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .add_stage(stage("a"))
            .set_entry("a")
            .set_finish(&["a"])
            .build();
        assert!(duplicate.unwrap_err().to_string().contains("duplicate"));

        let orphan = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .add_stage(stage("b"))
            .set_entry("a")
            .set_finish(&["a", "b"])
            .build();
        assert!(orphan
            .unwrap_err()
            .to_string()
            .contains("p: stage 'b' is unreachable from the entry"));
    }

    #[test]
    fn test_required_inputs_merge_declared_and_entry_keys() {
        let def = PipelineDefinition::builder("p")
            .add_stage(stage("a"))
            .set_entry("a")
            .set_finish(&["a"])
            .require_inputs(&["caseId", "seed"])
            .build()
            .unwrap();
        assert_eq!(def.required_inputs(), vec!["caseId", "seed"]);
    }
}
