//! Hierarchy resolution over parent pointers
//!
//! The resolver walks `parent_id` links through the [`RunStore`] to answer
//! "where in the graph did this happen". Only *semantic* runs (user-defined
//! graph nodes) contribute to execution paths; infrastructure runs that the host
//! engine inserts for routing are filtered out by a [`NodeClassifier`].
//!
//! Resolution never fails. A parent that was never recorded ends the walk, and an
//! empty path degrades every derived accessor to [`UNKNOWN_NODE`] or `None`.

use super::run::{Run, RunKind};
use super::run_store::RunStore;
use crate::error::Result;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Sentinel returned when no semantic ancestor can be found
pub const UNKNOWN_NODE: &str = "unknown";

/// Host tag that forces a run to be treated as plumbing
pub const PLUMBING_TAG: &str = "runtrace:plumbing";

/// Host tag that forces a run to be treated as a semantic node
pub const SEMANTIC_TAG: &str = "runtrace:semantic";

/// Upper bound on ancestor walks; deeper chains are assumed corrupt
pub const MAX_DEPTH: usize = 256;

/// Name patterns of infrastructure runs inserted by graph engines
pub const DEFAULT_PLUMBING_PATTERNS: &[&str] = &[
    r"^<.*>$",
    r"^__.*",
    r"^Channel(Write|Read|Invoke)",
    r"^Runnable(Sequence|Lambda|Parallel|Callable|Passthrough|Assign|Branch)\b",
    r"^[Bb]ranch(<.*>|:.*)?$",
    r"^tools$",
    r"^LangGraph$",
];

/// Decides whether a run is a user-meaningful processing step
pub trait NodeClassifier: Send + Sync {
    /// Pure predicate over a run name
    fn is_semantic_node(&self, name: &str) -> bool;

    /// Classify a complete run record
    ///
    /// Explicit host tags win. Otherwise only graph-node runs can be semantic,
    /// and the name predicate decides.
    fn is_semantic_run(&self, run: &Run) -> bool {
        if run.has_tag(PLUMBING_TAG) {
            return false;
        }
        if run.has_tag(SEMANTIC_TAG) {
            return true;
        }
        run.kind == RunKind::Chain && self.is_semantic_node(&run.name)
    }
}

/// Recognises plumbing by structural markers in the run name
pub struct PatternClassifier {
    plumbing: RegexSet,
}

impl PatternClassifier {
    /// Build a classifier from the default patterns plus any extras
    pub fn new<S: AsRef<str>>(extra_patterns: &[S]) -> Result<Self> {
        let patterns = DEFAULT_PLUMBING_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .chain(extra_patterns.iter().map(|p| p.as_ref().to_string()));
        Ok(Self {
            plumbing: RegexSet::new(patterns)?,
        })
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self {
            plumbing: RegexSet::new(DEFAULT_PLUMBING_PATTERNS).unwrap_or_else(|e| {
                tracing::warn!("Default plumbing patterns failed to compile: {}", e);
                RegexSet::empty()
            }),
        }
    }
}

impl NodeClassifier for PatternClassifier {
    fn is_semantic_node(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && !self.plumbing.is_match(name)
    }
}

/// Treats exactly the listed names as semantic nodes
pub struct AllowListClassifier {
    names: HashSet<String>,
}

impl AllowListClassifier {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl NodeClassifier for AllowListClassifier {
    fn is_semantic_node(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Derived position of a run in the semantic hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attribution {
    /// Nearest semantic ancestor (inclusive of the run itself)
    pub node: String,
    /// Root-most semantic node
    pub master_node: Option<String>,
    /// First-level nested semantic node
    pub subgraph_node: Option<String>,
}

impl Attribution {
    /// Attribution used when no run record is available
    pub fn unknown() -> Self {
        Self {
            node: UNKNOWN_NODE.to_string(),
            master_node: None,
            subgraph_node: None,
        }
    }
}

/// Resolves ancestor chains and semantic paths against a run store
pub struct HierarchyResolver<'a> {
    store: &'a RunStore,
    classifier: &'a dyn NodeClassifier,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(store: &'a RunStore, classifier: &'a dyn NodeClassifier) -> Self {
        Self { store, classifier }
    }

    /// Ancestors of `run`, root first, excluding the run itself
    pub fn ancestor_chain(&self, run: &Run) -> Vec<Arc<Run>> {
        let mut chain = VecDeque::new();
        let mut seen = HashSet::from([run.id]);
        let mut next = run.parent_id;

        while let Some(parent_id) = next {
            if !seen.insert(parent_id) || chain.len() >= MAX_DEPTH {
                tracing::warn!(run = %run.id, "Ancestor walk stopped at a cycle or depth limit");
                break;
            }
            let Some(parent) = self.store.get(&parent_id) else {
                tracing::debug!(run = %run.id, parent = %parent_id, "Parent run not recorded");
                break;
            };
            next = parent.parent_id;
            chain.push_front(parent);
        }

        chain.into()
    }

    pub fn is_semantic_node(&self, name: &str) -> bool {
        self.classifier.is_semantic_node(name)
    }

    /// Semantic ancestor names root first, plus the run's own name if semantic
    pub fn execution_path(&self, run: &Run) -> Vec<String> {
        let mut path: Vec<String> = self
            .ancestor_chain(run)
            .iter()
            .filter(|r| self.classifier.is_semantic_run(r))
            .map(|r| r.name.clone())
            .collect();
        if self.classifier.is_semantic_run(run) {
            path.push(run.name.clone());
        }
        path
    }

    /// Length of the execution path minus one; zero for an empty path
    pub fn nesting_level(&self, run: &Run) -> usize {
        self.execution_path(run).len().saturating_sub(1)
    }

    /// First semantic name walking upward from the run itself
    pub fn nearest_semantic_ancestor_name(&self, run: &Run) -> String {
        if self.classifier.is_semantic_run(run) {
            return run.name.clone();
        }
        self.ancestor_chain(run)
            .iter()
            .rev()
            .find(|r| self.classifier.is_semantic_run(r))
            .map(|r| r.name.clone())
            .unwrap_or_else(|| UNKNOWN_NODE.to_string())
    }

    pub fn master_node(&self, run: &Run) -> Option<String> {
        self.execution_path(run).into_iter().next()
    }

    pub fn immediate_subgraph_node(&self, run: &Run) -> Option<String> {
        self.execution_path(run).into_iter().nth(1)
    }

    /// Attribution bundle for a run
    pub fn attribution(&self, run: &Run) -> Attribution {
        self.resolve(run).2
    }

    /// Path, level and attribution computed from a single ancestor walk
    pub fn resolve(&self, run: &Run) -> (Vec<String>, usize, Attribution) {
        let path = self.execution_path(run);
        let level = path.len().saturating_sub(1);
        let node = path.last().cloned().unwrap_or_else(|| UNKNOWN_NODE.to_string());
        let attribution = Attribution {
            node,
            master_node: path.first().cloned(),
            subgraph_node: path.get(1).cloned(),
        };
        (path, level, attribution)
    }
}
