//! # stagehand-rules
//!
//! Configuration-driven [`StageResolver`]: a table from target name to the
//! ordered [`StagePlan`] the request handler should run.
//!
//! Rule files are plain JSON objects:
//!
//! ```json
//! {
//!   "cpp": [{"name": "compile"}, {"name": "run", "timeout_ms": 5000}],
//!   "python3": [{"name": "run"}]
//! }
//! ```

#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use stagehand_core::stages::{ResolveError, StagePlan, StageResolver};
use tracing::debug;

/// Errors building a rule table.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Failed to read the rule file.
    #[error("failed to read rule file: {0}")]
    Io(#[from] std::io::Error),
    /// The rule file is not a JSON object of stage lists.
    #[error("failed to parse rule file: {0}")]
    Json(#[from] serde_json::Error),
    /// A rule was declared with an empty target name.
    #[error("rule with an empty target name")]
    EmptyTarget,
}

/// Target → stage plan lookup table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleTable {
    targets: BTreeMap<String, StagePlan>,
}

impl RuleTable {
    /// Build a table from target → plan pairs.
    pub fn new(targets: BTreeMap<String, StagePlan>) -> Result<Self, RuleError> {
        if targets.keys().any(String::is_empty) {
            return Err(RuleError::EmptyTarget);
        }
        Ok(Self { targets })
    }

    /// Parse a table from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let targets: BTreeMap<String, StagePlan> = serde_json::from_str(json)?;
        Self::new(targets)
    }

    /// Load a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        debug!(?path, "loading rule table");
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Add or replace the plan for a target.
    pub fn insert(&mut self, target: impl Into<String>, plan: StagePlan) -> Result<(), RuleError> {
        let target = target.into();
        if target.is_empty() {
            return Err(RuleError::EmptyTarget);
        }
        let _ = self.targets.insert(target, plan);
        Ok(())
    }

    /// Known target names, sorted.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the table has no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl StageResolver for RuleTable {
    fn resolve(&self, target: &str) -> Result<StagePlan, ResolveError> {
        let plan = self
            .targets
            .get(target)
            .ok_or_else(|| ResolveError::UnknownTarget {
                target: target.to_owned(),
            })?;
        if plan.is_empty() {
            return Err(ResolveError::EmptyPlan {
                target: target.to_owned(),
            });
        }
        Ok(plan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn sample() -> RuleTable {
        RuleTable::from_json(
            r#"{"cpp": [{"name": "compile"}, {"name": "run"}], "noop": []}"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_known_target() {
        let plan = sample().resolve("cpp").unwrap();
        assert_eq!(plan.names(), vec!["compile", "run"]);
    }

    #[test]
    fn unknown_target_rejected() {
        assert_matches!(
            sample().resolve("cobol"),
            Err(ResolveError::UnknownTarget { target }) if target == "cobol"
        );
    }

    #[test]
    fn empty_plan_rejected() {
        assert_matches!(
            sample().resolve("noop"),
            Err(ResolveError::EmptyPlan { target }) if target == "noop"
        );
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(sample().resolve("CPP").is_err());
    }

    #[test]
    fn stage_options_survive() {
        let table = RuleTable::from_json(r#"{"py": [{"name": "run", "timeout_ms": 100}]}"#)
            .unwrap();
        let plan = table.resolve("py").unwrap();
        assert_eq!(plan.stages()[0].options["timeout_ms"], 100);
    }

    #[test]
    fn empty_target_name_rejected() {
        assert_matches!(
            RuleTable::from_json(r#"{"": [{"name": "run"}]}"#),
            Err(RuleError::EmptyTarget)
        );
    }

    #[test]
    fn non_object_rejected() {
        assert_matches!(RuleTable::from_json("[]"), Err(RuleError::Json(_)));
    }

    #[test]
    fn insert_and_list_targets() {
        let mut table = RuleTable::default();
        assert!(table.is_empty());
        table
            .insert("rust", StagePlan::from_names(["build", "run"]))
            .unwrap();
        table.insert("c", StagePlan::from_names(["compile"])).unwrap();
        assert_eq!(table.targets().collect::<Vec<_>>(), vec!["c", "rust"]);
        assert_eq!(table.len(), 2);
        assert_matches!(
            table.insert("", StagePlan::default()),
            Err(RuleError::EmptyTarget)
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"go": [{{"name": "build"}}, {{"name": "run"}}]}}"#).unwrap();
        let table = RuleTable::load(file.path()).unwrap();
        assert_eq!(table.resolve("go").unwrap().len(), 2);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            RuleTable::load(&dir.path().join("absent.json")),
            Err(RuleError::Io(_))
        );
    }
}
