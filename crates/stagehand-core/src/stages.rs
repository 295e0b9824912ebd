//! Stage plans and the target → plan lookup seam.
//!
//! A [`StagePlan`] is opaque to the connection coordinator: it is resolved
//! once per request cycle and handed to the request handler unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One processing step of a plan.
///
/// Only `name` is interpreted here; every other field is carried through
/// to the request handler untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name (e.g. `compile`, `run`).
    pub name: String,
    /// Handler-specific stage options.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Stage {
    /// Create a stage with no extra options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }
}

/// Ordered sequence of stages resolved for a target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagePlan(Vec<Stage>);

impl StagePlan {
    /// Build a plan from an ordered list of stages.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self(stages)
    }

    /// Build a plan of option-less stages from their names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Stage::named).collect())
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.0
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the plan has no stages.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the stages.
    pub fn iter(&self) -> std::slice::Iter<'_, Stage> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a StagePlan {
    type Item = &'a Stage;
    type IntoIter = std::slice::Iter<'a, Stage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Why a target could not be mapped to a plan.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No rule exists for the target.
    #[error("unsupported target '{target}'")]
    UnknownTarget {
        /// The requested target.
        target: String,
    },
    /// A rule exists but lists no stages.
    #[error("target '{target}' has an empty stage plan")]
    EmptyPlan {
        /// The requested target.
        target: String,
    },
}

/// Maps a target identifier to its ordered stage plan.
///
/// Implementations must be side-effect free; any error is reported to the
/// backend as an unsupported target.
pub trait StageResolver: Send + Sync {
    /// Resolve the plan for `target`.
    fn resolve(&self, target: &str) -> Result<StagePlan, ResolveError>;
}

impl<F> StageResolver for F
where
    F: Fn(&str) -> Result<StagePlan, ResolveError> + Send + Sync,
{
    fn resolve(&self, target: &str) -> Result<StagePlan, ResolveError> {
        self(target)
    }
}
