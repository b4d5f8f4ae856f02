use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ScenarioId, TestError, TimeStats};

/// Whether a step declaration is an action or an expected result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionResultType {
    /// Something the step does.
    Action,
    /// Something the step checks.
    Result,
}

impl fmt::Display for ActionResultType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Action => "ACTION",
            Self::Result => "RESULT",
        })
    }
}

/// An action or expected result declared by a step.
///
/// Owned by its step definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResultDefinition {
    kind: ActionResultType,
    description: String,
    executions: Vec<ActionResultExecution>,
}

impl ActionResultDefinition {
    /// Creates a declaration with no execution.
    #[must_use]
    pub fn new(kind: ActionResultType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            executions: Vec::new(),
        }
    }

    /// Action or expected result.
    #[must_use]
    pub const fn kind(&self) -> ActionResultType {
        self.kind
    }

    /// The declared text.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Execution records, one per step execution that reached it.
    #[must_use]
    pub fn executions(&self) -> &[ActionResultExecution] {
        &self.executions
    }

    pub(crate) fn executions_mut(&mut self) -> &mut Vec<ActionResultExecution> {
        &mut self.executions
    }

    /// Whether this declaration matches a call made while executing.
    #[must_use]
    pub fn matches(&self, kind: ActionResultType, description: &str) -> bool {
        self.kind == kind && self.description == description
    }
}

impl fmt::Display for ActionResultDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {:?}", self.kind, self.description)
    }
}

/// Execution record of an action or expected result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionResultExecution {
    /// Start and end times.
    pub time: TimeStats,
    /// Evidence collected while executing.
    pub evidence: Vec<String>,
    /// Errors raised while executing.
    pub errors: Vec<TestError>,
    /// Warnings raised while executing.
    pub warnings: Vec<TestError>,
    /// Sub-scenarios executed from here.
    pub subscenarios: Vec<ScenarioId>,
}

impl ActionResultExecution {
    /// An execution record started now.
    #[must_use]
    pub fn started() -> Self {
        Self {
            time: TimeStats::started(),
            ..Self::default()
        }
    }
}
