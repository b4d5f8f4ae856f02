use std::fmt;

use thiserror::Error;

use crate::domain::{
    ActionResultDefinition, CodeLocation, DefinitionError, ScenarioId, TestError, TimeStats,
};

/// Identity of a step definition in a [`ScenarioStore`](crate::domain::ScenarioStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(pub(crate) usize);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "step#{}", self.0)
    }
}

/// What a step is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A regular step.
    Regular,
    /// An unnumbered step describing the steps that follow.
    SectionDescription,
    /// The numbered step opening a skippable section.
    SectionBegin {
        /// The paired end step.
        end: StepId,
    },
    /// The numbered step closing a skippable section.
    SectionEnd {
        /// The paired begin step.
        begin: StepId,
    },
}

impl StepKind {
    /// Whether steps of this kind count in step numbers.
    #[must_use]
    pub const fn is_numbered(self) -> bool {
        !matches!(self, Self::SectionDescription)
    }
}

/// Static description of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    name: String,
    kind: StepKind,
    owner: Option<ScenarioId>,
    location: CodeLocation,
    description: Option<String>,
    actions_results: Vec<ActionResultDefinition>,
    executions: Vec<StepExecution>,
    known_issues: Vec<TestError>,
    init_known_issues: usize,
}

impl StepDefinition {
    /// Creates a step with no owner yet.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StepKind, location: CodeLocation) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: None,
            location,
            description: None,
            actions_results: Vec::new(),
            executions: Vec::new(),
            known_issues: Vec::new(),
            init_known_issues: 0,
        }
    }

    /// The short name of the step, e.g. `step010`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What the step is for.
    #[must_use]
    pub const fn kind(&self) -> StepKind {
        self.kind
    }

    pub(crate) const fn set_kind(&mut self, kind: StepKind) {
        self.kind = kind;
    }

    /// The owner scenario, once the step has been added to one.
    #[must_use]
    pub const fn owner(&self) -> Option<ScenarioId> {
        self.owner
    }

    /// Sets the owner scenario.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::OwnerAlreadySet`] if the step already
    /// belongs to a scenario.
    pub fn set_owner(&mut self, owner: ScenarioId) -> Result<(), DefinitionError> {
        if self.owner.is_some() {
            return Err(DefinitionError::OwnerAlreadySet(self.name.clone()));
        }
        self.owner = Some(owner);
        Ok(())
    }

    /// Where the step was defined.
    #[must_use]
    pub const fn location(&self) -> &CodeLocation {
        &self.location
    }

    /// The step description, once known.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Sets the step description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Declared actions and expected results, in declaration order.
    #[must_use]
    pub fn actions_results(&self) -> &[ActionResultDefinition] {
        &self.actions_results
    }

    pub(crate) fn actions_results_mut(&mut self) -> &mut Vec<ActionResultDefinition> {
        &mut self.actions_results
    }

    /// Execution records, more than one when the step was re-entered.
    #[must_use]
    pub fn executions(&self) -> &[StepExecution] {
        &self.executions
    }

    pub(crate) fn executions_mut(&mut self) -> &mut Vec<StepExecution> {
        &mut self.executions
    }

    /// Known issues declared while defining or building the step.
    #[must_use]
    pub fn known_issues(&self) -> &[TestError] {
        &self.known_issues
    }

    /// Known issues declared before the step was first built.
    #[must_use]
    pub fn init_known_issues(&self) -> &[TestError] {
        &self.known_issues[..self.init_known_issues]
    }

    pub(crate) fn push_known_issue(&mut self, issue: TestError) {
        if !self.known_issues.contains(&issue) {
            self.known_issues.push(issue);
        }
    }

    pub(crate) const fn save_init_known_issues(&mut self) {
        self.init_known_issues = self.known_issues.len();
    }
}

/// Execution record of a step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepExecution {
    /// Execution number in the scenario, 1-based.
    pub number: usize,
    /// Start and end times.
    pub time: TimeStats,
    /// Errors raised while executing.
    pub errors: Vec<TestError>,
    /// Warnings raised while executing.
    pub warnings: Vec<TestError>,
    next_action_result: usize,
    current_action_result: Option<usize>,
}

impl StepExecution {
    /// An execution record started now.
    #[must_use]
    pub fn started(number: usize) -> Self {
        Self {
            number,
            time: TimeStats::started(),
            ..Self::default()
        }
    }

    /// Index of the action or expected result being executed.
    #[must_use]
    pub const fn current_action_result(&self) -> Option<usize> {
        self.current_action_result
    }

    /// Moves the cursor to the next action or expected result.
    ///
    /// Returns the index of the declaration the call should match.
    pub(crate) const fn next_action_result(&mut self) -> usize {
        let index = self.next_action_result;
        self.next_action_result += 1;
        self.current_action_result = Some(index);
        index
    }

    pub(crate) const fn clear_current_action_result(&mut self) {
        self.current_action_result = None;
    }
}

/// Designates a step of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSpec {
    /// A step definition.
    Id(StepId),
    /// A step number.
    Number(usize),
    /// A suffix of the step's qualified name, plus which match to take when
    /// several steps share it.
    Name {
        /// Qualified name suffix.
        name: String,
        /// Index among the matches; the last match when unset.
        index: Option<usize>,
    },
}

impl From<StepId> for StepSpec {
    fn from(id: StepId) -> Self {
        Self::Id(id)
    }
}

impl From<usize> for StepSpec {
    fn from(number: usize) -> Self {
        Self::Number(number)
    }
}

impl From<&str> for StepSpec {
    fn from(name: &str) -> Self {
        Self::Name {
            name: name.to_string(),
            index: None,
        }
    }
}

impl From<(&str, usize)> for StepSpec {
    fn from((name, index): (&str, usize)) -> Self {
        Self::Name {
            name: name.to_string(),
            index: Some(index),
        }
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Number(number) => write!(f, "step #{number}"),
            Self::Name { name, index: None } => write!(f, "{name:?}"),
            Self::Name {
                name,
                index: Some(index),
            } => write!(f, "{name:?}[{index}]"),
        }
    }
}

/// Errors raised while resolving a [`StepSpec`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepLookupError {
    /// No step matches.
    #[error("no step matches {0}")]
    NotFound(String),
    /// Several steps match and no index was given.
    #[error("{count} steps match {spec}, an index is required")]
    Ambiguous {
        /// The specification.
        spec: String,
        /// Number of matching steps.
        count: usize,
    },
}
