use std::{collections::BTreeMap, fmt};

use thiserror::Error;
use tracing::warn;

use crate::domain::{CodeLocation, ExecutionStatus, StepId, TestError, TimeStats};

/// Attribute holding the scenario title.
pub const TITLE: &str = "TITLE";
/// Attribute holding the scenario description.
pub const DESCRIPTION: &str = "DESCRIPTION";

/// Identity of a scenario definition in a [`ScenarioStore`](crate::domain::ScenarioStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenarioId(pub(crate) usize);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "scenario#{}", self.0)
    }
}

/// Errors raised while assembling definitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// The step already belongs to a scenario.
    #[error("step {0} already belongs to a scenario")]
    OwnerAlreadySet(String),
    /// Step-table entries must be named with the step prefix.
    #[error("invalid step name '{0}': step-table entries must start with 'step'")]
    InvalidStepName(String),
    /// The scenario was already executed.
    #[error("scenario '{0}' has already been executed")]
    AlreadyExecuted(String),
}

/// Order of the step-table entries of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepOrder {
    /// By name.
    #[default]
    ByName,
    /// Steps declared by the deepest base assembly first, then by name.
    HierarchyThenName,
    /// Steps declared by the most derived assembly first, then by name.
    ReverseHierarchyThenName,
}

/// Static description of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDefinition {
    name: String,
    location: CodeLocation,
    attributes: BTreeMap<String, String>,
    continue_on_error: Option<bool>,
    expect_step_req_refinement: Option<bool>,
    steps: Vec<StepId>,
    known_issues: Vec<TestError>,
    execution: Option<ScenarioExecution>,
}

impl ScenarioDefinition {
    /// Creates a scenario with no step.
    #[must_use]
    pub fn new(name: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            name: name.into(),
            location,
            attributes: BTreeMap::new(),
            continue_on_error: None,
            expect_step_req_refinement: None,
            steps: Vec::new(),
            known_issues: Vec::new(),
            execution: None,
        }
    }

    /// The scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the scenario was defined.
    #[must_use]
    pub const fn location(&self) -> &CodeLocation {
        &self.location
    }

    /// The scenario title, empty when not set.
    #[must_use]
    pub fn title(&self) -> &str {
        self.attribute(TITLE).unwrap_or_default()
    }

    /// The scenario description, empty when not set.
    #[must_use]
    pub fn description(&self) -> &str {
        self.attribute(DESCRIPTION).unwrap_or_default()
    }

    /// Looks an attribute up.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes, ordered by name.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Sets an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Local continue-on-error override.
    #[must_use]
    pub const fn continue_on_error(&self) -> Option<bool> {
        self.continue_on_error
    }

    /// Overrides the continue-on-error setting for this scenario.
    pub const fn set_continue_on_error(&mut self, value: Option<bool>) {
        self.continue_on_error = value;
    }

    /// Local step requirement refinement override.
    #[must_use]
    pub const fn expect_step_req_refinement(&self) -> Option<bool> {
        self.expect_step_req_refinement
    }

    /// Overrides the step requirement refinement expectation for this
    /// scenario.
    pub const fn set_expect_step_req_refinement(&mut self, value: Option<bool>) {
        self.expect_step_req_refinement = value;
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    pub(crate) fn push_step(&mut self, step: StepId) {
        self.steps.push(step);
    }

    /// Known issues declared while defining the scenario.
    #[must_use]
    pub fn known_issues(&self) -> &[TestError] {
        &self.known_issues
    }

    pub(crate) fn push_known_issue(&mut self, issue: TestError) {
        if !self.known_issues.contains(&issue) {
            self.known_issues.push(issue);
        }
    }

    /// The execution record, once the scenario has been built.
    #[must_use]
    pub const fn execution(&self) -> Option<&ScenarioExecution> {
        self.execution.as_ref()
    }

    pub(crate) const fn execution_mut(&mut self) -> Option<&mut ScenarioExecution> {
        self.execution.as_mut()
    }

    pub(crate) fn set_execution(&mut self, execution: ScenarioExecution) {
        self.execution = Some(execution);
    }

    /// Starts the step cursor at the first step.
    pub(crate) fn start_step_list(&mut self) {
        if let Some(execution) = &mut self.execution {
            execution.start_step_list(&self.steps);
        }
    }

    /// Moves the step cursor forward, see [`ScenarioExecution::next_step`].
    pub(crate) fn next_step(&mut self) -> bool {
        self.execution
            .as_mut()
            .is_some_and(|execution| execution.next_step(&self.steps))
    }
}

/// Execution record of a scenario, including its step cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScenarioExecution {
    /// Start and end times.
    pub time: TimeStats,
    /// Errors raised while executing, including those of its steps.
    pub errors: Vec<TestError>,
    /// Warnings raised while executing, including those of its steps.
    pub warnings: Vec<TestError>,
    current_step: Option<StepId>,
    next_step: Option<StepId>,
}

impl ScenarioExecution {
    /// The step under the cursor.
    #[must_use]
    pub const fn current_step(&self) -> Option<StepId> {
        self.current_step
    }

    /// Sets the cursor on the first step, or on nothing if there is none.
    pub fn start_step_list(&mut self, steps: &[StepId]) {
        self.current_step = steps.first().copied();
        self.next_step = None;
    }

    /// Moves the cursor.
    ///
    /// A pending jump target is honoured, exactly once. Otherwise the cursor
    /// moves to the step following the current one in `steps`. Returns
    /// `false` when the list is exhausted.
    pub fn next_step(&mut self, steps: &[StepId]) -> bool {
        if let Some(target) = self.next_step.take() {
            self.current_step = Some(target);
            return true;
        }
        let Some(current) = self.current_step else {
            warn!("No current step definition, cannot move to the next step");
            return false;
        };
        self.current_step = steps
            .iter()
            .position(|step| *step == current)
            .and_then(|index| steps.get(index + 1))
            .copied();
        self.current_step.is_some()
    }

    /// Sets the jump target consumed by the next call to
    /// [`next_step`](Self::next_step).
    pub const fn set_next_step(&mut self, step: StepId) {
        self.next_step = Some(step);
    }

    /// The status of the execution.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        if !self.errors.is_empty() {
            ExecutionStatus::Fail
        } else if !self.warnings.is_empty() {
            ExecutionStatus::Warnings
        } else if self.time.end().is_some() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(count: usize) -> Vec<StepId> {
        (0..count).map(StepId).collect()
    }

    #[test]
    fn cursor_walks_linearly() {
        let steps = steps(3);
        let mut execution = ScenarioExecution::default();
        execution.start_step_list(&steps);

        let mut visited = vec![execution.current_step().unwrap()];
        while execution.next_step(&steps) {
            visited.push(execution.current_step().unwrap());
        }

        assert_eq!(visited, steps);
        assert_eq!(execution.current_step(), None);
    }

    #[test]
    fn empty_step_list() {
        let mut execution = ScenarioExecution::default();
        execution.start_step_list(&[]);
        assert_eq!(execution.current_step(), None);
        assert!(!execution.next_step(&[]));
    }

    #[test]
    fn jump_target_is_consumed_once() {
        let steps = steps(5);
        let mut execution = ScenarioExecution::default();
        execution.start_step_list(&steps);
        execution.next_step(&steps);

        execution.set_next_step(steps[3]);
        assert!(execution.next_step(&steps));
        assert_eq!(execution.current_step(), Some(steps[3]));

        assert!(execution.next_step(&steps));
        assert_eq!(execution.current_step(), Some(steps[4]));
    }

    #[test]
    fn backward_jump_resumes_after_the_target() {
        let steps = steps(4);
        let mut execution = ScenarioExecution::default();
        execution.start_step_list(&steps);
        execution.next_step(&steps);
        execution.next_step(&steps);

        execution.set_next_step(steps[0]);
        execution.next_step(&steps);
        assert_eq!(execution.current_step(), Some(steps[0]));
        execution.next_step(&steps);
        assert_eq!(execution.current_step(), Some(steps[1]));
    }

    #[test]
    fn status_follows_errors_warnings_and_end_time() {
        let mut execution = ScenarioExecution::default();
        assert_eq!(execution.status(), ExecutionStatus::Unknown);

        execution.time.set_start_time();
        execution.time.set_end_time();
        assert_eq!(execution.status(), ExecutionStatus::Success);

        execution.warnings.push(TestError::failure("warned", None));
        assert_eq!(execution.status(), ExecutionStatus::Warnings);

        execution.errors.push(TestError::failure("failed", None));
        assert_eq!(execution.status(), ExecutionStatus::Fail);
    }
}
