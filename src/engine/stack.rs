use crate::domain::ScenarioId;

/// The scenarios under construction, innermost last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildingContext {
    scenarios: Vec<ScenarioId>,
}

impl BuildingContext {
    /// The scenario being built, if any.
    #[must_use]
    pub fn scenario(&self) -> Option<ScenarioId> {
        self.scenarios.last().copied()
    }

    /// Whether nothing is being built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// All scenarios under construction, outermost first.
    #[must_use]
    pub fn scenarios(&self) -> &[ScenarioId] {
        &self.scenarios
    }

    pub(crate) fn push(&mut self, scenario: ScenarioId) {
        self.scenarios.push(scenario);
    }

    /// Pops `scenario`, which must be on top.
    ///
    /// Returns `false`, leaving the context untouched, otherwise.
    pub(crate) fn pop(&mut self, scenario: ScenarioId) -> bool {
        if self.scenario() == Some(scenario) {
            self.scenarios.pop();
            true
        } else {
            false
        }
    }
}

/// The stack of scenario executions.
///
/// The bottom entry is the main scenario; sub-scenarios are pushed on top
/// of it. Every main scenario is appended to the history when pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioStack {
    building: BuildingContext,
    executions: Vec<ScenarioId>,
    history: Vec<ScenarioId>,
}

impl ScenarioStack {
    /// The building context.
    #[must_use]
    pub const fn building(&self) -> &BuildingContext {
        &self.building
    }

    pub(crate) const fn building_mut(&mut self) -> &mut BuildingContext {
        &mut self.building
    }

    /// Number of scenarios executing.
    #[must_use]
    pub fn size(&self) -> usize {
        self.executions.len()
    }

    /// Scenarios executing, main scenario first.
    #[must_use]
    pub fn executions(&self) -> &[ScenarioId] {
        &self.executions
    }

    /// Main scenarios executed so far, in order.
    #[must_use]
    pub fn history(&self) -> &[ScenarioId] {
        &self.history
    }

    /// The main scenario, if one is executing.
    #[must_use]
    pub fn main(&self) -> Option<ScenarioId> {
        self.executions.first().copied()
    }

    /// The innermost scenario executing.
    #[must_use]
    pub fn current(&self) -> Option<ScenarioId> {
        self.executions.last().copied()
    }

    /// Whether `scenario` is the main scenario.
    #[must_use]
    pub fn is_main(&self, scenario: ScenarioId) -> bool {
        self.main() == Some(scenario)
    }

    /// Whether `scenario` is the innermost scenario executing.
    #[must_use]
    pub fn is_current(&self, scenario: ScenarioId) -> bool {
        self.current() == Some(scenario)
    }

    pub(crate) fn push_execution(&mut self, scenario: ScenarioId) {
        if self.executions.is_empty() {
            self.history.push(scenario);
        }
        self.executions.push(scenario);
    }

    /// Pops `scenario`, which must be on top.
    ///
    /// Returns `false`, leaving the stack untouched, otherwise.
    pub(crate) fn pop_execution(&mut self, scenario: ScenarioId) -> bool {
        if self.is_current(scenario) {
            self.executions.pop();
            true
        } else {
            false
        }
    }
}
