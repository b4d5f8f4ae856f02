//! Arena of scenario and step definitions.

use std::ops::{Index, IndexMut};

use crate::domain::{
    ActionResultType, DefinitionError, ExecTotalStats, ScenarioDefinition, ScenarioId,
    QUALNAME_SEPARATOR, ScenarioStats, StepDefinition, StepId, StepLookupError, StepSpec, Tracker,
    TrackerKey,
};

/// Owns every scenario and step definition of a session.
///
/// Identifiers are only minted by the store, so indexing with them never
/// fails for the store that produced them.
#[derive(Debug, Default)]
pub struct ScenarioStore {
    scenarios: Vec<ScenarioDefinition>,
    steps: Vec<StepDefinition>,
}

impl ScenarioStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scenario definition.
    pub fn insert_scenario(&mut self, scenario: ScenarioDefinition) -> ScenarioId {
        self.scenarios.push(scenario);
        ScenarioId(self.scenarios.len() - 1)
    }

    /// Adds a step definition, not yet owned by any scenario.
    pub fn insert_step(&mut self, step: StepDefinition) -> StepId {
        self.steps.push(step);
        StepId(self.steps.len() - 1)
    }

    /// Appends a step to a scenario.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::OwnerAlreadySet`] if the step already
    /// belongs to a scenario.
    pub fn add_step(&mut self, scenario: ScenarioId, step: StepId) -> Result<(), DefinitionError> {
        self[step].set_owner(scenario)?;
        self[scenario].push_step(step);
        Ok(())
    }

    /// Looks a scenario up.
    #[must_use]
    pub fn scenario(&self, id: ScenarioId) -> Option<&ScenarioDefinition> {
        self.scenarios.get(id.0)
    }

    /// Looks a step up.
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.get(id.0)
    }

    /// All scenarios, in definition order.
    pub fn scenarios(&self) -> impl Iterator<Item = (ScenarioId, &ScenarioDefinition)> {
        self.scenarios
            .iter()
            .enumerate()
            .map(|(index, scenario)| (ScenarioId(index), scenario))
    }

    /// Looks a scenario up by name.
    #[must_use]
    pub fn find_scenario(&self, name: &str) -> Option<ScenarioId> {
        self.scenarios().find(|(_, s)| s.name() == name).map(|(id, _)| id)
    }

    /// The step number: 1-based, counting only numbered steps up to and
    /// including this one.
    ///
    /// Unnumbered steps report the number of the last numbered step before
    /// them. Steps with no owner report 0.
    #[must_use]
    pub fn step_number(&self, step: StepId) -> usize {
        let Some(owner) = self[step].owner() else {
            return 0;
        };
        let mut number = 0;
        for id in self[owner].steps() {
            if self[*id].kind().is_numbered() {
                number += 1;
            }
            if *id == step {
                break;
            }
        }
        number
    }

    /// The number of numbered steps of a scenario.
    #[must_use]
    pub fn numbered_step_count(&self, scenario: ScenarioId) -> usize {
        self[scenario]
            .steps()
            .iter()
            .filter(|id| self[**id].kind().is_numbered())
            .count()
    }

    /// The qualified name of a step, e.g. `login::step010`.
    #[must_use]
    pub fn step_qualname(&self, step: StepId) -> String {
        let step = &self[step];
        step.owner().map_or_else(
            || step.name().to_string(),
            |owner| format!("{}{QUALNAME_SEPARATOR}{}", self[owner].name(), step.name()),
        )
    }

    /// The scenario a tracker belongs to: itself, or the owner of the step.
    #[must_use]
    pub fn tracker_scenario(&self, tracker: Tracker) -> Option<ScenarioId> {
        match tracker {
            Tracker::Scenario(id) => Some(id),
            Tracker::Step(id) => self[id].owner(),
        }
    }

    /// The deterministic sort key of a tracker.
    #[must_use]
    pub fn tracker_key(&self, tracker: Tracker) -> TrackerKey {
        match tracker {
            Tracker::Scenario(id) => TrackerKey::scenario(self[id].name()),
            Tracker::Step(id) => match self[id].owner() {
                Some(owner) => TrackerKey::step(
                    self[owner].name(),
                    self.step_number(id),
                    self.numbered_step_count(owner),
                ),
                None => TrackerKey::scenario(self[id].name()),
            },
        }
    }

    /// Human-readable name of a tracker.
    #[must_use]
    pub fn tracker_name(&self, tracker: Tracker) -> String {
        match tracker {
            Tracker::Scenario(id) => self[id].name().to_string(),
            Tracker::Step(id) => self.step_qualname(id),
        }
    }

    /// Resolves a step specification in a scenario.
    ///
    /// Name specifications match a suffix of the steps' qualified names.
    /// Without an index, the last match is taken, unless `strict` is set,
    /// in which case several matches are ambiguous.
    ///
    /// # Errors
    ///
    /// Returns [`StepLookupError`] if nothing matches, or if the match is
    /// ambiguous.
    pub fn find_step(
        &self,
        scenario: ScenarioId,
        spec: &StepSpec,
        strict: bool,
    ) -> Result<StepId, StepLookupError> {
        let steps = self[scenario].steps();
        let (matches, index): (Vec<StepId>, Option<usize>) = match spec {
            StepSpec::Id(id) => (steps.iter().copied().filter(|s| s == id).collect(), None),
            StepSpec::Number(number) => (
                steps
                    .iter()
                    .copied()
                    .filter(|s| self[*s].kind().is_numbered() && self.step_number(*s) == *number)
                    .collect(),
                None,
            ),
            StepSpec::Name { name, index } => (
                steps
                    .iter()
                    .copied()
                    .filter(|s| self.step_qualname(*s).ends_with(name.as_str()))
                    .collect(),
                *index,
            ),
        };
        if strict && index.is_none() && matches.len() > 1 {
            return Err(StepLookupError::Ambiguous {
                spec: spec.to_string(),
                count: matches.len(),
            });
        }
        let found = match index {
            Some(index) => matches.get(index),
            None => matches.last(),
        };
        found
            .copied()
            .ok_or_else(|| StepLookupError::NotFound(spec.to_string()))
    }

    /// Step, action and result counters of a scenario.
    ///
    /// Section descriptions are not counted.
    #[must_use]
    pub fn scenario_stats(&self, scenario: ScenarioId) -> ScenarioStats {
        let mut stats = ScenarioStats::default();
        for id in self[scenario].steps() {
            let step = &self[*id];
            if !step.kind().is_numbered() {
                continue;
            }
            stats.steps.add(!step.executions().is_empty());
            for action_result in step.actions_results() {
                let counter: &mut ExecTotalStats = match action_result.kind() {
                    ActionResultType::Action => &mut stats.actions,
                    ActionResultType::Result => &mut stats.results,
                };
                counter.add(!action_result.executions().is_empty());
            }
        }
        stats
    }
}

impl Index<ScenarioId> for ScenarioStore {
    type Output = ScenarioDefinition;

    fn index(&self, id: ScenarioId) -> &Self::Output {
        &self.scenarios[id.0]
    }
}

impl IndexMut<ScenarioId> for ScenarioStore {
    fn index_mut(&mut self, id: ScenarioId) -> &mut Self::Output {
        &mut self.scenarios[id.0]
    }
}

impl Index<StepId> for ScenarioStore {
    type Output = StepDefinition;

    fn index(&self, id: StepId) -> &Self::Output {
        &self.steps[id.0]
    }
}

impl IndexMut<StepId> for ScenarioStore {
    fn index_mut(&mut self, id: StepId) -> &mut Self::Output {
        &mut self.steps[id.0]
    }
}
