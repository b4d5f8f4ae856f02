//! The tracker role: the scenario or step side of a requirement link.

use std::{cmp::Ordering, fmt};

use crate::domain::{ScenarioId, StepId};

/// A scenario or a step tracking requirements.
///
/// Only these two kinds of definitions may cover or verify requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tracker {
    /// A scenario definition.
    Scenario(ScenarioId),
    /// A step definition.
    Step(StepId),
}

/// Trackers verify requirements the same way they cover them.
pub type Verifier = Tracker;

impl From<ScenarioId> for Tracker {
    fn from(id: ScenarioId) -> Self {
        Self::Scenario(id)
    }
}

impl From<StepId> for Tracker {
    fn from(id: StepId) -> Self {
        Self::Step(id)
    }
}

/// Deterministic sort key of a tracker.
///
/// Scenarios sort by name, and steps right after their owner scenario by
/// step number. The display form zero-pads the step number to the width of
/// the largest step number of the scenario, e.g. `login:step#03`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerKey {
    scenario: String,
    step: Option<StepNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepNumber {
    number: usize,
    width: usize,
}

impl TrackerKey {
    /// The key of a scenario.
    #[must_use]
    pub fn scenario(name: impl Into<String>) -> Self {
        Self {
            scenario: name.into(),
            step: None,
        }
    }

    /// The key of step `number` out of `max_number` numbered steps.
    #[must_use]
    pub fn step(scenario: impl Into<String>, number: usize, max_number: usize) -> Self {
        Self {
            scenario: scenario.into(),
            step: Some(StepNumber {
                number,
                width: max_number.max(1).to_string().len(),
            }),
        }
    }
}

impl Ord for TrackerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scenario.cmp(&other.scenario).then_with(|| {
            self.step
                .map(|step| step.number)
                .cmp(&other.step.map(|step| step.number))
        })
    }
}

impl PartialOrd for TrackerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.scenario)?;
        if let Some(StepNumber { number, width }) = self.step {
            write!(f, ":step#{number:0width$}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_are_zero_padded() {
        assert_eq!(TrackerKey::step("login", 3, 12).to_string(), "login:step#03");
        assert_eq!(TrackerKey::step("login", 3, 9).to_string(), "login:step#3");
        assert_eq!(TrackerKey::scenario("login").to_string(), "login");
    }

    #[test]
    fn steps_sort_after_their_scenario() {
        let mut keys = vec![
            TrackerKey::step("a", 10, 10),
            TrackerKey::scenario("a-b"),
            TrackerKey::step("a", 2, 10),
            TrackerKey::scenario("a"),
        ];
        keys.sort();
        let keys: Vec<_> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(keys, ["a", "a:step#02", "a:step#10", "a-b"]);
    }
}
