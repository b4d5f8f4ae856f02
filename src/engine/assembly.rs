//! Two-phase scenario assembly.
//!
//! [`Session::define`] pushes the new scenario on the building context, runs
//! the caller's assembly closure, then pops the scenario on every exit path
//! before adding the step-table entries in their configured order.

use std::{any::Any, cmp::Reverse, fmt, marker::PhantomData, rc::Rc};

use tracing::{debug, instrument};

use crate::{
    domain::{
        CodeLocation, DefinitionError, KnownIssue, LinkId, LinkSpec, QUALNAME_SEPARATOR,
        ScenarioDefinition, ScenarioId, StepDefinition, StepId, StepKind, StepOrder, TestError,
        Tracker, scenario::{DESCRIPTION, TITLE},
    },
    engine::{Error, Session, StepApi, StepResult},
};

/// Prefix of step-table entry names.
pub const STEP_PREFIX: &str = "step";

/// The user state of a scenario, shared by its step bodies.
pub(crate) struct ScenarioState(Box<dyn Any>);

impl ScenarioState {
    pub(crate) fn new<S: 'static>(state: S) -> Self {
        Self(Box::new(state))
    }

    pub(crate) fn downcast_mut<S: 'static>(&mut self) -> Option<&mut S> {
        self.0.downcast_mut()
    }
}

impl fmt::Debug for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ScenarioState(..)")
    }
}

type BodyFn = dyn Fn(&mut ScenarioState, &mut StepApi<'_>) -> StepResult;

/// The code of a step.
#[derive(Clone)]
pub(crate) struct StepBody(Rc<BodyFn>);

impl StepBody {
    fn typed<S, F>(body: F) -> Self
    where
        S: 'static,
        F: Fn(&mut S, &mut StepApi<'_>) -> StepResult + 'static,
    {
        Self::erased(move |state, api| match state.downcast_mut::<S>() {
            Some(state) => body(state, api),
            None => Err(api.context_error("scenario state type mismatch").into()),
        })
    }

    fn erased<F>(body: F) -> Self
    where
        F: Fn(&mut ScenarioState, &mut StepApi<'_>) -> StepResult + 'static,
    {
        Self(Rc::new(body))
    }

    pub(crate) fn call(&self, state: &mut ScenarioState, api: &mut StepApi<'_>) -> StepResult {
        (self.0)(state, api)
    }
}

impl fmt::Debug for StepBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("StepBody(..)")
    }
}

/// A skippable section: a numbered begin step paired with a numbered end
/// step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// The step opening the section.
    pub begin: StepId,
    /// The step closing the section.
    pub end: StepId,
}

struct TableEntry {
    step: StepId,
    name: String,
    depth: usize,
}

/// Assembles the definition of a scenario with user state `S`.
///
/// Steps are added in two ways: explicitly, in call order (`add_step`,
/// `section`, `begin_section`, `end_section`), and through the step table
/// (`step`), whose entries are appended after the explicit steps once the
/// assembly is over, sorted by [`StepOrder`].
pub struct ScenarioAssembly<'s, S> {
    session: &'s mut Session,
    scenario: ScenarioId,
    table: Vec<TableEntry>,
    order: StepOrder,
    depth: usize,
    state: PhantomData<fn(&mut S)>,
}

impl Session {
    /// Defines a scenario.
    ///
    /// The scenario is on the building context while `assemble` runs, so
    /// capability calls made from the assembly resolve to it. It is popped
    /// whatever `assemble` returns.
    ///
    /// # Errors
    ///
    /// Returns the error of `assemble`, or a [`ContextError`] if the
    /// building context was left unbalanced.
    ///
    /// [`ContextError`]: crate::engine::ContextError
    #[track_caller]
    pub fn define<S, F>(&mut self, name: &str, state: S, assemble: F) -> Result<ScenarioId, Error>
    where
        S: 'static,
        F: FnOnce(&mut ScenarioAssembly<'_, S>) -> Result<(), Error>,
    {
        let location = CodeLocation::caller(name);
        let scenario = self
            .store
            .insert_scenario(ScenarioDefinition::new(name, location));
        self.states.insert(scenario, ScenarioState::new(state));

        self.stack.building_mut().push(scenario);
        debug!("Building scenario {name}");
        let mut assembly = ScenarioAssembly {
            session: self,
            scenario,
            table: Vec::new(),
            order: StepOrder::default(),
            depth: 1,
            state: PhantomData,
        };
        let outcome = assemble(&mut assembly);
        let ScenarioAssembly {
            mut table, order, ..
        } = assembly;
        if !self.stack.building_mut().pop(scenario) {
            return Err(self
                .context_error(format!("scenario {name} is not on top of the building context"))
                .into());
        }
        outcome?;

        match order {
            StepOrder::ByName => table.sort_by(|a, b| a.name.cmp(&b.name)),
            StepOrder::HierarchyThenName => {
                table.sort_by(|a, b| (Reverse(a.depth), &a.name).cmp(&(Reverse(b.depth), &b.name)));
            }
            StepOrder::ReverseHierarchyThenName => {
                table.sort_by(|a, b| (a.depth, &a.name).cmp(&(b.depth, &b.name)));
            }
        }
        for entry in table {
            self.store.add_step(scenario, entry.step)?;
        }
        Ok(scenario)
    }
}

impl<S: 'static> ScenarioAssembly<'_, S> {
    /// The scenario being assembled.
    #[must_use]
    pub const fn id(&self) -> ScenarioId {
        self.scenario
    }

    /// The session, e.g. to create shared links or nested scenarios.
    pub const fn session(&mut self) -> &mut Session {
        self.session
    }

    fn definition(&mut self) -> &mut ScenarioDefinition {
        &mut self.session.store[self.scenario]
    }

    /// Sets the scenario title.
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.definition().set_attribute(TITLE, title);
        self
    }

    /// Sets the scenario description.
    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.definition().set_attribute(DESCRIPTION, description);
        self
    }

    /// Sets a user-defined attribute.
    pub fn attribute(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.definition().set_attribute(name, value);
        self
    }

    /// Overrides the configured continue-on-error setting.
    pub fn continue_on_error(&mut self, value: bool) -> &mut Self {
        self.definition().set_continue_on_error(Some(value));
        self
    }

    /// Overrides the configured step requirement refinement expectation.
    pub fn expect_step_req_refinement(&mut self, value: bool) -> &mut Self {
        self.definition().set_expect_step_req_refinement(Some(value));
        self
    }

    /// Sets the order of the step-table entries.
    pub const fn step_order(&mut self, order: StepOrder) -> &mut Self {
        self.order = order;
        self
    }

    /// Declares requirement links covered by the scenario.
    ///
    /// # Errors
    ///
    /// See [`Session::covers`].
    pub fn covers<I>(&mut self, links: I) -> Result<LinkId, Error>
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        let tracker = Tracker::Scenario(self.scenario);
        self.session.covers(tracker, links)
    }

    /// Declares requirement links verified by the scenario.
    ///
    /// # Errors
    ///
    /// See [`Session::covers`].
    pub fn verifies<I>(&mut self, links: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        let tracker = Tracker::Scenario(self.scenario);
        self.session.verifies(tracker, links)
    }

    /// Declares a known issue of the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if the building context is inconsistent.
    #[track_caller]
    pub fn known_issue(&mut self, issue: KnownIssue) -> Result<(), Error> {
        let location = CodeLocation::caller(self.session.store[self.scenario].name());
        let error = TestError::known_issue(issue, Some(location));
        self.session
            .on_error(error, Some(Tracker::Scenario(self.scenario)))
    }

    /// Runs the assembly of a base scenario.
    ///
    /// Step-table entries declared inside `assemble` are one level deeper in
    /// the hierarchy, which drives [`StepOrder::HierarchyThenName`] and its
    /// reverse.
    ///
    /// # Errors
    ///
    /// Returns the error of `assemble`.
    pub fn base<F>(&mut self, assemble: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        self.depth += 1;
        let outcome = assemble(self);
        self.depth -= 1;
        outcome
    }

    #[track_caller]
    fn new_step(&mut self, name: &str, kind: StepKind) -> StepId {
        let qualname = format!(
            "{}{QUALNAME_SEPARATOR}{name}",
            self.session.store[self.scenario].name()
        );
        let location = CodeLocation::caller(qualname);
        self.session
            .store
            .insert_step(StepDefinition::new(name, kind, location))
    }

    /// Declares a step-table entry.
    ///
    /// Entries are added once the assembly is over, sorted by the step
    /// order. Declaring a name again overrides the body: the body of the
    /// most derived assembly wins, and the entry keeps the deepest level.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidStepName`] if the name does not
    /// start with `step`.
    #[track_caller]
    pub fn step<F>(&mut self, name: &str, body: F) -> Result<StepId, Error>
    where
        F: Fn(&mut S, &mut StepApi<'_>) -> StepResult + 'static,
    {
        if !name.starts_with(STEP_PREFIX) {
            return Err(DefinitionError::InvalidStepName(name.to_string()).into());
        }
        let depth = self.depth;
        if let Some(entry) = self.table.iter_mut().find(|entry| entry.name == name) {
            let step = entry.step;
            if depth <= entry.depth {
                // Called from the same or a more derived assembly.
                self.session.bodies.insert(step, StepBody::typed(body));
            }
            entry.depth = entry.depth.max(depth);
            return Ok(step);
        }
        let step = self.new_step(name, StepKind::Regular);
        self.session.bodies.insert(step, StepBody::typed(body));
        self.table.push(TableEntry {
            step,
            name: name.to_string(),
            depth,
        });
        Ok(step)
    }

    /// Appends a step now.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot be added.
    #[track_caller]
    pub fn add_step<F>(&mut self, name: &str, body: F) -> Result<StepId, Error>
    where
        F: Fn(&mut S, &mut StepApi<'_>) -> StepResult + 'static,
    {
        let step = self.new_step(name, StepKind::Regular);
        self.session.bodies.insert(step, StepBody::typed(body));
        self.session.store.add_step(self.scenario, step)?;
        Ok(step)
    }

    /// Appends an unnumbered step describing the steps that follow.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot be added.
    #[track_caller]
    pub fn section(&mut self, description: &str) -> Result<StepId, Error> {
        let step = self.new_step("section", StepKind::SectionDescription);
        self.session.store[step].set_description(description);
        self.session.store.add_step(self.scenario, step)?;
        Ok(step)
    }

    /// Appends the begin step of a skippable section.
    ///
    /// `body` runs when the begin step executes and typically decides
    /// whether to skip the section, see [`StepApi::skip_section`]. Close the
    /// section with [`end_section`](Self::end_section).
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot be added.
    #[track_caller]
    pub fn begin_section<F>(&mut self, description: &str, body: F) -> Result<Section, Error>
    where
        F: Fn(&mut S, &mut StepApi<'_>) -> StepResult + 'static,
    {
        let begin = self.new_step("section_begin", StepKind::Regular);
        let end = self.new_step("section_end", StepKind::SectionEnd { begin });
        self.session.store[begin].set_kind(StepKind::SectionBegin { end });
        self.session.store[begin].set_description(format!("Beginning of section: {description}"));
        self.session.store[end].set_description(format!("End of section: {description}"));
        self.session.bodies.insert(begin, StepBody::typed(body));
        self.session.store.add_step(self.scenario, begin)?;
        Ok(Section { begin, end })
    }

    /// Appends the end step of a section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section was already closed.
    #[instrument(level = "debug", skip(self))]
    pub fn end_section(&mut self, section: Section) -> Result<(), Error> {
        self.session.store.add_step(self.scenario, section.end)?;
        Ok(())
    }
}
