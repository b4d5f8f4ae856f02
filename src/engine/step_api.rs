//! What step bodies can do.

use std::fmt::Debug;

use tracing::info;

use crate::{
    domain::{
        ActionResultType, CodeLocation, KnownIssue, LinkId, LinkSpec, ScenarioId, StepId,
        StepKind, StepSpec, TestError, Tracker,
    },
    engine::{ContextError, Error, ExecutionMode, Session},
};

/// Why a step body stopped early.
#[derive(Debug)]
pub enum StepBreak {
    /// The body jumped to another step; the jump target is already set.
    Goto,
    /// A test error ended the step.
    Failed(TestError),
    /// An engine error that must abort the run.
    Fatal(Box<Error>),
}

impl From<TestError> for StepBreak {
    fn from(error: TestError) -> Self {
        Self::Failed(error)
    }
}

impl From<Error> for StepBreak {
    fn from(error: Error) -> Self {
        Self::Fatal(Box::new(error))
    }
}

impl From<ContextError> for StepBreak {
    fn from(error: ContextError) -> Self {
        Self::Fatal(Box::new(error.into()))
    }
}

/// Outcome of a step body.
pub type StepResult = Result<(), StepBreak>;

/// The interface a step body uses to talk to the runner.
///
/// Typical body:
///
/// ```
/// # use scenario::engine::{StepApi, StepResult};
/// fn step010(count: &mut u32, step: &mut StepApi<'_>) -> StepResult {
///     step.description("Increment the counter")?;
///     if step.action("Add one.")? {
///         *count += 1;
///     }
///     if step.result("The counter is positive.")? {
///         step.ensure(*count > 0, "counter should be positive")?;
///     }
///     Ok(())
/// }
/// ```
pub struct StepApi<'s> {
    session: &'s mut Session,
    step: StepId,
}

impl<'s> StepApi<'s> {
    pub(crate) const fn new(session: &'s mut Session, step: StepId) -> Self {
        Self { session, step }
    }

    /// The step being run.
    #[must_use]
    pub const fn step(&self) -> StepId {
        self.step
    }

    /// The scenario owning the step.
    ///
    /// # Panics
    ///
    /// Never: steps only run once added to a scenario.
    #[must_use]
    pub fn scenario(&self) -> ScenarioId {
        self.session.store[self.step]
            .owner()
            .unwrap_or_else(|| panic!("step {} has no owner scenario", self.step))
    }

    /// Read access to the session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        self.session
    }

    /// The session, for modification, e.g. to declare a known issue on
    /// whatever is running with [`Session::known_issue`].
    pub const fn session_mut(&mut self) -> &mut Session {
        self.session
    }

    /// Whether actions and results are actually executed.
    #[must_use]
    pub fn do_execute(&self) -> bool {
        self.session.do_execute()
    }

    /// Builds a [`ContextError`], dumping the scenario context.
    #[must_use]
    pub fn context_error(&self, message: &str) -> ContextError {
        self.session.context_error(message)
    }

    /// Sets the step description. Only effective while building.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the step is not the one being built.
    pub fn description(&mut self, description: &str) -> StepResult {
        self.session.on_step_description(self.step, description)?;
        Ok(())
    }

    /// Declares an action; returns whether to execute it.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the action does not match the
    /// declaration made while building.
    pub fn action(&mut self, description: &str) -> Result<bool, StepBreak> {
        self.session
            .on_action_result(ActionResultType::Action, description)?;
        Ok(self.do_execute())
    }

    /// Declares an expected result; returns whether to check it.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the result does not match the
    /// declaration made while building.
    pub fn result(&mut self, description: &str) -> Result<bool, StepBreak> {
        self.session
            .on_action_result(ActionResultType::Result, description)?;
        Ok(self.do_execute())
    }

    /// Attaches evidence to the action or result being executed.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] outside an action or result.
    pub fn evidence(&mut self, evidence: &str) -> StepResult {
        self.session.on_evidence(evidence)?;
        Ok(())
    }

    /// Jumps to another step of the scenario once this one is over.
    ///
    /// Always returns `Err`: propagate it with `?` or `return`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Goto`] on success, [`StepBreak::Fatal`] if the target
    /// cannot be resolved.
    pub fn goto(&mut self, target: impl Into<StepSpec>) -> StepResult {
        self.session.goto(self.scenario(), &target.into())?;
        Err(StepBreak::Goto)
    }

    /// Declares a known issue on this step.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the scenario context is inconsistent, or if
    /// the issue is an error while building.
    #[track_caller]
    pub fn known_issue(&mut self, issue: KnownIssue) -> StepResult {
        let location = CodeLocation::caller(self.session.store.step_qualname(self.step));
        let error = TestError::known_issue(issue, Some(location));
        self.session.on_error(error, Some(Tracker::Step(self.step)))?;
        Ok(())
    }

    /// Fails the step unless `condition` holds.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when `condition` is false.
    #[track_caller]
    pub fn ensure(&self, condition: bool, message: impl Into<String>) -> StepResult {
        if condition {
            Ok(())
        } else {
            Err(self.failure(message).into())
        }
    }

    /// Fails the step unless `left == right`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Failed`] when the values differ.
    #[track_caller]
    pub fn ensure_eq<T>(&self, left: T, right: T, message: &str) -> StepResult
    where
        T: PartialEq + Debug,
    {
        if left == right {
            Ok(())
        } else {
            Err(self
                .failure(format!("{message}: {left:?} != {right:?}"))
                .into())
        }
    }

    /// A failure located at the caller.
    #[must_use]
    #[track_caller]
    pub fn failure(&self, message: impl Into<String>) -> TestError {
        let location = CodeLocation::caller(self.session.store.step_qualname(self.step));
        TestError::failure(message, Some(location))
    }

    /// Declares requirement links covered by this step.
    ///
    /// # Errors
    ///
    /// See [`Session::covers`].
    pub fn covers<I>(&mut self, links: I) -> Result<LinkId, StepBreak>
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        Ok(self.session.covers(Tracker::Step(self.step), links)?)
    }

    /// Declares requirement links verified by this step.
    ///
    /// # Errors
    ///
    /// See [`Session::covers`].
    pub fn verifies<I>(&mut self, links: I) -> StepResult
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        Ok(self.session.verifies(Tracker::Step(self.step), links)?)
    }

    /// Executes a sub-scenario from the current action or result.
    ///
    /// # Errors
    ///
    /// The last error of the sub-scenario, as [`StepBreak::Failed`], or a
    /// fatal engine error.
    pub fn execute_subscenario(&mut self, scenario: ScenarioId) -> StepResult {
        match self.session.run_scenario(scenario)? {
            Some(error) => Err(StepBreak::Failed(error)),
            None => Ok(()),
        }
    }

    /// Skips the section this step opens, jumping to its end step.
    ///
    /// The message is capitalised and completed with the begin and end
    /// steps, e.g. `Not supported. Steps skipped from step#2 (section_begin)
    /// to step#4 (section_end).` When `issue` carries a level or an
    /// identifier, the skip is recorded as a known issue; it is only logged
    /// otherwise.
    ///
    /// Always returns `Err`: propagate it with `?` or `return`.
    ///
    /// # Errors
    ///
    /// [`StepBreak::Goto`] on success. A fatal error if this step does not
    /// open a section, or if the section was never closed.
    #[track_caller]
    pub fn skip_section(&mut self, message: &str, issue: Option<KnownIssue>) -> StepResult {
        let StepKind::SectionBegin { end } = self.session.store[self.step].kind() else {
            return Err(self.context_error("skip_section() outside a section begin step").into());
        };
        if self.session.store[end].owner() != Some(self.scenario()) {
            return Err(self
                .context_error(&format!(
                    "section opened by {} was never closed",
                    self.session.store.step_qualname(self.step)
                ))
                .into());
        }
        if self.session.mode() == ExecutionMode::BuildObjects {
            return self.goto(end);
        }
        let message = format!(
            "{}. Steps skipped from {} to {}.",
            capitalize(message.trim().trim_end_matches('.')),
            self.step_label(self.step),
            self.step_label(end),
        );
        match issue {
            Some(issue) if issue.level.is_some() || issue.id.is_some() => {
                self.known_issue(KnownIssue { message, ..issue })?;
            }
            _ => info!("{message}"),
        }
        self.goto(end)
    }

    /// `step#N (name)`, as steps appear in messages.
    pub(crate) fn step_label(&self, step: StepId) -> String {
        let store = &self.session.store;
        format!("step#{} ({})", store.step_number(step), store[step].name())
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
