//! Scenario execution: build pass, step loop, error recording.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread,
};

use tracing::{debug, error, info, instrument, warn};

use crate::{
    domain::{
        ActionResultDefinition, ActionResultExecution, ActionResultType, DefinitionError,
        ExecutionStatus, ScenarioExecution, ScenarioId, Severity, StepExecution, StepId, StepKind,
        StepSpec, TestError, Tracker,
    },
    engine::{ContextError, Error, Session, StepApi, StepBreak, StepResult},
};

/// What the runner does with step bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Bodies run to declare descriptions, actions and results.
    BuildObjects,
    /// Bodies run to walk the steps; actions and results are not executed.
    DocOnly,
    /// Bodies run for real.
    Execute,
}

impl Session {
    /// The current execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        if !self.stack.building().is_empty() {
            ExecutionMode::BuildObjects
        } else if self.doc_only {
            ExecutionMode::DocOnly
        } else {
            ExecutionMode::Execute
        }
    }

    /// Whether actions and results are executed.
    #[must_use]
    pub fn do_execute(&self) -> bool {
        self.mode() == ExecutionMode::Execute
    }

    /// Executes a main scenario and returns its final status.
    ///
    /// # Errors
    ///
    /// Returns an error if a scenario is already executing, if the scenario
    /// was already executed, or on any contract violation raised while
    /// running. Test errors are not returned: they are recorded in the
    /// execution records and reflected by the status.
    #[instrument(level = "debug", skip(self))]
    pub fn execute(&mut self, scenario: ScenarioId) -> Result<ExecutionStatus, Error> {
        if let Some(current) = self.stack.current() {
            return Err(self
                .context_error(format!(
                    "cannot execute {} while {} is executing",
                    self.store[scenario].name(),
                    self.store[current].name()
                ))
                .into());
        }
        self.run_scenario(scenario)?;
        Ok(self.store[scenario]
            .execution()
            .map_or(ExecutionStatus::Unknown, ScenarioExecution::status))
    }

    /// Builds then runs a scenario, main or nested.
    ///
    /// Returns the last error of a nested scenario, to be propagated to the
    /// calling step.
    pub(crate) fn run_scenario(&mut self, scenario: ScenarioId) -> Result<Option<TestError>, Error> {
        if self.mode() == ExecutionMode::BuildObjects {
            return Err(self
                .context_error("scenarios cannot be executed while building")
                .into());
        }
        if self.store[scenario].execution().is_some() {
            return Err(DefinitionError::AlreadyExecuted(self.store[scenario].name().to_string()).into());
        }

        self.build(scenario)?;
        self.begin_scenario(scenario)?;
        while !self.should_stop(scenario) {
            let Some(step) = self.cursor(scenario) else {
                break;
            };
            self.exec_step(step)?;
            if !self.store[scenario].next_step() {
                break;
            }
            let delay = self.config.delay_between_steps();
            if self.do_execute() && !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        self.end_scenario(scenario)
    }

    fn cursor(&self, scenario: ScenarioId) -> Option<StepId> {
        self.store[scenario].execution()?.current_step()
    }

    /// Runs every step body in build mode.
    fn build(&mut self, scenario: ScenarioId) -> Result<(), Error> {
        debug!("Building steps of {}", self.store[scenario].name());
        self.stack.building_mut().push(scenario);
        let outcome = self.build_steps(scenario);
        if !self.stack.building_mut().pop(scenario) {
            return Err(self
                .context_error("building context left unbalanced by the build pass")
                .into());
        }
        outcome
    }

    fn build_steps(&mut self, scenario: ScenarioId) -> Result<(), Error> {
        let definition = &mut self.store[scenario];
        definition.set_execution(ScenarioExecution::default());
        definition.start_step_list();
        while let Some(step) = self.cursor(scenario) {
            self.store[step].save_init_known_issues();
            self.exec_step(step)?;
            if !self.store[scenario].next_step() {
                break;
            }
        }
        Ok(())
    }

    fn begin_scenario(&mut self, scenario: ScenarioId) -> Result<(), Error> {
        if let Some(execution) = self.current_action_result_execution_mut() {
            execution.subscenarios.push(scenario);
        }
        self.stack.push_execution(scenario);

        let name = self.store[scenario].name().to_string();
        if self.stack.is_main(scenario) {
            info!("SCENARIO '{name}'");
            if let Err(error) = self.check_main_scenario(scenario) {
                self.stack.pop_execution(scenario);
                return Err(error);
            }
        } else {
            info!("Sub-scenario '{name}'");
        }

        let definition = &mut self.store[scenario];
        definition.start_step_list();
        if let Some(execution) = definition.execution_mut() {
            execution.time.set_start_time();
        }
        self.notify_known_issues(Tracker::Scenario(scenario))
    }

    fn check_main_scenario(&self, scenario: ScenarioId) -> Result<(), Error> {
        let definition = &self.store[scenario];
        for attribute in self.config.expected_scenario_attributes() {
            if definition.attribute(attribute).is_none() {
                return Err(Error::MissingAttribute {
                    scenario: definition.name().to_string(),
                    attribute: attribute.clone(),
                });
            }
        }

        let scenario_refs = self.req_refs(Tracker::Scenario(scenario), false);
        for (req_ref, _) in &scenario_refs {
            info!("VERIFIES: {req_ref}");
        }

        let refinement = definition
            .expect_step_req_refinement()
            .unwrap_or(self.config.expect_step_req_refinement);
        if refinement {
            let step_refs: Vec<_> = definition
                .steps()
                .iter()
                .flat_map(|step| self.req_refs(Tracker::Step(*step), false))
                .map(|(req_ref, _)| req_ref)
                .collect();
            for (req_ref, _) in &scenario_refs {
                if !step_refs.iter().any(|step_ref| req_ref.covers(step_ref, true)) {
                    warn!("{req_ref} not refined at the step level in {}", definition.name());
                }
            }
        }
        Ok(())
    }

    fn end_scenario(&mut self, scenario: ScenarioId) -> Result<Option<TestError>, Error> {
        if !self.stack.is_current(scenario) {
            return Err(self
                .context_error(format!("{} is not the current scenario", self.store[scenario].name()))
                .into());
        }

        let unreached: Vec<StepId> = self.store[scenario]
            .steps()
            .iter()
            .copied()
            .filter(|step| self.store[*step].executions().is_empty())
            .collect();
        for step in unreached {
            self.notify_known_issues(Tracker::Step(step))?;
        }
        self.notify_known_issues(Tracker::Scenario(scenario))?;

        let definition = &mut self.store[scenario];
        let Some(execution) = definition.execution_mut() else {
            return Err(self.context_error("scenario executing without an execution record").into());
        };
        execution.time.set_end_time();
        let status = execution.status();
        let last_error = execution.errors.last().cloned();
        info!("END OF '{}': {status}", definition.name());

        self.stack.pop_execution(scenario);
        Ok(if self.stack.current().is_some() {
            last_error
        } else {
            None
        })
    }

    /// Records the known issues of a definition as test errors.
    fn notify_known_issues(&mut self, tracker: Tracker) -> Result<(), Error> {
        let issues = match tracker {
            Tracker::Scenario(scenario) => self.store[scenario].known_issues().to_vec(),
            Tracker::Step(step) => self.store[step].known_issues().to_vec(),
        };
        for issue in issues {
            self.on_error(issue, Some(tracker))?;
        }
        Ok(())
    }

    fn exec_step(&mut self, step: StepId) -> Result<(), Error> {
        let mode = self.mode();
        let definition = &self.store[step];
        let Some(scenario) = definition.owner() else {
            return Err(self.context_error(format!("step {} has no owner", definition.name())).into());
        };

        if definition.kind() == StepKind::SectionDescription {
            if mode != ExecutionMode::BuildObjects {
                info!("SECTION: {}", definition.description().unwrap_or_default());
            }
            return Ok(());
        }

        if mode != ExecutionMode::BuildObjects {
            let number = 1 + self.store[scenario]
                .steps()
                .iter()
                .filter(|id| self.store[**id].kind().is_numbered())
                .map(|id| self.store[*id].executions().len())
                .sum::<usize>();
            let definition = &mut self.store[step];
            definition.executions_mut().push(StepExecution::started(number));
            info!(
                "STEP #{number}: {}",
                definition.description().unwrap_or(definition.name())
            );
            let init: Vec<TestError> = definition.init_known_issues().to_vec();
            for issue in init {
                self.on_error(issue, Some(Tracker::Step(step)))?;
            }
        }

        match self.invoke_body(step, scenario) {
            Ok(()) | Err(StepBreak::Goto) => {}
            Err(StepBreak::Failed(error)) => self.on_error(error, Some(Tracker::Step(step)))?,
            Err(StepBreak::Fatal(error)) => return Err(*error),
        }

        if mode != ExecutionMode::BuildObjects {
            self.end_current_action_result();
            self.notify_known_issues(Tracker::Step(step))?;
            let executions = self.store[step].executions_mut();
            if mode == ExecutionMode::DocOnly {
                executions.pop();
            } else if let Some(execution) = executions.last_mut() {
                execution.time.set_end_time();
            }
        }
        Ok(())
    }

    /// Runs the body of a step with the state of its scenario, turning
    /// panics into exception test errors.
    fn invoke_body(&mut self, step: StepId, scenario: ScenarioId) -> StepResult {
        let Some(body) = self.bodies.get(&step).cloned() else {
            return Ok(());
        };
        let Some(mut state) = self.states.remove(&scenario) else {
            return Err(self
                .context_error(format!("no state for {}", self.store[scenario].name()))
                .into());
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut api = StepApi::new(self, step);
            body.call(&mut state, &mut api)
        }));
        self.states.insert(scenario, state);
        outcome.unwrap_or_else(|payload| {
            let location = self.store[step].location().clone();
            Err(TestError::exception("panic", panic_message(&*payload), Some(location)).into())
        })
    }

    pub(crate) fn on_step_description(
        &mut self,
        step: StepId,
        description: &str,
    ) -> Result<(), ContextError> {
        if self.mode() != ExecutionMode::BuildObjects {
            return Ok(());
        }
        if self.building_step() != Some(step) {
            return Err(self.context_error("description() outside the step being built"));
        }
        self.store[step].set_description(description);
        Ok(())
    }

    /// Declares an action or result while building; matches it against
    /// the next declaration of the step otherwise.
    pub(crate) fn on_action_result(
        &mut self,
        kind: ActionResultType,
        description: &str,
    ) -> Result<(), ContextError> {
        if self.mode() == ExecutionMode::BuildObjects {
            let Some(step) = self.building_step() else {
                return Err(self.context_error(format!("{kind} outside a step")));
            };
            self.store[step]
                .actions_results_mut()
                .push(ActionResultDefinition::new(kind, description));
            return Ok(());
        }

        self.end_current_action_result();
        let Some(step) = self.current_step() else {
            return Err(self.context_error(format!("{kind} outside a step")));
        };
        let Some(execution) = self.current_step_execution_mut() else {
            return Err(self.context_error(format!("{kind} outside a step execution")));
        };
        let index = execution.next_action_result();
        let declared = self.store[step]
            .actions_results()
            .get(index)
            .is_some_and(|definition| definition.matches(kind, description));
        if !declared {
            return Err(self.context_error(format!(
                "{kind} {description:?} does not match the declarations of {}",
                self.store.step_qualname(step)
            )));
        }
        if self.do_execute() {
            if let Some(definition) = self.store[step].actions_results_mut().get_mut(index) {
                definition
                    .executions_mut()
                    .push(ActionResultExecution::started());
            }
        }
        info!("{kind}: {description}");
        Ok(())
    }

    fn end_current_action_result(&mut self) {
        if self.do_execute() {
            if let Some(execution) = self.current_action_result_execution_mut() {
                execution.time.set_end_time();
            }
        }
        if let Some(execution) = self.current_step_execution_mut() {
            execution.clear_current_action_result();
        }
    }

    pub(crate) fn on_evidence(&mut self, evidence: &str) -> Result<(), ContextError> {
        info!("EVIDENCE: {evidence}");
        if !self.do_execute() {
            return Ok(());
        }
        let Some(execution) = self.current_action_result_execution_mut() else {
            return Err(self.context_error("evidence outside an action or result"));
        };
        execution.evidence.push(evidence.to_string());
        Ok(())
    }

    /// Sets the jump target of a scenario. Ignored while building, so that
    /// the build pass walks every step.
    pub(crate) fn goto(&mut self, scenario: ScenarioId, target: &StepSpec) -> Result<(), Error> {
        if self.mode() == ExecutionMode::BuildObjects {
            debug!("goto({target}) ignored while building");
            return Ok(());
        }
        let step = self.store.find_step(scenario, target, false)?;
        let Some(execution) = self.store[scenario].execution_mut() else {
            return Err(self.context_error("goto() outside a scenario execution").into());
        };
        execution.set_next_step(step);
        debug!("Next step: {}", self.store.step_qualname(step));
        Ok(())
    }

    /// Records a test error.
    ///
    /// While building, known issues are attached to the definition of the
    /// originator (see [`Session::from_originator`]) and any other error is
    /// fatal. While executing, the error goes to the current scenario, and
    /// unless the originator is a scenario, to the current step and action
    /// or result executions. Known issues already recorded are skipped.
    pub(crate) fn on_error(
        &mut self,
        error: TestError,
        originator: Option<Tracker>,
    ) -> Result<(), Error> {
        let severity = self.config.severity(&error);
        if severity == Severity::Ignored {
            debug!("Ignored: {error}");
            return Ok(());
        }

        if self.mode() == ExecutionMode::BuildObjects {
            return self.on_build_error(error, originator);
        }

        let Some(scenario) = self.stack.current() else {
            return Err(self.context_error(format!("no scenario executing for: {error}")).into());
        };
        let Some(execution) = self.store[scenario].execution_mut() else {
            return Err(self.context_error("scenario executing without an execution record").into());
        };
        if error.is_known_issue()
            && (execution.errors.contains(&error) || execution.warnings.contains(&error))
        {
            return Ok(());
        }
        let warning = severity == Severity::Warning;
        if warning {
            warn!("{error}");
        } else {
            error!("{error}");
        }
        push_error(&mut execution.errors, &mut execution.warnings, warning, &error);

        let Some(step) = self.current_step() else {
            return Ok(());
        };
        if !originator.is_none_or(|originator| originator == Tracker::Step(step)) {
            return Ok(());
        }
        let declared = self.store[step].known_issues().contains(&error);
        if let Some(execution) = self.current_step_execution_mut() {
            push_error(&mut execution.errors, &mut execution.warnings, warning, &error);
        }
        if !declared {
            if let Some(execution) = self.current_action_result_execution_mut() {
                push_error(&mut execution.errors, &mut execution.warnings, warning, &error);
            }
        }
        Ok(())
    }

    fn on_build_error(&mut self, error: TestError, originator: Option<Tracker>) -> Result<(), Error> {
        let Some(building) = self.stack.building().scenario() else {
            return Err(self.context_error("nothing being built").into());
        };
        if !error.is_known_issue() {
            return Err(Error::Build {
                scenario: self.store[building].name().to_string(),
                error,
            });
        }
        let target = originator.map_or_else(
            || {
                self.building_step()
                    .map_or(Tracker::Scenario(building), Tracker::Step)
            },
            |originator| self.from_originator(originator),
        );
        debug!("Known issue of {}: {error}", self.store.tracker_name(target));
        match target {
            Tracker::Scenario(scenario) => self.store[scenario].push_known_issue(error),
            Tracker::Step(step) => self.store[step].push_known_issue(error),
        }
        Ok(())
    }

    /// Whether the step loop of `scenario` must stop.
    fn should_stop(&self, scenario: ScenarioId) -> bool {
        let definition = &self.store[scenario];
        let continue_on_error = definition
            .continue_on_error()
            .unwrap_or(self.config.continue_on_error);
        !continue_on_error
            && definition
                .execution()
                .is_some_and(|execution| execution.errors.iter().any(|error| !error.is_known_issue()))
    }
}

fn push_error(
    errors: &mut Vec<TestError>,
    warnings: &mut Vec<TestError>,
    warning: bool,
    error: &TestError,
) {
    if warning {
        warnings.push(error.clone());
    } else {
        errors.push(error.clone());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use test_case::test_case;

    use super::*;
    use crate::domain::{KnownIssue, TestErrorKind};

    type Trace = Rc<RefCell<Vec<String>>>;

    fn record(trace: &Trace, entry: &str) {
        trace.borrow_mut().push(entry.to_string());
    }

    fn step_numbers(session: &Session, step: StepId) -> Vec<usize> {
        session.store()[step]
            .executions()
            .iter()
            .map(|execution| execution.number)
            .collect()
    }

    #[test]
    fn steps_run_with_actions_and_results() {
        let mut session = Session::default();
        let scenario = session
            .define("counter", 0_u32, |asm| {
                asm.step("step010", |count, step| {
                    step.description("Increment")?;
                    if step.action("Add one.")? {
                        *count += 1;
                        step.evidence("incremented")?;
                    }
                    if step.result("The counter is one.")? {
                        step.ensure_eq(*count, 1, "counter")?;
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        let status = session.execute(scenario).unwrap();

        assert_eq!(status, ExecutionStatus::Success);
        let step = session.store()[scenario].steps()[0];
        let definition = &session.store()[step];
        assert_eq!(definition.description(), Some("Increment"));
        assert_eq!(definition.actions_results().len(), 2);
        assert_eq!(
            definition.actions_results()[0].executions()[0].evidence,
            ["incremented"]
        );
        assert_eq!(step_numbers(&session, step), [1]);
        assert_eq!(session.stack().history(), [scenario]);
        assert_eq!(session.stack().size(), 0);
    }

    #[test]
    fn goto_jumps_once_then_resumes_linearly() {
        let mut session = Session::default();
        let trace = Trace::default();
        let (t1, t2, t3) = (trace.clone(), trace.clone(), trace.clone());
        let scenario = session
            .define("loop", 0_u32, move |asm| {
                asm.step("step010", move |_, step| {
                    if step.do_execute() {
                        record(&t1, "step010");
                    }
                    Ok(())
                })?;
                asm.step("step020", move |passes, step| {
                    if step.do_execute() {
                        record(&t2, "step020");
                    }
                    if step.action("Loop back once.")? {
                        *passes += 1;
                        if *passes == 1 {
                            step.goto("step010")?;
                        }
                    }
                    Ok(())
                })?;
                asm.step("step030", move |_, step| {
                    if step.do_execute() {
                        record(&t3, "step030");
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Success);
        assert_eq!(
            *trace.borrow(),
            ["step010", "step020", "step010", "step020", "step030"]
        );
        let steps = session.store()[scenario].steps().to_vec();
        assert_eq!(step_numbers(&session, steps[0]), [1, 3]);
        assert_eq!(step_numbers(&session, steps[1]), [2, 4]);
        assert_eq!(step_numbers(&session, steps[2]), [5]);
    }

    #[test_case(None, false, 1 ; "stops by default")]
    #[test_case(None, true, 2 ; "configured to continue")]
    #[test_case(Some(true), false, 2 ; "scenario continues")]
    #[test_case(Some(false), true, 1 ; "scenario stops")]
    fn errors_stop_execution(scenario_override: Option<bool>, configured: bool, executed: usize) {
        let mut session = Session::default();
        session.config_mut().continue_on_error = configured;
        let scenario = session
            .define("failing", (), |asm| {
                if let Some(value) = scenario_override {
                    asm.continue_on_error(value);
                }
                asm.step("step010", |(), step| {
                    if step.result("Fails.")? {
                        step.ensure(false, "always fails")?;
                    }
                    Ok(())
                })?;
                asm.step("step020", |(), _| Ok(()))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Fail);
        let run = session
            .store()
            .scenario_stats(scenario)
            .steps
            .executed;
        assert_eq!(run, executed);
        let step = session.store()[scenario].steps()[0];
        let result = &session.store()[step].actions_results()[0];
        assert_eq!(result.executions()[0].errors[0].message(), "always fails");
    }

    #[test]
    fn panics_are_recorded_as_exceptions() {
        let mut session = Session::default();
        let scenario = session
            .define("panicking", (), |asm| {
                asm.step("step010", |(), step| {
                    if step.action("Panic.")? {
                        panic!("boom");
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Fail);
        let execution = session.store()[scenario].execution().unwrap();
        assert!(matches!(
            execution.errors[0].kind(),
            TestErrorKind::Exception { type_name } if type_name == "panic"
        ));
        assert_eq!(execution.errors[0].message(), "boom");
        assert!(session.states.contains_key(&scenario));
    }

    fn known_issue_scenario(session: &mut Session, level: i32) -> ScenarioId {
        session
            .define("issues", (), move |asm| {
                asm.step("step010", move |(), step| {
                    if step.action("Hit a known issue.")? {
                        step.known_issue(KnownIssue::new("flaky").with_level(level))?;
                    }
                    Ok(())
                })?;
                asm.step("step020", |(), _| Ok(()))?;
                Ok(())
            })
            .unwrap()
    }

    #[test_case(10, ExecutionStatus::Fail, 2 ; "error level")]
    #[test_case(5, ExecutionStatus::Warnings, 2 ; "warning level")]
    #[test_case(1, ExecutionStatus::Success, 2 ; "ignored level")]
    fn known_issue_severities(level: i32, status: ExecutionStatus, executed: usize) {
        let mut session = Session::default();
        session.config_mut().set_issue_level_error(Some(10));
        session.config_mut().set_issue_level_ignored(Some(1));
        let scenario = known_issue_scenario(&mut session, level);

        assert_eq!(session.execute(scenario).unwrap(), status);
        assert_eq!(
            session.store().scenario_stats(scenario).steps.executed,
            executed
        );
    }

    #[test]
    fn definition_known_issues_are_notified_once() {
        let mut session = Session::default();
        let scenario = session
            .define("declared", (), |asm| {
                asm.known_issue(KnownIssue::new("scenario issue"))?;
                asm.step("step010", |(), step| {
                    step.known_issue(KnownIssue::new("step issue"))?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Warnings);
        let execution = session.store()[scenario].execution().unwrap();
        let messages: Vec<_> = execution.warnings.iter().map(TestError::message).collect();
        assert_eq!(messages, ["scenario issue", "step issue"]);
        let step = session.store()[scenario].steps()[0];
        assert_eq!(session.store()[step].known_issues().len(), 1);
        assert_eq!(session.store()[step].executions()[0].warnings.len(), 1);
    }

    #[test]
    fn subscenarios_nest_and_propagate_errors() {
        let mut session = Session::default();
        let sub = session
            .define("sub", (), |asm| {
                asm.step("step010", |(), step| {
                    if step.result("Fails.")? {
                        step.ensure(false, "sub failure")?;
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
        let depth = Rc::new(RefCell::new(0));
        let observed = depth.clone();
        let main = session
            .define("main", (), move |asm| {
                asm.step("step010", move |(), step| {
                    if step.action("Run the sub-scenario.")? {
                        *observed.borrow_mut() = step.session().stack().size();
                        step.execute_subscenario(sub)?;
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(main).unwrap(), ExecutionStatus::Fail);
        assert_eq!(*depth.borrow(), 1);
        assert_eq!(session.stack().history(), [main]);
        let step = session.store()[main].steps()[0];
        let action = &session.store()[step].actions_results()[0].executions()[0];
        assert_eq!(action.subscenarios, [sub]);
        assert_eq!(action.errors[0].message(), "sub failure");
        assert_eq!(
            session.store()[sub].execution().map(ScenarioExecution::status),
            Some(ExecutionStatus::Fail)
        );
    }

    #[test]
    fn doc_only_walks_without_records() {
        let mut session = Session::default();
        session.set_doc_only(true);
        let executed = Rc::new(RefCell::new(false));
        let flag = executed.clone();
        let scenario = session
            .define("documented", (), move |asm| {
                asm.step("step010", move |(), step| {
                    if step.action("Do something.")? {
                        *flag.borrow_mut() = true;
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Success);
        assert!(!*executed.borrow());
        let step = session.store()[scenario].steps()[0];
        assert!(session.store()[step].executions().is_empty());
        assert!(session.store()[step].actions_results()[0].executions().is_empty());
    }

    #[test]
    fn action_mismatch_is_a_context_error() {
        let mut session = Session::default();
        let scenario = session
            .define("unstable", 0_u32, |asm| {
                asm.step("step010", |calls, step| {
                    *calls += 1;
                    let description = if *calls == 1 { "First." } else { "Second." };
                    step.action(description)?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        let error = session.execute(scenario).expect_err("declarations differ");
        assert!(matches!(error, Error::Context(_)));
    }

    #[test]
    fn scenarios_execute_once() {
        let mut session = Session::default();
        let scenario = session.define("once", (), |_| Ok(())).unwrap();
        session.execute(scenario).unwrap();
        assert!(matches!(
            session.execute(scenario),
            Err(Error::Definition(DefinitionError::AlreadyExecuted(_)))
        ));
    }

    #[test]
    fn expected_attributes_are_checked() {
        let mut session = Session::default();
        session.config_mut().expect_scenario_attribute("AUTHOR");
        let scenario = session.define("anonymous", (), |_| Ok(())).unwrap();

        assert!(matches!(
            session.execute(scenario),
            Err(Error::MissingAttribute { attribute, .. }) if attribute == "AUTHOR"
        ));
        assert_eq!(session.stack().size(), 0);
    }

    #[test]
    fn skipped_sections_jump_to_their_end() {
        let mut session = Session::default();
        let trace = Trace::default();
        let (t1, t2) = (trace.clone(), trace.clone());
        let scenario = session
            .define("optional", (), move |asm| {
                let section = asm.begin_section("optional checks", |(), step| {
                    if step.do_execute() {
                        step.skip_section("not supported here", Some(KnownIssue::new("").with_id("#42")))?;
                    }
                    Ok(())
                })?;
                asm.add_step("inside", move |(), step| {
                    if step.do_execute() {
                        record(&t1, "inside");
                    }
                    Ok(())
                })?;
                asm.end_section(section)?;
                asm.add_step("after", move |(), step| {
                    if step.do_execute() {
                        record(&t2, "after");
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Warnings);
        assert_eq!(*trace.borrow(), ["after"]);
        let warnings = &session.store()[scenario].execution().unwrap().warnings;
        assert_eq!(
            warnings[0].message(),
            "Not supported here. Steps skipped from step#1 (section_begin) to step#3 (section_end)."
        );
    }

    #[test]
    fn empty_sections_name_their_bounds() {
        let mut session = Session::default();
        let trace = Trace::default();
        let after = trace.clone();
        let scenario = session
            .define("empty", (), move |asm| {
                let section = asm.begin_section("nothing inside", |(), step| {
                    if step.do_execute() {
                        step.skip_section("skipped", Some(KnownIssue::new("").with_id("#1")))?;
                    }
                    Ok(())
                })?;
                asm.end_section(section)?;
                asm.add_step("after", move |(), step| {
                    if step.do_execute() {
                        record(&after, "after");
                    }
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Warnings);
        assert_eq!(*trace.borrow(), ["after"]);
        let warnings = &session.store()[scenario].execution().unwrap().warnings;
        assert_eq!(
            warnings[0].message(),
            "Skipped. Steps skipped from step#1 (section_begin) to step#2 (section_end)."
        );
    }

    #[test]
    fn skipping_an_unclosed_section_is_a_context_error() {
        let mut session = Session::default();
        let scenario = session
            .define("unclosed", (), |asm| {
                asm.begin_section("never closed", |(), step| {
                    if step.do_execute() {
                        step.skip_section("skipped", None)?;
                    }
                    Ok(())
                })?;
                asm.add_step("after", |(), _| Ok(()))?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(session.execute(scenario), Err(Error::Context(_))));
        let execution = session.store()[scenario].execution().unwrap();
        assert!(execution.errors.is_empty());
    }
}
