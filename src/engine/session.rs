//! The process-scoped context of a scenario run.

use std::collections::{BTreeMap, HashMap};

use nonempty::NonEmpty;
use tracing::{debug, error, instrument, warn};

use crate::{
    domain::{
        ActionResultExecution, CodeLocation, Config, KnownIssue, LinkId, LinkSpec, ReqDatabase,
        ReqId, ReqRef, ScenarioId, ScenarioStore, StepExecution, StepId, TestError,
        Tracker,
    },
    engine::{
        ContextError, Error, ScenarioStack,
        assembly::{ScenarioState, StepBody},
    },
};

/// Everything a scenario run needs: configuration, requirement database,
/// definitions and execution stack.
///
/// A session is single-threaded. Use one session per run, or [`reset`]
/// it between runs.
///
/// [`reset`]: Session::reset
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) config: Config,
    pub(crate) req_db: ReqDatabase,
    pub(crate) store: ScenarioStore,
    pub(crate) stack: ScenarioStack,
    pub(crate) bodies: HashMap<StepId, StepBody>,
    pub(crate) states: HashMap<ScenarioId, ScenarioState>,
    pub(crate) doc_only: bool,
}

impl Session {
    /// Creates a session with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Forgets every definition, execution and requirement, keeping the
    /// configuration.
    pub fn reset(&mut self) {
        let config = std::mem::take(&mut self.config);
        *self = Self::new(config);
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The configuration, for modification.
    pub const fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The requirement database.
    #[must_use]
    pub const fn req_db(&self) -> &ReqDatabase {
        &self.req_db
    }

    /// The requirement database, for modification.
    pub const fn req_db_mut(&mut self) -> &mut ReqDatabase {
        &mut self.req_db
    }

    /// The scenario and step definitions.
    #[must_use]
    pub const fn store(&self) -> &ScenarioStore {
        &self.store
    }

    pub(crate) const fn store_mut(&mut self) -> &mut ScenarioStore {
        &mut self.store
    }

    /// The execution stack.
    #[must_use]
    pub const fn stack(&self) -> &ScenarioStack {
        &self.stack
    }

    /// Whether steps are only walked for documentation, not executed.
    #[must_use]
    pub const fn doc_only(&self) -> bool {
        self.doc_only
    }

    /// Switches documentation-only runs on or off.
    pub const fn set_doc_only(&mut self, doc_only: bool) {
        self.doc_only = doc_only;
    }

    // Requirement tracking.

    /// Declares that `tracker` covers the given requirement links.
    ///
    /// Textual references are registered in the requirement database when
    /// unknown. A textual reference equal to one already declared by the
    /// tracker (same reference, same comments) resolves to the existing
    /// link, so repeated declarations are idempotent.
    ///
    /// Returns the first link.
    ///
    /// # Errors
    ///
    /// Returns an error if no link is given, if a reference is malformed, or
    /// if a link identifier is unknown.
    pub fn covers<I>(&mut self, tracker: Tracker, links: I) -> Result<LinkId, Error>
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        let specs: Vec<LinkSpec> = links.into_iter().map(Into::into).collect();
        let NonEmpty { head, tail } = NonEmpty::from_vec(specs).ok_or(Error::NoLinkSpecification)?;
        let first = self.attach_spec(tracker, head)?;
        for spec in tail {
            self.attach_spec(tracker, spec)?;
        }
        Ok(first)
    }

    /// Declares that `tracker` verifies the given requirement links.
    ///
    /// Same as [`covers`](Self::covers).
    ///
    /// # Errors
    ///
    /// See [`covers`](Self::covers).
    pub fn verifies<I>(&mut self, tracker: Tracker, links: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: Into<LinkSpec>,
    {
        self.covers(tracker, links).map(|_| ())
    }

    /// Creates a standalone link, to be shared between several trackers.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed.
    pub fn new_link(&mut self, req_ref: &str, comments: &str) -> Result<LinkId, Error> {
        let req_ref = self.req_db.resolve_ref(req_ref, true)?;
        Ok(self.req_db.create_link(req_ref, comments))
    }

    fn attach_spec(&mut self, tracker: Tracker, spec: LinkSpec) -> Result<LinkId, Error> {
        let link = match spec {
            LinkSpec::Link(link) => link,
            LinkSpec::Ref { req_ref, comments } => {
                let req_ref = self.req_db.resolve_ref(&req_ref, true)?;
                let comments = comments.unwrap_or_default();
                match self.req_db.find_link(tracker, &req_ref, &comments) {
                    Some(link) => link,
                    None => self.req_db.create_link(req_ref, comments),
                }
            }
        };
        if self.req_db.attach(link, tracker)? {
            if let Some(req_link) = self.req_db.link(link) {
                debug!("{} -> {}", self.store.tracker_name(tracker), req_link.req_ref());
            }
        }
        Ok(link)
    }

    fn trackers_of(&self, tracker: Tracker, walk_steps: bool) -> Vec<Tracker> {
        let mut trackers = vec![tracker];
        if let (true, Tracker::Scenario(scenario)) = (walk_steps, tracker) {
            trackers.extend(self.store[scenario].steps().iter().copied().map(Tracker::Step));
        }
        trackers
    }

    fn links_of(&self, tracker: Tracker, walk_steps: bool) -> Vec<LinkId> {
        let mut links: Vec<_> = self
            .trackers_of(tracker, walk_steps)
            .into_iter()
            .flat_map(|tracker| self.req_db.tracker_links(tracker))
            .collect();
        links.sort_unstable();
        links.dedup();
        links
    }

    /// Distinct requirements tracked, with the links reaching them, ordered
    /// by requirement.
    ///
    /// With `walk_steps`, the links of a scenario's steps are included.
    #[must_use]
    pub fn reqs(&self, tracker: Tracker, walk_steps: bool) -> Vec<(ReqId, Vec<LinkId>)> {
        let mut reqs: BTreeMap<ReqId, Vec<LinkId>> = BTreeMap::new();
        for link in self.links_of(tracker, walk_steps) {
            if let Some(req_link) = self.req_db.link(link) {
                reqs.entry(req_link.req().clone()).or_default().push(link);
            }
        }
        reqs.into_iter().collect()
    }

    /// Distinct requirement identifiers tracked, ordered.
    #[must_use]
    pub fn req_ids(&self, tracker: Tracker) -> Vec<ReqId> {
        self.reqs(tracker, false)
            .into_iter()
            .map(|(req, _)| req)
            .collect()
    }

    /// Distinct requirement references tracked, with the links reaching
    /// them, ordered by reference.
    ///
    /// With `walk_steps`, the links of a scenario's steps are included.
    #[must_use]
    pub fn req_refs(&self, tracker: Tracker, walk_steps: bool) -> Vec<(ReqRef, Vec<LinkId>)> {
        let links = self.links_of(tracker, walk_steps);
        self.req_db.refs_with_links(&links).into_iter().collect()
    }

    /// Links of `tracker` matching `req_ref` (all links when `None`), or
    /// its sub-references with `walk_subrefs`.
    #[must_use]
    pub fn req_links(
        &self,
        tracker: Tracker,
        req_ref: Option<&ReqRef>,
        walk_subrefs: bool,
    ) -> Vec<LinkId> {
        self.req_db
            .tracker_links(tracker)
            .into_iter()
            .filter(|link| match (req_ref, self.req_db.link(*link)) {
                (None, Some(_)) => true,
                (Some(req_ref), Some(req_link)) => req_link.matches(req_ref, walk_subrefs),
                (_, None) => false,
            })
            .collect()
    }

    fn sort_trackers(&self, trackers: BTreeMap<Tracker, Vec<LinkId>>) -> Vec<(Tracker, Vec<LinkId>)> {
        let mut trackers: Vec<_> = trackers.into_iter().collect();
        trackers.sort_by_cached_key(|(tracker, _)| self.store.tracker_key(*tracker));
        trackers
    }

    /// Direct trackers of a reference, each with all the links connecting
    /// it, ordered by tracker key.
    #[must_use]
    pub fn verifiers(&self, req_ref: &ReqRef) -> Vec<(Tracker, Vec<LinkId>)> {
        let links = self.req_db.ref_links(req_ref);
        self.sort_trackers(self.req_db.trackers_with_links(&links))
    }

    /// Direct trackers of a requirement, through its main reference and,
    /// with `walk_subrefs`, its sub-references.
    #[must_use]
    pub fn req_verifiers(&self, req: &ReqId, walk_subrefs: bool) -> Vec<(Tracker, Vec<LinkId>)> {
        let links = self.req_db.req_links(req, walk_subrefs);
        self.sort_trackers(self.req_db.trackers_with_links(&links))
    }

    /// Scenarios verifying a requirement, directly or through their steps.
    #[must_use]
    pub fn req_scenarios(&self, req: &ReqId, walk_subrefs: bool) -> Vec<(ScenarioId, Vec<LinkId>)> {
        let mut scenarios: BTreeMap<ScenarioId, Vec<LinkId>> = BTreeMap::new();
        for (tracker, links) in self.req_verifiers(req, walk_subrefs) {
            if let Some(scenario) = self.store.tracker_scenario(tracker) {
                let entry = scenarios.entry(scenario).or_default();
                for link in links {
                    if !entry.contains(&link) {
                        entry.push(link);
                    }
                }
            }
        }
        let mut scenarios: Vec<_> = scenarios.into_iter().collect();
        scenarios.sort_by(|(a, _), (b, _)| self.store[*a].name().cmp(self.store[*b].name()));
        scenarios
    }

    /// All scenarios tracking at least one requirement, directly or through
    /// their steps, ordered by name.
    #[must_use]
    pub fn tracking_scenarios(&self) -> Vec<ScenarioId> {
        let mut scenarios: Vec<_> = self
            .req_db
            .all_trackers()
            .into_iter()
            .filter_map(|tracker| self.store.tracker_scenario(tracker))
            .collect();
        scenarios.sort_by(|a, b| self.store[*a].name().cmp(self.store[*b].name()).then(a.cmp(b)));
        scenarios.dedup();
        scenarios
    }

    // Scenario context.

    /// The step being built: the step cursor of the scenario being built.
    #[must_use]
    pub fn building_step(&self) -> Option<StepId> {
        let scenario = self.stack.building().scenario()?;
        self.store[scenario].execution()?.current_step()
    }

    /// The step being executed: the step cursor of the innermost scenario
    /// executing.
    #[must_use]
    pub fn current_step(&self) -> Option<StepId> {
        let scenario = self.stack.current()?;
        self.store[scenario].execution()?.current_step()
    }

    /// The last execution record of the step being executed.
    #[must_use]
    pub fn current_step_execution(&self) -> Option<&StepExecution> {
        self.store[self.current_step()?].executions().last()
    }

    pub(crate) fn current_step_execution_mut(&mut self) -> Option<&mut StepExecution> {
        let step = self.current_step()?;
        self.store[step].executions_mut().last_mut()
    }

    /// Index of the action or expected result being executed in the
    /// current step.
    #[must_use]
    pub fn current_action_result(&self) -> Option<(StepId, usize)> {
        let step = self.current_step()?;
        let index = self.store[step].executions().last()?.current_action_result()?;
        Some((step, index))
    }

    pub(crate) fn current_action_result_execution_mut(
        &mut self,
    ) -> Option<&mut ActionResultExecution> {
        let (step, index) = self.current_action_result()?;
        self.store[step]
            .actions_results_mut()
            .get_mut(index)?
            .executions_mut()
            .last_mut()
    }

    /// Redirects a capability call made on the scenario being built to the
    /// step being built, if any.
    #[must_use]
    pub fn from_originator(&self, originator: Tracker) -> Tracker {
        let building = self.stack.building().scenario();
        match originator {
            Tracker::Scenario(scenario) if Some(scenario) == building => self
                .building_step()
                .map_or(originator, Tracker::Step),
            Tracker::Scenario(scenario) => {
                warn!(
                    "Unexpected originator {}, scenario being built: {:?}",
                    self.store[scenario].name(),
                    building.map(|id| self.store[id].name())
                );
                originator
            }
            Tracker::Step(_) => originator,
        }
    }

    /// Declares a known issue on the most relevant definition: the step
    /// executing, else the step being built, else the scenario executing,
    /// else the scenario being built.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if nothing is being built or executed.
    #[track_caller]
    pub fn known_issue(&mut self, issue: KnownIssue) -> Result<(), Error> {
        let location = CodeLocation::caller("known_issue");
        let originator = self
            .current_step()
            .or_else(|| self.building_step())
            .map(Tracker::Step)
            .or_else(|| self.stack.current().map(Tracker::Scenario))
            .or_else(|| self.stack.building().scenario().map(Tracker::Scenario))
            .ok_or_else(|| self.context_error("no scenario context for a known issue"))?;
        self.on_error(TestError::known_issue(issue, Some(location)), Some(originator))
    }

    /// Builds a [`ContextError`], dumping the building context and the
    /// execution stack through the error log.
    pub fn context_error(&self, message: impl Into<String>) -> ContextError {
        let message = message.into();
        error!("Invalid scenario context: {message}");
        error!("Building context:");
        for scenario in self.stack.building().scenarios() {
            error!("- scenario definition: {}", self.store[*scenario].name());
        }
        error!(
            "- step definition: {:?}",
            self.building_step().map(|step| self.store.step_qualname(step))
        );
        error!("Execution stack:");
        for scenario in self.stack.executions() {
            let definition = &self.store[*scenario];
            error!(
                "- scenario: {} (step {:?})",
                definition.name(),
                definition
                    .execution()
                    .and_then(|execution| execution.current_step())
                    .map(|step| self.store.step_qualname(step))
            );
        }
        if let Some((step, index)) = self.current_action_result() {
            if let Some(action_result) = self.store[step].actions_results().get(index) {
                error!("- action/result: {action_result}");
            }
        }
        ContextError::new(message)
    }

    /// Resolves a textual reference the way report decoding does: unknown
    /// references are registered only with `push_unknown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed or unknown.
    #[instrument(level = "debug", skip(self))]
    pub fn resolve_ref(&mut self, req_ref: &str, push_unknown: bool) -> Result<ReqRef, Error> {
        Ok(self.req_db.resolve_ref(req_ref, push_unknown)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ScenarioDefinition, StepDefinition, StepKind};

    fn session_with_step() -> (Session, ScenarioId, StepId) {
        let mut session = Session::default();
        let scenario = session
            .store
            .insert_scenario(ScenarioDefinition::new("login", CodeLocation::new("login.rs", 1, "login")));
        let step = session.store.insert_step(StepDefinition::new(
            "step010",
            StepKind::Regular,
            CodeLocation::new("login.rs", 2, "login::step010"),
        ));
        session.store.add_step(scenario, step).unwrap();
        (session, scenario, step)
    }

    #[test]
    fn repeated_declarations_are_idempotent() {
        let (mut session, scenario, _) = session_with_step();
        let tracker = Tracker::Scenario(scenario);

        let first = session.covers(tracker, ["REQ-1"]).unwrap();
        let second = session.covers(tracker, ["REQ-1"]).unwrap();
        session
            .verifies(tracker, [("REQ-1", "with comments")])
            .unwrap();
        session
            .verifies(tracker, [("REQ-1", "with comments")])
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(session.req_db().tracker_links(tracker).len(), 2);
        assert_eq!(session.req_db().link_trackers(first), [tracker]);
    }

    #[test]
    fn empty_specification_is_rejected() {
        let (mut session, scenario, _) = session_with_step();
        let error = session
            .verifies(Tracker::Scenario(scenario), Vec::<&str>::new())
            .expect_err("no link given");
        assert!(matches!(error, Error::NoLinkSpecification));
    }

    #[test]
    fn shared_link_is_attached_to_each_tracker() {
        let (mut session, scenario, step) = session_with_step();
        let link = session.new_link("REQ-1/a", "shared").unwrap();

        session.verifies(Tracker::Scenario(scenario), [link]).unwrap();
        session.verifies(Tracker::Step(step), [link]).unwrap();

        assert_eq!(
            session.req_db().link_trackers(link),
            [Tracker::Scenario(scenario), Tracker::Step(step)]
        );
        let verifiers = session.verifiers(&"REQ-1/a".parse().unwrap());
        assert_eq!(
            verifiers,
            [
                (Tracker::Scenario(scenario), vec![link]),
                (Tracker::Step(step), vec![link])
            ]
        );
    }

    #[test]
    fn step_links_are_walked_on_request() {
        let (mut session, scenario, step) = session_with_step();
        session.verifies(Tracker::Scenario(scenario), ["REQ-1"]).unwrap();
        session.verifies(Tracker::Step(step), ["REQ-2/a"]).unwrap();

        let refs = |walk| -> Vec<String> {
            session
                .req_refs(Tracker::Scenario(scenario), walk)
                .into_iter()
                .map(|(req_ref, _)| req_ref.id())
                .collect()
        };
        assert_eq!(refs(false), ["REQ-1"]);
        assert_eq!(refs(true), ["REQ-1", "REQ-2/a"]);
        assert_eq!(
            session.req_ids(Tracker::Step(step)),
            ["REQ-2".parse::<ReqId>().unwrap()]
        );
        let req2: ReqId = "REQ-2".parse().unwrap();
        assert_eq!(session.req_scenarios(&req2, true).len(), 1);
        assert!(session.req_scenarios(&req2, false).is_empty());
    }

    #[test]
    fn req_scenarios_merge_the_links_of_steps() {
        let (mut session, scenario, step) = session_with_step();
        let shared = session.new_link("REQ-1", "").unwrap();
        session.verifies(Tracker::Scenario(scenario), [shared]).unwrap();
        session.verifies(Tracker::Step(step), [shared]).unwrap();
        let own = session.covers(Tracker::Step(step), [("REQ-1", "step only")]).unwrap();

        let req: ReqId = "REQ-1".parse().unwrap();
        assert_eq!(session.req_scenarios(&req, false), [(scenario, vec![shared, own])]);
    }

    #[test]
    fn req_links_filter_by_reference() {
        let (mut session, _, step) = session_with_step();
        let tracker = Tracker::Step(step);
        session.verifies(tracker, ["REQ-1", "REQ-1/a", "REQ-2"]).unwrap();

        let main: ReqRef = "REQ-1".parse().unwrap();
        assert_eq!(session.req_links(tracker, None, false).len(), 3);
        assert_eq!(session.req_links(tracker, Some(&main), false).len(), 1);
        assert_eq!(session.req_links(tracker, Some(&main), true).len(), 2);
    }

    #[test]
    fn known_issue_without_context_is_a_context_error() {
        let mut session = Session::default();
        let error = session
            .known_issue(KnownIssue::new("nowhere"))
            .expect_err("no context");
        assert!(matches!(error, Error::Context(_)));
    }

    #[test]
    fn known_issues_raised_while_defining_go_to_the_scenario() {
        let mut session = Session::default();
        let scenario = session
            .define("declared", (), |asm| {
                asm.session().known_issue(KnownIssue::new("scenario wide").with_id("#7"))?;
                asm.step("step010", |(), _| Ok(()))?;
                Ok(())
            })
            .unwrap();

        let issues = session.store()[scenario].known_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message(), "scenario wide");
        let step = session.store()[scenario].steps()[0];
        assert!(session.store()[step].known_issues().is_empty());
    }

    #[test]
    fn known_issues_go_to_the_step_being_built_then_executed() {
        let mut session = Session::default();
        let scenario = session
            .define("routed", (), |asm| {
                asm.step("step010", |(), step| {
                    let message = if step.do_execute() { "while executing" } else { "while building" };
                    step.session_mut().known_issue(KnownIssue::new(message))?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();

        session.execute(scenario).unwrap();

        let step = session.store()[scenario].steps()[0];
        let messages = |errors: &[TestError]| -> Vec<String> {
            errors.iter().map(|error| error.message().to_string()).collect()
        };
        assert!(session.store()[scenario].known_issues().is_empty());
        assert_eq!(messages(session.store()[step].known_issues()), ["while building"]);
        let execution = &session.store()[step].executions()[0];
        let mut warnings = messages(&execution.warnings);
        warnings.sort();
        assert_eq!(warnings, ["while building", "while executing"]);
        let scenario_warnings = messages(&session.store()[scenario].execution().unwrap().warnings);
        assert!(scenario_warnings.contains(&"while executing".to_string()));
    }

    #[test]
    fn reset_keeps_the_configuration() {
        let (mut session, scenario, _) = session_with_step();
        session.config_mut().continue_on_error = true;
        session.verifies(Tracker::Scenario(scenario), ["REQ-1"]).unwrap();

        session.reset();

        assert!(session.config().continue_on_error);
        assert_eq!(session.req_db().all_reqs().count(), 0);
        assert!(session.store().scenario(scenario).is_none());
    }
}
