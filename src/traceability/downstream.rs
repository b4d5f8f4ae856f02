//! Requirement-centric projection: requirement reference → scenarios →
//! steps.

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::{
    domain::{LinkId, ReqRef, ScenarioId, StepId, Tracker},
    engine::Session,
};

/// Downstream traceability, one entry per requirement reference, in
/// reference order.
///
/// Serializes as a map keyed by reference identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Downstream(pub Vec<DownstreamReqRef>);

impl Serialize for Downstream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|entry| (&entry.id, entry)))
    }
}

impl Downstream {
    /// The entry of a reference.
    #[must_use]
    pub fn get(&self, req_ref: &ReqRef) -> Option<&DownstreamReqRef> {
        self.0.iter().find(|entry| entry.req_ref == *req_ref)
    }
}

/// A requirement reference with the scenarios verifying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownstreamReqRef {
    /// The reference.
    #[serde(skip)]
    pub req_ref: ReqRef,
    /// Textual identifier of the reference.
    pub id: String,
    /// Requirement title, for main references only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Requirement text, for main references only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Verifying scenarios, in tracker order.
    #[serde(serialize_with = "scenarios_by_name")]
    pub scenarios: Vec<DownstreamScenario>,
}

/// A scenario verifying a reference, directly or through its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownstreamScenario {
    /// The scenario.
    #[serde(skip)]
    pub scenario: ScenarioId,
    /// The link the scenario verifies the reference through, `None` when
    /// only its steps do.
    #[serde(skip)]
    pub link: Option<LinkId>,
    /// Scenario name.
    pub name: String,
    /// Link comments, or the scenario title; empty without a link.
    pub comments: String,
    /// Scenario title.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Verifying steps, in step order.
    #[serde(serialize_with = "steps_by_number")]
    pub steps: Vec<DownstreamStep>,
}

/// A step verifying a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownstreamStep {
    /// The step.
    #[serde(skip)]
    pub step: StepId,
    /// The link the step verifies the reference through.
    #[serde(skip)]
    pub link: LinkId,
    /// Step number.
    pub number: usize,
    /// Step name.
    pub name: String,
    /// Link comments, or the scenario title.
    pub comments: String,
}

fn scenarios_by_name<S: Serializer>(
    scenarios: &[DownstreamScenario],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(scenarios.iter().map(|scenario| (&scenario.name, scenario)))
}

fn steps_by_number<S: Serializer>(
    steps: &[DownstreamStep],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        steps
            .iter()
            .map(|step| (format!("step#{}", step.number), step)),
    )
}

fn link_comments(session: &Session, link: LinkId, fallback: &str) -> String {
    session
        .req_db()
        .link(link)
        .map(|req_link| req_link.comments())
        .filter(|comments| !comments.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

impl DownstreamScenario {
    fn new(session: &Session, scenario: ScenarioId, link: Option<LinkId>) -> Self {
        let definition = &session.store()[scenario];
        let title = definition.title().to_string();
        Self {
            scenario,
            link,
            name: definition.name().to_string(),
            comments: link.map_or_else(String::new, |link| link_comments(session, link, &title)),
            title,
            steps: Vec::new(),
        }
    }
}

/// Computes the downstream projection of every reference in the database.
pub(super) fn compute(session: &Session) -> Downstream {
    let req_db = session.req_db();
    let store = session.store();
    debug!(
        "Computing downstream traceability from {} requirement references",
        req_db.all_refs().count()
    );

    let mut entries = Vec::new();
    for req_ref in req_db.all_refs() {
        let req = req_ref
            .is_main()
            .then(|| req_db.req(req_ref.req()))
            .flatten();
        let mut entry = DownstreamReqRef {
            req_ref: req_ref.clone(),
            id: req_ref.id(),
            title: req.map(|req| req.title().to_string()).filter(|t| !t.is_empty()),
            text: req.map(|req| req.text().to_string()).filter(|t| !t.is_empty()),
            scenarios: Vec::new(),
        };

        for (tracker, links) in session.verifiers(req_ref) {
            for link in links {
                match tracker {
                    Tracker::Scenario(scenario) => {
                        if entry.scenarios.last().is_some_and(|last| last.scenario == scenario) {
                            debug!(
                                "{req_ref} -> {} already known, {link} ignored",
                                store[scenario].name()
                            );
                        } else {
                            entry
                                .scenarios
                                .push(DownstreamScenario::new(session, scenario, Some(link)));
                        }
                    }
                    Tracker::Step(step) => {
                        let Some(owner) = store[step].owner() else {
                            warn!("{} has no owner scenario, {link} ignored", store[step].name());
                            continue;
                        };
                        if entry.scenarios.last().is_none_or(|last| last.scenario != owner) {
                            entry
                                .scenarios
                                .push(DownstreamScenario::new(session, owner, None));
                        }
                        if let Some(last) = entry.scenarios.last_mut() {
                            last.steps.push(DownstreamStep {
                                step,
                                link,
                                number: store.step_number(step),
                                name: store[step].name().to_string(),
                                comments: link_comments(session, link, &last.title),
                            });
                        }
                    }
                }
            }
        }
        entries.push(entry);
    }
    debug!("{} downstream entries", entries.len());
    Downstream(entries)
}
