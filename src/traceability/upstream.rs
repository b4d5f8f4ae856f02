//! Scenario-centric projection: scenario → requirements →
//! sub-references.

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{
    domain::{LinkId, ReqId, ReqRef, ScenarioId, Tracker},
    engine::Session,
};

/// Upstream traceability, one entry per scenario.
///
/// Serializes as a map keyed by scenario name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upstream(pub Vec<UpstreamScenario>);

impl Serialize for Upstream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|entry| (&entry.name, entry)))
    }
}

impl Upstream {
    /// The entry of a scenario.
    #[must_use]
    pub fn get(&self, scenario: ScenarioId) -> Option<&UpstreamScenario> {
        self.0.iter().find(|entry| entry.scenario == scenario)
    }
}

/// A scenario with the requirements it verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamScenario {
    /// The scenario.
    #[serde(skip)]
    pub scenario: ScenarioId,
    /// Scenario name.
    pub name: String,
    /// Scenario title.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Verified requirements, in identifier order.
    #[serde(serialize_with = "reqs_by_id")]
    pub reqs: Vec<UpstreamReq>,
}

/// A requirement verified by a scenario, directly or through
/// sub-references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamReq {
    /// The requirement.
    #[serde(skip)]
    pub req: ReqId,
    /// The link to the main reference, `None` when only sub-references are
    /// linked.
    #[serde(skip)]
    pub link: Option<LinkId>,
    /// Requirement identifier.
    pub id: String,
    /// Link comments, or the scenario title; empty without a link.
    pub comments: String,
    /// Requirement title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Verified sub-references, in reference order.
    #[serde(serialize_with = "subrefs_by_id")]
    pub subrefs: Vec<UpstreamSubref>,
}

/// A sub-reference verified by a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamSubref {
    /// The sub-reference.
    #[serde(skip)]
    pub req_ref: ReqRef,
    /// The link to the sub-reference.
    #[serde(skip)]
    pub link: LinkId,
    /// Textual identifier of the sub-reference.
    pub id: String,
    /// Link comments, or the scenario title.
    pub comments: String,
}

fn reqs_by_id<S: Serializer>(reqs: &[UpstreamReq], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(reqs.iter().map(|req| (&req.id, req)))
}

fn subrefs_by_id<S: Serializer>(
    subrefs: &[UpstreamSubref],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(subrefs.iter().map(|subref| (&subref.id, subref)))
}

fn comments(session: &Session, link: LinkId, scenario_title: &str) -> String {
    match session.req_db().link(link).map(|req_link| req_link.comments()) {
        Some(comments) if !comments.is_empty() => comments.to_string(),
        _ => scenario_title.to_string(),
    }
}

/// Computes the upstream projection of `scenarios`, including the links
/// declared by their steps.
pub(super) fn compute(session: &Session, scenarios: &[ScenarioId]) -> Upstream {
    debug!(
        "Computing upstream traceability from {} scenarios",
        scenarios.len()
    );
    let mut entries = Vec::with_capacity(scenarios.len());
    for scenario in scenarios.iter().copied() {
        let definition = &session.store()[scenario];
        let mut entry = UpstreamScenario {
            scenario,
            name: definition.name().to_string(),
            title: definition.title().to_string(),
            reqs: Vec::new(),
        };

        for (req_ref, links) in session.req_refs(Tracker::Scenario(scenario), true) {
            let req = req_ref.req();
            let title = session
                .req_db()
                .req(req)
                .map(|req| req.title().to_string())
                .filter(|title| !title.is_empty());
            for link in links {
                let is_open = entry.reqs.last().is_some_and(|last| last.req == *req);
                if req_ref.is_main() && is_open {
                    debug!("{} -> {req} already known, {link} ignored", entry.name);
                    continue;
                }
                if !is_open {
                    let main_link = req_ref.is_main().then_some(link);
                    entry.reqs.push(UpstreamReq {
                        req: req.clone(),
                        link: main_link,
                        id: req.to_string(),
                        comments: main_link
                            .map_or_else(String::new, |link| comments(session, link, &entry.title)),
                        title: title.clone(),
                        subrefs: Vec::new(),
                    });
                }
                if req_ref.is_subref() {
                    let comments = comments(session, link, &entry.title);
                    if let Some(last) = entry.reqs.last_mut() {
                        last.subrefs.push(UpstreamSubref {
                            req_ref: req_ref.clone(),
                            link,
                            id: req_ref.id(),
                            comments,
                        });
                    }
                }
            }
        }
        entries.push(entry);
    }
    Upstream(entries)
}
