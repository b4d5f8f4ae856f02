//! Requirement traceability projections.
//!
//! Both projections read the link graph of a [`Session`] and never modify
//! it:
//! - [`Downstream`]: requirement reference → verifying scenarios → steps,
//! - [`Upstream`]: scenario → verified requirements → sub-references.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::{domain::ScenarioId, engine::Session, storage};

mod downstream;
pub use downstream::{Downstream, DownstreamReqRef, DownstreamScenario, DownstreamStep};

mod upstream;
pub use upstream::{Upstream, UpstreamReq, UpstreamScenario, UpstreamSubref};

/// The scenarios traceability is computed for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReqTraceability {
    scenarios: Vec<ScenarioId>,
}

impl ReqTraceability {
    /// An empty traceability set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scenarios: Vec::new(),
        }
    }

    /// The loaded scenarios, in load order.
    #[must_use]
    pub fn scenarios(&self) -> &[ScenarioId] {
        &self.scenarios
    }

    /// Adds a scenario defined in-process.
    pub fn push_scenario(&mut self, scenario: ScenarioId) {
        if !self.scenarios.contains(&scenario) {
            self.scenarios.push(scenario);
        }
    }

    /// Reloads everything from files.
    ///
    /// The session is reset first. Requirement databases are loaded from
    /// `req_db_files`, or from the configured files when empty. Reports are
    /// then decoded from `report_paths`; directories are scanned
    /// recursively for `.json` files.
    ///
    /// Not reentrant: the session is shared with any scenario defined
    /// before.
    ///
    /// # Errors
    ///
    /// Returns the first file that cannot be read or decoded. The session
    /// keeps what was loaded up to that point.
    #[instrument(level = "debug", skip(self, session))]
    pub fn load_data(
        &mut self,
        session: &mut Session,
        req_db_files: &[PathBuf],
        report_paths: &[PathBuf],
    ) -> Result<(), storage::Error> {
        session.reset();
        self.scenarios.clear();

        let req_db_files = if req_db_files.is_empty() {
            session.config().req_db_files().to_vec()
        } else {
            req_db_files.to_vec()
        };
        info!("Loading requirements");
        for path in &req_db_files {
            info!("Loading '{}'", path.display());
            storage::req_db_file::load(session.req_db_mut(), path)?;
        }
        let count = session.req_db().all_refs().count();
        info!("{count} requirement reference{} loaded", plural(count));

        info!("Loading scenarios");
        for path in report_paths {
            for report in report_files(path)? {
                info!("Loading '{}'", report.display());
                let scenario = storage::report::read(session, &report, true)?;
                self.push_scenario(scenario);
            }
        }
        let count = self.scenarios.len();
        info!("{count} scenario{} loaded", plural(count));
        Ok(())
    }

    /// Requirement-centric projection of every reference in the database.
    #[must_use]
    pub fn downstream(&self, session: &Session) -> Downstream {
        downstream::compute(session)
    }

    /// Scenario-centric projection of the loaded scenarios.
    #[must_use]
    pub fn upstream(&self, session: &Session) -> Upstream {
        upstream::compute(session, &self.scenarios)
    }
}

const fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

/// `path` itself, or the `.json` files below it, sorted.
fn report_files(path: &Path) -> Result<Vec<PathBuf>, storage::Error> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|error| storage::Error::Walk {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
        {
            files.push(entry.into_path());
        }
    }
    debug!("{} report files in {}", files.len(), path.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        domain::{ReqRef, Tracker},
        engine::{StepApi, StepResult},
    };

    fn noop(_: &mut (), _: &mut StepApi<'_>) -> StepResult {
        Ok(())
    }

    /// Scenario A verifies REQ-1 directly and through its step #2.
    fn scenario_a(session: &mut Session) -> ScenarioId {
        session
            .define("A", (), |asm| {
                asm.title("Scenario A").verifies(["REQ-1"])?;
                asm.step("step010", noop)?;
                let step = asm.step("step020", noop)?;
                asm.session()
                    .verifies(Tracker::Step(step), [("REQ-1", "checked here")])?;
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn step_and_scenario_links_share_one_scenario_entry() {
        let mut session = Session::default();
        let mut traceability = ReqTraceability::new();
        traceability.push_scenario(scenario_a(&mut session));

        let downstream = traceability.downstream(&session);
        let entry = downstream.get(&"REQ-1".parse().unwrap()).unwrap();

        assert_eq!(entry.scenarios.len(), 1);
        let scenario = &entry.scenarios[0];
        assert_eq!(scenario.name, "A");
        assert_eq!(scenario.comments, "Scenario A");
        assert_eq!(scenario.steps.len(), 1);
        assert_eq!(scenario.steps[0].number, 2);
        assert_eq!(scenario.steps[0].comments, "checked here");
    }

    #[test]
    fn step_only_links_open_an_unlinked_scenario_entry() {
        let mut session = Session::default();
        let scenario = session
            .define("B", (), |asm| {
                let step = asm.step("step010", noop)?;
                asm.session().verifies(Tracker::Step(step), ["REQ-2"])?;
                Ok(())
            })
            .unwrap();

        let downstream = ReqTraceability::new().downstream(&session);
        let entry = downstream.get(&"REQ-2".parse().unwrap()).unwrap();

        assert_eq!(entry.scenarios[0].scenario, scenario);
        assert_eq!(entry.scenarios[0].link, None);
        assert_eq!(entry.scenarios[0].comments, "");
        assert_eq!(entry.scenarios[0].steps.len(), 1);
    }

    #[test]
    fn subrefs_are_grouped_under_their_requirement() {
        let mut session = Session::default();
        let scenario = session
            .define("C", (), |asm| {
                asm.verifies(["REQ-1/b", "REQ-1/a", "REQ-2"])?;
                Ok(())
            })
            .unwrap();
        let mut traceability = ReqTraceability::new();
        traceability.push_scenario(scenario);

        let upstream = traceability.upstream(&session);
        let entry = upstream.get(scenario).unwrap();

        let ids: Vec<_> = entry.reqs.iter().map(|req| req.id.as_str()).collect();
        assert_eq!(ids, ["REQ-1", "REQ-2"]);
        assert_eq!(entry.reqs[0].link, None);
        let subrefs: Vec<_> = entry.reqs[0]
            .subrefs
            .iter()
            .map(|subref| subref.id.as_str())
            .collect();
        assert_eq!(subrefs, ["REQ-1/a", "REQ-1/b"]);
        assert!(entry.reqs[1].link.is_some());
    }

    #[test]
    fn downstream_and_upstream_agree() {
        let mut session = Session::default();
        let mut traceability = ReqTraceability::new();
        traceability.push_scenario(scenario_a(&mut session));
        let other = session
            .define("D", (), |asm| {
                asm.verifies(["REQ-1/x", "REQ-3"])?;
                Ok(())
            })
            .unwrap();
        traceability.push_scenario(other);

        let downstream = traceability.downstream(&session);
        let upstream = traceability.upstream(&session);

        let main: ReqRef = "REQ-1".parse().unwrap();
        for req_ref in session.req_db().all_refs() {
            let from_downstream: BTreeSet<_> = downstream
                .get(req_ref)
                .unwrap()
                .scenarios
                .iter()
                .map(|scenario| scenario.scenario)
                .collect();
            let from_upstream: BTreeSet<_> = upstream
                .0
                .iter()
                .filter(|scenario| {
                    scenario.reqs.iter().any(|req| {
                        (req.link.is_some() && req_ref.is_main() && req.req == *req_ref.req())
                            || req.subrefs.iter().any(|subref| subref.req_ref == *req_ref)
                    })
                })
                .map(|scenario| scenario.scenario)
                .collect();
            assert_eq!(from_downstream, from_upstream, "{req_ref}");
        }
        assert!(downstream.get(&main).is_some());
    }

    #[test]
    fn projections_serialize_keyed_maps() {
        let mut session = Session::default();
        let mut traceability = ReqTraceability::new();
        traceability.push_scenario(scenario_a(&mut session));

        let downstream = serde_json::to_value(traceability.downstream(&session)).unwrap();
        assert_eq!(
            downstream["REQ-1"]["scenarios"]["A"]["steps"]["step#2"]["name"],
            "step020"
        );
        let upstream = serde_json::to_value(traceability.upstream(&session)).unwrap();
        assert_eq!(upstream["A"]["reqs"]["REQ-1"]["comments"], "Scenario A");
    }
}
