//! Scenario execution reports.
//!
//! A report holds the definition of a scenario (name, attributes,
//! requirement links, steps with their actions and results) along with its
//! execution records. Sub-scenarios are nested in the action or result
//! execution that ran them. Aggregate counters are only written for main
//! scenarios.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    domain::{
        ActionResultDefinition, ActionResultExecution, ActionResultType, CodeLocation,
        ExecutionStatus, LinkSpec, ReqDbError, ScenarioDefinition, ScenarioExecution, ScenarioId,
        ScenarioStats, StepDefinition, StepExecution, StepId, StepKind, TestError,
        TestErrorRecord, TimeStatsRecord, Tracker,
    },
    engine::{self, Session},
    storage::{Error, json_error, read_to_string, write as write_file},
};

/// Serialized form of a scenario and its execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioReport {
    name: String,
    location: CodeLocation,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    reqs: Vec<ReqLinkRecord>,
    steps: Vec<StepReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ExecutionStatus>,
    #[serde(default)]
    errors: Vec<TestErrorRecord>,
    #[serde(default)]
    warnings: Vec<TestErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<TimeStatsRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<ScenarioStats>,
}

impl ScenarioReport {
    /// The scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The recorded status, if the scenario was executed.
    #[must_use]
    pub const fn status(&self) -> Option<ExecutionStatus> {
        self.status
    }

    /// The aggregate counters, for main scenarios.
    #[must_use]
    pub const fn stats(&self) -> Option<&ScenarioStats> {
        self.stats.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReqLinkRecord {
    #[serde(rename = "ref")]
    req_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    comments: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_true(value: &bool) -> bool {
    *value
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StepReport {
    location: CodeLocation,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    numbered: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reqs: Vec<ReqLinkRecord>,
    #[serde(default)]
    actions_results: Vec<ActionResultReport>,
    #[serde(default)]
    executions: Vec<StepExecutionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StepExecutionReport {
    number: usize,
    time: TimeStatsRecord,
    #[serde(default)]
    errors: Vec<TestErrorRecord>,
    #[serde(default)]
    warnings: Vec<TestErrorRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActionResultReport {
    #[serde(rename = "type")]
    kind: ActionResultType,
    description: String,
    #[serde(default)]
    executions: Vec<ActionResultExecutionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActionResultExecutionReport {
    time: TimeStatsRecord,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    errors: Vec<TestErrorRecord>,
    #[serde(default)]
    warnings: Vec<TestErrorRecord>,
    #[serde(default)]
    subscenarios: Vec<ScenarioReport>,
}

fn records<'a>(errors: impl IntoIterator<Item = &'a TestError>) -> Vec<TestErrorRecord> {
    errors.into_iter().map(TestErrorRecord::from).collect()
}

fn reqs_of(session: &Session, tracker: Tracker) -> Vec<ReqLinkRecord> {
    session
        .req_db()
        .tracker_links(tracker)
        .into_iter()
        .filter_map(|link| session.req_db().link(link))
        .map(|req_link| ReqLinkRecord {
            req_ref: req_link.req_ref().id(),
            comments: req_link.comments().to_string(),
        })
        .collect()
}

/// Builds the report of a scenario.
#[must_use]
pub fn encode(session: &Session, scenario: ScenarioId) -> ScenarioReport {
    encode_scenario(session, scenario, true)
}

fn encode_scenario(session: &Session, scenario: ScenarioId, is_main: bool) -> ScenarioReport {
    let store = session.store();
    let definition = &store[scenario];
    let execution = definition.execution();
    ScenarioReport {
        name: definition.name().to_string(),
        location: definition.location().clone(),
        attributes: definition.attributes().clone(),
        reqs: reqs_of(session, Tracker::Scenario(scenario)),
        steps: definition
            .steps()
            .iter()
            .map(|step| encode_step(session, *step))
            .collect(),
        status: execution.map(ScenarioExecution::status),
        errors: execution.map(|e| records(&e.errors)).unwrap_or_default(),
        warnings: execution.map(|e| records(&e.warnings)).unwrap_or_default(),
        time: execution.map(|e| TimeStatsRecord::from(&e.time)),
        stats: (is_main && execution.is_some()).then(|| store.scenario_stats(scenario)),
    }
}

fn encode_step(session: &Session, step: StepId) -> StepReport {
    let definition = &session.store()[step];
    StepReport {
        location: definition.location().clone(),
        numbered: definition.kind().is_numbered(),
        description: definition.description().map(ToString::to_string),
        reqs: reqs_of(session, Tracker::Step(step)),
        actions_results: definition
            .actions_results()
            .iter()
            .map(|action_result| ActionResultReport {
                kind: action_result.kind(),
                description: action_result.description().to_string(),
                executions: action_result
                    .executions()
                    .iter()
                    .map(|execution| ActionResultExecutionReport {
                        time: (&execution.time).into(),
                        evidence: execution.evidence.clone(),
                        errors: records(&execution.errors),
                        warnings: records(&execution.warnings),
                        subscenarios: execution
                            .subscenarios
                            .iter()
                            .map(|sub| encode_scenario(session, *sub, false))
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
        executions: definition
            .executions()
            .iter()
            .map(|execution| StepExecutionReport {
                number: execution.number,
                time: (&execution.time).into(),
                errors: records(&execution.errors),
                warnings: records(&execution.warnings),
            })
            .collect(),
    }
}

/// Rebuilds a scenario, with its sub-scenarios, into `session`.
///
/// With `feed_req_db`, unknown requirement references are added to the
/// requirement database; otherwise they are skipped with a warning.
///
/// # Errors
///
/// Returns an error if a requirement reference is malformed, or if the
/// step list is inconsistent.
#[instrument(level = "debug", skip_all, fields(scenario = report.name.as_str()))]
pub fn decode(
    session: &mut Session,
    report: ScenarioReport,
    feed_req_db: bool,
) -> Result<ScenarioId, engine::Error> {
    let ScenarioReport {
        name,
        location,
        attributes,
        reqs,
        steps,
        status: _,
        errors,
        warnings,
        time,
        stats: _,
    } = report;

    let mut definition = ScenarioDefinition::new(name, location);
    for (attribute, value) in attributes {
        definition.set_attribute(attribute, value);
    }
    if let Some(time) = time {
        let mut execution = ScenarioExecution::default();
        execution.time = time.into();
        execution.errors = errors.into_iter().map(Into::into).collect();
        execution.warnings = warnings.into_iter().map(Into::into).collect();
        definition.set_execution(execution);
    }
    let scenario = session.store_mut().insert_scenario(definition);
    decode_reqs(session, Tracker::Scenario(scenario), reqs, feed_req_db)?;

    for step_report in steps {
        let step = decode_step(session, step_report, feed_req_db)?;
        session.store_mut().add_step(scenario, step)?;
    }
    debug!("{} steps decoded", session.store()[scenario].steps().len());
    Ok(scenario)
}

fn decode_step(
    session: &mut Session,
    report: StepReport,
    feed_req_db: bool,
) -> Result<StepId, engine::Error> {
    let kind = if report.numbered {
        StepKind::Regular
    } else {
        StepKind::SectionDescription
    };
    let name = report.location.short_name().to_string();
    let mut definition = StepDefinition::new(name, kind, report.location);
    if let Some(description) = report.description {
        definition.set_description(description);
    }
    for action_result in report.actions_results {
        let mut decoded = ActionResultDefinition::new(action_result.kind, action_result.description);
        for execution in action_result.executions {
            let subscenarios = execution
                .subscenarios
                .into_iter()
                .map(|sub| decode(session, sub, feed_req_db))
                .collect::<Result<Vec<_>, _>>()?;
            decoded.executions_mut().push(ActionResultExecution {
                time: execution.time.into(),
                evidence: execution.evidence,
                errors: execution.errors.into_iter().map(Into::into).collect(),
                warnings: execution.warnings.into_iter().map(Into::into).collect(),
                subscenarios,
            });
        }
        definition.actions_results_mut().push(decoded);
    }
    for execution in report.executions {
        let mut decoded = StepExecution::started(execution.number);
        decoded.time = execution.time.into();
        decoded.errors = execution.errors.into_iter().map(Into::into).collect();
        decoded.warnings = execution.warnings.into_iter().map(Into::into).collect();
        definition.executions_mut().push(decoded);
    }

    let step = session.store_mut().insert_step(definition);
    decode_reqs(session, Tracker::Step(step), report.reqs, feed_req_db)?;
    Ok(step)
}

fn decode_reqs(
    session: &mut Session,
    tracker: Tracker,
    reqs: Vec<ReqLinkRecord>,
    feed_req_db: bool,
) -> Result<(), engine::Error> {
    for record in reqs {
        match session.resolve_ref(&record.req_ref, feed_req_db) {
            Ok(_) => {}
            Err(engine::Error::ReqDb(ReqDbError::UnknownReference(req_ref))) => {
                warn!("Unknown requirement reference {req_ref:?}");
                continue;
            }
            Err(error) => return Err(error),
        }
        let comments = (!record.comments.is_empty()).then_some(record.comments);
        session.verifies(
            tracker,
            [LinkSpec::Ref {
                req_ref: record.req_ref,
                comments,
            }],
        )?;
    }
    Ok(())
}

/// Writes the report of a scenario as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write(session: &Session, scenario: ScenarioId, path: &Path) -> Result<(), Error> {
    let report = encode(session, scenario);
    let content = serde_json::to_string_pretty(&report).map_err(json_error(path))?;
    write_file(path, &content)
}

/// Reads a JSON report into `session`, see [`decode`].
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a valid report, or
/// cannot be decoded.
pub fn read(session: &mut Session, path: &Path, feed_req_db: bool) -> Result<ScenarioId, Error> {
    let content = read_to_string(path)?;
    let report: ScenarioReport = serde_json::from_str(&content).map_err(json_error(path))?;
    Ok(decode(session, report, feed_req_db)?)
}
