//! Domain models for scenario definitions, executions and requirement
//! traceability.
//!
//! This module contains the pure data model: requirements and their
//! references and links, the requirement database, scenario and step
//! definitions with their execution records, test errors and the
//! configuration. It knows nothing about how scenarios are driven.

mod action_result;
pub use action_result::{ActionResultDefinition, ActionResultExecution, ActionResultType};

mod config;
pub use config::{Config, Severity};

mod location;
pub use location::{CodeLocation, InvalidLocationError, QUALNAME_SEPARATOR};

/// Requirement identifiers, requirements and requirement references.
pub mod req;
pub use req::{InvalidReqIdError, Req, ReqId, ReqRef, ReqRefError};

mod req_db;
pub use req_db::{ReqDatabase, ReqDbError};

mod req_link;
pub use req_link::{LinkId, LinkSpec, ReqLink};

/// Scenario definitions and executions.
pub mod scenario;
pub use scenario::{
    DefinitionError, ScenarioDefinition, ScenarioExecution, ScenarioId, StepOrder,
};

mod stats;
pub(crate) use stats::TimeStatsRecord;
pub use stats::{ExecTotalStats, ExecutionStatus, ScenarioStats, TimeStats};

mod step;
pub use step::{StepDefinition, StepExecution, StepId, StepKind, StepLookupError, StepSpec};

mod store;
pub use store::ScenarioStore;

mod test_error;
pub use test_error::{KnownIssue, TestError, TestErrorKind, TestErrorRecord};

/// Requirement trackers: scenarios and steps.
pub mod tracker;
pub use tracker::{Tracker, TrackerKey, Verifier};
