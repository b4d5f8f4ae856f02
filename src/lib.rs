//! Scenario-based testing with requirement traceability.
//!
//! Scenarios are ordered lists of steps. Each step declares actions and
//! expected results, and may be linked to the requirements it verifies.
//! A [`Session`] holds definitions, executions and the requirement
//! database; [`ReqTraceability`] projects the links both ways.
//!
//! ```
//! use scenario::{ExecutionStatus, Session};
//!
//! let mut session = Session::default();
//! let scenario = session
//!     .define("demo", 0_u32, |asm| {
//!         asm.title("Counting").verifies(["REQ-1"])?;
//!         asm.step("step010", |count, step| {
//!             if step.action("Count once.")? {
//!                 *count += 1;
//!             }
//!             if step.result("One is counted.")? {
//!                 step.ensure_eq(*count, 1, "count")?;
//!             }
//!             Ok(())
//!         })?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(session.execute(scenario).unwrap(), ExecutionStatus::Success);
//! ```

pub mod domain;
pub use domain::{
    CodeLocation, Config, ExecutionStatus, KnownIssue, Req, ReqDatabase, ReqId, ReqRef,
    ScenarioId, StepId, TestError, Tracker,
};

pub mod engine;
pub use engine::{ScenarioAssembly, Session, StepApi, StepBreak, StepResult};

pub mod storage;

pub mod traceability;
pub use traceability::ReqTraceability;
