//! The scenario engine.
//!
//! A [`Session`] owns everything a run needs. Scenarios are assembled with
//! [`Session::define`], then run with [`Session::execute`]: a build pass
//! first walks every step body to collect descriptions, actions and
//! results, then the step loop executes them. Step bodies talk to the
//! runner through [`StepApi`].

mod assembly;
pub use assembly::{STEP_PREFIX, ScenarioAssembly, Section};

mod assertions;

mod error;
pub use error::{ContextError, Error};

mod runner;
pub use runner::ExecutionMode;

mod session;
pub use session::Session;

mod stack;
pub use stack::{BuildingContext, ScenarioStack};

mod step_api;
pub use step_api::{StepApi, StepBreak, StepResult};
