use std::path::PathBuf;

use clap::Parser;
use scenario::{
    ReqTraceability, Session,
    storage::traceability_file::{self, TraceabilityKind},
};
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "Compute requirement traceability from scenario reports")]
pub struct Trace {
    /// Requirement database files (defaults to the configured ones)
    #[arg(long = "req-db", value_name = "FILE")]
    req_db: Vec<PathBuf>,

    /// Downstream traceability output (.json, .yml or .yaml)
    #[arg(long, value_name = "OUT")]
    downstream: Option<PathBuf>,

    /// Upstream traceability output (.json, .yml or .yaml)
    #[arg(long, value_name = "OUT")]
    upstream: Option<PathBuf>,

    /// Scenario reports, or directories searched for them
    #[arg(value_name = "REPORT", required = true)]
    reports: Vec<PathBuf>,
}

impl Trace {
    #[instrument(level = "debug", skip(self, session))]
    pub fn run(self, mut session: Session) -> anyhow::Result<()> {
        let mut traceability = ReqTraceability::new();
        traceability.load_data(&mut session, &self.req_db, &self.reports)?;

        let downstream = traceability.downstream(&session);
        let upstream = traceability.upstream(&session);

        if let Some(path) = &self.downstream {
            traceability_file::write(path, TraceabilityKind::Downstream, &downstream)?;
            println!("Downstream traceability written to {}", path.display());
        }
        if let Some(path) = &self.upstream {
            traceability_file::write(path, TraceabilityKind::Upstream, &upstream)?;
            println!("Upstream traceability written to {}", path.display());
        }

        let unverified: Vec<_> = downstream
            .0
            .iter()
            .filter(|entry| entry.scenarios.is_empty())
            .map(|entry| entry.id.as_str())
            .collect();
        println!(
            "{} scenarios, {}/{} requirement references verified",
            upstream.0.len(),
            downstream.0.len() - unverified.len(),
            downstream.0.len()
        );
        for id in unverified {
            println!("  not verified: {id}");
        }
        Ok(())
    }
}
