use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use scenario::{ReqRef, ReqTraceability, Session};
use tracing::instrument;

#[derive(Debug, Parser)]
#[command(about = "List requirement references and their verifiers")]
pub struct Reqs {
    /// Requirement database files (defaults to the configured ones)
    #[arg(long = "req-db", value_name = "FILE")]
    req_db: Vec<PathBuf>,

    /// Regular expression matched against reference identifiers
    #[arg(long)]
    regex: Option<String>,

    /// Show only references no scenario or step verifies
    #[arg(long)]
    unverified: bool,

    /// Scenario reports, or directories searched for them
    #[arg(value_name = "REPORT")]
    reports: Vec<PathBuf>,
}

impl Reqs {
    #[instrument(level = "debug", skip(self, session))]
    pub fn run(self, mut session: Session) -> anyhow::Result<()> {
        let regex = self
            .regex
            .as_deref()
            .map(|pattern| Regex::new(pattern).with_context(|| format!("invalid regex: {pattern}")))
            .transpose()?;

        ReqTraceability::new().load_data(&mut session, &self.req_db, &self.reports)?;

        let rows = rows(&session, regex.as_ref(), self.unverified);
        if rows.is_empty() {
            println!("No requirement reference found.");
            return Ok(());
        }
        let width = rows.iter().map(|row| row.id.len()).max().unwrap_or_default();
        for row in rows {
            println!("{:<width$}  {:>3}  {}", row.id, row.verifiers, row.title);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Row {
    id: String,
    verifiers: usize,
    title: String,
}

fn rows(session: &Session, regex: Option<&Regex>, unverified: bool) -> Vec<Row> {
    session
        .req_db()
        .all_refs()
        .filter(|req_ref| regex.is_none_or(|regex| regex.is_match(&req_ref.id())))
        .map(|req_ref: &ReqRef| Row {
            id: req_ref.id(),
            verifiers: session.verifiers(req_ref).len(),
            title: req_ref
                .is_main()
                .then(|| session.req_db().req(req_ref.req()))
                .flatten()
                .map(|req| req.title().to_string())
                .unwrap_or_default(),
        })
        .filter(|row| !unverified || row.verifiers == 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use scenario::{Req, Tracker};

    use super::*;

    fn session() -> Session {
        let mut session = Session::default();
        session
            .req_db_mut()
            .push_req(Req::new("REQ-1".parse().unwrap()).with_title("First"))
            .unwrap();
        session
            .define("A", (), |asm| {
                let step = asm.step("step010", |(), _| Ok(()))?;
                asm.session().verifies(Tracker::Step(step), ["REQ-1/a"])?;
                asm.verifies(["REQ-2"])
            })
            .unwrap();
        session
    }

    #[test]
    fn rows_count_verifiers() {
        let rows = rows(&session(), None, false);
        let summary: Vec<_> = rows
            .iter()
            .map(|row| (row.id.as_str(), row.verifiers, row.title.as_str()))
            .collect();
        assert_eq!(
            summary,
            [("REQ-1", 0, "First"), ("REQ-1/a", 1, ""), ("REQ-2", 1, "")]
        );
    }

    #[test]
    fn rows_are_filtered() {
        let regex = Regex::new("^REQ-1").unwrap();
        let ids: Vec<_> = rows(&session(), Some(&regex), true)
            .into_iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, ["REQ-1"]);
    }
}
