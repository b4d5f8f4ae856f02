use std::path::PathBuf;

mod reqs;
mod trace;

use anyhow::Context;
use clap::ArgAction;
use reqs::Reqs;
use scenario::{Config, Session};
use tracing::debug;
use trace::Trace;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let config = match &self.config {
            Some(path) => Config::load(path)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };
        debug!(?config);
        self.command.run(Session::new(config))
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Compute downstream and upstream requirement traceability
    ///
    /// Requirement databases and scenario reports are loaded, then the
    /// projections are written to the requested files.
    Trace(Trace),

    /// List requirement references with the number of their verifiers
    Reqs(Reqs),
}

impl Command {
    fn run(self, session: Session) -> anyhow::Result<()> {
        match self {
            Self::Trace(command) => command.run(session)?,
            Self::Reqs(command) => command.run(session)?,
        }
        Ok(())
    }
}
