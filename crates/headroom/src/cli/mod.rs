//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use headroom_common::HostPaths;
use headroom_common::paths::{DEFAULT_CGROUP_ROOT, DEFAULT_PROC_ROOT};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::estimator::DEFAULT_MARGIN;
use crate::runtime::{GovernorConfig, GovernorEvent, Launcher};

/// Headroom - run a command while keeping a share of the machine free
#[derive(Parser, Debug)]
#[command(name = "headroom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fraction of CPU, memory and disk bandwidth kept free, in [0, 1)
    #[arg(long, env = "HEADROOM_MARGIN", default_value_t = DEFAULT_MARGIN)]
    pub margin: f64,

    /// Root of the cgroup v2 hierarchy
    #[arg(long, env = "HEADROOM_CGROUP_ROOT", default_value = DEFAULT_CGROUP_ROOT)]
    pub cgroup_root: PathBuf,

    /// Root of the proc filesystem
    #[arg(long, default_value = DEFAULT_PROC_ROOT)]
    pub proc_root: PathBuf,

    /// Empty directory where unmounted filesystems are mounted for the write benchmark
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Skip the disk benchmark; I/O is then not limited
    #[arg(long)]
    pub skip_benchmark: bool,

    /// Print every applied limit set to stderr as a JSON line
    #[arg(long)]
    pub report: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Governor configuration described by the flags.
    #[must_use]
    pub fn config(&self) -> GovernorConfig {
        let paths = HostPaths::new()
            .with_proc_root(self.proc_root.clone())
            .with_cgroup_root(self.cgroup_root.clone());

        let config = GovernorConfig::default()
            .with_paths(paths)
            .with_margin(self.margin)
            .with_skip_benchmark(self.skip_benchmark);

        match &self.scratch_dir {
            Some(dir) => config.with_scratch_dir(dir.clone()),
            None => config,
        }
    }

    /// Run the command and return the exit code to report.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be governed.
    pub async fn execute(self) -> Result<i32> {
        let launcher = Launcher::new(self.config());

        let reporter = self
            .report
            .then(|| tokio::spawn(report(launcher.events().subscribe())));

        let result = launcher.run(&self.command).await;

        // Closing the bus lets the reporter drain what is left and exit.
        drop(launcher);
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        Ok(result?)
    }
}

/// Print applied limits as JSON lines on stderr.
async fn report(mut events: broadcast::Receiver<GovernorEvent>) {
    loop {
        match events.recv().await {
            Ok(event @ GovernorEvent::LimitsApplied { .. }) => match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            },
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Report fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
