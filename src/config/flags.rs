//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

use crate::service::jobs::JobSelection;

#[derive(Debug, Clone, Parser)]
#[command(name = "app-supervisor")]
#[command(about = "Supervises long-running services and workers", long_about = None)]
pub struct Flags {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "APP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the job to run.
    #[arg(long, env = "APP_JOB")]
    pub job: Option<String>,

    /// Disable all jobs.
    #[arg(long, default_value_t = false)]
    pub disable_job: bool,

    /// Print version information and exit.
    #[arg(long, default_value_t = false)]
    pub version: bool,
}

impl Flags {
    /// Build the job selection from `--job` and `--disable-job`.
    pub fn job_selection(&self) -> JobSelection {
        JobSelection::new(self.job.clone(), self.disable_job)
    }
}
