//! Job selection.
//!
//! A process runs at most the jobs named on its command line, and none at
//! all when jobs are disabled.

/// Selected job name and global disable switch, usually from CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSelection {
    /// Name of the job to run, if any.
    pub job: Option<String>,
    /// Disable every job regardless of `job`.
    pub disabled: bool,
}

/// Outcome of matching a job against the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDecision {
    /// The job is selected and should be registered.
    Selected,
    /// Jobs are disabled for this process.
    Disabled,
    /// No job name was supplied.
    NoSelection,
    /// Another job was selected.
    NotSelected,
}

impl JobSelection {
    /// Create a selection for `job`, or one that disables all jobs.
    pub fn new(job: Option<String>, disabled: bool) -> Self {
        Self { job, disabled }
    }

    /// Decide whether the job called `name` may run.
    pub fn decide(&self, name: &str) -> JobDecision {
        if self.disabled {
            return JobDecision::Disabled;
        }
        match self.job.as_deref() {
            None | Some("") => JobDecision::NoSelection,
            Some(selected) if selected == name => JobDecision::Selected,
            Some(_) => JobDecision::NotSelected,
        }
    }
}
