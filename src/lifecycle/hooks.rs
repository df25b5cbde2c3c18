//! Hook stages run around the stop sequence.
//!
//! # Responsibilities
//! - Hold one ordered, drain-once stack of callbacks per stage
//! - Run a stage in LIFO order, logging failures without halting
//!
//! # Design Decisions
//! - Stages are fixed when the registry is built
//! - Running a stage empties it, so a second run is a no-op

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;

use crate::error::{BoxError, SupervisorError};
use crate::observability::metrics;

/// A fallible zero-argument callback.
pub type Hook = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Named lifecycle points that accept hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Runs before any server or worker is asked to stop.
    BeforeStop,
    /// Runs once every stop operation has completed.
    AfterStop,
}

impl HookStage {
    /// Both stages, in the order the stop sequence visits them.
    pub const ALL: [HookStage; 2] = [HookStage::BeforeStop, HookStage::AfterStop];

    /// Get the stage's config name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeStop => "before_stop",
            HookStage::AfterStop => "after_stop",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookStage {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before_stop" => Ok(HookStage::BeforeStop),
            "after_stop" => Ok(HookStage::AfterStop),
            other => Err(SupervisorError::UnknownStage(other.to_string())),
        }
    }
}

/// An ordered stack of callbacks that is drained when run.
#[derive(Default)]
pub struct HookStack {
    hooks: Mutex<Vec<Hook>>,
}

impl HookStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append callbacks; the last one pushed runs first.
    pub fn push<I>(&self, hooks: I)
    where
        I: IntoIterator<Item = Hook>,
    {
        self.hooks.lock().extend(hooks);
    }

    /// Get the number of hooks not yet run.
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    /// True when no hooks are left to run.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every callback in LIFO order and empty the stack.
    ///
    /// Returns the number of callbacks that failed. `label` only tags logs.
    pub fn clean(&self, label: &str) -> usize {
        // Take the callbacks out first so a hook may register more without deadlocking.
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let total = hooks.len();
        let mut failed = 0;

        for (idx, hook) in hooks.into_iter().rev().enumerate() {
            if let Err(e) = hook() {
                failed += 1;
                metrics::record_hook_failure(label);
                tracing::error!(stage = label, hook = total - idx, error = %e, "Hook failed");
            }
        }

        if total > 0 {
            tracing::debug!(stage = label, total, failed, "Hook stack drained");
        }
        failed
    }
}

/// Registry of hook stacks keyed by stage.
pub struct HookRegistry {
    stages: HashMap<HookStage, HookStack>,
}

impl HookRegistry {
    /// Build a registry that accepts hooks for the given stages only.
    pub fn with_stages(stages: &[HookStage]) -> Self {
        Self {
            stages: stages.iter().map(|s| (*s, HookStack::new())).collect(),
        }
    }

    /// Append hooks to `stage`.
    pub fn register_hooks<I>(&self, stage: HookStage, hooks: I) -> Result<(), SupervisorError>
    where
        I: IntoIterator<Item = Hook>,
    {
        let stack = self
            .stages
            .get(&stage)
            .ok_or(SupervisorError::StageNotFound(stage))?;
        stack.push(hooks);
        Ok(())
    }

    /// Append a single hook to `stage`.
    pub fn register<F>(&self, stage: HookStage, hook: F) -> Result<(), SupervisorError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.register_hooks(stage, [Box::new(hook) as Hook])
    }

    /// Run and drain `stage`. Unknown stages are ignored.
    pub fn run_stage(&self, stage: HookStage) -> usize {
        match self.stages.get(&stage) {
            Some(stack) => stack.clean(stage.as_str()),
            None => 0,
        }
    }

    /// Number of hooks waiting in `stage`.
    pub fn pending(&self, stage: HookStage) -> usize {
        self.stages.get(&stage).map_or(0, HookStack::len)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_stages(&HookStage::ALL)
    }
}
