//! Application supervisor.
//!
//! # Responsibilities
//! - Own registered servers, workers and jobs
//! - Drive initialize → startup → run → stop, each transition at most once
//! - Compose the coordinator, hook stages and signal listener
//!
//! # Design Decisions
//! - One supervisor per process, built at entry and shared as `Arc<Supervisor>`
//! - `stop` and `graceful_stop` share one guard; the loser waits for the winner
//! - Hook and operation failures never interrupt the stop sequence
//! - No software timeout: escalation only comes from a second signal

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{BoxError, SupervisorError};
use crate::lifecycle::cycle::{Cycle, OperationFailure};
use crate::lifecycle::hooks::{Hook, HookRegistry, HookStack, HookStage};
use crate::lifecycle::shutdown::{OneShot, StopMode};
use crate::lifecycle::signals::{SignalListener, StopFn};
use crate::lifecycle::startup::{self, Step};
use crate::service::{
    AppIdentity, Job, JobDecision, JobSelection, NopRegistry, Registry, Server, Worker,
};

/// Where the supervisor is in its lifetime. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    StoppingGraceful,
    StoppingForced,
    Stopped,
}

impl LifecycleState {
    /// True for both stopping states and `Stopped`.
    pub fn is_stopping(&self) -> bool {
        *self >= LifecycleState::StoppingGraceful
    }
}

/// Process lifecycle supervisor.
pub struct Supervisor {
    identity: AppIdentity,
    selection: JobSelection,
    cycle: Cycle,
    hooks: HookRegistry,
    cleanups: HookStack,
    servers: RwLock<Vec<Arc<dyn Server>>>,
    workers: RwLock<Vec<Arc<dyn Worker>>>,
    jobs: RwLock<Vec<Arc<dyn Job>>>,
    registry: RwLock<Arc<dyn Registry>>,
    init_once: Once,
    startup_once: Once,
    stop_once: OneShot,
    state: watch::Sender<LifecycleState>,
}

impl Supervisor {
    /// Create a supervisor for `identity`.
    pub fn new(identity: AppIdentity) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            identity,
            selection: JobSelection::default(),
            cycle: Cycle::new(),
            hooks: HookRegistry::default(),
            cleanups: HookStack::new(),
            servers: RwLock::new(Vec::new()),
            workers: RwLock::new(Vec::new()),
            jobs: RwLock::new(Vec::new()),
            registry: RwLock::new(Arc::new(NopRegistry)),
            init_once: Once::new(),
            startup_once: Once::new(),
            stop_once: OneShot::new(),
            state,
        }
    }

    /// Filter later [`Supervisor::job`] calls through `selection`.
    pub fn with_job_selection(mut self, selection: JobSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Get the application identity.
    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Failures of dispatched serve and stop operations so far.
    pub fn failures(&self) -> Vec<OperationFailure> {
        self.cycle.failures()
    }

    /// Run startup steps in order, stopping at the first failure.
    ///
    /// The banner and state change happen once; `steps` run on every call.
    pub fn startup<I>(&self, steps: I) -> Result<(), SupervisorError>
    where
        I: IntoIterator<Item = Step>,
    {
        self.initialize();
        self.startup_once.call_once(|| {
            info!(
                name = %self.identity.name,
                instance = %self.identity.instance,
                region = %self.identity.region,
                zone = %self.identity.zone,
                deployment = %self.identity.deployment,
                version = env!("CARGO_PKG_VERSION"),
                "Application starting"
            );
        });
        startup::run_serial(steps).map_err(SupervisorError::Startup)
    }

    /// Register servers. Nothing starts until [`Supervisor::run`].
    pub fn serve<I>(&self, servers: I)
    where
        I: IntoIterator<Item = Arc<dyn Server>>,
    {
        self.servers.write().extend(servers);
    }

    /// Register a background worker.
    pub fn schedule(&self, worker: Arc<dyn Worker>) {
        self.workers.write().push(worker);
    }

    /// Register a job if the job selection allows it.
    pub fn job(&self, job: Arc<dyn Job>) -> JobDecision {
        let decision = self.selection.decide(job.name());
        match decision {
            JobDecision::Selected => {
                info!(job = job.name(), "Job selected");
                self.jobs.write().push(job);
            }
            JobDecision::Disabled => info!(job = job.name(), "Jobs disabled, skipping"),
            JobDecision::NoSelection => error!(job = job.name(), "No job name given, skipping"),
            JobDecision::NotSelected => debug!(job = job.name(), "Job not selected"),
        }
        decision
    }

    /// Replace the registry servers are announced to.
    pub fn set_registry(&self, registry: Arc<dyn Registry>) {
        *self.registry.write() = registry;
    }

    /// Register hooks for `stage`.
    pub fn register_hooks<I>(&self, stage: HookStage, hooks: I) -> Result<(), SupervisorError>
    where
        I: IntoIterator<Item = Hook>,
    {
        self.hooks.register_hooks(stage, hooks)
    }

    /// Register a single hook for `stage`.
    pub fn register_hook<F>(&self, stage: HookStage, hook: F) -> Result<(), SupervisorError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.hooks.register(stage, hook)
    }

    /// Register a callback that runs when [`Supervisor::run`] returns, on every path.
    pub fn register_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.cleanups.push([Box::new(cleanup) as Hook]);
    }

    /// Run until stopped, listening on the process's termination signals.
    pub async fn run(self: &Arc<Self>, extra: Vec<Arc<dyn Server>>) -> Result<(), SupervisorError> {
        match SignalListener::os() {
            Ok(listener) => self.run_with_signals(listener, extra).await,
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
                self.clean();
                Err(SupervisorError::Signal(e))
            }
        }
    }

    /// Run until stopped, taking termination signals from `listener`.
    pub async fn run_with_signals(
        self: &Arc<Self>,
        listener: SignalListener,
        extra: Vec<Arc<dyn Server>>,
    ) -> Result<(), SupervisorError> {
        let _cleanup = CleanupOnExit(self);
        self.initialize();
        self.serve(extra);
        self.advance(LifecycleState::Running);

        let signals = listener.spawn(self.stop_handler());
        self.run_jobs().await;
        self.start_servers().await;

        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Stopped).await;
        signals.abort();

        info!(failures = self.cycle.failures().len(), "Application stopped");
        Ok(())
    }

    /// Stop everything immediately.
    ///
    /// The stop sequence runs on its own task; dropping this future does not abort it.
    pub async fn stop(self: &Arc<Self>) {
        self.stop_with(StopMode::Immediate, None).await;
    }

    /// Stop servers gracefully, giving up when `token` is cancelled.
    ///
    /// Workers still get the immediate stop.
    pub async fn graceful_stop(self: &Arc<Self>, token: CancellationToken) {
        self.stop_with(StopMode::Graceful, Some(token)).await;
    }

    async fn stop_with(self: &Arc<Self>, mode: StopMode, token: Option<CancellationToken>) {
        let supervisor = Arc::clone(self);
        let ran = self
            .stop_once
            .run(move || async move { supervisor.stop_sequence(mode, token).await })
            .await;
        if !ran {
            debug!(mode = ?mode, "Stop already performed");
        }
    }

    async fn stop_sequence(&self, mode: StopMode, token: Option<CancellationToken>) {
        self.advance(match mode {
            StopMode::Graceful => LifecycleState::StoppingGraceful,
            StopMode::Immediate => LifecycleState::StoppingForced,
        });
        info!(mode = ?mode, "Stopping application");

        self.hooks.run_stage(HookStage::BeforeStop);

        let registry = self.registry.read().clone();
        if let Err(e) = registry.close().await {
            error!(error = %e, "Failed to deregister from registry");
        }

        let servers = self.servers.read().clone();
        for server in servers {
            let label = server.info().label();
            let dispatched = match (&token, mode) {
                (Some(token), StopMode::Graceful) => {
                    let token = token.clone();
                    self.cycle
                        .dispatch(format!("graceful stop {label}"), async move {
                            server.graceful_stop(token).await
                        })
                }
                _ => self
                    .cycle
                    .dispatch(format!("stop {label}"), async move { server.stop().await }),
            };
            if let Err(e) = dispatched {
                warn!(server = %label, error = %e, "Stop not dispatched");
            }
        }

        let workers = self.workers.read().clone();
        for (idx, worker) in workers.into_iter().enumerate() {
            if let Err(e) = self
                .cycle
                .dispatch(format!("stop worker {idx}"), async move { worker.stop().await })
            {
                warn!(worker = idx, error = %e, "Stop not dispatched");
            }
        }

        self.cycle.wait().await;
        self.hooks.run_stage(HookStage::AfterStop);
        self.cycle.close();

        self.advance(LifecycleState::Stopped);
        info!(mode = ?mode, "Application stop complete");
    }

    fn initialize(&self) {
        self.init_once.call_once(|| {
            self.advance(LifecycleState::Initialized);
            debug!(name = %self.identity.name, "Supervisor initialized");
        });
    }

    fn advance(&self, to: LifecycleState) {
        self.state.send_if_modified(|state| {
            if *state < to {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    fn clean(&self) {
        let failed = self.cleanups.clean("cleanup");
        if failed > 0 {
            warn!(failed, "Cleanup callbacks failed");
        }
    }

    fn stop_handler(self: &Arc<Self>) -> StopFn {
        let supervisor = Arc::downgrade(self);
        Arc::new(move |mode: StopMode| -> BoxFuture<'static, ()> {
            let supervisor = supervisor.clone();
            Box::pin(async move {
                let Some(supervisor) = supervisor.upgrade() else {
                    return;
                };
                match mode {
                    StopMode::Graceful => supervisor.graceful_stop(CancellationToken::new()).await,
                    StopMode::Immediate => supervisor.stop().await,
                }
            })
        })
    }

    async fn run_jobs(&self) {
        let jobs = self.jobs.read().clone();
        if jobs.is_empty() {
            return;
        }

        let results = join_all(jobs.iter().map(|job| async move {
            info!(job = job.name(), "Job started");
            (job.name(), AssertUnwindSafe(job.run()).catch_unwind().await)
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(Ok(())) => info!(job = name, "Job finished"),
                Ok(Err(e)) => error!(job = name, error = %e, "Job failed"),
                Err(_) => error!(job = name, "Job panicked"),
            }
        }
    }

    async fn start_servers(&self) {
        let servers = self.servers.read().clone();
        let registry = self.registry.read().clone();

        for server in servers {
            if self.state().is_stopping() {
                warn!("Stop requested, remaining servers not started");
                break;
            }

            let info = server.info();
            let label = info.label();
            let serving = Arc::clone(&server);
            if let Err(e) = self
                .cycle
                .dispatch(format!("serve {label}"), async move { serving.serve().await })
            {
                warn!(server = %label, error = %e, "Server not started");
                break;
            }
            info!(server = %label, name = %info.name, kind = %info.kind, "Server started");

            if let Err(e) = registry.register(&info).await {
                error!(server = %label, error = %e, "Failed to register server");
            }
        }
    }
}

/// Runs the cleanup stack when [`Supervisor::run_with_signals`] exits, however it exits.
struct CleanupOnExit<'a>(&'a Supervisor);

impl Drop for CleanupOnExit<'_> {
    fn drop(&mut self) {
        self.0.clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::service::ServiceDescriptor;

    fn identity() -> AppIdentity {
        AppIdentity::from_lookup(|_| None)
    }

    struct FailingWorker;

    #[async_trait]
    impl Worker for FailingWorker {
        async fn stop(&self) -> Result<(), BoxError> {
            Err("worker stuck".into())
        }
    }

    struct NamedJob(&'static str, Arc<AtomicUsize>);

    #[async_trait]
    impl Job for NamedJob {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self) -> Result<(), BoxError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct IdleServer;

    #[async_trait]
    impl Server for IdleServer {
        async fn serve(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn graceful_stop(&self, _token: CancellationToken) -> Result<(), BoxError> {
            Ok(())
        }

        fn info(&self) -> ServiceDescriptor {
            ServiceDescriptor::new(&identity()).with_address("127.0.0.1:1")
        }
    }

    #[test]
    fn test_startup_moves_to_initialized_and_fails_fast() {
        let supervisor = Supervisor::new(identity());
        assert_eq!(supervisor.state(), LifecycleState::Uninitialized);

        let err = supervisor
            .startup([
                Box::new(|| -> Result<(), BoxError> { Ok(()) }) as Step,
                Box::new(|| -> Result<(), BoxError> { Err("no database".into()) }) as Step,
            ])
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Startup(_)));
        assert_eq!(supervisor.state(), LifecycleState::Initialized);
    }

    #[tokio::test]
    async fn test_stop_runs_hooks_in_order_and_collects_failures() {
        let supervisor = Arc::new(Supervisor::new(identity()));
        let order = Arc::new(Mutex::new(Vec::new()));

        for (stage, name) in [
            (HookStage::BeforeStop, "before"),
            (HookStage::AfterStop, "after"),
        ] {
            let order = order.clone();
            supervisor
                .register_hook(stage, move || {
                    order.lock().push(name);
                    Ok(())
                })
                .unwrap();
        }
        supervisor.schedule(Arc::new(FailingWorker));
        supervisor.serve([Arc::new(IdleServer) as Arc<dyn Server>]);

        supervisor.stop().await;

        assert_eq!(*order.lock(), vec!["before", "after"]);
        assert_eq!(supervisor.state(), LifecycleState::Stopped);
        let failures = supervisor.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, "worker stuck");

        // The second stop is a no-op and hooks stay drained.
        supervisor.graceful_stop(CancellationToken::new()).await;
        assert_eq!(order.lock().len(), 2);
    }

    #[test]
    fn test_job_registration_follows_selection() {
        let runs = Arc::new(AtomicUsize::new(0));
        let supervisor = Supervisor::new(identity())
            .with_job_selection(JobSelection::new(Some("reindex".into()), false));

        assert_eq!(
            supervisor.job(Arc::new(NamedJob("reindex", runs.clone()))),
            JobDecision::Selected
        );
        assert_eq!(
            supervisor.job(Arc::new(NamedJob("backfill", runs))),
            JobDecision::NotSelected
        );
        assert_eq!(supervisor.jobs.read().len(), 1);
    }

    #[test]
    fn test_state_never_moves_backwards() {
        let supervisor = Supervisor::new(identity());
        supervisor.advance(LifecycleState::StoppingForced);
        supervisor.advance(LifecycleState::Running);
        assert_eq!(supervisor.state(), LifecycleState::StoppingForced);
        assert!(supervisor.state().is_stopping());
    }
}
