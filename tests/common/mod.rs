//! Shared fixtures for supervisor integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use app_supervisor::lifecycle::{ShutdownSignal, SignalListener};
use app_supervisor::{
    AppIdentity, BoxError, Job, Registry, Server, ServiceDescriptor, Worker,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Ordered record of everything the fixtures observed.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.lock().iter().any(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> usize {
        self.0
            .lock()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event:?} not recorded: {:?}", self.events()))
    }

    /// Poll until `event` shows up.
    pub async fn wait_for(&self, event: &str) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !self.contains(event) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {event:?}: {:?}", self.events()));
    }

    /// A hook that records `event`.
    pub fn hook(&self, event: &'static str) -> impl FnOnce() -> Result<(), BoxError> + Send + 'static {
        let log = self.clone();
        move || {
            log.push(event);
            Ok(())
        }
    }
}

pub fn identity() -> AppIdentity {
    AppIdentity::from_lookup(|key| (key == "APP_NAME").then(|| "fixture".to_string()))
}

/// Server whose serve loop blocks until it is stopped.
pub struct MockServer {
    name: &'static str,
    log: EventLog,
    stopped: CancellationToken,
    /// When set, graceful stop blocks until this is cancelled.
    release: Option<CancellationToken>,
}

impl MockServer {
    pub fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
            stopped: CancellationToken::new(),
            release: None,
        }
    }

    pub fn blocking(name: &'static str, log: &EventLog, release: CancellationToken) -> Self {
        Self {
            release: Some(release),
            ..Self::new(name, log)
        }
    }

    pub fn shared(self) -> Arc<dyn Server> {
        Arc::new(self)
    }
}

#[async_trait]
impl Server for MockServer {
    async fn serve(&self) -> Result<(), BoxError> {
        self.log.push(format!("serve {}", self.name));
        self.stopped.cancelled().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.log.push(format!("stop {}", self.name));
        self.stopped.cancel();
        Ok(())
    }

    async fn graceful_stop(&self, _token: CancellationToken) -> Result<(), BoxError> {
        self.log.push(format!("graceful_stop {}", self.name));
        if let Some(release) = &self.release {
            release.cancelled().await;
        }
        self.stopped.cancel();
        Ok(())
    }

    fn info(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(&identity())
            .with_name(self.name)
            .with_address(format!("{}.local:80", self.name))
    }
}

pub struct MockWorker {
    name: &'static str,
    log: EventLog,
}

impl MockWorker {
    pub fn new(name: &'static str, log: &EventLog) -> Arc<dyn Worker> {
        Arc::new(Self {
            name,
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Worker for MockWorker {
    async fn stop(&self) -> Result<(), BoxError> {
        self.log.push(format!("stop {}", self.name));
        Ok(())
    }
}

pub struct MockJob {
    name: &'static str,
    log: EventLog,
}

impl MockJob {
    pub fn new(name: &'static str, log: &EventLog) -> Arc<dyn Job> {
        Arc::new(Self {
            name,
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Job for MockJob {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self) -> Result<(), BoxError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.log.push(format!("job {}", self.name));
        Ok(())
    }
}

/// Job that panics instead of returning.
pub struct PanickingJob;

#[async_trait]
impl Job for PanickingJob {
    fn name(&self) -> &str {
        "explode"
    }

    async fn run(&self) -> Result<(), BoxError> {
        panic!("job exploded")
    }
}

pub struct RecordingRegistry {
    log: EventLog,
}

impl RecordingRegistry {
    pub fn new(log: &EventLog) -> Arc<dyn Registry> {
        Arc::new(Self { log: log.clone() })
    }
}

#[async_trait]
impl Registry for RecordingRegistry {
    async fn register(&self, info: &ServiceDescriptor) -> Result<(), BoxError> {
        self.log.push(format!("register {}", info.name));
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.log.push("registry close");
        Err("registry unreachable".into())
    }
}

/// Signal listener fed by a channel, with exits recorded instead of performed.
pub fn test_signals() -> (SignalListener, mpsc::Sender<ShutdownSignal>, Arc<Mutex<Vec<i32>>>) {
    let (tx, rx) = mpsc::channel(4);
    let exits = Arc::new(Mutex::new(Vec::new()));
    let recorded = exits.clone();
    let listener = SignalListener::from_channel(rx).with_exit(move |code| recorded.lock().push(code));
    (listener, tx, exits)
}
