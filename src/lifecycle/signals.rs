//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM and SIGQUIT
//! - Turn the first signal into a stop request
//! - Exit the process on a second signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Signals are forwarded through a channel so tests can inject them
//! - SIGQUIT asks for an immediate stop, the others for a graceful one
//! - The exit code of a forced exit is `128 + first signal number`

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle::shutdown::StopMode;
use crate::observability::metrics;

/// Termination signals the listener reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Quit,
}

impl ShutdownSignal {
    /// POSIX signal number.
    pub fn number(&self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 2,
            ShutdownSignal::Quit => 3,
            ShutdownSignal::Terminate => 15,
        }
    }

    /// Get the conventional signal name.
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Quit => "SIGQUIT",
            ShutdownSignal::Terminate => "SIGTERM",
        }
    }

    /// Get the stop mode this signal requests.
    pub fn stop_mode(&self) -> StopMode {
        match self {
            ShutdownSignal::Quit => StopMode::Immediate,
            ShutdownSignal::Interrupt | ShutdownSignal::Terminate => StopMode::Graceful,
        }
    }

    /// Exit code used when a second signal forces the process down.
    pub fn exit_code(&self) -> i32 {
        128 + self.number()
    }
}

/// Where the listener currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Listening,
    StopRequested(StopMode),
    ForceRequested,
}

/// Terminates the process with a code.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Called once with the stop mode of the first signal.
pub type StopFn = Arc<dyn Fn(StopMode) -> BoxFuture<'static, ()> + Send + Sync>;

/// Waits for termination signals and escalates on repeats.
pub struct SignalListener {
    rx: mpsc::Receiver<ShutdownSignal>,
    exit: ExitFn,
    source: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Listen on signals delivered through `rx`.
    pub fn from_channel(rx: mpsc::Receiver<ShutdownSignal>) -> Self {
        Self {
            rx,
            exit: Arc::new(process_exit),
            source: None,
        }
    }

    /// Listen on the process's real signals. Must be called inside a runtime.
    pub fn os() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(4);
        let source = spawn_os_source(tx)?;
        let mut listener = Self::from_channel(rx);
        listener.source = Some(source);
        Ok(listener)
    }

    /// Replace the function used for the forced exit.
    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit = Arc::new(exit);
        self
    }

    /// Start listening in the background.
    pub fn spawn(self, on_stop: StopFn) -> SignalHandle {
        let (state_tx, state_rx) = watch::channel(SignalState::Listening);
        let task = tokio::spawn(listen(self.rx, self.exit, on_stop, state_tx));
        SignalHandle {
            state: state_rx,
            task,
            source: self.source,
        }
    }
}

/// Handle to a running [`SignalListener`].
pub struct SignalHandle {
    state: watch::Receiver<SignalState>,
    task: JoinHandle<()>,
    source: Option<JoinHandle<()>>,
}

impl SignalHandle {
    /// Get the listener's current state.
    pub fn state(&self) -> SignalState {
        *self.state.borrow()
    }

    /// Stop listening. Later signals are ignored.
    pub fn abort(&self) {
        self.task.abort();
        if let Some(source) = &self.source {
            source.abort();
        }
    }
}

fn process_exit(code: i32) {
    std::process::exit(code)
}

async fn listen(
    mut rx: mpsc::Receiver<ShutdownSignal>,
    exit: ExitFn,
    on_stop: StopFn,
    state: watch::Sender<SignalState>,
) {
    let Some(first) = rx.recv().await else {
        return;
    };
    let mode = first.stop_mode();
    metrics::record_signal(first.name());
    info!(signal = first.name(), mode = ?mode, "Termination signal received, stopping");
    state.send_replace(SignalState::StopRequested(mode));
    tokio::spawn(on_stop(mode));

    let Some(second) = rx.recv().await else {
        return;
    };
    metrics::record_signal(second.name());
    let code = first.exit_code();
    warn!(
        first = first.name(),
        second = second.name(),
        code,
        "Second termination signal received, exiting immediately"
    );
    state.send_replace(SignalState::ForceRequested);
    exit(code);
}

#[cfg(unix)]
fn spawn_os_source(tx: mpsc::Sender<ShutdownSignal>) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        loop {
            let sig = tokio::select! {
                Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                Some(()) = sigquit.recv() => ShutdownSignal::Quit,
                else => break,
            };
            if tx.send(sig).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_os_source(tx: mpsc::Sender<ShutdownSignal>) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                break;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording_stop() -> (StopFn, Arc<Mutex<Vec<StopMode>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let on_stop: StopFn = Arc::new(move |mode: StopMode| -> BoxFuture<'static, ()> {
            let sink = sink.clone();
            Box::pin(async move { sink.lock().push(mode) })
        });
        (on_stop, calls)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_signal_numbers_and_modes() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
        assert_eq!(ShutdownSignal::Quit.stop_mode(), StopMode::Immediate);
        assert_eq!(ShutdownSignal::Terminate.stop_mode(), StopMode::Graceful);
    }

    #[tokio::test]
    async fn test_first_signal_requests_stop() {
        let (tx, rx) = mpsc::channel(4);
        let (on_stop, calls) = recording_stop();
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorded = exits.clone();

        let handle = SignalListener::from_channel(rx)
            .with_exit(move |code| recorded.lock().push(code))
            .spawn(on_stop);

        tx.send(ShutdownSignal::Terminate).await.unwrap();
        settle().await;

        assert_eq!(*calls.lock(), vec![StopMode::Graceful]);
        assert_eq!(handle.state(), SignalState::StopRequested(StopMode::Graceful));
        assert!(exits.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_signal_exits_with_first_signal_code() {
        let (tx, rx) = mpsc::channel(4);
        let (on_stop, calls) = recording_stop();
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorded = exits.clone();

        let handle = SignalListener::from_channel(rx)
            .with_exit(move |code| recorded.lock().push(code))
            .spawn(on_stop);

        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        tx.send(ShutdownSignal::Terminate).await.unwrap();
        settle().await;

        assert_eq!(*exits.lock(), vec![130]);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(handle.state(), SignalState::ForceRequested);
    }

    #[tokio::test]
    async fn test_quit_requests_immediate_stop() {
        let (tx, rx) = mpsc::channel(4);
        let (on_stop, calls) = recording_stop();
        let _handle = SignalListener::from_channel(rx)
            .with_exit(|_| {})
            .spawn(on_stop);

        tx.send(ShutdownSignal::Quit).await.unwrap();
        settle().await;
        assert_eq!(*calls.lock(), vec![StopMode::Immediate]);
    }
}
