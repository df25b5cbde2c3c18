//! Governor server.
//!
//! Answers every TCP connection with this process's JSON service descriptor
//! followed by a newline, then closes it. Operators and registries use it to
//! discover what is running behind an address.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GovernorConfig;
use crate::error::BoxError;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::Listener;
use crate::service::{AppIdentity, Server, ServiceDescriptor, ServiceKind};

const ACCEPT_BACKOFF_BASE_MS: u64 = 10;
const ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

/// Delay before retrying after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let delay_ms = ACCEPT_BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(failures - 1));
    Duration::from_millis(delay_ms.min(ACCEPT_BACKOFF_MAX_MS))
}

pub struct GovernorServer {
    config: GovernorConfig,
    info: RwLock<ServiceDescriptor>,
    /// Cancelled to stop accepting.
    accepting: CancellationToken,
    /// Cancelled to drop open connections.
    abort: CancellationToken,
    tracker: ConnectionTracker,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl GovernorServer {
    /// Create a governor server describing `identity`.
    pub fn new(identity: &AppIdentity, config: GovernorConfig) -> Self {
        let info = ServiceDescriptor::new(identity)
            .with_name(format!("{}-governor", identity.name))
            .with_kind(ServiceKind::Governor)
            .with_address(config.bind_address.clone());
        let (bound, _) = watch::channel(None);

        Self {
            config,
            info: RwLock::new(info),
            accepting: CancellationToken::new(),
            abort: CancellationToken::new(),
            tracker: ConnectionTracker::new(),
            bound,
        }
    }

    /// Address actually bound, once `serve` has bound it.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.bound.subscribe();
        let addr = rx.wait_for(Option::is_some).await.ok().and_then(|addr| *addr);
        addr
    }

    /// Get the number of connections still being answered.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

#[async_trait]
impl Server for GovernorServer {
    async fn serve(&self) -> Result<(), BoxError> {
        if self.accepting.is_cancelled() {
            return Ok(());
        }

        let listener = Listener::bind(&self.config.bind_address, self.config.max_connections).await?;
        let addr = listener.local_addr()?;
        self.info.write().address = addr.to_string();
        self.bound.send_replace(Some(addr));

        let mut failures = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = self.accepting.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => {
                            failures = 0;
                            accepted
                        }
                        Err(e) => {
                            failures = failures.saturating_add(1);
                            let delay = accept_backoff(failures);
                            warn!(error = %e, attempt = failures, delay = ?delay, "Governor accept failed");
                            tokio::select! {
                                _ = self.accepting.cancelled() => break,
                                _ = tokio::time::sleep(delay) => continue,
                            }
                        }
                    };
                    let guard = self.tracker.track();
                    let info = self.info.read().clone();
                    let abort = self.abort.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        tokio::select! {
                            _ = abort.cancelled() => {
                                debug!(connection_id = %guard.id(), peer = %peer, "Connection dropped");
                            }
                            result = answer(stream, &info) => {
                                if let Err(e) = result {
                                    debug!(connection_id = %guard.id(), peer = %peer, error = %e, "Governor reply failed");
                                }
                            }
                        }
                    });
                }
            }
        }

        info!(address = %addr, "Governor stopped accepting");
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.accepting.cancel();
        self.abort.cancel();
        Ok(())
    }

    async fn graceful_stop(&self, token: CancellationToken) -> Result<(), BoxError> {
        self.accepting.cancel();
        tokio::select! {
            _ = self.tracker.wait_idle() => {
                debug!("Governor connections drained");
            }
            _ = token.cancelled() => {
                warn!(
                    open = self.tracker.active_count(),
                    "Graceful stop cancelled, dropping connections"
                );
                self.abort.cancel();
            }
        }
        Ok(())
    }

    fn info(&self) -> ServiceDescriptor {
        self.info.read().clone()
    }
}

async fn answer(mut stream: TcpStream, info: &ServiceDescriptor) -> Result<(), BoxError> {
    let mut payload = serde_json::to_vec(info)?;
    payload.push(b'\n');
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    Ok(())
}
