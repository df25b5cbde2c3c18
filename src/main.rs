//! Application supervisor entry point.
//!
//! ```text
//!   flags ──▶ config ──▶ identity ──▶ logging
//!                                        │
//!                                        ▼
//!   SIGINT/SIGTERM/SIGQUIT ──▶ ┌──────────────────────┐
//!                              │      Supervisor      │
//!                              │  startup → run → stop │
//!                              └──────────┬───────────┘
//!                                         │
//!                    ┌────────────────────┼────────────────────┐
//!                    ▼                    ▼                    ▼
//!               governor server       workers               jobs
//! ```

use std::sync::Arc;

use clap::Parser;

use app_supervisor::config::{load_config, Flags};
use app_supervisor::observability::logging;
use app_supervisor::{AppIdentity, BoxError, GovernorServer, Server, Supervisor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let flags = Flags::parse();
    let config = load_config(flags.config.as_deref())?;
    let identity = config.app.apply(AppIdentity::from_env());

    if flags.version {
        println!("{}", identity.version_banner());
        return Ok(());
    }

    let log_guard = logging::init(&config.logger)?;

    let supervisor = Arc::new(Supervisor::new(identity).with_job_selection(flags.job_selection()));
    // On an early return the cleanup is dropped unrun; dropping the guard still flushes.
    supervisor.register_cleanup(move || log_guard.close().map_err(BoxError::from));
    supervisor.startup(std::iter::empty())?;

    let mut servers: Vec<Arc<dyn Server>> = Vec::new();
    if config.governor.enabled {
        servers.push(Arc::new(GovernorServer::new(
            supervisor.identity(),
            config.governor.clone(),
        )));
    }

    supervisor.run(servers).await?;
    Ok(())
}
