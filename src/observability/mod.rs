//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events → logging.rs (EnvFilter + fmt layer)
//!     → metrics.rs (counters, gauges)
//!
//! Log destination chain:
//!     fmt layer → LogSink → sink.rs (BufferedSink, optional)
//!                        → rotate.rs (RotatingFile) | stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Log writes land in memory; disk I/O happens on capacity pressure or the flush timer
//! - Metrics are cheap (no recorder installed means no-op)

pub mod logging;
pub mod metrics;
pub mod rotate;
pub mod sink;

pub use logging::{LogGuard, LogSink, LoggingError};
pub use sink::{buffer, BufferedSink, CloseHandle, SharedSink, WriteSync};
