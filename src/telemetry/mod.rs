//! Logging and metrics capabilities used by the interceptors.
//!
//! Interceptors never talk to `tracing` or a metrics backend directly. They hold an
//! `Arc<dyn Logger>` and an `Arc<dyn Metrics>`, both of which default to null objects
//! ([`NoopLogger`], [`NoopMetrics`]) so the hot path carries no `Option` checks.
//!
//! - [`TracingLogger`] forwards log calls to `tracing`.
//! - [`MemoryLogger`] and [`MemoryMetrics`] keep bounded in-memory records for tests.
//! - Prometheus export lives in the `restline-prometheus` crate.
//!
//! ```rust
//! use restline::telemetry::{Field, Logger, MemoryLogger};
//!
//! let logger = MemoryLogger::new();
//! let scoped = logger.with(vec![Field::new("client", "dns")]);
//! scoped.info("ready", &[Field::new("endpoints", 4)]);
//!
//! let records = logger.records();
//! assert_eq!(records[0].message, "ready");
//! assert_eq!(records[0].field("client"), Some("dns"));
//! ```

pub mod log;
pub mod metrics;

pub use log::{Field, LogRecord, Logger, MemoryLogger, NoopLogger, TracingLogger};
pub use metrics::{MemoryMetrics, MetricEvent, Metrics, NoopMetrics};

use std::sync::Arc;

/// Default logger handle (discards everything).
pub fn noop_logger() -> Arc<dyn Logger> {
    Arc::new(NoopLogger)
}

/// Default metrics handle (discards everything).
pub fn noop_metrics() -> Arc<dyn Metrics> {
    Arc::new(NoopMetrics)
}
