//! Observability module
//!
//! Structured log events, spans and metrics shared by the queue, the message
//! dispatcher and the cron scheduler.

pub mod job_tracer;
pub mod metrics_collector;
pub mod structured_logger;

pub use job_tracer::JobTracer;
pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
