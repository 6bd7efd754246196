use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Span factories for cron runs and message handler invocations
pub struct JobTracer;

impl JobTracer {
    pub fn cron_run_span(
        job_name: &str,
        correlation_id: Uuid,
        scheduled_at: DateTime<Utc>,
    ) -> tracing::Span {
        tracing::info_span!(
            "cron_job_run",
            job.name = job_name,
            job.correlation_id = %correlation_id,
            job.scheduled_at = %scheduled_at,
        )
    }

    pub fn handler_span(handler_name: &str, handler_id: &str, message_type: &str) -> tracing::Span {
        tracing::debug_span!(
            "handle_messages",
            handler.name = handler_name,
            handler.id = handler_id,
            message_type = message_type,
        )
    }
}
