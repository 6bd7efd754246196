//! Structured logging utilities
//!
//! Keeps the field names of recurring lifecycle events in one place so that
//! failures from the queue, handlers and cron jobs can be filtered uniformly.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jobhost_errors::JobHostError;

pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a work item that returned an error
    pub fn log_work_item_failed(error: &JobHostError) {
        error!(
            event = "work_item_failed",
            error = %error,
            "Work item failed"
        );
    }

    /// Log a work item that panicked
    pub fn log_work_item_panicked(panic_message: &str) {
        error!(
            event = "work_item_panicked",
            panic = panic_message,
            "Work item panicked"
        );
    }

    /// Log a swallowed handler failure; `body` is only present when enabled by config
    pub fn log_handler_failed(
        handler_name: &str,
        handler_id: &str,
        message_type: &str,
        error: &JobHostError,
        body: Option<&str>,
    ) {
        match body {
            Some(body) => error!(
                event = "handler_failed",
                handler.name = handler_name,
                handler.id = handler_id,
                message_type = message_type,
                message.body = body,
                error = %error,
                "Message handler failed"
            ),
            None => error!(
                event = "handler_failed",
                handler.name = handler_name,
                handler.id = handler_id,
                message_type = message_type,
                error = %error,
                "Message handler failed"
            ),
        }
    }

    pub fn log_messages_published(message_type: &str, mode: &str, messages: usize, handlers: usize) {
        debug!(
            event = "messages_published",
            message_type = message_type,
            dispatch.mode = mode,
            messages = messages,
            handlers = handlers,
            "Messages published"
        );
    }

    pub fn log_invalid_cron(job_name: &str, expression: &str, error: &JobHostError) {
        warn!(
            event = "cron_invalid_expression",
            job.name = job_name,
            job.cron_expression = expression,
            error = %error,
            "Cron expression could not be parsed; job disabled"
        );
    }

    pub fn log_job_started(job_name: &str, correlation_id: Uuid, scheduled_at: DateTime<Utc>) {
        info!(
            event = "cron_job_started",
            job.name = job_name,
            correlation_id = %correlation_id,
            job.scheduled_at = %scheduled_at,
            "Cron job started"
        );
    }

    pub fn log_job_completed(job_name: &str, correlation_id: Uuid, duration_ms: u64) {
        info!(
            event = "cron_job_completed",
            job.name = job_name,
            correlation_id = %correlation_id,
            duration_ms = duration_ms,
            "Cron job completed"
        );
    }

    pub fn log_job_failed(job_name: &str, correlation_id: Uuid, error: &JobHostError) {
        error!(
            event = "cron_job_failed",
            job.name = job_name,
            correlation_id = %correlation_id,
            error = %error,
            "Cron job failed"
        );
    }

    pub fn log_job_next_due(job_name: &str, next_due: DateTime<Utc>) {
        debug!(
            event = "cron_job_scheduled",
            job.name = job_name,
            job.next_due = %next_due,
            "Cron job next occurrence computed"
        );
    }
}
