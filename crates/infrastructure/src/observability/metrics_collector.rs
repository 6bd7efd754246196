//! Metrics collector for the background work host
//!
//! Handles are registered against whatever `metrics` recorder is installed
//! when the collector is created; without a recorder they are no-ops.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

pub struct MetricsCollector {
    // Work queue metrics
    work_items_enqueued_total: Counter,
    work_items_rejected_total: Counter,
    work_items_failed_total: Counter,
    work_queue_depth: Gauge,

    // Message bus metrics
    handler_failures_total: Counter,

    // Cron metrics
    cron_job_runs_total: Counter,
    cron_job_failures_total: Counter,
    cron_job_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            work_items_enqueued_total: counter!("jobhost_work_items_enqueued_total"),
            work_items_rejected_total: counter!("jobhost_work_items_rejected_total"),
            work_items_failed_total: counter!("jobhost_work_items_failed_total"),
            work_queue_depth: gauge!("jobhost_work_queue_depth"),
            handler_failures_total: counter!("jobhost_handler_failures_total"),
            cron_job_runs_total: counter!("jobhost_cron_job_runs_total"),
            cron_job_failures_total: counter!("jobhost_cron_job_failures_total"),
            cron_job_duration: histogram!("jobhost_cron_job_duration_seconds"),
        }
    }

    pub fn record_enqueued(&self, depth: usize) {
        self.work_items_enqueued_total.increment(1);
        self.work_queue_depth.set(depth as f64);
    }

    pub fn record_rejected(&self) {
        self.work_items_rejected_total.increment(1);
    }

    pub fn record_dequeued(&self, depth: usize) {
        self.work_queue_depth.set(depth as f64);
    }

    pub fn record_work_item_failure(&self) {
        self.work_items_failed_total.increment(1);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures_total.increment(1);
    }

    pub fn record_cron_run(&self, duration_seconds: f64, success: bool) {
        self.cron_job_runs_total.increment(1);
        self.cron_job_duration.record(duration_seconds);
        if !success {
            self.cron_job_failures_total.increment(1);
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
