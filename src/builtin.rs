//! 宿主自带的任务与消息处理器
//!
//! `queue_stats` 任务定期发布一条 [`QueueStatsReport`]，由 [`QueueStatsLogger`] 写入日志。
//! 只有在 `cron.jobs` 中配置了同名任务时才会运行。

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use jobhost_core::{
    job_fn, CancellationToken, CronJob, DispatchMode, HandlerRegistry, JobHostResult, Message,
    MessageHandler,
};
use jobhost_dispatcher::MessageDispatcher;
use jobhost_infrastructure::WorkQueue;

pub const QUEUE_STATS_JOB: &str = "queue_stats";

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatsReport {
    pub depth: usize,
    pub capacity: Option<usize>,
    pub closed: bool,
    pub message_types: Vec<&'static str>,
    pub reported_at: DateTime<Utc>,
}

impl Message for QueueStatsReport {
    fn message_type() -> &'static str {
        "queue_stats_report"
    }
}

pub struct QueueStatsLogger;

#[async_trait]
impl MessageHandler<QueueStatsReport> for QueueStatsLogger {
    async fn handle(&self, report: &QueueStatsReport, _: &CancellationToken) -> JobHostResult<()> {
        info!(
            queue.depth = report.depth,
            queue.capacity = ?report.capacity,
            queue.closed = report.closed,
            message_types = ?report.message_types,
            reported_at = %report.reported_at,
            "工作队列状态"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "queue_stats_logger"
    }
}

/// 启动注册列表中的内置处理器
pub fn install(registry: &HandlerRegistry) {
    registry.register_singleton::<QueueStatsReport>(Arc::new(QueueStatsLogger));
}

/// 采集队列状态并以广播方式发布
///
/// 持有分发器的弱引用，宿主释放后任务变成空操作。
pub fn queue_stats_job(queue: Arc<WorkQueue>, dispatcher: Weak<MessageDispatcher>) -> Arc<dyn CronJob> {
    job_fn(move |context| {
        let queue = Arc::clone(&queue);
        let dispatcher = dispatcher.upgrade();
        async move {
            let Some(dispatcher) = dispatcher else {
                debug!("消息分发器已释放，跳过队列状态上报");
                return Ok(());
            };
            let report = QueueStatsReport {
                depth: queue.len(),
                capacity: queue.capacity(),
                closed: queue.is_closed(),
                message_types: dispatcher.registry().registered_message_types(),
                reported_at: context.started_at,
            };
            dispatcher
                .publish_one(DispatchMode::Broadcast, report)
                .await
                .map(|_| ())
        }
    })
}
