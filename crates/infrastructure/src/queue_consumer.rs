use std::sync::Arc;
use std::time::Duration;

use jobhost_config::QueueConfig;
use jobhost_core::WorkItem;
use jobhost_errors::JobHostResult;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::in_memory_queue::WorkQueue;
use crate::observability::{MetricsCollector, StructuredLogger};

/// 消费者退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub failed: u64,
}

/// 工作队列的唯一读取者
///
/// 每个工作项在独立的 Tokio 任务中执行，消费者不等待其完成就继续出队；
/// 任务的返回值和 panic 通过 `JoinSet` 回收并记录，任何一个工作项失败都不会终止循环。
/// `max_concurrent_items` 为 1 时退化为严格顺序执行。
pub struct WorkQueueConsumer {
    queue: Arc<WorkQueue>,
    limiter: Option<Arc<Semaphore>>,
    drain_timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl WorkQueueConsumer {
    pub fn new(queue: Arc<WorkQueue>, config: &QueueConfig) -> Self {
        Self::with_metrics(queue, config, Arc::new(MetricsCollector::new()))
    }

    pub fn with_metrics(
        queue: Arc<WorkQueue>,
        config: &QueueConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let limiter = (config.max_concurrent_items > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent_items)));
        Self {
            queue,
            limiter,
            drain_timeout: Duration::from_secs(config.drain_timeout_seconds),
            metrics,
        }
    }

    /// 运行直到队列关闭并排空，或 `shutdown` 触发
    ///
    /// 退出前等待在途工作项完成（最长 `drain_timeout`），超时的工作项继续在后台运行。
    pub async fn run(self, shutdown: CancellationToken) -> ConsumerStats {
        info!("工作队列消费者启动");
        let mut tasks: JoinSet<JobHostResult<()>> = JoinSet::new();
        let mut stats = ConsumerStats::default();

        loop {
            tokio::select! {
                biased;
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    self.observe(result, &mut stats);
                }
                next = self.next_item(&shutdown) => {
                    let Some((item, permit)) = next else {
                        break;
                    };
                    let cancel = shutdown.child_token();
                    tasks.spawn(async move {
                        let _permit = permit;
                        item.execute(cancel).await
                    });
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "等待在途工作项完成");
            let drain = async {
                while let Some(result) = tasks.join_next().await {
                    self.observe(result, &mut stats);
                }
            };
            if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
                warn!(
                    remaining = tasks.len(),
                    timeout_seconds = self.drain_timeout.as_secs(),
                    "等待在途工作项超时，剩余工作项将在后台继续执行"
                );
                tasks.detach_all();
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            "工作队列消费者已停止"
        );
        stats
    }

    async fn next_item(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<(WorkItem, Option<OwnedSemaphorePermit>)> {
        let permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                permit = Arc::clone(limiter).acquire_owned() => permit.ok(),
                _ = shutdown.cancelled() => return None,
            },
            None => None,
        };
        let item = self.queue.dequeue(shutdown).await?;
        Some((item, permit))
    }

    fn observe(&self, result: Result<JobHostResult<()>, JoinError>, stats: &mut ConsumerStats) {
        match result {
            Ok(Ok(())) => {
                stats.processed += 1;
            }
            Ok(Err(error)) => {
                stats.processed += 1;
                stats.failed += 1;
                self.metrics.record_work_item_failure();
                StructuredLogger::log_work_item_failed(&error);
            }
            Err(join_error) if join_error.is_panic() => {
                stats.processed += 1;
                stats.failed += 1;
                self.metrics.record_work_item_failure();
                let panic = join_error.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                StructuredLogger::log_work_item_panicked(&message);
            }
            Err(join_error) => {
                debug!(error = %join_error, "工作项任务被取消");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhost_errors::JobHostError;
    use std::sync::Mutex;

    fn config(max_concurrent_items: usize) -> QueueConfig {
        QueueConfig {
            max_concurrent_items,
            drain_timeout_seconds: 5,
            ..QueueConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let queue = Arc::new(WorkQueue::unbounded());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..6u32 {
            let seen = Arc::clone(&seen);
            queue
                .enqueue(WorkItem::new(move |_| async move {
                    seen.lock().unwrap().push(i);
                    match i {
                        1 => Err(JobHostError::internal("boom")),
                        3 => panic!("work item {i} panicked"),
                        _ => Ok(()),
                    }
                }))
                .await
                .unwrap();
        }
        queue.close();

        let stats = WorkQueueConsumer::new(Arc::clone(&queue), &config(0))
            .run(CancellationToken::new())
            .await;

        assert_eq!(stats, ConsumerStats { processed: 6, failed: 2 });
        assert_eq!(seen.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_sequential_consumer_preserves_fifo() {
        let queue = Arc::new(WorkQueue::unbounded());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50u32 {
            let seen = Arc::clone(&seen);
            queue
                .enqueue(WorkItem::new(move |_| async move {
                    tokio::task::yield_now().await;
                    seen.lock().unwrap().push(i);
                    Ok(())
                }))
                .await
                .unwrap();
        }
        queue.close();

        WorkQueueConsumer::new(Arc::clone(&queue), &config(1))
            .run(CancellationToken::new())
            .await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_shutdown_stops_without_closing_queue() {
        let queue = Arc::new(WorkQueue::unbounded());
        let shutdown = CancellationToken::new();
        let consumer = tokio::spawn(
            WorkQueueConsumer::new(Arc::clone(&queue), &config(0)).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.cancel();
        let stats = consumer.await.unwrap();

        assert_eq!(stats, ConsumerStats::default());
        assert!(!queue.is_closed());
    }

    #[tokio::test]
    async fn test_in_flight_items_finish_after_shutdown() {
        let queue = Arc::new(WorkQueue::unbounded());
        let shutdown = CancellationToken::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let finished = Arc::new(Mutex::new(false));

        {
            let finished = Arc::clone(&finished);
            queue
                .enqueue(WorkItem::new(move |_| async move {
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    *finished.lock().unwrap() = true;
                    Ok(())
                }))
                .await
                .unwrap();
        }

        let consumer = tokio::spawn(
            WorkQueueConsumer::new(Arc::clone(&queue), &config(0)).run(shutdown.clone()),
        );
        started_rx.await.unwrap();
        shutdown.cancel();

        let stats = consumer.await.unwrap();
        assert_eq!(stats.processed, 1);
        assert!(*finished.lock().unwrap());
    }
}
