use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use jobhost_config::{FullQueuePolicy, QueueConfig};
use jobhost_core::WorkItem;
use jobhost_errors::{JobHostError, JobHostResult};
use tokio::sync::{mpsc, Semaphore, SemaphorePermit, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::observability::MetricsCollector;

/// 内存工作队列
///
/// 使用 Tokio 无界通道保存工作项，有界模式下通过信号量控制容量：
/// 每个排队中的工作项占用一个许可，出队时归还。
/// 生产者可以有多个，出队只由消费者进行；同一生产者的入队顺序即出队顺序。
pub struct WorkQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkItem>>,
    /// 容量控制信号量，无界队列为 None
    slots: Option<Semaphore>,
    capacity: Option<usize>,
    policy: FullQueuePolicy,
    depth: AtomicUsize,
    closed: AtomicBool,
    metrics: Arc<MetricsCollector>,
}

impl WorkQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self::with_metrics(config, Arc::new(MetricsCollector::new()))
    }

    pub fn unbounded() -> Self {
        Self::new(&QueueConfig::default())
    }

    pub fn bounded(capacity: usize, policy: FullQueuePolicy) -> Self {
        Self::new(&QueueConfig::bounded(capacity, policy))
    }

    pub fn with_metrics(config: &QueueConfig, metrics: Arc<MetricsCollector>) -> Self {
        info!(
            capacity = ?config.capacity,
            policy = %config.full_policy,
            "创建内存工作队列"
        );
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            slots: config.capacity.map(Semaphore::new),
            capacity: config.capacity,
            policy: config.full_policy,
            depth: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// 入队。有界队列已满时按策略挂起等待空位或立即返回 `QueueFull`。
    pub async fn enqueue(&self, item: WorkItem) -> JobHostResult<()> {
        if self.is_closed() {
            return Err(JobHostError::QueueClosed);
        }
        let permit = match (&self.slots, self.policy) {
            (None, _) => None,
            (Some(slots), FullQueuePolicy::Block) => Some(
                slots
                    .acquire()
                    .await
                    .map_err(|_| JobHostError::QueueClosed)?,
            ),
            (Some(slots), FullQueuePolicy::Reject) => Some(self.try_acquire_slot(slots)?),
        };
        self.push(item, permit)
    }

    /// 不挂起的入队：不论策略，队列已满即返回 `QueueFull`
    pub fn try_enqueue(&self, item: WorkItem) -> JobHostResult<()> {
        if self.is_closed() {
            return Err(JobHostError::QueueClosed);
        }
        let permit = match &self.slots {
            None => None,
            Some(slots) => Some(self.try_acquire_slot(slots)?),
        };
        self.push(item, permit)
    }

    /// 出队。队列关闭且已排空，或取消信号触发时返回 `None`。
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<WorkItem> {
        let mut receiver = tokio::select! {
            guard = self.receiver.lock() => guard,
            _ = cancel.cancelled() => return None,
        };
        let item = tokio::select! {
            item = receiver.recv() => item,
            _ = cancel.cancelled() => None,
        }?;

        if let Some(slots) = &self.slots {
            slots.add_permits(1);
        }
        let depth = self.depth.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        self.metrics.record_dequeued(depth);
        Some(item)
    }

    /// 停止接收新工作项，已入队的工作项仍可被取出
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(slots) = &self.slots {
            // 唤醒等待空位的生产者
            slots.close();
        }
        info!(remaining = self.len(), "工作队列已关闭");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn policy(&self) -> FullQueuePolicy {
        self.policy
    }

    fn try_acquire_slot<'a>(&self, slots: &'a Semaphore) -> JobHostResult<SemaphorePermit<'a>> {
        slots.try_acquire().map_err(|e| match e {
            TryAcquireError::NoPermits => {
                self.metrics.record_rejected();
                debug!(capacity = ?self.capacity, "工作队列已满，拒绝入队");
                JobHostError::QueueFull {
                    capacity: self.capacity.unwrap_or_default(),
                }
            }
            TryAcquireError::Closed => JobHostError::QueueClosed,
        })
    }

    fn push(&self, item: WorkItem, permit: Option<SemaphorePermit<'_>>) -> JobHostResult<()> {
        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = guard.as_ref() else {
            return Err(JobHostError::QueueClosed);
        };
        // 先计数再发送，保证消费者出队时计数不会下溢
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        if sender.send(item).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(JobHostError::QueueClosed);
        }

        // 许可随工作项留在队列中，出队时归还
        if let Some(permit) = permit {
            permit.forget();
        }
        self.metrics.record_enqueued(depth);
        Ok(())
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
