//! 基于工作队列的类型化发布/订阅分发
//!
//! 发布时按消息类型查出处理器快照，每个目标处理器入队一个工作项，
//! 该工作项按发布顺序依次处理这一批消息。同一处理器的工作项通过其投递通道
//! 按入队顺序执行，即使消费者并发运行工作项。处理器的错误、panic 和作用域解析失败
//! 都在工作项内部记录后吞掉，发布方只会看到入队本身的失败。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use jobhost_config::MessageBusConfig;
use jobhost_core::{
    DependencyScopeFactory, DispatchMode, HandlerDescriptor, HandlerRegistry, HandlerSource,
    LaneTicket, Message, WorkItem,
};
use jobhost_errors::{JobHostError, JobHostResult};
use jobhost_infrastructure::{JobTracer, MetricsCollector, StructuredLogger, WorkQueue};

pub struct MessageDispatcher {
    registry: Arc<HandlerRegistry>,
    queue: Arc<WorkQueue>,
    scopes: Arc<dyn DependencyScopeFactory>,
    log_message_body: bool,
    metrics: Arc<MetricsCollector>,
}

impl MessageDispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        queue: Arc<WorkQueue>,
        scopes: Arc<dyn DependencyScopeFactory>,
        config: &MessageBusConfig,
    ) -> Self {
        Self::with_metrics(registry, queue, scopes, config, Arc::new(MetricsCollector::new()))
    }

    pub fn with_metrics(
        registry: Arc<HandlerRegistry>,
        queue: Arc<WorkQueue>,
        scopes: Arc<dyn DependencyScopeFactory>,
        config: &MessageBusConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            queue,
            scopes,
            log_message_body: config.log_message_body,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// 发布一批同类型消息，返回入队的工作项数量
    ///
    /// 没有处理器时直接返回 0。`Queued` 模式只投递给第一个注册的处理器。
    /// 只有队列已满（拒绝策略）或已关闭时返回错误，此前已入队的工作项保留。
    pub async fn publish<M: Message>(
        &self,
        mode: DispatchMode,
        messages: Vec<M>,
    ) -> JobHostResult<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let descriptors = self.registry.lookup::<M>();
        if descriptors.is_empty() {
            debug!(
                message_type = M::message_type(),
                messages = messages.len(),
                "没有已注册的处理器，忽略消息"
            );
            return Ok(0);
        }

        let targets = match mode {
            DispatchMode::Broadcast => &descriptors[..],
            DispatchMode::Queued => &descriptors[..1],
        };
        let messages: Arc<[M]> = Arc::from(messages);

        let mut enqueued = 0;
        for descriptor in targets {
            let _reserved = descriptor.lane().reserve().await;
            let invocation = HandlerInvocation {
                ticket: descriptor.lane().ticket(),
                descriptor: Arc::clone(descriptor),
                messages: Arc::clone(&messages),
                scopes: Arc::clone(&self.scopes),
                log_message_body: self.log_message_body,
                metrics: Arc::clone(&self.metrics),
            };
            self.queue
                .enqueue(WorkItem::new(move |cancel| invocation.run(cancel)))
                .await?;
            enqueued += 1;
        }

        StructuredLogger::log_messages_published(
            M::message_type(),
            &mode.to_string(),
            messages.len(),
            enqueued,
        );
        Ok(enqueued)
    }

    pub async fn publish_one<M: Message>(
        &self,
        mode: DispatchMode,
        message: M,
    ) -> JobHostResult<usize> {
        self.publish(mode, vec![message]).await
    }

    pub async fn broadcast<M: Message>(&self, messages: Vec<M>) -> JobHostResult<usize> {
        self.publish(DispatchMode::Broadcast, messages).await
    }

    pub async fn queue<M: Message>(&self, messages: Vec<M>) -> JobHostResult<usize> {
        self.publish(DispatchMode::Queued, messages).await
    }
}

/// 一个处理器对一批消息的处理，作为单个工作项执行
struct HandlerInvocation<M: Message> {
    ticket: LaneTicket,
    descriptor: Arc<HandlerDescriptor<M>>,
    messages: Arc<[M]>,
    scopes: Arc<dyn DependencyScopeFactory>,
    log_message_body: bool,
    metrics: Arc<MetricsCollector>,
}

impl<M: Message> HandlerInvocation<M> {
    async fn run(self, cancel: CancellationToken) -> JobHostResult<()> {
        let handler_id = self.descriptor.id().to_string();
        let span = JobTracer::handler_span(self.descriptor.name(), &handler_id, M::message_type());

        async {
            tokio::select! {
                _ = self.ticket.wait_turn() => {}
                _ = cancel.cancelled() => {
                    debug!(
                        skipped = self.messages.len(),
                        "等待投递顺序时收到取消信号"
                    );
                    return;
                }
            }
            for (index, message) in self.messages.iter().enumerate() {
                if cancel.is_cancelled() {
                    debug!(
                        skipped = self.messages.len() - index,
                        "收到取消信号，跳过剩余消息"
                    );
                    break;
                }
                let outcome = AssertUnwindSafe(self.invoke(message, &cancel))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(JobHostError::handler_failed(
                            self.descriptor.name(),
                            panic_message(panic.as_ref()),
                        ))
                    });
                if let Err(error) = outcome {
                    self.report(&handler_id, message, &error);
                }
            }
        }
        .instrument(span)
        .await;

        Ok(())
    }

    async fn invoke(&self, message: &M, cancel: &CancellationToken) -> JobHostResult<()> {
        match self.descriptor.source() {
            HandlerSource::Singleton(handler) => handler.handle(message, cancel).await,
            HandlerSource::Scoped(resolve) => {
                // 作用域在本次调用结束时释放，失败路径同样如此
                let scope = self.scopes.create_scope()?;
                let handler = resolve(&*scope)?;
                handler.handle(message, cancel).await
            }
        }
    }

    fn report(&self, handler_id: &str, message: &M, error: &JobHostError) {
        self.metrics.record_handler_failure();
        let body = if self.log_message_body {
            serde_json::to_string(message).ok()
        } else {
            None
        };
        StructuredLogger::log_handler_failed(
            self.descriptor.name(),
            handler_id,
            M::message_type(),
            error,
            body.as_deref(),
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}
