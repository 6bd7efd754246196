use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jobhost_config::AppConfig;
use jobhost_core::{
    CronJob, DispatchMode, HandlerId, HandlerInstaller, HandlerRegistry, JobHostResult, Message,
    MessageHandler, ServiceContainer, WorkItem,
};
use jobhost_dispatcher::{Clock, CronScheduler, MessageDispatcher, SystemClock};
use jobhost_infrastructure::{ConsumerStats, MetricsCollector, WorkQueue, WorkQueueConsumer};

use crate::builtin;

/// 进程内后台任务宿主
///
/// 整个进程只持有一个实例：队列、处理器注册表、分发器和调度器都由它构造并共享，
/// 需要发布消息或入队的组件通过引用拿到它（或其中的 `Arc`）。
pub struct Application {
    config: AppConfig,
    queue: Arc<WorkQueue>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<MessageDispatcher>,
    scheduler: Arc<CronScheduler>,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self::with_services(config, ServiceContainer::new())
    }

    /// 使用已注册好服务的容器创建宿主，作用域处理器从该容器解析
    pub fn with_services(config: AppConfig, services: ServiceContainer) -> Self {
        Self::with_clock(config, services, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, services: ServiceContainer, clock: Arc<dyn Clock>) -> Self {
        info!(
            queue.capacity = ?config.queue.capacity,
            queue.full_policy = %config.queue.full_policy,
            cron.jobs = config.cron.jobs.len(),
            "初始化后台任务宿主"
        );
        let metrics = Arc::new(MetricsCollector::new());
        let queue = Arc::new(WorkQueue::with_metrics(&config.queue, Arc::clone(&metrics)));
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Arc::new(MessageDispatcher::with_metrics(
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::new(services),
            &config.message_bus,
            Arc::clone(&metrics),
        ));
        let scheduler = Arc::new(CronScheduler::with_clock(
            config.cron.clone(),
            clock,
            Arc::clone(&metrics),
        ));

        registry.install(&[builtin::install]);
        if config.cron.job(builtin::QUEUE_STATS_JOB).is_some() {
            scheduler.register_job(
                builtin::QUEUE_STATS_JOB,
                builtin::queue_stats_job(Arc::clone(&queue), Arc::downgrade(&dispatcher)),
            );
        }

        Self {
            config,
            queue,
            registry,
            dispatcher,
            scheduler,
            metrics,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<CronScheduler> {
        &self.scheduler
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub async fn enqueue(&self, item: WorkItem) -> JobHostResult<()> {
        self.queue.enqueue(item).await
    }

    pub async fn publish<M: Message>(
        &self,
        mode: DispatchMode,
        messages: Vec<M>,
    ) -> JobHostResult<usize> {
        self.dispatcher.publish(mode, messages).await
    }

    pub fn register_handler<M: Message>(&self, handler: Arc<dyn MessageHandler<M>>) -> HandlerId {
        self.registry.register_singleton(handler)
    }

    pub fn register_scoped_handler<M, H>(&self) -> HandlerId
    where
        M: Message,
        H: MessageHandler<M>,
    {
        self.registry.register_scoped::<M, H>()
    }

    pub fn install_handlers(&self, installers: &[HandlerInstaller]) {
        self.registry.install(installers);
    }

    pub fn unregister_handler<M: Message>(&self, id: HandlerId) -> bool {
        self.registry.unregister::<M>(id)
    }

    pub fn register_job(&self, job_name: impl Into<String>, job: Arc<dyn CronJob>) {
        self.scheduler.register_job(job_name, job);
    }

    /// 启动消费者和调度器，直到 `shutdown` 触发
    ///
    /// 关闭顺序：停止CRON循环，关闭队列，等待消费者排空（最长 `drain_timeout_seconds`），
    /// 超时后取消消费者，只等待在途工作项。
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ConsumerStats> {
        info!("启动后台任务宿主");

        // 消费者使用独立的令牌：关闭信号到达后它仍需排空队列
        let consumer_token = CancellationToken::new();
        let consumer = WorkQueueConsumer::with_metrics(
            Arc::clone(&self.queue),
            &self.config.queue,
            Arc::clone(&self.metrics),
        );
        let mut consumer_handle = tokio::spawn(consumer.run(consumer_token.clone()));

        if let Err(e) = self.scheduler.start(&shutdown) {
            error!(error = %e, "CRON调度器启动失败");
            consumer_token.cancel();
            self.queue.close();
            let _ = consumer_handle.await;
            return Err(e).context("启动CRON调度器失败");
        }

        shutdown.cancelled().await;
        info!("收到关闭信号，开始停止后台任务");

        self.scheduler.stop().await;
        self.queue.close();

        let drain_timeout = Duration::from_secs(self.config.queue.drain_timeout_seconds);
        let stats = match tokio::time::timeout(drain_timeout, &mut consumer_handle).await {
            Ok(joined) => joined.context("工作队列消费者异常退出")?,
            Err(_) => {
                warn!(
                    remaining = self.queue.len(),
                    timeout_seconds = drain_timeout.as_secs(),
                    "排空工作队列超时，放弃剩余工作项"
                );
                consumer_token.cancel();
                consumer_handle.await.context("工作队列消费者异常退出")?
            }
        };

        info!(
            processed = stats.processed,
            failed = stats.failed,
            healthy = self.scheduler.is_healthy(),
            "后台任务宿主已停止"
        );
        Ok(stats)
    }
}
