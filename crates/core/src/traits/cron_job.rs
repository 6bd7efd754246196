use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use jobhost_errors::JobHostResult;

use crate::models::JobContext;

/// CRON任务的执行体
#[async_trait]
pub trait CronJob: Send + Sync + 'static {
    async fn execute(&self, context: JobContext) -> JobHostResult<()>;
}

/// 以闭包实现的CRON任务
pub struct FnJob {
    body: Box<dyn Fn(JobContext) -> BoxFuture<'static, JobHostResult<()>> + Send + Sync>,
}

#[async_trait]
impl CronJob for FnJob {
    async fn execute(&self, context: JobContext) -> JobHostResult<()> {
        (self.body)(context).await
    }
}

pub fn job_fn<F, Fut>(body: F) -> Arc<dyn CronJob>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobHostResult<()>> + Send + 'static,
{
    Arc::new(FnJob {
        body: Box::new(move |context| Box::pin(body(context))),
    })
}
