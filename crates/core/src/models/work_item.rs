use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use jobhost_errors::JobHostResult;

pub type WorkFuture = BoxFuture<'static, JobHostResult<()>>;

/// 放入工作队列的一个不透明延迟执行单元
///
/// 队列看不到它的内容：没有标识、优先级或负载，只知道给它一个取消信号就能执行。
pub struct WorkItem {
    job: Box<dyn FnOnce(CancellationToken) -> WorkFuture + Send + 'static>,
}

impl WorkItem {
    pub fn new<F, Fut>(job: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = JobHostResult<()>> + Send + 'static,
    {
        Self {
            job: Box::new(move |cancel| Box::pin(job(cancel))),
        }
    }

    pub fn execute(self, cancel: CancellationToken) -> WorkFuture {
        (self.job)(cancel)
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhost_errors::JobHostError;

    #[tokio::test]
    async fn test_work_item_receives_cancellation_signal() {
        let token = CancellationToken::new();
        token.cancel();

        let item = WorkItem::new(|cancel| async move {
            if cancel.is_cancelled() {
                Err(JobHostError::internal("cancelled"))
            } else {
                Ok(())
            }
        });

        assert!(item.execute(token).await.is_err());
    }
}
