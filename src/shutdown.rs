use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 持有一个根取消令牌，消费者循环和各个CRON任务循环都从它派生。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 触发关闭并在限定时间内等待 `completion` 完成，超时返回 None
    pub async fn shutdown_with_timeout<F>(&self, completion: F, limit: Duration) -> Option<F::Output>
    where
        F: Future,
    {
        self.shutdown();
        match timeout(limit, completion).await {
            Ok(output) => Some(output),
            Err(_) => {
                warn!(timeout_seconds = limit.as_secs(), "等待关闭完成超时");
                None
            }
        }
    }
}
