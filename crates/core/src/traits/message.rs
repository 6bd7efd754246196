//! 消息与消息处理器接口
//!
//! 消息按具体类型分组：注册表和分发器都以消息类型为单位工作。
//! 消息交给分发器之后被所有处理器共享只读访问，处理器不得修改消息。

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use jobhost_errors::JobHostResult;

/// "是一条消息"的标记能力
///
/// `Serialize` 约束用于在处理失败时按配置把消息体写入日志。
pub trait Message: Serialize + Send + Sync + 'static {
    fn message_type() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// 异步处理某一类型消息的处理器
#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync + 'static {
    async fn handle(&self, message: &M, cancel: &CancellationToken) -> JobHostResult<()>;

    /// 处理器标识，用于日志和按名称注销
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
