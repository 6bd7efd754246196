//! 进程内后台任务宿主
//!
//! 把工作队列、消息分发器和CRON调度器组装成一个可嵌入的 [`Application`]。

pub mod app;
pub mod builtin;
pub mod shutdown;

pub use app::Application;
pub use shutdown::ShutdownManager;

pub use jobhost_config::AppConfig;
pub use jobhost_core::{
    job_fn, CancellationToken, CronJob, DispatchMode, HandlerId, JobContext, JobHostError,
    JobHostResult, Message, MessageHandler, ServiceContainer, WorkItem,
};
