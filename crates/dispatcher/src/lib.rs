//! 消息分发与CRON调度
//!
//! `MessageDispatcher` 把类型化消息扇出到工作队列，
//! `CronScheduler` 为每个配置的任务运行独立的调度循环。

pub mod clock;
pub mod cron_utils;
pub mod message_dispatcher;
pub mod scheduler;

pub use clock::{Clock, SystemClock, TokioClock};
pub use cron_utils::CronSchedule;
pub use message_dispatcher::MessageDispatcher;
pub use scheduler::CronScheduler;
