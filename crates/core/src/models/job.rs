use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 单次CRON任务执行的上下文
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_name: String,
    /// 每次执行都重新生成
    pub correlation_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_name: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            correlation_id: Uuid::new_v4(),
            scheduled_at,
            started_at,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// 每个任务循环的运行状态
///
/// `Idle → Due → (WaitingForLock) → Running → Idle`；
/// 取消后进入 `Stopped`，调度本身出错进入 `Faulted`。
/// 未加锁的任务只要还有执行在跑就保持 `Running`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobLoopState {
    Idle,
    Due,
    WaitingForLock,
    Running,
    Stopped,
    Faulted(String),
}

impl JobLoopState {
    pub fn is_faulted(&self) -> bool {
        matches!(self, JobLoopState::Faulted(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobLoopState::Stopped | JobLoopState::Faulted(_))
    }
}

impl std::fmt::Display for JobLoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobLoopState::Idle => write!(f, "idle"),
            JobLoopState::Due => write!(f, "due"),
            JobLoopState::WaitingForLock => write!(f, "waiting_for_lock"),
            JobLoopState::Running => write!(f, "running"),
            JobLoopState::Stopped => write!(f, "stopped"),
            JobLoopState::Faulted(reason) => write!(f, "faulted: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context_correlation_ids_are_unique() {
        let now = Utc::now();
        let a = JobContext::new("report", now, now, CancellationToken::new());
        let b = JobContext::new("report", now, now, CancellationToken::new());
        assert_ne!(a.correlation_id, b.correlation_id);
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_job_loop_state_classification() {
        assert!(JobLoopState::Faulted("bad cron".to_string()).is_faulted());
        assert!(JobLoopState::Stopped.is_terminal());
        assert!(!JobLoopState::Running.is_terminal());
        assert_eq!(JobLoopState::WaitingForLock.to_string(), "waiting_for_lock");
    }
}
