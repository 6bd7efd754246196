use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 有界队列已满时的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FullQueuePolicy {
    /// 挂起生产者直到有空位
    #[default]
    Block,
    /// 立即拒绝
    Reject,
}

impl std::str::FromStr for FullQueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "block" => Ok(FullQueuePolicy::Block),
            "reject" => Ok(FullQueuePolicy::Reject),
            _ => Err(format!(
                "Invalid full queue policy: {s}. Valid policies: block, reject"
            )),
        }
    }
}

impl std::fmt::Display for FullQueuePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FullQueuePolicy::Block => write!(f, "block"),
            FullQueuePolicy::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// 队列容量，`None` 表示无界
    pub capacity: Option<usize>,
    pub full_policy: FullQueuePolicy,
    /// 消费者同时执行的工作项上限（0表示不限制）
    pub max_concurrent_items: usize,
    /// 关闭时等待在途工作项完成的时间
    pub drain_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            full_policy: FullQueuePolicy::Block,
            max_concurrent_items: 0,
            drain_timeout_seconds: 30,
        }
    }
}

impl QueueConfig {
    pub fn bounded(capacity: usize, full_policy: FullQueuePolicy) -> Self {
        Self {
            capacity: Some(capacity),
            full_policy,
            ..Self::default()
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some()
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if let Some(capacity) = self.capacity {
            ValidationUtils::validate_count(capacity, "queue.capacity", 1_000_000)?;
        }
        if self.max_concurrent_items > 10_000 {
            return Err(crate::ConfigError::Validation(
                "queue.max_concurrent_items must be less than or equal to 10000".to_string(),
            ));
        }
        ValidationUtils::validate_timeout_seconds(
            self.drain_timeout_seconds,
            "queue.drain_timeout_seconds",
        )?;
        Ok(())
    }
}
