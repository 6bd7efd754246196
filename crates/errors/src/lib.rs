use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobHostError {
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("工作队列已满 (容量: {capacity})")]
    QueueFull { capacity: usize },
    #[error("工作队列已关闭")]
    QueueClosed,
    #[error("依赖作用域无法解析服务: {type_name}")]
    ScopeResolution { type_name: String },
    #[error("消息处理器 {handler} 执行失败: {message}")]
    HandlerFailed { handler: String, message: String },
    #[error("任务执行错误: {0}")]
    JobExecution(String),
    #[error("任务未注册: {0}")]
    JobNotFound(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type JobHostResult<T> = Result<T, JobHostError>;

impl JobHostError {
    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }
    pub fn scope_resolution<S: Into<String>>(type_name: S) -> Self {
        Self::ScopeResolution {
            type_name: type_name.into(),
        }
    }
    pub fn handler_failed<H: Into<String>, M: Into<String>>(handler: H, message: M) -> Self {
        Self::HandlerFailed {
            handler: handler.into(),
            message: message.into(),
        }
    }
    pub fn job_failed<S: Into<String>>(msg: S) -> Self {
        Self::JobExecution(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 对所属循环而言不可恢复的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JobHostError::InvalidCron { .. }
                | JobHostError::Configuration(_)
                | JobHostError::Internal(_)
        )
    }

    /// 生产者可以稍后重试的错误（队列暂时已满）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobHostError::QueueFull { .. } | JobHostError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for JobHostError {
    fn from(err: serde_json::Error) -> Self {
        JobHostError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for JobHostError {
    fn from(err: anyhow::Error) -> Self {
        JobHostError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
