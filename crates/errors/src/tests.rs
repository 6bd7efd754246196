#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_error_display() {
        let cron_error = JobHostError::invalid_cron("bad", "expected 6 fields");
        assert_eq!(
            cron_error.to_string(),
            "无效的CRON表达式: bad - expected 6 fields"
        );

        let full = JobHostError::QueueFull { capacity: 8 };
        assert_eq!(full.to_string(), "工作队列已满 (容量: 8)");

        assert_eq!(JobHostError::QueueClosed.to_string(), "工作队列已关闭");

        let scope = JobHostError::scope_resolution("OrderHandler");
        assert_eq!(scope.to_string(), "依赖作用域无法解析服务: OrderHandler");

        let handler = JobHostError::handler_failed("audit", "boom");
        assert_eq!(handler.to_string(), "消息处理器 audit 执行失败: boom");
    }

    #[test]
    fn test_error_classification() {
        assert!(JobHostError::invalid_cron("x", "y").is_fatal());
        assert!(JobHostError::config_error("x").is_fatal());
        assert!(!JobHostError::QueueClosed.is_fatal());

        assert!(JobHostError::QueueFull { capacity: 1 }.is_retryable());
        assert!(JobHostError::Timeout("drain".to_string()).is_retryable());
        assert!(!JobHostError::job_failed("x").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: JobHostError = json_err.into();
        assert!(matches!(err, JobHostError::Serialization(_)));

        let err: JobHostError = anyhow::anyhow!("wrapped").into();
        match err {
            JobHostError::Internal(msg) => assert_eq!(msg, "wrapped"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
