use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 600;

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

fn default_true() -> bool {
    true
}

/// 单个CRON任务的配置，进程启动时加载后不再变化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronJobSettings {
    pub job_name: String,
    /// 秒级精度的6字段CRON表达式
    pub cron_expression: String,
    /// 检查任务是否到期的间隔，不是任务本身的执行周期
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// 为true时同一任务的两次执行不会重叠
    #[serde(default = "default_true")]
    pub lock_single_instance: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl CronJobSettings {
    pub fn new<N: Into<String>, E: Into<String>>(job_name: N, cron_expression: E) -> Self {
        Self {
            job_name: job_name.into(),
            cron_expression: cron_expression.into(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            lock_single_instance: true,
            enabled: true,
        }
    }

    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    pub fn with_lock_single_instance(mut self, lock: bool) -> Self {
        self.lock_single_instance = lock;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl ConfigValidator for CronJobSettings {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.job_name, "cron.jobs.job_name")?;
        // 表达式语法在调度器启动时才检查：解析失败只停用该任务
        ValidationUtils::validate_not_empty(&self.cron_expression, "cron.jobs.cron_expression")?;
        ValidationUtils::validate_interval_seconds(
            self.poll_interval_seconds,
            "cron.jobs.poll_interval_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CronConfig {
    pub enabled: bool,
    pub jobs: Vec<CronJobSettings>,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jobs: Vec::new(),
        }
    }
}

impl CronConfig {
    pub fn job(&self, job_name: &str) -> Option<&CronJobSettings> {
        self.jobs.iter().find(|job| job.job_name == job_name)
    }
}

impl ConfigValidator for CronConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.job_name.as_str()) {
                return Err(crate::ConfigError::Validation(format!(
                    "Duplicate cron job name: {}",
                    job.job_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_job_settings_defaults_from_toml() {
        let job: CronJobSettings = toml::from_str(
            r#"
            job_name = "cleanup"
            cron_expression = "0 0 3 * * *"
            "#,
        )
        .unwrap();

        assert_eq!(job.poll_interval_seconds, 600);
        assert!(job.lock_single_instance);
        assert!(job.enabled);
        assert_eq!(job.poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_cron_config_rejects_duplicates() {
        let config = CronConfig {
            enabled: true,
            jobs: vec![
                CronJobSettings::new("cleanup", "0 0 3 * * *"),
                CronJobSettings::new("cleanup", "0 0 4 * * *"),
            ],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate cron job name"));
    }

    #[test]
    fn test_cron_job_settings_validation() {
        assert!(CronJobSettings::new("ok", "* * * * * *").validate().is_ok());
        assert!(CronJobSettings::new("", "* * * * * *").validate().is_err());
        assert!(CronJobSettings::new("empty", " ").validate().is_err());
        assert!(CronJobSettings::new("zero", "* * * * * *")
            .with_poll_interval_seconds(0)
            .validate()
            .is_err());
        // 语法错误的表达式在配置层面是允许的
        assert!(CronJobSettings::new("broken", "not a cron").validate().is_ok());
    }

    #[test]
    fn test_cron_config_lookup() {
        let config = CronConfig {
            enabled: true,
            jobs: vec![CronJobSettings::new("report", "0 */5 * * * *")
                .with_lock_single_instance(false)],
        };
        assert!(!config.job("report").unwrap().lock_single_instance);
        assert!(config.job("missing").is_none());
    }
}
