use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

use jobhost_errors::{JobHostError, JobHostResult};

/// 秒级精度的CRON表达式
///
/// 六个字段：秒 分 时 日 月 周，可选第七个字段为年份。
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn new(cron_expr: &str) -> JobHostResult<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|e| JobHostError::invalid_cron(cron_expr, e.to_string()))?;

        Ok(Self {
            expression: cron_expr.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 严格晚于 `from` 的下一次触发时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    pub fn validate_cron_expression(cron_expr: &str) -> JobHostResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 距离下一次触发还有多久
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_after(now).map(|next| next - now)
    }

    /// 根据 `from` 之后相邻两次触发的间隔给出执行频率描述
    pub fn frequency_description(&self, from: DateTime<Utc>) -> String {
        let upcoming = self.upcoming_times(from, 2);
        if upcoming.len() >= 2 {
            let seconds = (upcoming[1] - upcoming[0]).num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }
}
