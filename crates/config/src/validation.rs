use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// Common validation helpers shared by the config sections
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate an interval in seconds (1 second .. 1 day)
    pub fn validate_interval_seconds(seconds: u64, field_name: &str) -> ConfigResult<()> {
        if seconds == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if seconds > 86_400 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 86400"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds > 3600 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// Validate that a count is positive and below `max`
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("nightly", "cron.job_name").is_ok());
        assert!(ValidationUtils::validate_not_empty("   ", "cron.job_name").is_err());
    }

    #[test]
    fn test_validate_interval_seconds() {
        assert!(ValidationUtils::validate_interval_seconds(600, "poll").is_ok());
        assert!(ValidationUtils::validate_interval_seconds(0, "poll").is_err());
        assert!(ValidationUtils::validate_interval_seconds(86_401, "poll").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(10, "queue.capacity", 100).is_ok());
        let err = ValidationUtils::validate_count(0, "queue.capacity", 100).unwrap_err();
        assert!(err.to_string().contains("queue.capacity must be greater than 0"));
        assert!(ValidationUtils::validate_count(101, "queue.capacity", 100).is_err());
    }
}
