use crate::{ModelOpsError, ModelOpsResult};

/// 配置校验
pub trait ConfigValidator {
    fn validate(&self) -> ModelOpsResult<()>;
}

/// 通用校验工具
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_not_empty(value: &str, field_name: &str) -> ModelOpsResult<()> {
        if value.trim().is_empty() {
            return Err(ModelOpsError::Configuration(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    pub fn validate_interval_seconds(seconds: u64, field_name: &str) -> ModelOpsResult<()> {
        if seconds == 0 {
            return Err(ModelOpsError::Configuration(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if seconds > 86_400 {
            return Err(ModelOpsError::Configuration(format!(
                "{field_name} must be less than or equal to 86400"
            )));
        }
        Ok(())
    }

    pub fn validate_timeout_seconds(seconds: u64, field_name: &str) -> ModelOpsResult<()> {
        if seconds == 0 {
            return Err(ModelOpsError::Configuration(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if seconds > 3600 {
            return Err(ModelOpsError::Configuration(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    pub fn validate_one_of(value: &str, allowed: &[&str], field_name: &str) -> ModelOpsResult<()> {
        if !allowed.contains(&value) {
            return Err(ModelOpsError::Configuration(format!(
                "Invalid {field_name}: {value}. Valid options: {allowed:?}"
            )));
        }
        Ok(())
    }
}
