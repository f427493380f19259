use crate::utils::error::{Result, YardError};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 收集所有違規項目後一次回報，而不是遇到第一個就失敗
#[derive(Debug, Default, Clone)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn non_empty_string(&mut self, field_name: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(format!("{} cannot be empty or whitespace-only", field_name));
        }
    }

    pub fn max_chars(&mut self, field_name: &str, value: &str, max: usize) {
        let len = value.trim().chars().count();
        if len > max {
            self.push(format!(
                "{} must be at most {} characters (got {})",
                field_name, max, len
            ));
        }
    }

    pub fn at_least(&mut self, field_name: &str, value: u64, min_value: u64) {
        if value < min_value {
            self.push(format!("{} must be at least {} (got {})", field_name, min_value, value));
        }
    }

    pub fn one_of(&mut self, field_name: &str, value: &str, allowed: &[&str]) {
        if !allowed.contains(&value.trim().to_ascii_lowercase().as_str()) {
            self.push(format!(
                "{} '{}' is not recognized (expected one of: {})",
                field_name,
                value,
                allowed.join(", ")
            ));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(YardError::validation(self.messages))
        }
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(YardError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(YardError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(YardError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}
