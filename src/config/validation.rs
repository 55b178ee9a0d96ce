use reqwest::Method;
use tracing_subscriber::EnvFilter;

use crate::{
    config::models::{FetchConfig, GateConfig, LoggingConfig, SlotgateConfig},
    core::{Gate, MAX_ERROR_BUFFER},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid duration '{value}' for '{field}': {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported HTTP method '{method}'")]
    InvalidMethod { method: String },

    #[error("Invalid log level '{level}': {reason}")]
    InvalidLogLevel { level: String, reason: String },
}

/// All problems found in one validation pass.
#[derive(Debug, thiserror::Error, Clone)]
#[error("{} configuration error(s):\n{}", .0.len(), format_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire configuration, collecting every error.
    pub fn validate(config: &SlotgateConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        errors.extend(Self::validate_gate(&config.gate));
        errors.extend(Self::validate_fetch(&config.fetch));
        errors.extend(Self::validate_logging(&config.logging));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn validate_gate(gate: &GateConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if gate.capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "gate.capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        } else if gate.capacity > Gate::MAX_CAPACITY {
            errors.push(ValidationError::InvalidField {
                field: "gate.capacity".to_string(),
                message: format!("must be at most {}", Gate::MAX_CAPACITY),
            });
        }
        if gate.error_buffer == 0 {
            errors.push(ValidationError::InvalidField {
                field: "gate.error_buffer".to_string(),
                message: "must be at least 1".to_string(),
            });
        } else if gate.error_buffer > MAX_ERROR_BUFFER {
            errors.push(ValidationError::InvalidField {
                field: "gate.error_buffer".to_string(),
                message: format!("must be at most {MAX_ERROR_BUFFER}"),
            });
        }
        if gate.label.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "gate.label".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if let Err(e) = gate.shutdown_timeout() {
            errors.push(ValidationError::InvalidDuration {
                field: "gate.shutdown_timeout".to_string(),
                value: gate.shutdown_timeout.clone(),
                reason: e.to_string(),
            });
        }

        errors
    }

    fn validate_fetch(fetch: &FetchConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_method(&fetch.method) {
            errors.push(e);
        }
        match fetch.timeout() {
            Ok(timeout) if timeout.is_zero() => errors.push(ValidationError::InvalidDuration {
                field: "fetch.timeout".to_string(),
                value: fetch.timeout.clone(),
                reason: "must be greater than zero".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidDuration {
                field: "fetch.timeout".to_string(),
                value: fetch.timeout.clone(),
                reason: e.to_string(),
            }),
        }

        errors
    }

    fn validate_logging(logging: &LoggingConfig) -> Vec<ValidationError> {
        match EnvFilter::try_new(&logging.level) {
            Ok(_) => Vec::new(),
            Err(e) => vec![ValidationError::InvalidLogLevel {
                level: logging.level.clone(),
                reason: e.to_string(),
            }],
        }
    }

    /// Parse an HTTP method name, accepting only the standard verbs.
    pub fn validate_method(method: &str) -> Result<Method, ValidationError> {
        let upper = method.to_ascii_uppercase();
        match upper.as_str() {
            "GET" | "HEAD" | "POST" | "PUT" | "DELETE" | "PATCH" | "OPTIONS" => {
                Method::from_bytes(upper.as_bytes()).map_err(|_| ValidationError::InvalidMethod {
                    method: method.to_string(),
                })
            }
            _ => Err(ValidationError::InvalidMethod {
                method: method.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&SlotgateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SlotgateConfig::default();
        config.gate.capacity = 0;
        config.gate.shutdown_timeout = "forever".to_string();
        config.fetch.method = "BREW".to_string();
        config.fetch.timeout = "0s".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err().0;
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidMethod {
            method: "BREW".to_string()
        }));
    }

    #[test]
    fn test_oversized_gate_limits_rejected() {
        let mut config = SlotgateConfig::default();
        config.gate.capacity = usize::MAX;
        config.gate.error_buffer = usize::MAX;

        let errors = ConfigValidator::validate(&config).unwrap_err().0;
        let fields: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::InvalidField { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec!["gate.capacity", "gate.error_buffer"]);
    }

    #[test]
    fn test_method_case_insensitive() {
        assert_eq!(ConfigValidator::validate_method("head").unwrap(), Method::HEAD);
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = SlotgateConfig::default();
        config.logging.level = "slotgate=verbose".to_string();
        let errors = ConfigValidator::validate(&config).unwrap_err().0;
        assert!(matches!(errors[0], ValidationError::InvalidLogLevel { .. }));
    }
}
