//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_database(config, &mut result);
        Self::validate_worker(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_database(config: &Config, result: &mut ValidationResult) {
        if config.database.path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "database.path",
                "Database path cannot be empty",
            ));
        }

        if config.database.busy_timeout_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "database.busy_timeout_ms",
                "busy_timeout_ms is 0, concurrent workers will see lock errors instead of waiting",
            ));
        }
    }

    fn validate_worker(config: &Config, result: &mut ValidationResult) {
        if config.worker.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "worker.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        }

        if config.worker.poll_interval_ms > 60_000 {
            result.add_warning(ValidationWarning::new(
                "worker.poll_interval_ms",
                "poll_interval_ms is very high (>60s), new jobs will wait long before pickup",
            ));
        }

        if config.worker.record_attempts == 0 {
            result.add_error(ValidationError::new(
                "worker.record_attempts",
                "record_attempts must be at least 1",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unrecognised log level '{}', treated as a filter directive",
                    config.logging.level
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
