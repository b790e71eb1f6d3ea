use crate::config::Config;
use crate::error::ConfigError;

/// Smallest stack wait that still leaves the debugger time to answer.
pub const MIN_STACK_TIMEOUT_MS: u64 = 100;

/// Check a [`Config`], collecting every violation.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.debugger.command.trim().is_empty() {
        errors.push(ConfigError::invalid("debugger.command", "must not be empty"));
    }

    if config.debugger.stack_timeout_ms < MIN_STACK_TIMEOUT_MS {
        errors.push(ConfigError::invalid(
            "debugger.stack_timeout_ms",
            format!(
                "must be at least {MIN_STACK_TIMEOUT_MS}, got {}",
                config.debugger.stack_timeout_ms
            ),
        ));
    }

    let markers = &config.markers;
    let required = [
        ("markers.channel_tag", &markers.channel_tag),
        ("markers.prompt", &markers.prompt),
        ("markers.stack_open", &markers.stack_open),
        ("markers.stack_close", &markers.stack_close),
        ("markers.exception_open", &markers.exception_open),
        ("markers.exception_close", &markers.exception_close),
        ("markers.set_variable_open", &markers.set_variable_open),
        ("markers.set_variable_close", &markers.set_variable_close),
    ];
    for (field, value) in required {
        if value.is_empty() {
            errors.push(ConfigError::invalid(field, "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and keep only the first violation.
pub(crate) fn validate_first(config: &Config) -> Result<(), ConfigError> {
    validate(config).map_err(|errors| {
        errors
            .into_iter()
            .next()
            .unwrap_or_else(|| ConfigError::invalid("config", "validation failed"))
    })
}
