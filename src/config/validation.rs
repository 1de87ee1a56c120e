//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check resource declarations (unique names, parsable addresses)
//! - Check collector URLs in production mode
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use url::Url;

use crate::config::schema::{ExportMode, ServiceConfig};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::new("telemetry.service_name", "must not be empty"));
    }
    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be between 1 and 65535"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.drain_timeout_secs", "must be greater than 0"));
    }
    if config.shutdown.teardown_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.teardown_timeout_secs", "must be greater than 0"));
    }

    let telemetry = &config.telemetry;
    if telemetry.metric_interval_ms == Some(0) {
        errors.push(ValidationError::new("telemetry.metric_interval_ms", "must be greater than 0"));
    }
    if telemetry.host_metrics && telemetry.host_metrics_interval_secs == 0 {
        errors.push(ValidationError::new(
            "telemetry.host_metrics_interval_secs",
            "must be greater than 0",
        ));
    }
    if telemetry.mode == ExportMode::Production {
        if let Err(message) = check_http_url(&telemetry.endpoint) {
            errors.push(ValidationError::new("telemetry.endpoint", message));
        }
        if let Some(url) = &telemetry.metrics_endpoint {
            if let Err(message) = check_http_url(url) {
                errors.push(ValidationError::new("telemetry.metrics_endpoint", message));
            }
        }
    }

    let mut seen = HashSet::new();
    for (i, spec) in config.resources.iter().enumerate() {
        let field = format!("resources[{i}]");
        if spec.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        } else if !seen.insert(spec.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate resource name `{}`", spec.name),
            ));
        }
        if let Err(e) = spec.target() {
            errors.push(ValidationError::new(format!("{field}.address"), e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collector URLs must be absolute http(s) URLs.
pub(crate) fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL `{raw}`: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        "http" | "https" => Err(format!("URL `{raw}` has no host")),
        other => Err(format!("unsupported scheme `{other}` in `{raw}`")),
    }
}
