//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{ExportMode, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::resources::{ResourceKind, ResourceSpec};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}=`{value}`: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Backends the service knows how to declare from a single environment key.
const BACKEND_KEYS: &[(&str, &str, ResourceKind)] = &[
    ("MYSQL_DSN", "mysql", ResourceKind::Relational),
    ("REDIS_ADDR", "redis", ResourceKind::Cache),
    ("MONGO_URI", "mongo", ResourceKind::Document),
    ("CLICKHOUSE_ADDR", "clickhouse", ResourceKind::Columnar),
    ("KAFKA_BROKERS", "kafka-producer", ResourceKind::QueueProducer),
    ("KAFKA_BROKERS", "kafka-consumer", ResourceKind::QueueConsumer),
];

/// Load configuration: optional TOML file, then process environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment-style overrides from `lookup`.
///
/// Recognised keys: `SERVICE_NAME`, `OTEL_SERVICE_NAME`, `PORT`, `OTEL_MODE`,
/// `OTEL_LOG_LEVEL`, `OTEL_EXPORTER_OTLP_ENDPOINT`,
/// `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT`, `OTEL_METRIC_EXPORT_INTERVAL`,
/// `LOG_LEVEL`, plus one address key per known backend.
pub fn apply_env<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(name) = get("OTEL_SERVICE_NAME").or_else(|| get("SERVICE_NAME")) {
        config.telemetry.service_name = name;
    }
    if let Some(port) = get("PORT") {
        config.listener.port = port.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            key: "PORT",
            value: port.clone(),
            reason: e.to_string(),
        })?;
    }

    // OTEL_LOG_LEVEL=debug selects debug export; an explicit OTEL_MODE wins.
    if get("OTEL_LOG_LEVEL").is_some_and(|level| level.trim().eq_ignore_ascii_case("debug")) {
        config.telemetry.mode = ExportMode::Debug;
    }
    if let Some(mode) = get("OTEL_MODE") {
        config.telemetry.mode = mode.parse().map_err(|reason| ConfigError::Env {
            key: "OTEL_MODE",
            value: mode.clone(),
            reason,
        })?;
    }
    if let Some(endpoint) = get("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.endpoint = endpoint;
    }
    if let Some(endpoint) = get("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT") {
        config.telemetry.metrics_endpoint = Some(endpoint);
    }
    if let Some(interval) = get("OTEL_METRIC_EXPORT_INTERVAL") {
        let ms = interval.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            key: "OTEL_METRIC_EXPORT_INTERVAL",
            value: interval.clone(),
            reason: e.to_string(),
        })?;
        config.telemetry.metric_interval_ms = Some(ms);
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }

    for &(key, name, kind) in BACKEND_KEYS {
        if let Some(address) = get(key) {
            upsert_resource(&mut config.resources, ResourceSpec::new(name, address, kind));
        }
    }

    Ok(())
}

fn upsert_resource(resources: &mut Vec<ResourceSpec>, spec: ResourceSpec) {
    match resources.iter_mut().find(|r| r.name == spec.name) {
        Some(existing) => existing.address = spec.address,
        None => resources.push(spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_core_settings() {
        let mut config = ServiceConfig::default();
        apply_env(
            &mut config,
            env(&[
                ("SERVICE_NAME", "orders"),
                ("PORT", "9000"),
                ("OTEL_LOG_LEVEL", "debug"),
                ("OTEL_METRIC_EXPORT_INTERVAL", "500"),
                ("LOG_LEVEL", "warn"),
            ]),
        )
        .unwrap();

        assert_eq!(config.telemetry.service_name, "orders");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.telemetry.mode, ExportMode::Debug);
        assert_eq!(config.telemetry.metric_interval_ms, Some(500));
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn explicit_mode_beats_log_level() {
        let mut config = ServiceConfig::default();
        apply_env(
            &mut config,
            env(&[("OTEL_LOG_LEVEL", "debug"), ("OTEL_MODE", "production")]),
        )
        .unwrap();
        assert_eq!(config.telemetry.mode, ExportMode::Production);
    }

    #[test]
    fn backend_keys_declare_resources_in_order() {
        let mut config = ServiceConfig::default();
        config.resources.push(ResourceSpec::new("redis", "old:6379", ResourceKind::Cache));
        apply_env(
            &mut config,
            env(&[
                ("MYSQL_DSN", "root:root@tcp(mysql:3306)/test"),
                ("REDIS_ADDR", "redis:6379"),
                ("KAFKA_BROKERS", "kafka:9092"),
            ]),
        )
        .unwrap();

        let names: Vec<_> = config.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["redis", "mysql", "kafka-producer", "kafka-consumer"]);
        assert_eq!(config.resources[0].address, "redis:6379");
        assert_eq!(config.resources[3].kind, ResourceKind::QueueConsumer);
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = ServiceConfig::default();
        let err = apply_env(&mut config, env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "PORT", .. }));

        let err = apply_env(&mut config, env(&[("OTEL_MODE", "loud")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "OTEL_MODE", .. }));
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[listener]
port = 8123

[telemetry]
service_name = "checkout"
mode = "debug"

[[resources]]
name = "primary"
address = "postgres://db:5432/app"
kind = "relational"

[shutdown]
drain_timeout_secs = 2
"#
        )
        .unwrap();

        let config = load_config_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.listener.port, 8123);
        assert_eq!(config.telemetry.mode, ExportMode::Debug);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.shutdown.drain_timeout_secs, 2);
        assert_eq!(config.shutdown.teardown_timeout_secs, 5);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
