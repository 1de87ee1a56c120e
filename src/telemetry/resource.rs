//! Resource descriptor attached to every span and metric.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{HOST_NAME, SERVICE_NAME, SERVICE_VERSION};

/// SDK defaults merged with service identity and the local host name.
pub fn build_resource(service_name: &str) -> Resource {
    let mut attributes = vec![
        KeyValue::new(SERVICE_NAME, service_name.to_string()),
        KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ];
    match host_name() {
        Some(host) => attributes.push(KeyValue::new(HOST_NAME, host)),
        None => tracing::warn!("Could not determine host name; host.name will be omitted"),
    }
    Resource::default().merge(&Resource::new(attributes))
}

fn host_name() -> Option<String> {
    sysinfo::System::host_name()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|h| !h.is_empty())
}
