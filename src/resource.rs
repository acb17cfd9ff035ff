//! Resource construction and runtime resource detection.

use crate::config::ResourceConfig;
use opentelemetry::KeyValue;
use opentelemetry_resource_detectors::{
    HostResourceDetector, OsResourceDetector, ProcessResourceDetector,
};
use opentelemetry_sdk::resource::{Resource, ResourceDetector};
use opentelemetry_semantic_conventions::resource::PROCESS_RUNTIME_NAME;

/// Detects attributes of the running Rust binary.
///
/// - `process.runtime.name` = "rust"
/// - `rust.target_os`, `rust.target_arch`
/// - `rust.debug` (true for debug builds)
pub struct RuntimeResourceDetector;

impl ResourceDetector for RuntimeResourceDetector {
    fn detect(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes([
                KeyValue::new(PROCESS_RUNTIME_NAME, "rust"),
                KeyValue::new("rust.target_os", std::env::consts::OS),
                KeyValue::new("rust.target_arch", std::env::consts::ARCH),
                KeyValue::new("rust.debug", cfg!(debug_assertions)),
            ])
            .build()
    }
}

/// Builds the resource shared by the tracer and logger providers.
///
/// Starts from the SDK defaults, which already honour `OTEL_SERVICE_NAME` and
/// `OTEL_RESOURCE_ATTRIBUTES`; explicit configuration wins over both.
pub(crate) fn build_resource(config: &ResourceConfig) -> Resource {
    let mut builder = Resource::builder();

    if config.detect {
        builder = builder
            .with_detector(Box::new(HostResourceDetector::default()))
            .with_detector(Box::new(OsResourceDetector))
            .with_detector(Box::new(ProcessResourceDetector))
            .with_detector(Box::new(RuntimeResourceDetector));
    }

    let mut attributes: Vec<KeyValue> = config
        .attributes
        .iter()
        .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
        .collect();

    if let Some(version) = &config.service_version {
        attributes.push(KeyValue::new("service.version", version.clone()));
    }

    builder = builder.with_attributes(attributes);

    if let Some(name) = &config.service_name {
        builder = builder.with_service_name(name.clone());
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn attr(resource: &Resource, key: &str) -> Option<String> {
        resource
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.to_string())
    }

    #[test]
    fn runtime_detector_reports_rust() {
        let resource = RuntimeResourceDetector.detect();
        assert_eq!(attr(&resource, PROCESS_RUNTIME_NAME).as_deref(), Some("rust"));
        assert_eq!(
            attr(&resource, "rust.target_os").as_deref(),
            Some(std::env::consts::OS)
        );
    }

    #[test]
    fn detection_enabled_includes_runtime_attributes() {
        let resource = build_resource(&ResourceConfig::default());
        assert!(attr(&resource, PROCESS_RUNTIME_NAME).is_some());
    }

    #[test]
    fn detection_disabled_skips_detectors() {
        let config = ResourceConfig {
            detect: false,
            ..Default::default()
        };
        let resource = build_resource(&config);
        assert!(attr(&resource, PROCESS_RUNTIME_NAME).is_none());
    }

    #[test]
    fn explicit_service_name_and_attributes_are_applied() {
        let mut attributes = HashMap::new();
        attributes.insert("team".to_string(), "observability".to_string());

        let config = ResourceConfig {
            service_name: Some("console-demo".to_string()),
            service_version: Some("1.0.0".to_string()),
            attributes,
            detect: false,
        };
        let resource = build_resource(&config);

        assert_eq!(attr(&resource, "service.name").as_deref(), Some("console-demo"));
        assert_eq!(attr(&resource, "service.version").as_deref(), Some("1.0.0"));
        assert_eq!(attr(&resource, "team").as_deref(), Some("observability"));
    }
}
