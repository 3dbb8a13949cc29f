use crate::config::TracingConfig;

#[cfg(feature = "telemetry")]
use opentelemetry::trace::TracerProvider as _;
#[cfg(feature = "telemetry")]
use opentelemetry_sdk::trace::TracerProvider;

/// Installs the OTLP exporter when tracing is enabled. An exporter that
/// fails to install leaves the service running without trace export.
#[cfg(feature = "telemetry")]
pub fn init_telemetry(config: &TracingConfig) -> Option<TracerProvider> {
    use opentelemetry_otlp::WithExportConfig;

    if !config.enabled {
        return None;
    }

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint);

    let installed = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    config.sample_rate,
                ))
                .with_resource(opentelemetry_sdk::Resource::new(vec![
                    opentelemetry::KeyValue::new("service.name", config.service_name.clone()),
                ])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio);

    match installed {
        Ok(provider) => Some(provider),
        Err(e) => {
            // The subscriber is not up yet.
            eprintln!("failed to install OpenTelemetry tracer: {e}");
            None
        }
    }
}

#[cfg(feature = "telemetry")]
pub fn make_otel_layer(
    provider: &TracerProvider,
) -> tracing_opentelemetry::OpenTelemetryLayer<
    tracing_subscriber::Registry,
    opentelemetry_sdk::trace::Tracer,
> {
    let tracer = provider.tracer("relgate");
    tracing_opentelemetry::layer().with_tracer(tracer)
}

#[cfg(not(feature = "telemetry"))]
pub fn init_telemetry(config: &TracingConfig) -> Option<()> {
    if config.enabled {
        eprintln!("tracing.enabled is set but relgate was built without the `telemetry` feature");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_telemetry_returns_none_when_disabled() {
        let config = TracingConfig {
            enabled: false,
            ..Default::default()
        };
        let result = init_telemetry(&config);
        assert!(result.is_none());
    }

    #[test]
    fn default_service_name_is_relgate() {
        assert_eq!(TracingConfig::default().service_name, "relgate");
    }
}
