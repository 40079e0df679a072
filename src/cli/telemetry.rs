//! Log output and optional OTLP span export.
//!
//! Export is on only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. The exporter
//! speaks plain gRPC; TLS termination is expected in front of the collector.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{
    global, propagation::TextMapCompositePropagator, trace::TracerProvider as _, KeyValue,
};
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, Tracer},
    Resource,
};
use std::time::Duration;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use ulid::Ulid;

const ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const HEADERS_VAR: &str = "OTEL_EXPORTER_OTLP_HEADERS";
const INSTANCE_VAR: &str = "OTEL_SERVICE_INSTANCE_ID";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Exporter settings read from the standard `OTEL_*` variables.
#[derive(Debug)]
struct OtlpSettings {
    endpoint: String,
    metadata: MetadataMap,
    instance_id: String,
}

impl OtlpSettings {
    /// `None` when no endpoint is configured.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(endpoint) = lookup(ENDPOINT_VAR).filter(|value| !value.trim().is_empty()) else {
            return Ok(None);
        };

        let endpoint = endpoint.trim().trim_end_matches('/');
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };

        let metadata = match lookup(HEADERS_VAR) {
            Some(raw) => grpc_metadata(&raw)?,
            None => MetadataMap::new(),
        };

        Ok(Some(Self {
            endpoint,
            metadata,
            instance_id: lookup(INSTANCE_VAR).unwrap_or_else(|| Ulid::new().to_string()),
        }))
    }
}

/// Parses `key=value,key2=value2` into gRPC metadata. Pairs without `=` are
/// skipped; binary (`-bin`) keys are rejected.
fn grpc_metadata(raw: &str) -> Result<MetadataMap> {
    let mut metadata = MetadataMap::new();

    for pair in raw.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        if key.ends_with("-bin") {
            return Err(anyhow!("binary OTLP header {key} is not supported"));
        }

        let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
            .map_err(|err| anyhow!("invalid OTLP header name {key}: {err}"))?;
        let value: MetadataValue<Ascii> = value
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid OTLP header value for {key}: {err}"))?;
        metadata.insert(name, value);
    }

    Ok(metadata)
}

fn tracer(settings: OtlpSettings) -> Result<Tracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.endpoint)
        .with_compression(Compression::Gzip)
        .with_timeout(EXPORT_TIMEOUT)
        .with_metadata(settings.metadata)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes([
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", settings.instance_id),
                ])
                .build(),
        )
        .build();

    let _ = TRACER_PROVIDER.set(provider.clone());
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(provider.tracer(env!("CARGO_PKG_NAME")))
}

/// Installs the global subscriber: pretty log output filtered at
/// `verbosity_level` (ERROR when `None`, `RUST_LOG` overrides), plus span
/// export when an OTLP endpoint is configured.
///
/// # Errors
///
/// Returns an error if the OTLP settings are invalid, the exporter cannot be
/// built, or a global subscriber is already installed.
pub fn init(verbosity_level: Option<Level>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let otel_layer = match OtlpSettings::from_lookup(|name| std::env::var(name).ok())? {
        Some(settings) => Some(tracing_opentelemetry::layer().with_tracer(tracer(settings)?)),
        None => None,
    };

    let subscriber = Registry::default()
        .with(otel_layer)
        .with(fmt::layer().with_target(false).pretty())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Flushes pending spans. Does nothing when export is off.
pub fn shutdown_tracer() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        debug!("flushing span exporter");
        let _ = provider.shutdown();
    }
}
