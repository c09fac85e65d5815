/*!
Observability infrastructure for pdsnap.

- Structured logging setup through `tracing-subscriber`
- Prometheus counters for codec outcomes (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{PdsnapError, Result};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";
/// Filter used in verbose mode when `RUST_LOG` is unset
pub const VERBOSE_LOG_FILTER: &str = "debug";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<PdsnapMetrics> = OnceLock::new();

/// Counters for volume identity and tag operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct PdsnapMetrics {
    pub volume_id_reads_total: Counter,
    pub volume_id_writes_total: Counter,
    pub malformed_volumes_total: Counter,
    pub tag_decode_fallbacks_total: Counter,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl PdsnapMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let volume_id_reads_total = register_counter(
            &registry,
            "pdsnap_volume_id_reads_total",
            "Volume IDs read from persistent volumes",
        )?;
        let volume_id_writes_total = register_counter(
            &registry,
            "pdsnap_volume_id_writes_total",
            "Volume IDs written into persistent volumes",
        )?;
        let malformed_volumes_total = register_counter(
            &registry,
            "pdsnap_malformed_volumes_total",
            "Persistent volumes rejected as malformed",
        )?;
        let tag_decode_fallbacks_total = register_counter(
            &registry,
            "pdsnap_tag_decode_fallbacks_total",
            "Disk descriptions that could not be decoded as tags",
        )?;

        Ok(Self {
            volume_id_reads_total,
            volume_id_writes_total,
            malformed_volumes_total,
            tag_decode_fallbacks_total,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static PdsnapMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize pdsnap metrics"))
    }

    pub fn record_volume_id_read(&self) {
        self.volume_id_reads_total.inc();
    }

    pub fn record_volume_id_write(&self) {
        self.volume_id_writes_total.inc();
    }

    pub fn record_malformed_volume(&self) {
        self.malformed_volumes_total.inc();
    }

    pub fn record_tag_decode_fallback(&self) {
        self.tag_decode_fallbacks_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PdsnapError::config(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| PdsnapError::config(format!("Failed to convert metrics to string: {e}")))
    }
}

#[cfg(feature = "metrics")]
fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| PdsnapError::config(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| PdsnapError::config(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise [`DEFAULT_LOG_FILTER`] or, when
/// `verbose`, [`VERBOSE_LOG_FILTER`] applies.
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable output
/// * `verbose` - Default to debug level
pub fn init_observability(json: bool, verbose: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    PdsnapMetrics::global();

    let default_filter = if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        set_global_default(subscriber)
    };

    result.map_err(|e| {
        PdsnapError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("pdsnap observability initialized");
    Ok(())
}

/// Initialize observability with human-readable output at the default level
pub fn init_default_observability() -> Result<()> {
    init_observability(false, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_parse() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(EnvFilter::try_new(VERBOSE_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        let _ = init_default_observability();
        let err = init_observability(true, true).unwrap_err();
        assert!(err.to_string().contains("global tracing subscriber"));
    }
}
