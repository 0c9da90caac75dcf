//! Prometheus metrics and tracing spans.
//!
//! With the `metrics` feature, [`METRICS`] exposes OpenTelemetry instruments
//! exported into a Prometheus registry:
//!
//! - `quarry_statements_total` / `quarry_statement_duration_seconds`
//! - `quarry_statement_errors_total`
//! - `quarry_plan_cache_hits_total` / `quarry_plan_cache_misses_total`
//!
//! Every instrument is labelled with `table` and `operation`.
//! [`QuarryMetrics::render`] returns the text exposition format for a scrape
//! endpoint. With the `tracing` feature, [`tracing_helpers`] builds the spans
//! opened around statements and façade operations.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{QuarryMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use crate::error::Operation;
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<QuarryMetrics> = Lazy::new(QuarryMetrics::init);

    pub struct QuarryMetrics {
        pub registry: Registry,
        provider: SdkMeterProvider,
        pub statements_total: Counter<u64>,
        pub statement_duration: Histogram<f64>,
        pub statement_errors_total: Counter<u64>,
        pub plan_cache_hits_total: Counter<u64>,
        pub plan_cache_misses_total: Counter<u64>,
    }

    impl QuarryMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(err) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {err}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("quarry");

            let statements_total = meter
                .u64_counter("quarry_statements_total")
                .with_description("Statements executed")
                .build();

            let statement_duration = meter
                .f64_histogram("quarry_statement_duration_seconds")
                .with_description("Duration of statements, including row decoding")
                .build();

            let statement_errors_total = meter
                .u64_counter("quarry_statement_errors_total")
                .with_description("Statements the executor failed")
                .build();

            let plan_cache_hits_total = meter
                .u64_counter("quarry_plan_cache_hits_total")
                .with_description("Write plans served from the statement cache")
                .build();

            let plan_cache_misses_total = meter
                .u64_counter("quarry_plan_cache_misses_total")
                .with_description("Write plans compiled on a statement cache miss")
                .build();

            Self {
                registry,
                provider,
                statements_total,
                statement_duration,
                statement_errors_total,
                plan_cache_hits_total,
                plan_cache_misses_total,
            }
        }

        pub fn record_statement(&self, table: &'static str, op: Operation, elapsed: Duration) {
            let labels = labels(table, op);
            self.statements_total.add(1, &labels);
            self.statement_duration.record(elapsed.as_secs_f64(), &labels);
        }

        pub fn record_error(&self, table: &'static str, op: Operation) {
            self.statement_errors_total.add(1, &labels(table, op));
        }

        pub fn record_plan_cache(&self, table: &'static str, op: Operation, hit: bool) {
            if hit {
                self.plan_cache_hits_total.add(1, &labels(table, op));
            } else {
                self.plan_cache_misses_total.add(1, &labels(table, op));
            }
        }

        /// Prometheus text exposition of everything recorded so far.
        pub fn render(&self) -> String {
            if let Err(err) = self.provider.force_flush() {
                log::debug!("metrics flush failed: {err}");
            }
            let mut buffer = Vec::new();
            if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
                log::warn!("failed to encode metrics: {err}");
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }

    fn labels(table: &'static str, op: Operation) -> [KeyValue; 2] {
        [
            KeyValue::new("table", table),
            KeyValue::new("operation", op.as_str()),
        ]
    }

}

/// Span constructors used when the `tracing` feature is on.
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use crate::error::Operation;
    use tracing::{info_span, Span};

    /// Span around opening a connection.
    pub fn connect_span() -> Span {
        info_span!("quarry.connect", db.system = "postgresql")
    }

    /// Span around one statement sent to the database.
    pub fn execute_query_span(query: &str) -> Span {
        info_span!("quarry.execute", db.system = "postgresql", db.statement = query)
    }

    /// Span around one façade operation.
    pub fn operation_span(table: &'static str, op: Operation) -> Span {
        info_span!("quarry.operation", db.table = table, operation = op.as_str())
    }
}
