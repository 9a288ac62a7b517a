//! Operational metrics
//!
//! Recording a metric is fire-and-forget: [`Metrics`] wraps a
//! [`MetricsBackend`] and swallows anything it returns or panics with. A
//! broken metrics pipeline never changes the outcome of the calling task.
//!
//! The production backend feeds the `metrics` facade, exported in Prometheus
//! text format on the trigger server's `/metrics` route.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Posts returned by the forum API (incremented once per successful fetch)
pub const POSTS_EXTRACTED: &str = "forumpipe_posts_extracted_total";
/// Time from send to confirmation for successful publishes
pub const PUBLISH_LATENCY_MS: &str = "forumpipe_publish_latency_ms";
pub const ARCHIVE_SUCCEEDED: &str = "forumpipe_archive_uploads_succeeded_total";
pub const ARCHIVE_FAILED: &str = "forumpipe_archive_uploads_failed_total";

/// A sink for counters and latencies
pub trait MetricsBackend: Send + Sync {
    fn record_counter(&self, name: &str, value: u64) -> anyhow::Result<()>;

    fn record_latency(&self, name: &str, millis: f64) -> anyhow::Result<()>;
}

/// Fire-and-forget handle shared by every component
#[derive(Clone)]
pub struct Metrics {
    backend: Arc<dyn MetricsBackend>,
}

impl Metrics {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// A handle that records nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopBackend))
    }

    pub fn record_counter(&self, name: &str, value: u64) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.backend.record_counter(name, value)));
        report(name, outcome);
    }

    pub fn record_latency(&self, name: &str, millis: f64) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.backend.record_latency(name, millis)));
        report(name, outcome);
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn report(name: &str, outcome: std::thread::Result<anyhow::Result<()>>) {
    match outcome {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(metric = name, error = %e, "Failed to record metric"),
        Err(_) => warn!(metric = name, "Metrics backend panicked while recording"),
    }
}

/// Backend that drops every measurement
#[derive(Debug, Default)]
pub struct NoopBackend;

impl MetricsBackend for NoopBackend {
    fn record_counter(&self, _name: &str, _value: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn record_latency(&self, _name: &str, _millis: f64) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Backend writing to the global `metrics` recorder
#[derive(Debug, Default)]
pub struct PrometheusBackend;

impl MetricsBackend for PrometheusBackend {
    fn record_counter(&self, name: &str, value: u64) -> anyhow::Result<()> {
        metrics::counter!(name.to_string()).increment(value);
        Ok(())
    }

    fn record_latency(&self, name: &str, millis: f64) -> anyhow::Result<()> {
        if !millis.is_finite() || millis < 0.0 {
            anyhow::bail!("latency must be a non-negative number of milliseconds, got {}", millis);
        }
        metrics::histogram!(name.to_string()).record(millis);
        Ok(())
    }
}

/// Install the Prometheus recorder and describe the job's metrics.
///
/// Fails if a global recorder is already installed.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!(POSTS_EXTRACTED, Unit::Count, "Posts fetched from the forum API");
    describe_histogram!(
        PUBLISH_LATENCY_MS,
        Unit::Milliseconds,
        "Latency of confirmed publishes to the primary queue"
    );
    describe_counter!(ARCHIVE_SUCCEEDED, Unit::Count, "Records written to the archive");
    describe_counter!(ARCHIVE_FAILED, Unit::Count, "Archive writes that failed");

    Ok(handle)
}
