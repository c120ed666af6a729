//! Prometheus metrics for server-side RPC handling
//!
//! [`ServerMetrics`] owns the four per-call counter families and the optional
//! handling-time histogram, implements the interceptor contract so it can be
//! composed like any other cross-cutting concern, and implements
//! [`prometheus::core::Collector`] so an external registry can poll it.
//!
//! There is no process-wide singleton: build one `ServerMetrics` at server
//! startup, register a clone with your `prometheus::Registry`, and add a
//! clone to the interceptor chain. Handles share state, so both see the same
//! series.
//!
//! ```ignore
//! let metrics = ServerMetrics::new()?;
//! registry.register(Box::new(metrics.clone()))?;
//! chain.add(metrics.clone());
//! ```

mod reporter;
mod stream;

pub(crate) use reporter::CallReporter;
use stream::MonitoredConn;

use crate::call::StreamingConn;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::interceptor::{Interceptor, StreamingHandler, UnaryHandler};
use crate::labels::CallLabels;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

// Metric names and help text are fixed strings: existing scrapers and
// dashboards key on them exactly.
const STARTED_NAME: &str = "grpc_server_started_total";
const STARTED_HELP: &str = "Total number of RPCs started on the server.";
const HANDLED_NAME: &str = "grpc_server_handled_total";
const HANDLED_HELP: &str =
    "Total number of RPCs completed on the server, regardless of success or failure.";
const MSG_RECEIVED_NAME: &str = "grpc_server_msg_received_total";
const MSG_RECEIVED_HELP: &str = "Total number of RPC stream messages received on the server.";
const MSG_SENT_NAME: &str = "grpc_server_msg_sent_total";
const MSG_SENT_HELP: &str = "Total number of gRPC stream messages sent by the server.";
const HANDLING_NAME: &str = "grpc_server_handling_seconds";
const HANDLING_HELP: &str =
    "Histogram of response latency (seconds) of gRPC that had been application-level handled by the server.";

const CALL_LABELS: [&str; 3] = ["grpc_type", "grpc_service", "grpc_method"];
const HANDLED_LABELS: [&str; 4] = ["grpc_type", "grpc_service", "grpc_method", "grpc_code"];

/// Configuration for [`ServerMetrics`] construction
///
/// Constant labels are applied to every counter family (the histogram takes
/// its own set when enabled, see [`HistogramConfig`]).
pub struct MetricsConfig {
    /// Labels stamped on every counter series, e.g. a shard identifier
    pub const_labels: HashMap<String, String>,
    /// Time source for latency measurement
    pub clock: Arc<dyn Clock>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            const_labels: HashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl MetricsConfig {
    /// Default configuration: no constant labels, system clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant label applied to every counter family
    pub fn const_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.const_labels.insert(name.into(), value.into());
        self
    }

    /// Substitute the time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Options applied when enabling the handling-time histogram
///
/// Unset fields keep their current values, so repeated enable calls can
/// adjust options incrementally.
#[derive(Default, Clone)]
pub struct HistogramConfig {
    buckets: Option<Vec<f64>>,
    const_labels: Option<HashMap<String, String>>,
}

impl HistogramConfig {
    /// Defaults: standard latency ladder (5ms–10s), no constant labels
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bucket upper bounds; must be strictly increasing
    pub fn buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Add a constant label applied to the histogram family
    pub fn const_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.const_labels
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

struct Inner {
    started: IntCounterVec,
    handled: IntCounterVec,
    msg_received: IntCounterVec,
    msg_sent: IntCounterVec,
    // Pending histogram options; mutated by every enable call. The histogram
    // itself is built once: the first enable wins structurally and later
    // bucket changes do not rebuild it.
    handling_opts: Mutex<HistogramOpts>,
    handling: OnceLock<HistogramVec>,
    clock: Arc<dyn Clock>,
}

/// Shared metrics registry and interceptor for server-side RPC handling
///
/// Cheap to clone; all clones share the same counter state. Implements
/// [`Interceptor`] for composition and [`Collector`] for pull-based scraping.
#[derive(Clone)]
pub struct ServerMetrics {
    inner: Arc<Inner>,
}

impl ServerMetrics {
    /// Build with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(MetricsConfig::default())
    }

    /// Build with explicit configuration
    pub fn with_config(config: MetricsConfig) -> Result<Self> {
        let MetricsConfig {
            const_labels,
            clock,
        } = config;

        let started = IntCounterVec::new(
            Opts::new(STARTED_NAME, STARTED_HELP).const_labels(const_labels.clone()),
            &CALL_LABELS,
        )?;
        let handled = IntCounterVec::new(
            Opts::new(HANDLED_NAME, HANDLED_HELP).const_labels(const_labels.clone()),
            &HANDLED_LABELS,
        )?;
        let msg_received = IntCounterVec::new(
            Opts::new(MSG_RECEIVED_NAME, MSG_RECEIVED_HELP).const_labels(const_labels.clone()),
            &CALL_LABELS,
        )?;
        let msg_sent = IntCounterVec::new(
            Opts::new(MSG_SENT_NAME, MSG_SENT_HELP).const_labels(const_labels),
            &CALL_LABELS,
        )?;

        Ok(Self {
            inner: Arc::new(Inner {
                started,
                handled,
                msg_received,
                msg_sent,
                handling_opts: Mutex::new(HistogramOpts::new(HANDLING_NAME, HANDLING_HELP)),
                handling: OnceLock::new(),
                clock,
            }),
        })
    }

    /// Enable the handling-time histogram
    ///
    /// Histograms are comparatively expensive for the scrape backend, so they
    /// are off unless asked for. Option changes apply on every call, but the
    /// histogram structure (bucket layout) is fixed by the first enabling
    /// call; re-enabling with different buckets does not rebuild it.
    pub fn enable_handling_time_histogram(&self, config: HistogramConfig) -> Result<()> {
        let mut opts = self.inner.handling_opts.lock();
        if let Some(buckets) = config.buckets {
            validate_buckets(&buckets)?;
            opts.buckets = buckets;
        }
        if let Some(labels) = config.const_labels {
            opts.common_opts.const_labels = labels;
        }
        if self.inner.handling.get().is_none() {
            let histogram = HistogramVec::new(opts.clone(), &CALL_LABELS)?;
            // The opts lock serializes concurrent enables, so this set wins.
            let _ = self.inner.handling.set(histogram);
        }
        Ok(())
    }

    pub(crate) fn histogram_enabled(&self) -> bool {
        self.inner.handling.get().is_some()
    }

    pub(crate) fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    pub(crate) fn inc_started(&self, labels: &CallLabels) {
        self.inner
            .started
            .with_label_values(&labels.values())
            .inc();
    }

    pub(crate) fn inc_msg_received(&self, labels: &CallLabels) {
        self.inner
            .msg_received
            .with_label_values(&labels.values())
            .inc();
    }

    pub(crate) fn inc_msg_sent(&self, labels: &CallLabels) {
        self.inner
            .msg_sent
            .with_label_values(&labels.values())
            .inc();
    }

    pub(crate) fn inc_handled(&self, labels: &CallLabels, code: &str) {
        let [stream_type, service, method] = labels.values();
        self.inner
            .handled
            .with_label_values(&[stream_type, service, method, code])
            .inc();
    }

    pub(crate) fn observe_handling(&self, labels: &CallLabels, seconds: f64) {
        if let Some(handling) = self.inner.handling.get() {
            handling
                .with_label_values(&labels.values())
                .observe(seconds);
        }
    }
}

fn validate_buckets(buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(Error::Config(
            "histogram buckets must not be empty".to_string(),
        ));
    }
    if !buckets.windows(2).all(|pair| pair[0] < pair[1]) {
        return Err(Error::Config(
            "histogram buckets must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

impl Collector for ServerMetrics {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.inner.started.desc();
        descs.extend(self.inner.handled.desc());
        descs.extend(self.inner.msg_received.desc());
        descs.extend(self.inner.msg_sent.desc());
        if let Some(handling) = self.inner.handling.get() {
            descs.extend(handling.desc());
        }
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = self.inner.started.collect();
        families.extend(self.inner.handled.collect());
        families.extend(self.inner.msg_received.collect());
        families.extend(self.inner.msg_sent.collect());
        if let Some(handling) = self.inner.handling.get() {
            families.extend(handling.collect());
        }
        families
    }
}

impl Interceptor for ServerMetrics {
    // A unary exchange is modeled as one received and one sent message; the
    // send is only counted when the handler succeeded.
    fn wrap_unary(&self, next: UnaryHandler) -> UnaryHandler {
        let metrics = self.clone();
        Arc::new(move |ctx, req| {
            let metrics = metrics.clone();
            let next = Arc::clone(&next);
            Box::pin(async move {
                let mut reporter = CallReporter::new(metrics, req.spec());
                reporter.start();
                reporter.record_receive();
                let result = next(ctx, req).await;
                reporter.done(result.as_ref().err());
                if result.is_ok() {
                    reporter.record_send();
                }
                result
            })
        })
    }

    // Message counts accrue solely through the decorated connection while the
    // inner handler runs; nothing is synthesized here.
    fn wrap_streaming_handler(&self, next: StreamingHandler) -> StreamingHandler {
        let metrics = self.clone();
        Arc::new(move |ctx, conn| {
            let metrics = metrics.clone();
            let next = Arc::clone(&next);
            Box::pin(async move {
                let mut reporter = CallReporter::new(metrics, conn.spec());
                reporter.start();
                let reporter = Arc::new(reporter);
                let monitored: Box<dyn StreamingConn> =
                    Box::new(MonitoredConn::new(conn, Arc::clone(&reporter)));
                let result = next(ctx, monitored).await;
                reporter.done(result.as_ref().err());
                result
            })
        })
    }
}

#[cfg(test)]
impl ServerMetrics {
    pub(crate) fn started_total(&self, labels: &CallLabels) -> u64 {
        self.inner.started.with_label_values(&labels.values()).get()
    }

    pub(crate) fn handled_total(&self, labels: &CallLabels, code: &str) -> u64 {
        let [stream_type, service, method] = labels.values();
        self.inner
            .handled
            .with_label_values(&[stream_type, service, method, code])
            .get()
    }

    pub(crate) fn msg_received_total(&self, labels: &CallLabels) -> u64 {
        self.inner
            .msg_received
            .with_label_values(&labels.values())
            .get()
    }

    pub(crate) fn msg_sent_total(&self, labels: &CallLabels) -> u64 {
        self.inner
            .msg_sent
            .with_label_values(&labels.values())
            .get()
    }
}
