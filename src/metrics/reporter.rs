//! Per-call metric reporter
//!
//! A [`CallReporter`] is created for each intercepted call and owned by that
//! call's execution path from creation to completion. It derives the call's
//! label tuple once, then emits the start, message, and completion events
//! against the shared [`ServerMetrics`] state.
//!
//! Completion is guaranteed by scope: `done` records the outcome exactly
//! once, and `Drop` is the backstop for abnormal exits (handler panic, call
//! future dropped on cancellation), which are recorded as `Canceled`. Every
//! started call therefore accounts exactly one handled outcome.

use super::ServerMetrics;
use crate::call::CallSpec;
use crate::labels::{code_label, outcome_label, CallLabels};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tonic::{Code, Status};

pub(crate) struct CallReporter {
    metrics: ServerMetrics,
    labels: CallLabels,
    started_at: Option<Instant>,
    finished: AtomicBool,
}

impl CallReporter {
    pub(crate) fn new(metrics: ServerMetrics, spec: &CallSpec) -> Self {
        Self {
            labels: CallLabels::from_spec(spec),
            metrics,
            started_at: None,
            finished: AtomicBool::new(false),
        }
    }

    /// Record the call as started; called exactly once, before the reporter
    /// is shared with a stream decorator
    pub(crate) fn start(&mut self) {
        self.metrics.inc_started(&self.labels);
        if self.metrics.histogram_enabled() {
            self.started_at = Some(self.metrics.now());
        }
    }

    /// Count one successfully received message
    pub(crate) fn record_receive(&self) {
        self.metrics.inc_msg_received(&self.labels);
    }

    /// Count one successfully sent message
    pub(crate) fn record_send(&self) {
        self.metrics.inc_msg_sent(&self.labels);
    }

    /// Record the call outcome; at most one completion is ever accounted
    pub(crate) fn done(&self, err: Option<&Status>) {
        self.finish(outcome_label(err));
    }

    fn finish(&self, code: Cow<'static, str>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(started_at) = self.started_at {
            let elapsed = self.metrics.now().saturating_duration_since(started_at);
            self.metrics
                .observe_handling(&self.labels, elapsed.as_secs_f64());
        }
        self.metrics.inc_handled(&self.labels, &code);
    }
}

impl Drop for CallReporter {
    fn drop(&mut self) {
        // Abnormal exit: the call never reached done(). A dropped call future
        // is a cancelled call.
        self.finish(code_label(Code::Cancelled as i32));
    }
}
