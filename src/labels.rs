//! Label taxonomy for per-call metric series
//!
//! Pure functions mapping a [`CallSpec`] and a call outcome into the stable
//! label strings used by every metric family. Labels must stay deterministic:
//! the same descriptor always yields the same tuple, and unrecognized inputs
//! fall back to `"unknown"` rather than erroring.

use crate::call::{CallSpec, StreamKind};
use std::borrow::Cow;
use tonic::{Code, Status};

/// Fallback label for inputs that cannot be classified
const UNKNOWN: &str = "unknown";

/// Label tuple identifying a call's metric series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLabels {
    /// Stream-shape label: `unary`, `client_stream`, `server_stream`,
    /// `bidi_stream`, or `unknown`
    pub stream_type: &'static str,
    /// Service segment of the procedure name
    pub service: String,
    /// Method segment of the procedure name
    pub method: String,
}

impl CallLabels {
    /// Derive the label tuple from a call descriptor
    pub fn from_spec(spec: &CallSpec) -> Self {
        let (service, method) = split_procedure(&spec.procedure);
        Self {
            stream_type: stream_type_label(spec.stream_kind),
            service: service.to_string(),
            method: method.to_string(),
        }
    }

    /// Label values in `[type, service, method]` order
    pub(crate) fn values(&self) -> [&str; 3] {
        [self.stream_type, &self.service, &self.method]
    }
}

/// Split a fully-qualified procedure name into `(service, method)`
///
/// One leading `/` is stripped, then the string splits on the first remaining
/// `/`. Without a separator, or with an empty service segment, both labels
/// fall back to `"unknown"`. A trailing separator with a non-empty service
/// yields `(service, "")`; the empty method label is kept as-is, not mapped
/// to `"unknown"`.
pub fn split_procedure(procedure: &str) -> (&str, &str) {
    let trimmed = procedure.strip_prefix('/').unwrap_or(procedure);
    match trimmed.split_once('/') {
        Some((service, method)) if !service.is_empty() => (service, method),
        _ => (UNKNOWN, UNKNOWN),
    }
}

/// Stream-shape label for a call kind; total over all inputs
pub fn stream_type_label(kind: StreamKind) -> &'static str {
    match kind {
        StreamKind::Unary => "unary",
        StreamKind::ClientStream => "client_stream",
        StreamKind::ServerStream => "server_stream",
        StreamKind::BidiStream => "bidi_stream",
        StreamKind::Unrecognized => UNKNOWN,
    }
}

/// Render a numeric status code as its canonical label
///
/// The 17 canonical categories map to their fixed names; anything outside
/// that range renders as `Code(<N>)`. Total and stable; scrapers key on
/// these strings.
pub fn code_label(code: i32) -> Cow<'static, str> {
    match code {
        0..=16 => Cow::Borrowed(code_name(Code::from_i32(code))),
        other => Cow::Owned(format!("Code({other})")),
    }
}

/// Outcome label for a completed call: no error is `OK`
pub fn outcome_label(err: Option<&Status>) -> Cow<'static, str> {
    match err {
        None => Cow::Borrowed("OK"),
        Some(status) => code_label(status.code() as i32),
    }
}

fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}
