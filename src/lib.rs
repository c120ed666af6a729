//! VALVO - server-side RPC interceptors
//!
//! Composable request/response interception for RPC servers: cross-cutting
//! concerns wrap unary and streaming call handling without touching service
//! logic.
//!
//! # Composition model
//!
//! ```text
//! dispatch ──► InterceptorChain ──► service handler
//!                 │
//!                 ├─► ServerMetrics   (counters, latency histogram)
//!                 ├─► BearerAuth      (credential gate)
//!                 └─► Spec/Header hooks (context enrichment)
//! ```
//!
//! The metrics subsystem is the load-bearing part: a per-call reporter with a
//! guaranteed completion event, a streaming decorator counting individual
//! messages, and a pull-based collector an external Prometheus registry
//! polls. Everything else composes on the same three wrap points.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod auth;
pub mod call;
pub mod clock;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod labels;
pub mod metrics;
pub mod metrics_server;

pub use auth::{BearerAuth, TokenVerifier, VerifiedToken, VerifyError};
pub use call::{CallContext, CallSpec, StreamKind, StreamingConn, UnaryRequest, UnaryResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{HeaderHook, HeaderInterceptor, SpecHook, SpecInterceptor};
pub use error::{Error, Result};
pub use interceptor::{
    streaming_client_handler, streaming_handler, unary_handler, BoxFuture, Interceptor,
    InterceptorChain, StreamingClientHandler, StreamingHandler, UnaryHandler,
};
pub use labels::{code_label, outcome_label, split_procedure, stream_type_label, CallLabels};
pub use metrics::{HistogramConfig, MetricsConfig, ServerMetrics};
pub use metrics_server::MetricsServer;
