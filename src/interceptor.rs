//! Interceptor composition contract
//!
//! An [`Interceptor`] is a cross-cutting concern that wraps call handling
//! without touching service logic. It exposes three wrap points, each taking
//! the next handler and returning a replacement with the same signature:
//!
//! ```text
//! dispatch ──► interceptor A ──► interceptor B ──► service handler
//!                 (outermost)        (innermost wrap)
//! ```
//!
//! Contract: a wrap must propagate the inner handler's error unchanged unless
//! error conversion is its documented purpose, and must not introduce
//! blocking beyond constant-time bookkeeping.
//!
//! # Example
//!
//! ```ignore
//! let mut chain = InterceptorChain::new();
//! chain.add(metrics.clone());                       // outermost
//! chain.add(HeaderInterceptor::new(bearer_auth));   // runs under metrics
//!
//! let handler = chain.apply_unary(unary_handler(|_ctx, req| async move {
//!     Ok(UnaryResponse::new(req.payload().clone()))
//! }));
//! ```

use crate::call::{CallContext, CallSpec, StreamingConn, UnaryRequest, UnaryResponse};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tonic::Status;

/// Boxed future used by all handler signatures
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for a unary call: one request in, one response or error out
pub type UnaryHandler = Arc<
    dyn Fn(CallContext, UnaryRequest) -> BoxFuture<'static, Result<UnaryResponse, Status>>
        + Send
        + Sync,
>;

/// Handler for a server-side streaming call
///
/// The handler drives the connection itself; the returned error (or `Ok`)
/// is the call outcome.
pub type StreamingHandler = Arc<
    dyn Fn(CallContext, Box<dyn StreamingConn>) -> BoxFuture<'static, Result<(), Status>>
        + Send
        + Sync,
>;

/// Handler that opens an outbound client stream for a spec
pub type StreamingClientHandler = Arc<
    dyn Fn(CallContext, CallSpec) -> BoxFuture<'static, Result<Box<dyn StreamingConn>, Status>>
        + Send
        + Sync,
>;

/// Lift an async function into a [`UnaryHandler`]
pub fn unary_handler<F, Fut>(f: F) -> UnaryHandler
where
    F: Fn(CallContext, UnaryRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<UnaryResponse, Status>> + Send + 'static,
{
    Arc::new(move |ctx, req| Box::pin(f(ctx, req)))
}

/// Lift an async function into a [`StreamingHandler`]
pub fn streaming_handler<F, Fut>(f: F) -> StreamingHandler
where
    F: Fn(CallContext, Box<dyn StreamingConn>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    Arc::new(move |ctx, conn| Box::pin(f(ctx, conn)))
}

/// Lift an async function into a [`StreamingClientHandler`]
pub fn streaming_client_handler<F, Fut>(f: F) -> StreamingClientHandler
where
    F: Fn(CallContext, CallSpec) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn StreamingConn>, Status>> + Send + 'static,
{
    Arc::new(move |ctx, spec| Box::pin(f(ctx, spec)))
}

/// A cross-cutting concern composable around call handling
///
/// Every wrap point defaults to pass-through, so an implementation only
/// overrides the shapes it instruments.
pub trait Interceptor: Send + Sync {
    /// Wrap unary call handling
    fn wrap_unary(&self, next: UnaryHandler) -> UnaryHandler {
        next
    }

    /// Wrap outbound client stream creation
    fn wrap_streaming_client(&self, next: StreamingClientHandler) -> StreamingClientHandler {
        next
    }

    /// Wrap server-side stream handling
    fn wrap_streaming_handler(&self, next: StreamingHandler) -> StreamingHandler {
        next
    }
}

/// An ordered interceptor stack
///
/// The first interceptor added becomes the outermost wrap: it sees the call
/// first on the way in and last on the way out.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor to the chain
    pub fn add<I: Interceptor + 'static>(&mut self, interceptor: I) {
        self.interceptors.push(Arc::new(interceptor));
    }

    /// Append a shared interceptor to the chain
    pub fn add_arc(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Number of interceptors in the chain
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Compose the chain around a unary handler
    pub fn apply_unary(&self, handler: UnaryHandler) -> UnaryHandler {
        self.interceptors
            .iter()
            .rev()
            .fold(handler, |next, i| i.wrap_unary(next))
    }

    /// Compose the chain around a streaming-client handler
    pub fn apply_streaming_client(&self, handler: StreamingClientHandler) -> StreamingClientHandler {
        self.interceptors
            .iter()
            .rev()
            .fold(handler, |next, i| i.wrap_streaming_client(next))
    }

    /// Compose the chain around a streaming handler
    pub fn apply_streaming_handler(&self, handler: StreamingHandler) -> StreamingHandler {
        self.interceptors
            .iter()
            .rev()
            .fold(handler, |next, i| i.wrap_streaming_handler(next))
    }
}
