//! Context-enrichment interceptors
//!
//! Adapters that turn a single async hook into a full [`Interceptor`]: the
//! hook runs before the inner handler on unary and streaming paths, may
//! enrich the [`CallContext`], and fails the call with its own error. Hook
//! errors pass through unchanged; outbound client streams are untouched.
//!
//! The auth gate is built on [`HeaderInterceptor`]; [`SpecInterceptor`] is
//! the same shape for hooks keyed on the call descriptor instead of request
//! metadata.

use crate::call::{CallContext, CallSpec};
use crate::interceptor::{Interceptor, StreamingHandler, UnaryHandler};
use async_trait::async_trait;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Status;

/// Hook invoked with the call descriptor before the inner handler runs
#[async_trait]
pub trait SpecHook: Send + Sync {
    /// Enrich the context or reject the call
    async fn apply(&self, ctx: &mut CallContext, spec: &CallSpec) -> Result<(), Status>;
}

/// Hook invoked with the request metadata before the inner handler runs
#[async_trait]
pub trait HeaderHook: Send + Sync {
    /// Enrich the context or reject the call
    async fn apply(&self, ctx: &mut CallContext, headers: &MetadataMap) -> Result<(), Status>;
}

/// Interceptor running a [`SpecHook`] ahead of every inbound call
pub struct SpecInterceptor<H> {
    hook: Arc<H>,
}

impl<H: SpecHook> SpecInterceptor<H> {
    /// Wrap a hook into an interceptor
    pub fn new(hook: H) -> Self {
        Self {
            hook: Arc::new(hook),
        }
    }
}

impl<H: SpecHook + 'static> Interceptor for SpecInterceptor<H> {
    fn wrap_unary(&self, next: UnaryHandler) -> UnaryHandler {
        let hook = Arc::clone(&self.hook);
        Arc::new(move |mut ctx, req| {
            let hook = Arc::clone(&hook);
            let next = Arc::clone(&next);
            Box::pin(async move {
                hook.apply(&mut ctx, req.spec()).await?;
                next(ctx, req).await
            })
        })
    }

    fn wrap_streaming_handler(&self, next: StreamingHandler) -> StreamingHandler {
        let hook = Arc::clone(&self.hook);
        Arc::new(move |mut ctx, conn| {
            let hook = Arc::clone(&hook);
            let next = Arc::clone(&next);
            Box::pin(async move {
                hook.apply(&mut ctx, conn.spec()).await?;
                next(ctx, conn).await
            })
        })
    }
}

/// Interceptor running a [`HeaderHook`] ahead of every inbound call
pub struct HeaderInterceptor<H> {
    hook: Arc<H>,
}

impl<H: HeaderHook> HeaderInterceptor<H> {
    /// Wrap a hook into an interceptor
    pub fn new(hook: H) -> Self {
        Self {
            hook: Arc::new(hook),
        }
    }
}

impl<H: HeaderHook + 'static> Interceptor for HeaderInterceptor<H> {
    fn wrap_unary(&self, next: UnaryHandler) -> UnaryHandler {
        let hook = Arc::clone(&self.hook);
        Arc::new(move |mut ctx, req| {
            let hook = Arc::clone(&hook);
            let next = Arc::clone(&next);
            Box::pin(async move {
                hook.apply(&mut ctx, req.metadata()).await?;
                next(ctx, req).await
            })
        })
    }

    fn wrap_streaming_handler(&self, next: StreamingHandler) -> StreamingHandler {
        let hook = Arc::clone(&self.hook);
        Arc::new(move |mut ctx, conn| {
            let hook = Arc::clone(&hook);
            let next = Arc::clone(&next);
            Box::pin(async move {
                hook.apply(&mut ctx, conn.request_metadata()).await?;
                next(ctx, conn).await
            })
        })
    }
}
