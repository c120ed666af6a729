//! Bearer-token authentication gate
//!
//! Extracts a bearer credential from request metadata, verifies it against an
//! identity provider through the [`TokenVerifier`] trait, optionally checks
//! claims, and stores the verified principal in the call context for
//! downstream retrieval. Token cryptography stays behind the trait; this
//! module only decides where the credential comes from and what a failure
//! maps to:
//!
//! - missing, malformed, or unverifiable credential → `Unauthenticated`
//! - valid credential with insufficient claims → `PermissionDenied`
//!
//! # Example
//!
//! ```ignore
//! let gate = BearerAuth::new(my_oidc_client).require_role("operator");
//! chain.add(gate.into_interceptor());
//!
//! // later, inside a handler:
//! let who = VerifiedToken::from_context(&ctx).map(|t| t.subject.clone());
//! ```

use crate::call::CallContext;
use crate::context::{HeaderHook, HeaderInterceptor};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tonic::Status;

/// Metadata key the credential is read from
const AUTHORIZATION_HEADER: &str = "authorization";

/// Failure reported by a [`TokenVerifier`]
///
/// Every variant surfaces to the caller as `Unauthenticated`; the split
/// exists so verifier implementations can log transport trouble apart from
/// bad credentials.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The credential is expired, malformed, or fails verification
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The identity provider could not be reached
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// A verified principal, stored in the call context on success
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Subject identifier asserted by the identity provider
    pub subject: String,
    /// Raw claim set of the token
    pub claims: serde_json::Value,
}

impl VerifiedToken {
    /// Retrieve the verified principal stored by the auth gate
    pub fn from_context(ctx: &CallContext) -> Option<&VerifiedToken> {
        ctx.extensions().get::<VerifiedToken>()
    }

    /// Look up a claim by name
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }
}

/// Delegation point for credential verification
///
/// Implementations wrap a real identity-provider client (OIDC, PASETO, an
/// internal token service); this crate never inspects the credential itself.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a raw bearer credential and return the principal it asserts
    async fn verify(&self, raw_token: &str) -> Result<VerifiedToken, VerifyError>;
}

type ClaimCheck = Box<dyn Fn(&VerifiedToken) -> Result<(), Status> + Send + Sync>;

/// Bearer-token auth gate over a [`TokenVerifier`]
///
/// Built once at server startup and composed into the interceptor chain via
/// [`into_interceptor`](Self::into_interceptor). Claim checks run in the
/// order they were added, after verification succeeds.
pub struct BearerAuth<V> {
    verifier: Arc<V>,
    checks: Vec<ClaimCheck>,
}

impl<V: TokenVerifier + 'static> BearerAuth<V> {
    /// Create a gate around a verifier
    pub fn new(verifier: V) -> Self {
        Self::from_arc(Arc::new(verifier))
    }

    /// Create a gate around a shared verifier
    pub fn from_arc(verifier: Arc<V>) -> Self {
        Self {
            verifier,
            checks: Vec::new(),
        }
    }

    /// Require the token's `roles` claim to contain `role`
    ///
    /// A missing or non-array `roles` claim is `Unauthenticated`; a readable
    /// claim without the role is `PermissionDenied`. Role comparison trims
    /// surrounding whitespace on both sides.
    pub fn require_role(self, role: impl Into<String>) -> Self {
        let role = role.into().trim().to_string();
        self.with_check(move |token| match token.claim("roles").and_then(|v| v.as_array()) {
            None => Err(Status::unauthenticated("no roles claim")),
            Some(roles) => {
                if roles
                    .iter()
                    .filter_map(|r| r.as_str())
                    .any(|r| r.trim() == role)
                {
                    Ok(())
                } else {
                    Err(Status::permission_denied(format!("missing role {role}")))
                }
            }
        })
    }

    /// Add a custom check run against the verified token
    pub fn with_check(
        mut self,
        check: impl Fn(&VerifiedToken) -> Result<(), Status> + Send + Sync + 'static,
    ) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Finish the gate as a chain-composable interceptor
    pub fn into_interceptor(self) -> HeaderInterceptor<BearerAuth<V>> {
        HeaderInterceptor::new(self)
    }
}

#[async_trait]
impl<V: TokenVerifier> HeaderHook for BearerAuth<V> {
    async fn apply(&self, ctx: &mut CallContext, headers: &MetadataMap) -> Result<(), Status> {
        let raw = headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let raw = raw.strip_prefix("Bearer").unwrap_or(raw).trim();
        if raw.is_empty() {
            return Err(Status::unauthenticated("missing bearer token"));
        }

        let token = self.verifier.verify(raw).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            Status::unauthenticated(e.to_string())
        })?;

        for check in &self.checks {
            check(&token)?;
        }

        tracing::debug!(subject = %token.subject, "call authenticated");
        ctx.extensions_mut().insert(token);
        Ok(())
    }
}
