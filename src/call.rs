//! Call descriptors, per-call context, and message envelopes
//!
//! Everything an interceptor can see about a call lives here: the immutable
//! [`CallSpec`] derived once at dispatch, the [`CallContext`] that flows down
//! the chain and can be enriched by interceptors, the type-erased unary
//! envelopes, and the [`StreamingConn`] trait for bidirectional streams.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tonic::metadata::MetadataMap;
use tonic::Status;

/// Stream shape of a call, as declared by the transport dispatch.
///
/// `Unrecognized` models wire values outside the four known kinds; label
/// derivation maps it to `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Single request, single response
    Unary,
    /// Client sends a stream, server responds once
    ClientStream,
    /// Client sends once, server streams responses
    ServerStream,
    /// Both sides stream
    BidiStream,
    /// Anything the dispatch layer could not classify
    Unrecognized,
}

/// Immutable descriptor of a call, derived once at dispatch
///
/// `procedure` is the fully-qualified method name, with or without a leading
/// slash (`"/pkg.Service/Method"` and `"pkg.Service/Method"` are equivalent
/// for label purposes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSpec {
    /// Stream shape of the call
    pub stream_kind: StreamKind,
    /// Fully-qualified method name
    pub procedure: String,
}

impl CallSpec {
    /// Create a spec with an explicit stream kind
    pub fn new(stream_kind: StreamKind, procedure: impl Into<String>) -> Self {
        Self {
            stream_kind,
            procedure: procedure.into(),
        }
    }

    /// Spec for a unary call
    pub fn unary(procedure: impl Into<String>) -> Self {
        Self::new(StreamKind::Unary, procedure)
    }

    /// Spec for a client-streaming call
    pub fn client_stream(procedure: impl Into<String>) -> Self {
        Self::new(StreamKind::ClientStream, procedure)
    }

    /// Spec for a server-streaming call
    pub fn server_stream(procedure: impl Into<String>) -> Self {
        Self::new(StreamKind::ServerStream, procedure)
    }

    /// Spec for a bidirectional-streaming call
    pub fn bidi_stream(procedure: impl Into<String>) -> Self {
        Self::new(StreamKind::BidiStream, procedure)
    }
}

/// Per-call context handed down the interceptor chain
///
/// Interceptors may enrich the context before invoking the next handler; the
/// auth gate stores the verified principal in [`extensions`](Self::extensions)
/// for downstream retrieval. Cancellation and deadlines belong to the host:
/// dropping the call future is cancellation, and this crate imposes no
/// timeout of its own.
#[derive(Debug, Default)]
pub struct CallContext {
    peer: Option<SocketAddr>,
    extensions: http::Extensions,
}

impl CallContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the remote peer address
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Remote peer address, when the transport knows it
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Typed extension map for context enrichment
    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    /// Mutable access to the extension map
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }
}

/// Type-erased unary request envelope
///
/// Carries the call spec, the request metadata, and the encoded message
/// payload. `Bytes` keeps the payload zero-copy through the chain.
#[derive(Debug, Clone)]
pub struct UnaryRequest {
    spec: CallSpec,
    metadata: MetadataMap,
    payload: Bytes,
}

impl UnaryRequest {
    /// Create a request with empty metadata
    pub fn new(spec: CallSpec, payload: Bytes) -> Self {
        Self {
            spec,
            metadata: MetadataMap::new(),
            payload,
        }
    }

    /// Replace the request metadata
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// The call's immutable descriptor
    pub fn spec(&self) -> &CallSpec {
        &self.spec
    }

    /// Request metadata (headers)
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable request metadata
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// Encoded message payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Type-erased unary response envelope
#[derive(Debug, Clone, Default)]
pub struct UnaryResponse {
    metadata: MetadataMap,
    payload: Bytes,
}

impl UnaryResponse {
    /// Create a response with empty metadata
    pub fn new(payload: Bytes) -> Self {
        Self {
            metadata: MetadataMap::new(),
            payload,
        }
    }

    /// Response metadata (headers)
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Mutable response metadata
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// Encoded message payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// A bidirectional message connection as seen by a streaming handler
///
/// The transport implements this; interceptors may substitute the connection
/// handed to the inner handler (the metrics decorator does) but must forward
/// all operations without altering observable call semantics.
///
/// `receive` returns `Ok(None)` on a clean end of stream; only `Ok(Some(_))`
/// is a delivered message.
#[async_trait]
pub trait StreamingConn: Send {
    /// The call's immutable descriptor
    fn spec(&self) -> &CallSpec;

    /// Remote peer address, when known
    fn peer(&self) -> Option<SocketAddr> {
        None
    }

    /// Request metadata sent by the client
    fn request_metadata(&self) -> &MetadataMap;

    /// Response metadata to send ahead of messages
    fn response_metadata(&mut self) -> &mut MetadataMap;

    /// Trailers to send when the stream closes
    fn response_trailers(&mut self) -> &mut MetadataMap;

    /// Receive the next message; `Ok(None)` means end of stream
    async fn receive(&mut self) -> Result<Option<Bytes>, Status>;

    /// Send a message to the client
    async fn send(&mut self, msg: Bytes) -> Result<(), Status>;
}
