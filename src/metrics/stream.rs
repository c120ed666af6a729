//! Message-counting decorator for streaming connections
//!
//! Wraps the connection handed to a streaming handler so every successful
//! transfer updates the call's reporter. Failed transfers and a clean end of
//! stream count nothing, and every other connection operation forwards
//! untouched. The decorator adds counting side effects only.

use super::CallReporter;
use crate::call::{CallSpec, StreamingConn};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::Status;

pub(crate) struct MonitoredConn {
    inner: Box<dyn StreamingConn>,
    reporter: Arc<CallReporter>,
}

impl MonitoredConn {
    pub(crate) fn new(inner: Box<dyn StreamingConn>, reporter: Arc<CallReporter>) -> Self {
        Self { inner, reporter }
    }
}

#[async_trait]
impl StreamingConn for MonitoredConn {
    fn spec(&self) -> &CallSpec {
        self.inner.spec()
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer()
    }

    fn request_metadata(&self) -> &MetadataMap {
        self.inner.request_metadata()
    }

    fn response_metadata(&mut self) -> &mut MetadataMap {
        self.inner.response_metadata()
    }

    fn response_trailers(&mut self) -> &mut MetadataMap {
        self.inner.response_trailers()
    }

    async fn receive(&mut self) -> Result<Option<Bytes>, Status> {
        let result = self.inner.receive().await;
        if let Ok(Some(_)) = &result {
            self.reporter.record_receive();
        }
        result
    }

    async fn send(&mut self, msg: Bytes) -> Result<(), Status> {
        let result = self.inner.send(msg).await;
        if result.is_ok() {
            self.reporter.record_send();
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::labels::CallLabels;
    use crate::metrics::ServerMetrics;
    use std::collections::VecDeque;

    /// Connection that replays a scripted sequence of transfer results
    struct ScriptedConn {
        spec: CallSpec,
        request_metadata: MetadataMap,
        response_metadata: MetadataMap,
        trailers: MetadataMap,
        receives: VecDeque<Result<Option<Bytes>, Status>>,
        sends: VecDeque<Result<(), Status>>,
    }

    impl ScriptedConn {
        fn new(spec: CallSpec) -> Self {
            Self {
                spec,
                request_metadata: MetadataMap::new(),
                response_metadata: MetadataMap::new(),
                trailers: MetadataMap::new(),
                receives: VecDeque::new(),
                sends: VecDeque::new(),
            }
        }

        fn script_receive(mut self, result: Result<Option<Bytes>, Status>) -> Self {
            self.receives.push_back(result);
            self
        }

        fn script_send(mut self, result: Result<(), Status>) -> Self {
            self.sends.push_back(result);
            self
        }
    }

    #[async_trait]
    impl StreamingConn for ScriptedConn {
        fn spec(&self) -> &CallSpec {
            &self.spec
        }
        fn request_metadata(&self) -> &MetadataMap {
            &self.request_metadata
        }
        fn response_metadata(&mut self) -> &mut MetadataMap {
            &mut self.response_metadata
        }
        fn response_trailers(&mut self) -> &mut MetadataMap {
            &mut self.trailers
        }
        async fn receive(&mut self) -> Result<Option<Bytes>, Status> {
            self.receives.pop_front().unwrap_or(Ok(None))
        }
        async fn send(&mut self, _msg: Bytes) -> Result<(), Status> {
            self.sends.pop_front().unwrap_or(Ok(()))
        }
    }

    fn monitored(metrics: &ServerMetrics, conn: ScriptedConn) -> (MonitoredConn, Arc<CallReporter>) {
        let mut reporter = CallReporter::new(metrics.clone(), conn.spec());
        reporter.start();
        let reporter = Arc::new(reporter);
        (
            MonitoredConn::new(Box::new(conn), Arc::clone(&reporter)),
            reporter,
        )
    }

    fn bidi_labels() -> CallLabels {
        CallLabels::from_spec(&CallSpec::bidi_stream("/t.Svc/Watch"))
    }

    #[tokio::test]
    async fn test_successful_transfers_count() {
        let metrics = ServerMetrics::new().unwrap();
        let conn = ScriptedConn::new(CallSpec::bidi_stream("/t.Svc/Watch"))
            .script_receive(Ok(Some(Bytes::from_static(b"a"))))
            .script_receive(Ok(Some(Bytes::from_static(b"b"))))
            .script_send(Ok(()))
            .script_send(Ok(()))
            .script_send(Ok(()));
        let (mut conn, reporter) = monitored(&metrics, conn);

        assert!(conn.receive().await.unwrap().is_some());
        assert!(conn.receive().await.unwrap().is_some());
        for _ in 0..3 {
            conn.send(Bytes::new()).await.unwrap();
        }
        reporter.done(None);

        assert_eq!(metrics.msg_received_total(&bidi_labels()), 2);
        assert_eq!(metrics.msg_sent_total(&bidi_labels()), 3);
    }

    #[tokio::test]
    async fn test_failed_transfers_do_not_count() {
        let metrics = ServerMetrics::new().unwrap();
        let conn = ScriptedConn::new(CallSpec::bidi_stream("/t.Svc/Watch"))
            .script_receive(Err(Status::unavailable("closed")))
            .script_send(Err(Status::unavailable("closed")));
        let (mut conn, reporter) = monitored(&metrics, conn);

        assert!(conn.receive().await.is_err());
        assert!(conn.send(Bytes::new()).await.is_err());
        reporter.done(Some(&Status::unavailable("closed")));

        assert_eq!(metrics.msg_received_total(&bidi_labels()), 0);
        assert_eq!(metrics.msg_sent_total(&bidi_labels()), 0);
    }

    #[tokio::test]
    async fn test_end_of_stream_does_not_count() {
        let metrics = ServerMetrics::new().unwrap();
        let conn = ScriptedConn::new(CallSpec::bidi_stream("/t.Svc/Watch"))
            .script_receive(Ok(Some(Bytes::from_static(b"only"))))
            .script_receive(Ok(None));
        let (mut conn, reporter) = monitored(&metrics, conn);

        assert!(conn.receive().await.unwrap().is_some());
        assert!(conn.receive().await.unwrap().is_none());
        reporter.done(None);

        assert_eq!(metrics.msg_received_total(&bidi_labels()), 1);
    }

    #[tokio::test]
    async fn test_transfer_errors_pass_through_unchanged() {
        let metrics = ServerMetrics::new().unwrap();
        let conn = ScriptedConn::new(CallSpec::bidi_stream("/t.Svc/Watch"))
            .script_receive(Err(Status::data_loss("torn frame")));
        let (mut conn, _reporter) = monitored(&metrics, conn);

        let err = conn.receive().await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::DataLoss);
        assert_eq!(err.message(), "torn frame");
    }

    #[tokio::test]
    async fn test_metadata_forwarded_untouched() {
        let metrics = ServerMetrics::new().unwrap();
        let mut conn = ScriptedConn::new(CallSpec::server_stream("/t.Svc/List"));
        conn.request_metadata
            .insert("x-tenant", "acme".parse().expect("ascii"));
        let (mut conn, _reporter) = monitored(&metrics, conn);

        assert_eq!(conn.spec().procedure, "/t.Svc/List");
        assert_eq!(
            conn.request_metadata()
                .get("x-tenant")
                .and_then(|v| v.to_str().ok()),
            Some("acme")
        );
        conn.response_metadata()
            .insert("x-served-by", "node-1".parse().expect("ascii"));
        conn.response_trailers()
            .insert("x-status-detail", "done".parse().expect("ascii"));
    }
}
