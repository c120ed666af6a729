//! Registry integration and exposition-format tests
//!
//! Validates the pull-based collector contract against a real
//! `prometheus::Registry`: exact metric names and help text, histogram
//! opt-in, and snapshot reads interleaved with live interception.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::Bytes;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use valvo::{
    unary_handler, CallContext, CallSpec, HistogramConfig, Interceptor, ManualClock,
    MetricsConfig, ServerMetrics, UnaryRequest, UnaryResponse,
};

fn encode(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

async fn run_ok_call(metrics: &ServerMetrics, procedure: &str) {
    let handler = metrics.wrap_unary(unary_handler(|_ctx, _req| async move {
        Ok(UnaryResponse::default())
    }));
    handler(
        CallContext::new(),
        UnaryRequest::new(CallSpec::unary(procedure), Bytes::new()),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn exposition_uses_fixed_names_and_help() {
    let metrics = ServerMetrics::new().unwrap();
    let registry = Registry::new();
    registry.register(Box::new(metrics.clone())).unwrap();

    run_ok_call(&metrics, "/pkg.Search/Query").await;
    let text = encode(&registry);

    assert!(text.contains(
        "# HELP grpc_server_started_total Total number of RPCs started on the server."
    ));
    assert!(text.contains(
        "# HELP grpc_server_handled_total Total number of RPCs completed on the server, regardless of success or failure."
    ));
    assert!(text.contains(
        "# HELP grpc_server_msg_received_total Total number of RPC stream messages received on the server."
    ));
    assert!(text.contains(
        "# HELP grpc_server_msg_sent_total Total number of gRPC stream messages sent by the server."
    ));

    assert!(text.contains(
        r#"grpc_server_started_total{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary"} 1"#
    ));
    assert!(text.contains(
        r#"grpc_server_handled_total{grpc_code="OK",grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary"} 1"#
    ));
}

#[tokio::test]
async fn histogram_family_appears_only_after_enable() {
    let metrics = ServerMetrics::new().unwrap();
    let registry = Registry::new();
    registry.register(Box::new(metrics.clone())).unwrap();

    run_ok_call(&metrics, "/pkg.Search/Query").await;
    assert!(!encode(&registry).contains("grpc_server_handling_seconds"));

    metrics
        .enable_handling_time_histogram(HistogramConfig::new())
        .unwrap();
    run_ok_call(&metrics, "/pkg.Search/Query").await;

    let text = encode(&registry);
    assert!(text.contains(
        "# HELP grpc_server_handling_seconds Histogram of response latency (seconds) of gRPC that had been application-level handled by the server."
    ));
    // Only the post-enable call is observed.
    assert!(text.contains(
        r#"grpc_server_handling_seconds_count{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary"} 1"#
    ));
    assert!(text.contains(r#"le="+Inf""#));
}

#[tokio::test]
async fn histogram_const_labels_are_separate_from_counters() {
    let clock = Arc::new(ManualClock::new());
    let metrics = ServerMetrics::with_config(
        MetricsConfig::new()
            .const_label("shard", "eu-1")
            .clock(clock.clone()),
    )
    .unwrap();
    metrics
        .enable_handling_time_histogram(
            HistogramConfig::new()
                .buckets(vec![0.1, 1.0, 10.0])
                .const_label("quantile_set", "coarse"),
        )
        .unwrap();

    let registry = Registry::new();
    registry.register(Box::new(metrics.clone())).unwrap();

    let inner_clock = clock.clone();
    let handler = metrics.wrap_unary(unary_handler(move |_ctx, _req| {
        let clock = inner_clock.clone();
        async move {
            clock.advance(Duration::from_millis(300));
            Ok(UnaryResponse::default())
        }
    }));
    handler(
        CallContext::new(),
        UnaryRequest::new(CallSpec::unary("/pkg.Search/Query"), Bytes::new()),
    )
    .await
    .unwrap();

    let text = encode(&registry);
    // Counters carry the shard label, the histogram carries its own set.
    assert!(text.contains(r#"grpc_server_started_total{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary",shard="eu-1"} 1"#));
    assert!(text.contains("quantile_set=\"coarse\""));
    // 0.3s lands in the le=1 bucket but not le=0.1.
    assert!(text.contains(r#"grpc_server_handling_seconds_bucket{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary",quantile_set="coarse",le="0.1"} 0"#));
    assert!(text.contains(r#"grpc_server_handling_seconds_bucket{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary",quantile_set="coarse",le="1"} 1"#));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn snapshot_reads_interleave_with_writers() {
    let metrics = ServerMetrics::new().unwrap();
    let registry = Registry::new();
    registry.register(Box::new(metrics.clone())).unwrap();

    let handler = metrics.wrap_unary(unary_handler(|_ctx, _req| async move {
        tokio::task::yield_now().await;
        Ok(UnaryResponse::default())
    }));

    let writer = {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            for _ in 0..200 {
                handler(
                    CallContext::new(),
                    UnaryRequest::new(CallSpec::unary("/pkg.Search/Query"), Bytes::new()),
                )
                .await
                .unwrap();
            }
        })
    };
    let reader = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                // Snapshots must never observe torn series, only lag.
                let _ = registry.gather();
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    let text = encode(&registry);
    assert!(text.contains(
        r#"grpc_server_started_total{grpc_method="Query",grpc_service="pkg.Search",grpc_type="unary"} 200"#
    ));
}
