use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use runtimoor::agent::dispatch::Dispatcher;
use runtimoor::agent::Agent;
use runtimoor::config::Config;
use runtimoor::ingest::event::EventId;
use runtimoor::ingest::stats::IngestStats;
use runtimoor::ingest::SocketIngest;

const HEADER_SIZE: usize = 24;
const MS: u64 = 1_000_000;
const BASE_NS: u64 = 1_700_000_000 * 1_000_000_000;

fn frame(event_id: u16, timestamp_ns: u64, thread_id: u64, pid: u32, slots: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + slots.len() * 8);
    buf.extend_from_slice(&timestamp_ns.to_le_bytes());
    buf.extend_from_slice(&thread_id.to_le_bytes());
    buf.extend_from_slice(&pid.to_le_bytes());
    buf.extend_from_slice(&event_id.to_le_bytes());
    buf.push(slots.len() as u8);
    buf.push(0);
    for slot in slots {
        buf.extend_from_slice(&slot.to_le_bytes());
    }
    buf
}

fn gc_frames() -> Vec<Vec<u8>> {
    vec![
        // Suspension for GC, resumed 30ms later.
        frame(EventId::GcSuspendEeBegin as u16, BASE_NS, 7, 100, &[0x1, 1]),
        // Gen2 background collection number 5, induced, running 40ms.
        frame(
            EventId::GcStart as u16,
            BASE_NS + 10 * MS,
            7,
            100,
            &[5, 2, 1, 1],
        ),
        frame(EventId::GcRestartEeEnd as u16, BASE_NS + 30 * MS, 7, 100, &[]),
        frame(EventId::GcEnd as u16, BASE_NS + 50 * MS, 7, 100, &[5]),
        frame(
            EventId::GcHeapStats as u16,
            BASE_NS + 50 * MS,
            7,
            100,
            &[1000, 0, 2000, 0, 3000, 0, 4000, 0, 0, 17, 9, 0],
        ),
        frame(EventId::GcAllocationTick as u16, BASE_NS, 7, 100, &[102_400, 0]),
        frame(EventId::GcAllocationTick as u16, BASE_NS, 7, 100, &[200_000, 1]),
    ]
}

async fn scrape(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect metrics server");
    let request = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .expect("send request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    match response.split_once("\r\n\r\n") {
        Some((_, body)) => body.to_string(),
        None => response,
    }
}

/// Value of the series whose rendered line starts with `series` followed
/// by a space. Labeled series must be given with their label set.
fn metric_value(body: &str, series: &str) -> Option<f64> {
    body.lines().find_map(|line| {
        let rest = line.strip_prefix(series)?;
        let rest = rest.strip_prefix(' ')?;
        rest.trim().parse().ok()
    })
}

fn assert_metric(body: &str, series: &str, expected: f64) {
    let got = metric_value(body, series)
        .unwrap_or_else(|| panic!("series {series} missing from scrape:\n{body}"));
    assert!(
        (got - expected).abs() < 1e-9,
        "{series}: expected {expected}, got {got}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_blackbox_socket_to_metrics() {
    let mut cfg = Config::default();
    cfg.ingest.addr = "127.0.0.1:0".to_string();
    cfg.metrics.addr = "127.0.0.1:0".to_string();
    // Keep counts exact: no sampling.
    cfg.collectors.contention.sample_every = 1;
    cfg.collectors.jit.sample_every = 1;

    let mut agent = Agent::new(cfg);
    agent.start().await.expect("start agent");
    let ingest_addr = agent.ingest_addr().expect("ingest bound");
    let metrics_addr = agent.metrics_addr().expect("metrics bound");

    let mut frames = gc_frames();
    // Lock held 50ms on thread 42.
    frames.push(frame(EventId::ContentionStart as u16, BASE_NS, 42, 100, &[]));
    frames.push(frame(
        EventId::ContentionStop as u16,
        BASE_NS + 50 * MS,
        42,
        100,
        &[],
    ));
    // Method 777 compiled in 20ms, not dynamic.
    frames.push(frame(EventId::MethodJitStart as u16, BASE_NS, 9, 100, &[777]));
    frames.push(frame(
        EventId::MethodLoadVerbose as u16,
        BASE_NS + 20 * MS,
        9,
        100,
        &[777, 0, 0, 0, 0, 0],
    ));
    // Worker pool climbed to 8 threads; IO pool has 4.
    frames.push(frame(EventId::ThreadPoolAdjustment as u16, BASE_NS, 7, 100, &[0, 8, 3]));
    frames.push(frame(EventId::IoThreadCreate as u16, BASE_NS, 7, 100, &[4]));
    frames.push(frame(EventId::ExceptionThrown as u16, BASE_NS, 7, 100, &[]));
    // No parser claims id 77.
    frames.push(frame(77, BASE_NS, 7, 100, &[]));
    let total_frames = frames.len() as f64;

    let mut conn = TcpStream::connect(ingest_addr).await.expect("connect ingest");
    for data in &frames {
        conn.write_all(data).await.expect("send frame");
    }
    conn.flush().await.expect("flush frames");

    // Ingestion is asynchronous; wait until every frame is accounted for.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let body = loop {
        let body = scrape(metrics_addr, "/metrics").await;
        if metric_value(&body, "runtimoor_frames_received") == Some(total_frames) {
            break body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "frames not ingested in time, last scrape:\n{body}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    };

    // Ingest accounting.
    assert_metric(&body, "runtimoor_events_dispatched", total_frames - 1.0);
    assert_metric(&body, "runtimoor_events_unrecognized", 1.0);
    assert_metric(&body, "runtimoor_decode_errors", 0.0);
    assert_metric(&body, "runtimoor_malformed_events", 0.0);
    assert_metric(&body, "runtimoor_active_connections", 1.0);

    // GC collection, pause, heap, and allocation series.
    assert_metric(
        &body,
        "runtime_gc_collection_seconds_count{gc_generation=\"2\",gc_type=\"background_gc\"}",
        1.0,
    );
    assert_metric(
        &body,
        "runtime_gc_collection_seconds_sum{gc_generation=\"2\",gc_type=\"background_gc\"}",
        0.04,
    );
    assert_metric(
        &body,
        "runtime_gc_collection_count_total{gc_generation=\"2\",gc_reason=\"induced\"}",
        1.0,
    );
    assert_metric(&body, "runtime_gc_pause_seconds_count", 1.0);
    assert_metric(&body, "runtime_gc_pause_seconds_sum", 0.03);
    assert_metric(&body, "runtime_gc_heap_size_bytes{gc_generation=\"0\"}", 1000.0);
    assert_metric(&body, "runtime_gc_heap_size_bytes{gc_generation=\"1\"}", 2000.0);
    assert_metric(&body, "runtime_gc_heap_size_bytes{gc_generation=\"2\"}", 3000.0);
    assert_metric(&body, "runtime_gc_heap_size_bytes{gc_generation=\"loh\"}", 4000.0);
    assert_metric(&body, "runtime_gc_pinned_objects", 9.0);
    assert_metric(&body, "runtime_gc_finalization_queue_length", 17.0);
    assert_metric(&body, "runtime_gc_allocated_bytes_total{gc_heap=\"soh\"}", 102_400.0);
    assert_metric(&body, "runtime_gc_allocated_bytes_total{gc_heap=\"loh\"}", 200_000.0);

    // Contention, JIT, thread pool, and exception series.
    assert_metric(&body, "runtime_contention_total", 1.0);
    assert_metric(&body, "runtime_contention_seconds_total", 0.05);
    assert_metric(&body, "runtime_jit_method_total{dynamic=\"false\"}", 1.0);
    assert_metric(&body, "runtime_jit_method_seconds_total{dynamic=\"false\"}", 0.02);
    assert_metric(&body, "runtime_threadpool_num_threads", 8.0);
    assert_metric(
        &body,
        "runtime_threadpool_adjustments_total{adjustment_reason=\"climbing_move\"}",
        1.0,
    );
    assert_metric(&body, "runtime_threadpool_io_num_threads", 4.0);
    assert_metric(&body, "runtime_exceptions_total", 1.0);

    // Ratio gauges update at scrape time and stay within [0, 1].
    for series in ["runtime_gc_cpu_ratio", "runtime_gc_pause_ratio", "runtime_jit_cpu_ratio"] {
        let ratio = metric_value(&body, series)
            .unwrap_or_else(|| panic!("series {series} missing from scrape:\n{body}"));
        assert!((0.0..=1.0).contains(&ratio), "{series} out of range: {ratio}");
    }

    assert_eq!(scrape(metrics_addr, "/healthz").await, "ok");

    drop(conn);
    agent.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn decode_errors_close_connections() {
    let stats = Arc::new(IngestStats::new());
    let mut ingest = SocketIngest::new(
        "127.0.0.1:0".to_string(),
        Arc::new(Dispatcher::new()),
        Arc::clone(&stats),
    );
    ingest.start().await.expect("start ingest");
    let addr = ingest.local_addr().expect("ingest bound");

    // A header declaring more payload slots than any frame can carry is
    // fatal for the connection.
    let mut oversized = frame(EventId::ExceptionThrown as u16, BASE_NS, 7, 100, &[]);
    oversized[22] = 17;
    let mut conn = TcpStream::connect(addr).await.expect("connect");
    conn.write_all(&frame(77, BASE_NS, 7, 100, &[])).await.expect("send");
    conn.write_all(&oversized).await.expect("send");
    let mut probe = [0u8; 1];
    assert_eq!(conn.read(&mut probe).await.expect("read"), 0, "server should close");

    // A zero event id decodes the frame but fails validation.
    let mut conn = TcpStream::connect(addr).await.expect("connect");
    conn.write_all(&frame(0, BASE_NS, 7, 100, &[1])).await.expect("send");
    assert_eq!(conn.read(&mut probe).await.expect("read"), 0, "server should close");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = stats.snapshot();
        if snapshot.decode_errors == 2 && snapshot.active_connections() == 0 {
            assert_eq!(snapshot.frames_received, 2);
            assert_eq!(snapshot.events_unrecognized, 1);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "decode errors not recorded in time: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    ingest.stop().await;
}
