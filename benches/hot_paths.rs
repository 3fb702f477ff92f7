use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use runtimoor::agent::dispatch::Dispatcher;
use runtimoor::correlate::pair::PairTimer;
use runtimoor::correlate::sampling::{SampleEvery, SamplingRate};
use runtimoor::ingest::codec::decode_frame;
use runtimoor::ingest::event::{EventId, RawEvent};
use runtimoor::ingest::stats::IngestStats;
use runtimoor::parsers::threadpool::ThreadPoolParser;

const HEADER_SIZE: usize = 24;

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

fn bench_decode_frame(c: &mut Criterion) {
    let gc_start = frame(EventId::GcStart as u16, 123_456_789, 7, 100, &[5, 2, 1, 1]);
    let heap_stats = frame(
        EventId::GcHeapStats as u16,
        123_456_789,
        7,
        100,
        &[1000, 0, 2000, 0, 3000, 0, 4000, 0, 0, 17, 9, 0],
    );

    c.bench_function("decode_frame/gc_start", |b| {
        b.iter(|| decode_frame(black_box(&gc_start)).expect("decode gc start"))
    });

    c.bench_function("decode_frame/heap_stats", |b| {
        b.iter(|| decode_frame(black_box(&heap_stats)).expect("decode heap stats"))
    });
}

fn bench_sampler(c: &mut Criterion) {
    let sampler = SamplingRate::new(SampleEvery::Ten);

    c.bench_function("sampler/should_sample", |b| {
        b.iter(|| black_box(sampler.should_sample()))
    });
}

fn bench_pair_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("build runtime");
    let timer: PairTimer<u64> = {
        let _guard = rt.enter();
        PairTimer::new(
            EventId::ContentionStart as u16,
            EventId::ContentionStop as u16,
            |e| e.thread_id,
            SampleEvery::One,
            Duration::from_secs(300),
            1024,
        )
        .expect("build timer")
    };
    let start = RawEvent::new(EventId::ContentionStart as u16, 0, 42, 100, &[]);
    let end = RawEvent::new(EventId::ContentionStop as u16, 50_000_000, 42, 100, &[]);

    c.bench_function("pair/matched_cycle", |b| {
        b.iter(|| {
            black_box(timer.observe(black_box(&start)));
            black_box(timer.observe(black_box(&end)))
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let stats = Arc::new(IngestStats::new());
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(ThreadPoolParser::new(stats)));
    let adjustment = RawEvent::new(
        EventId::ThreadPoolAdjustment as u16,
        123_456_789,
        7,
        100,
        &[0, 8, 3],
    );

    c.bench_function("dispatch/threadpool_adjustment", |b| {
        b.iter(|| black_box(dispatcher.dispatch(black_box(&adjustment))))
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_decode_frame(c);
    bench_sampler(c);
    bench_pair_cycle(c);
    bench_dispatch(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
