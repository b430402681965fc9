//! Benchmarks for broadcast hub fan-out

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use radio_relay::broadcast::{BroadcastHub, Subscription};

/// One throttle sub-chunk at the default bitrate
const CHUNK: usize = 2508;

fn drain(subscriptions: &mut [Subscription]) {
    for subscription in subscriptions {
        while subscription.try_recv().is_some() {}
    }
}

fn bench_write(c: &mut Criterion) {
    let chunk = Bytes::from(vec![0u8; CHUNK]);
    let mut group = c.benchmark_group("hub_write");

    for listeners in [1usize, 16, 256] {
        let hub = BroadcastHub::new(32);
        let mut subscriptions: Vec<_> = (0..listeners).map(|_| hub.subscribe()).collect();

        group.throughput(Throughput::Bytes((CHUNK * listeners) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
            b.iter(|| {
                hub.write(black_box(chunk.clone()));
                drain(&mut subscriptions);
            })
        });
    }

    group.finish();
}

fn bench_subscribe(c: &mut Criterion) {
    let hub = BroadcastHub::new(32);
    for _ in 0..32 {
        hub.write(Bytes::from(vec![0u8; CHUNK]));
    }

    c.bench_function("subscribe_with_replay", |b| {
        b.iter(|| black_box(hub.subscribe()))
    });
}

criterion_group!(benches, bench_write, bench_subscribe);
criterion_main!(benches);
