use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ring_queues::MpmcQueue;
use std::sync::Arc;
use std::thread;

// Queue capacity for benchmarks
const CAPACITY: usize = 1024;
// Number of ping-pong operations per benchmark
const PING_PONGS: usize = 100_000;

fn bench_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency");

    // 1. MPMC ring, blocking hand-off in both directions
    group.bench_function(BenchmarkId::new("MpmcQueue", "ping-pong"), |b| {
        b.iter(|| {
            let q1 = Arc::new(MpmcQueue::<u32, CAPACITY>::new());
            let q2 = Arc::new(MpmcQueue::<u32, CAPACITY>::new());

            // Ping thread
            let q1_ping = q1.clone();
            let q2_ping = q2.clone();
            let ping_thread = thread::spawn(move || {
                for i in 0..PING_PONGS {
                    q1_ping.push(black_box(i as u32));
                    black_box(q2_ping.pop());
                }
            });

            // Pong thread
            let pong_thread = thread::spawn(move || {
                for _ in 0..PING_PONGS {
                    let val = q1.pop();
                    q2.push(black_box(val));
                }
            });

            ping_thread.join().unwrap();
            pong_thread.join().unwrap();
        })
    });

    // 2. crossbeam-channel bounded, as the third-party reference
    group.bench_function(BenchmarkId::new("crossbeam-channel", "ping-pong"), |b| {
        b.iter(|| {
            let (tx1, rx1) = crossbeam_channel::bounded::<u32>(CAPACITY);
            let (tx2, rx2) = crossbeam_channel::bounded::<u32>(CAPACITY);

            let ping_thread = thread::spawn(move || {
                for i in 0..PING_PONGS {
                    tx1.send(black_box(i as u32)).unwrap();
                    black_box(rx2.recv().unwrap());
                }
            });

            let pong_thread = thread::spawn(move || {
                for _ in 0..PING_PONGS {
                    let val = rx1.recv().unwrap();
                    tx2.send(black_box(val)).unwrap();
                }
            });

            ping_thread.join().unwrap();
            pong_thread.join().unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_latency);
criterion_main!(benches);
