use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pubsub_gateway::broker::memory::InMemoryBroker;
use pubsub_gateway::broker::MessageBroker;
use pubsub_gateway::config::PullConfig;
use pubsub_gateway::coordinator::{MergedPullResult, PullMergeCoordinator};
use pubsub_gateway::types::{AckHandle, Attributes, LeasedMessage, MessageId};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Create a leased message with the given identity
fn leased(id: usize, subscription: &str) -> LeasedMessage {
    LeasedMessage {
        message_id: MessageId::from_string(format!("msg-{}", id)),
        ack_handle: AckHandle::new(subscription, format!("{}-{}", subscription, id)),
        attributes: Attributes::new(),
        data: vec![b'x'; 256],
        publish_time: Utc::now(),
        delivery_attempt: 1,
    }
}

/// Two batches of `size` messages where `overlap` percent share identities
fn batches(size: usize, overlap: usize) -> (Vec<LeasedMessage>, Vec<LeasedMessage>) {
    let shared = size * overlap / 100;
    let first = (0..size).map(|i| leased(i, "sub-a")).collect();
    let second = (size - shared..2 * size - shared)
        .map(|i| leased(i, "sub-b"))
        .collect();
    (first, second)
}

/// Benchmark merging two pulled batches with varying overlap
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_batches");

    for overlap in [0, 50, 100].iter() {
        let (first, second) = batches(1000, *overlap);

        group.throughput(Throughput::Elements(2000));
        group.bench_with_input(
            BenchmarkId::new("overlap_pct", overlap),
            overlap,
            |b, _| {
                b.iter(|| {
                    let mut merged = MergedPullResult::new();
                    merged.extend(first.iter().cloned());
                    merged.extend(second.iter().cloned());
                    black_box(merged.ack_handles());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark a full merged pull and acknowledgment against the in-memory broker
fn bench_pull_merge(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pull_merge");

    for batch_size in [10, 100, 1000].iter() {
        let broker = InMemoryBroker::new();
        rt.block_on(async {
            broker.create_topic("docs").await.unwrap();
            broker.create_subscription("sub-a", "docs").await.unwrap();
            broker.create_subscription("sub-b", "docs").await.unwrap();
        });
        let coordinator =
            PullMergeCoordinator::new(Arc::new(broker.clone()), PullConfig::default());

        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &size| {
                b.to_async(&rt).iter(|| async {
                    for _ in 0..size {
                        broker
                            .publish("docs", b"payload".to_vec(), Attributes::new())
                            .await
                            .unwrap();
                    }
                    black_box(coordinator.pull_merge("sub-a", "sub-b").await);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_merge, bench_pull_merge);
criterion_main!(benches);
