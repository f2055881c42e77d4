//! Throughput benchmarks for the archive timestamp service

use std::sync::Arc;

use ats_client::testutil::FakeAuthority;
use ats_client::ArchiveTimestampService;
use ats_core::{MerkleTree, NodeId, TreeBuilder};
use ats_types::HashAlgorithm;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn wide_tree(size: usize) -> (MerkleTree, Vec<NodeId>) {
    let mut builder = TreeBuilder::new(HashAlgorithm::Sha256, b"root");
    let root = builder.root_id();
    let ids = (0..size)
        .map(|i| builder.add_child(root, &(i as u64).to_be_bytes()))
        .collect();
    (builder.build(), ids)
}

fn bench_single_archive(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));
    let (tree, ids) = wide_tree(100);

    c.bench_function("single_archive", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.archive_node(&tree, ids[42]).await.expect("archive failed");
            })
        })
    });
}

fn bench_sequential_archives(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));

    let mut group = c.benchmark_group("sequential_archives");

    for count in [10, 50, 100] {
        let (tree, ids) = wide_tree(count);
        group.bench_function(format!("n={}", count), |b| {
            b.iter(|| {
                rt.block_on(async {
                    for id in &ids {
                        service.archive_node(&tree, *id).await.expect("archive failed");
                    }
                })
            })
        });
    }

    group.finish();
}

fn bench_batched_archives(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));

    let mut group = c.benchmark_group("batched_archives");

    for count in [10, 100, 1000] {
        let (tree, ids) = wide_tree(count);
        group.bench_function(format!("n={}", count), |b| {
            b.iter(|| {
                rt.block_on(async {
                    service.archive_nodes(&tree, &ids).await.expect("archive failed");
                })
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_archive,
    bench_sequential_archives,
    bench_batched_archives,
);
criterion_main!(benches);
