use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::runtime::Runtime;

use binstore::application::gc::GcConfig;
use binstore::application::{BinaryStore, BinaryUpload, UsageTracker};
use binstore::infrastructure::persistence::{connect_in_memory, SqlBinaryCatalog};
use binstore::infrastructure::storage::{ContentHasher, InternalStore, ProviderChain};
use binstore::ports::BinaryCatalog;

async fn filesystem_store(dir: &TempDir) -> Arc<BinaryStore> {
    let catalog = SqlBinaryCatalog::new(connect_in_memory().await.unwrap());
    catalog.init().await.unwrap();
    let chain = Arc::new(ProviderChain::new(
        Arc::new(UsageTracker::new()),
        InternalStore::Filesystem {
            root: dir.path().to_path_buf(),
            durable_writes: false,
        },
        None,
    ));
    chain.init().await.unwrap();
    Arc::new(BinaryStore::new(Arc::new(catalog), chain, GcConfig::default()))
}

/// Payload of `size` bytes that differs for every `seed`
fn payload(size: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; size.max(8)];
    data[..8].copy_from_slice(&seed.to_le_bytes());
    data
}

fn store_benchmarks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let store = rt.block_on(filesystem_store(&dir));
    let seed = AtomicU64::new(0);

    let mut group = c.benchmark_group("binary_store");
    group.measurement_time(Duration::from_secs(10));

    for size in [1024usize, 1024 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("add_new", size), &size, |b, &s| {
            b.to_async(&rt).iter(|| {
                let data = payload(s, seed.fetch_add(1, Ordering::Relaxed));
                let store = Arc::clone(&store);
                async move {
                    black_box(store.add_stream(BinaryUpload::from_bytes(data)).await.unwrap());
                }
            })
        });

        let existing = payload(size, u64::MAX);
        rt.block_on(store.add_stream(BinaryUpload::from_bytes(existing.clone())))
            .unwrap();

        group.bench_with_input(BenchmarkId::new("add_duplicate", size), &size, |b, _| {
            b.to_async(&rt).iter(|| {
                let data = existing.clone();
                let store = Arc::clone(&store);
                async move {
                    black_box(store.add_stream(BinaryUpload::from_bytes(data)).await.unwrap());
                }
            })
        });

        let hash = ContentHasher::hash_bytes(&existing)
            .unwrap()
            .primary_hash()
            .clone();
        group.bench_with_input(BenchmarkId::new("get", size), &size, |b, _| {
            b.to_async(&rt).iter(|| {
                let store = Arc::clone(&store);
                let hash = hash.clone();
                async move {
                    let mut reader = store.get_stream(&hash).await.unwrap();
                    let mut buffer = Vec::new();
                    reader.read_to_end(&mut buffer).await.unwrap();
                    black_box(buffer);
                }
            })
        });
    }

    group.finish();
}

fn hash_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_hashing");
    for size in [1024usize, 1024 * 1024] {
        let data = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sha256_blake3", size), &data, |b, data| {
            b.iter(|| black_box(ContentHasher::hash_bytes(black_box(data)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, store_benchmarks, hash_benchmarks);
criterion_main!(benches);
