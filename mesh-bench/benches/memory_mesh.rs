//! Memory mesh benchmark suite
//!
//! Performance targets:
//!   memory_store_single .............. < 20μs
//!   retrieval_rank_top5_from_500 ..... < 500μs
//!   mesh_retrieve_top5_from_500 ...... < 1ms
//!   consolidation_pass_200 ........... < 200μs
//!   bridge_store_and_recall .......... < 100μs

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use mesh_bridge::{BridgeConfig, MemoryMeshBridge};
use mesh_core::config::{MeshConfig, RetrievalConfig};
use mesh_core::consolidation;
use mesh_core::memory::{LongTermMemory, MemoryItem, WorkingMemory};
use mesh_core::retrieval::{PreparedQuery, RetrievalEngine};
use mesh_core::{Category, CategoryHint, MemoryId, MemoryMesh, Metadata, categorize};

const TOPICS: [&str; 6] = [
    "learn python",
    "prefer green tea",
    "friend from work",
    "birthday party happened",
    "remember the lake trip",
    "rainy weather",
];

fn make_content(i: usize) -> String {
    format!("Entry {i}: we talked about {} in the garden", TOPICS[i % TOPICS.len()])
}

fn make_item(i: usize) -> MemoryItem {
    let created = Utc::now() - Duration::minutes(i64::try_from(i).unwrap_or(0));
    let content = make_content(i);
    let metadata = Metadata::new();
    let category = categorize(&content, &metadata);
    MemoryItem::new(
        MemoryId::derive(&content, &created),
        content,
        category,
        (i % 10) as f32 / 10.0,
        metadata,
        created,
    )
}

/// Mesh without the background task. Working capacity stays at 7, so stores
/// past that still spill into long-term memory.
fn bench_mesh(dir: &std::path::Path) -> MemoryMesh {
    let mut config = MeshConfig::with_memory_dir(dir);
    config.consolidation.auto_consolidate = false;
    MemoryMesh::open(config).unwrap()
}

/// Benchmark: single store into working memory (target: < 20μs).
fn bench_store(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mesh = bench_mesh(dir.path());
    let mut i = 0usize;

    c.bench_function("memory_store_single", |b| {
        b.iter(|| {
            i += 1;
            let id = mesh
                .store(black_box(&make_content(i)), CategoryHint::Auto, 0.5, Metadata::new())
                .unwrap();
            black_box(id);
        });
    });
}

/// Benchmark: rank 500 candidates for a two-word query (target: < 500μs).
fn bench_rank(c: &mut Criterion) {
    let items: Vec<MemoryItem> = (0..500).map(make_item).collect();
    let engine = RetrievalEngine::new(RetrievalConfig::default());
    let query = PreparedQuery::new("python garden").unwrap();
    let now = Utc::now();

    c.bench_function("retrieval_rank_top5_from_500", |b| {
        b.iter(|| {
            let mut ranked = engine.rank(black_box(&query), black_box(&items), now);
            ranked.truncate(5);
            black_box(ranked);
        });
    });
}

/// Benchmark: full mesh retrieval over 500 consolidated memories (target: < 1ms).
fn bench_mesh_retrieve(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mesh = bench_mesh(dir.path());
    for i in 0..500 {
        mesh.store(&make_content(i), CategoryHint::Auto, 0.5, Metadata::new()).unwrap();
    }
    mesh.consolidate_all(true);

    c.bench_function("mesh_retrieve_top5_from_500", |b| {
        b.iter(|| {
            let hits = mesh.retrieve(black_box("lake trip"), None, 5);
            black_box(hits);
        });
    });

    c.bench_function("mesh_retrieve_category_filtered", |b| {
        b.iter(|| {
            let hits = mesh.retrieve(black_box("garden"), Some(Category::Learning), 5);
            black_box(hits);
        });
    });
}

/// Benchmark: drain 200 working items into long-term tiers (target: < 200μs).
fn bench_consolidation(c: &mut Criterion) {
    let items: Vec<MemoryItem> = (0..200).map(make_item).collect();

    c.bench_function("consolidation_pass_200", |b| {
        b.iter_batched(
            || {
                let mut working = WorkingMemory::new(items.len());
                for item in &items {
                    working.push(item.clone());
                }
                (working, LongTermMemory::new())
            },
            |(mut working, mut long_term)| {
                let moved =
                    consolidation::consolidate_working(&mut working, &mut long_term, Utc::now());
                black_box((moved, long_term));
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: bridge store followed by a formatted recall (target: < 100μs).
fn bench_bridge(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let bridge = MemoryMeshBridge::new(Arc::new(bench_mesh(dir.path())), BridgeConfig::default());
    for i in 0..100 {
        bridge.store("seed", make_content(i)).unwrap();
    }
    let mut i = 0usize;

    c.bench_function("bridge_store_and_recall", |b| {
        b.iter(|| {
            i += 1;
            bridge.store("note", black_box(make_content(i))).unwrap();
            black_box(bridge.retrieve_relevant(black_box("green tea")));
        });
    });
}

criterion_group!(
    benches,
    bench_store,
    bench_rank,
    bench_mesh_retrieve,
    bench_consolidation,
    bench_bridge,
);
criterion_main!(benches);
