//! Criterion micro-benchmarks for crossing the pgcoll boundary.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use pgcoll::{with_collection, Collection, Error, ForeignString};
use pgcoll_bench::{document_batch, seeded_collection};

fn bench_bridge(c: &mut Criterion) {
    let text = "x".repeat(256);
    c.bench_function("foreign_string_256b", |b| {
        b.iter(|| ForeignString::new(black_box(&text)))
    });
}

fn bench_session(c: &mut Criterion) {
    c.bench_function("session_create_destroy", |b| {
        b.iter(|| with_collection(black_box("bench_session"), |_| Ok::<_, Error>(())))
    });

    c.bench_function("session_upsert_count", |b| {
        b.iter(|| {
            with_collection("bench_upsert_count", |coll| {
                coll.upsert_document(black_box("doc1"), black_box("test1"))?;
                coll.document_count()
            })
        })
    });
}

fn bench_documents(c: &mut Criterion) {
    let mut seeded = match seeded_collection("bench_documents", 1_000, 64) {
        Ok(c) => c,
        Err(e) => panic!("seeding failed: {e}"),
    };

    c.bench_function("get_document_hit", |b| {
        b.iter(|| seeded.get_document(black_box("doc500")))
    });

    c.bench_function("get_document_miss", |b| {
        b.iter(|| seeded.get_document(black_box("absent")))
    });

    c.bench_function("get_documents_1k", |b| b.iter(|| seeded.get_documents()));

    let batch = document_batch(100, 64);
    c.bench_function("upsert_documents_100", |b| {
        b.iter_batched(
            || Collection::new("bench_batch"),
            |coll| {
                if let Ok(mut coll) = coll {
                    let _ = coll.upsert_documents(black_box(&batch).iter().map(|(i, d)| (i, d)));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_bridge, bench_session, bench_documents);
criterion_main!(benches);
