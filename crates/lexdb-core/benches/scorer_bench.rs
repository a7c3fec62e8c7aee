//! Benchmark for the candidate-gather/accumulate hot path (`spec.md` §4.5
//! steps 3-4): the join-based SQL `search::scorer::score_batch` runs once per
//! query batch. This measures end-to-end `search_documents` over a
//! synthetic corpus rather than microbenchmarking the SQL string builder, so
//! it tracks the cost DuckDB itself incurs.
//!
//! Run with: `cargo bench --all-features`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lexdb_core::{DocumentInput, Index};

fn build_corpus(index: &Index, num_docs: usize) {
    let words = [
        "rust", "python", "search", "index", "engine", "query", "score", "term", "document",
        "vector", "graph", "database", "storage", "parallel", "async",
    ];
    let docs: Vec<DocumentInput> = (0..num_docs)
        .map(|i| {
            let text = (0..20)
                .map(|j| words[(i + j) % words.len()])
                .collect::<Vec<_>>()
                .join(" ");
            DocumentInput {
                id: i.to_string(),
                fields: [("text".to_string(), text)].into_iter().collect(),
            }
        })
        .collect();
    index.upload_documents(&docs, &["text".to_string()]).unwrap();
}

fn bench_search_small_corpus(c: &mut Criterion) {
    let index = Index::open(":memory:").unwrap();
    build_corpus(&index, 2_000);

    c.bench_function("search_documents_2k_docs", |b| {
        b.iter(|| {
            let hits = index
                .search_documents(&["rust search engine".to_string()], 10, None, None, None)
                .unwrap();
            black_box(hits)
        });
    });
}

fn bench_search_with_top_k_token_pruning(c: &mut Criterion) {
    let index = Index::open(":memory:").unwrap();
    build_corpus(&index, 2_000);

    c.bench_function("search_documents_2k_docs_pruned", |b| {
        b.iter(|| {
            let hits = index
                .search_documents(&["rust search engine".to_string()], 10, Some(100), None, None)
                .unwrap();
            black_box(hits)
        });
    });
}

criterion_group!(benches, bench_search_small_corpus, bench_search_with_top_k_token_pruning);
criterion_main!(benches);
