//! Search funnel benchmarks
//!
//! Measures quantization, the Hamming scan and the full orchestrated search
//! over an in-memory corpus.

use std::sync::Arc;

use binsift::index::BinaryQuantizer;
use binsift::search::{CandidateSelector, SearchConfig, SearchOrchestrator};
use binsift::storage::{
    DocumentRepository, EmbeddingStore, MemoryDocumentRepository, MemoryEmbeddingStore,
};
use binsift::types::{ChunkEmbedding, Document, DocumentScope};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

const DIMENSION: usize = 256;
const CHUNKS_PER_DOCUMENT: usize = 4;

fn random_vector(rng: &mut fastrand::Rng) -> Vec<f32> {
    (0..DIMENSION).map(|_| rng.f32() * 2.0 - 1.0).collect()
}

async fn corpus(
    documents: u64,
) -> (Arc<MemoryEmbeddingStore>, Arc<MemoryDocumentRepository>) {
    let store = Arc::new(MemoryEmbeddingStore::new(DIMENSION).unwrap());
    let repo = Arc::new(MemoryDocumentRepository::new());
    let mut rng = fastrand::Rng::with_seed(42);

    for id in 1..=documents {
        repo.put(Document {
            id,
            kind: "post".to_string(),
            status: "published".to_string(),
            attributes: Default::default(),
            metadata: Default::default(),
        })
        .await
        .unwrap();
        let chunks = (0..CHUNKS_PER_DOCUMENT)
            .map(|_| ChunkEmbedding {
                vector: random_vector(&mut rng),
                vector_type: "chunk".to_string(),
            })
            .collect();
        store.replace_document(id, chunks).await.unwrap();
    }

    (store, repo)
}

fn bench_quantize(c: &mut Criterion) {
    let quantizer = BinaryQuantizer::new(DIMENSION).unwrap();
    let vector = random_vector(&mut fastrand::Rng::with_seed(1));

    c.bench_function("quantize_256d", |b| {
        b.iter(|| black_box(quantizer.quantize(black_box(&vector)).unwrap()));
    });
}

fn bench_hamming_scan(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hamming_scan");

    for documents in [1_000u64, 10_000] {
        let (store, repo) = rt.block_on(corpus(documents));
        let codes = rt.block_on(async {
            let eligible = repo.eligible(&DocumentScope::any(), None).await.unwrap();
            store.codes_for_documents(&eligible, usize::MAX).await.unwrap()
        });
        let quantizer = BinaryQuantizer::new(DIMENSION).unwrap();
        let selector = CandidateSelector::new(quantizer);
        let query = quantizer
            .quantize(&random_vector(&mut fastrand::Rng::with_seed(7)))
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(codes.len()), &codes, |b, codes| {
            b.iter(|| black_box(selector.select(&query, codes, 100).unwrap()));
        });
    }

    group.finish();
}

fn bench_full_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, repo) = rt.block_on(corpus(10_000));
    let config = SearchConfig {
        dimension: DIMENSION,
        ..SearchConfig::default()
    };
    let search = SearchOrchestrator::new(config, store, repo).unwrap();
    let query = random_vector(&mut fastrand::Rng::with_seed(9));

    c.bench_function("search_top10_40k_chunks", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(search.search(&query, 10, None, None).await.unwrap()) });
    });
}

criterion_group!(benches, bench_quantize, bench_hamming_scan, bench_full_search);
criterion_main!(benches);
