// VecBench — example/custom_source.rs
// Feeds the loader with precomputed vectors instead of random data.

use vbench::pipeline::{ensure_collection, load_vectors, query_bench};
use vbench::{BenchConfig, MemoryService, VecSource};

fn main() {
    let config = BenchConfig {
        dim: 3,
        num_vectors: 4,
        insert_batch: 2,
        top_k: 2,
        num_searches: 1,
        ..Default::default()
    };

    let embeddings = vec![
        vec![0.9, 0.1, 0.0],
        vec![0.8, 0.2, 0.0],
        vec![0.0, 0.0, 0.9],
        vec![0.0, 0.1, 0.8],
    ];

    let mut service = MemoryService::new();
    ensure_collection(&mut service, &config).expect("provision failed");

    let mut data = VecSource::new(config.dim, embeddings);
    let load = load_vectors(&mut service, &config, &mut data).expect("load failed");
    println!("Inserted: {}", load.inserted);

    let mut queries = VecSource::new(config.dim, vec![vec![1.0, 0.0, 0.0]]);
    let report = query_bench(&mut service, &config, &mut queries).expect("search failed");
    println!("Hits:     {}", report.hits);
    println!("Latency:  {:?}", report.latencies[0]);
}
