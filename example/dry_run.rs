// VecBench — example/dry_run.rs
// Runs the whole benchmark against the in-process service and prints the
// per-stage results.
// Run with:  cargo run --example dry_run  (from vbench/ directory)

use vbench::pipeline::{self, IndexOutcome, Workload};
use vbench::{BenchConfig, ErrorPolicy, MemoryService, MetricType, RandomVectors};

fn main() {
    env_logger::init();

    println!("── VecBench Dry Run ──────────────────────────");

    let config = BenchConfig {
        dim: 64,
        num_vectors: 10_500,
        insert_batch: 2_000,
        metric: MetricType::L2,
        top_k: 10,
        num_searches: 5,
        ..Default::default()
    };

    let mut service = MemoryService::new();
    let mut workload = Workload::new(
        Box::new(RandomVectors::seeded(config.dim, config.num_vectors, 1)),
        Box::new(RandomVectors::seeded(config.dim, config.num_searches, 2)),
    );

    let summary = pipeline::run(&mut service, &config, &mut workload, ErrorPolicy::Abort)
        .expect("dry run failed");

    if let Some(load) = &summary.load {
        println!(
            "Inserted {} vectors in {} batches ({} left over).",
            load.inserted, load.batches, load.dropped_remainder
        );
    }
    if let Some(IndexOutcome::Built { previous, params, .. }) = &summary.index {
        println!("Index {} -> {}", previous, params.index_type);
    }
    if let Some(q) = &summary.queries {
        for (i, latency) in q.latencies.iter().enumerate() {
            println!("  query {}  {:?}", i + 1, latency);
        }
    }

    println!("\nExpected: 10000 inserted, 500 left over, FLAT -> IVFSQ8");

    println!("\n── Done ──────────────────────────────────────");
}
