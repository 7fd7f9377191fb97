// VecBench — main.rs
// Binary entry point: configure, connect, run the benchmark, print a summary.
// Author: d65v <https://github.com/d65v>

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use vbench::pipeline::{self, IndexOutcome, Inspection, Provisioned, RunSummary};
use vbench::{BenchConfig, HttpService, MemoryService, Workload};

#[derive(Debug, Parser)]
#[command(
    name = "vecbench",
    version,
    about = "Load and query benchmark for a remote vector search service",
    after_help = ENV_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Service host (overrides VECBENCH_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Service HTTP port (overrides VECBENCH_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Target collection (overrides VECBENCH_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Stop at the first failed stage and exit non-zero
    #[arg(long, global = true)]
    fail_fast: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision, load, index and query the remote service (default)
    Run,
    /// Describe the target collection without changing it
    Info,
    /// Run the full benchmark against an in-process service
    DryRun {
        /// Vectors to load
        #[arg(long, default_value_t = 20_000)]
        vectors: usize,
        /// Vector dimension
        #[arg(long, default_value_t = 128)]
        dim: usize,
    },
}

const ENV_HELP: &str = r#"ENVIRONMENT:
  VECBENCH_HOST / VECBENCH_PORT     Service address (default: 127.0.0.1:19121)
  VECBENCH_COLLECTION               Target collection (default: images)
  VECBENCH_DIM                      Vector dimension (default: 1256)
  VECBENCH_NUM_VECTORS              Vectors to load (default: 1500000)
  VECBENCH_INSERT_BATCH             Vectors per insert (default: 5000)
  VECBENCH_INDEX_FILE_SIZE          Segment size hint in MB (default: 1024)
  VECBENCH_METRIC                   L2 | IP (default: IP)
  VECBENCH_INDEX_TYPE               FLAT | IVFFLAT | IVFSQ8 | ... (default: IVFSQ8)
  VECBENCH_INDEX_PARAMS             JSON (default: {"nlist": 16384})
  VECBENCH_TOP_K                    Results per search (default: 5000)
  VECBENCH_NUM_SEARCHES             Timed searches (default: 10)
  VECBENCH_SEARCH_PARAMS            JSON (default: {"nprobe": 32})
  VECBENCH_SEED                     Seed for reproducible vectors
  VECBENCH_VECTORS_FILE             float32 .npy file to load instead of random data
  VECBENCH_TIMEOUT_SECS             Per-request timeout (default: none)
  VECBENCH_FAIL_FAST                true | false (default: false)
  RUST_LOG                          Log level: info | debug | warn | error
"#;

fn main() -> anyhow::Result<()> {
    // Load .env if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Initialize logger — respects RUST_LOG env var, defaults to info
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = BenchConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }
    if cli.fail_fast {
        config.fail_fast = true;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            config.validate()?;
            let mut service = HttpService::new(
                &config.host,
                config.port,
                config.timeout_secs.map(Duration::from_secs),
            )?;
            log::info!("VecBench against {} / '{}'", service.base_url(), config.collection);
            log_config(&config);
            run(&mut service, &config)
        }
        Command::Info => {
            config.validate()?;
            let mut service = HttpService::new(
                &config.host,
                config.port,
                config.timeout_secs.map(Duration::from_secs),
            )?;
            let inspection = pipeline::inspect(&mut service, &config)
                .with_context(|| format!("cannot reach {}", service.base_url()))?;
            print_inspection(&config, &inspection);
            Ok(())
        }
        Command::DryRun { vectors, dim } => {
            config.num_vectors = vectors;
            config.dim = dim;
            config.validate()?;
            log::info!("VecBench dry run against an in-process service");
            log_config(&config);
            let mut service = MemoryService::new();
            run(&mut service, &config)
        }
    }
}

fn run<S: vbench::VectorService>(service: &mut S, config: &BenchConfig) -> anyhow::Result<()> {
    let mut workload = Workload::from_config(config)?;
    let summary = pipeline::run(service, config, &mut workload, config.error_policy())?;
    print_summary(&summary);
    Ok(())
}

fn log_config(config: &BenchConfig) {
    log::info!(
        "Config: dim={}, vectors={}, batch={}, metric={}, index={} {}, top_k={}, searches={}, search_params={}",
        config.dim,
        config.num_vectors,
        config.insert_batch,
        config.metric,
        config.index_type,
        config.index_params,
        config.top_k,
        config.num_searches,
        config.search_params
    );
}

fn print_summary(summary: &RunSummary) {
    println!("\n[VecBench] Summary");

    if let Some(p) = &summary.provisioned {
        let how = match p {
            Provisioned::Existing(_) => "existing",
            Provisioned::Created(_) => "created",
        };
        let info = p.info();
        println!(
            "  collection : {} ({}, dim={}, metric={})",
            info.param.collection_name, how, info.param.dimension, info.param.metric_type
        );
    }

    if let Some(load) = &summary.load {
        println!(
            "  insert     : {} vectors in {} batches, {:.2?} ({:.0} vec/s)",
            load.inserted,
            load.batches,
            load.elapsed,
            load.vectors_per_sec()
        );
        if load.dropped_remainder > 0 {
            println!("               {} remainder vectors not inserted", load.dropped_remainder);
        }
        if load.id_mismatches > 0 {
            println!("               {} batches returned a wrong id count", load.id_mismatches);
        }
    }

    match &summary.index {
        Some(IndexOutcome::Unchanged(idx)) => {
            println!("  index      : {} (unchanged)", idx.index_type)
        }
        Some(IndexOutcome::Built { previous, params, elapsed }) => println!(
            "  index      : {} -> {} in {:.2?}",
            previous, params.index_type, elapsed
        ),
        None => {}
    }

    if let Some(stats) = &summary.stats {
        println!("  stats      : {}", stats);
    }

    if let Some(q) = &summary.queries {
        if let (Some(min), Some(mean), Some(p50), Some(max)) =
            (q.min(), q.mean(), q.percentile(50.0), q.max())
        {
            println!(
                "  search     : {} queries  min={:.2?}  mean={:.2?}  p50={:.2?}  max={:.2?}",
                q.latencies.len(),
                min,
                mean,
                p50,
                max
            );
        } else {
            println!("  search     : no queries issued");
        }
        if q.failures > 0 {
            println!("               {} queries failed", q.failures);
        }
    }

    for failure in &summary.failures {
        println!("  FAILED     : {}", failure);
    }
}

fn print_inspection(config: &BenchConfig, inspection: &Inspection) {
    println!("collections : {}", inspection.collections.join(", "));
    match &inspection.info {
        Some(info) => println!(
            "{:<11} : dim={} metric={} index_file_size={} rows={}",
            info.param.collection_name,
            info.param.dimension,
            info.param.metric_type,
            info.param.index_file_size,
            info.count
        ),
        None => println!("{:<11} : (absent)", config.collection),
    }
    if let Some(index) = &inspection.index {
        println!("index       : {} {}", index.index_type, index.extra_params);
    }
    if let Some(stats) = &inspection.stats {
        println!("stats       : {}", stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["vecbench"]);
        assert!(cli.command.is_none());
        assert!(!cli.fail_fast);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["vecbench", "info", "--host", "db.local", "--port", "8080"]);
        assert!(matches!(cli.command, Some(Command::Info)));
        assert_eq!(cli.host.as_deref(), Some("db.local"));
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn test_dry_run_defaults() {
        let cli = Cli::parse_from(["vecbench", "dry-run", "--fail-fast"]);
        assert!(cli.fail_fast);
        match cli.command {
            Some(Command::DryRun { vectors, dim }) => {
                assert_eq!(vectors, 20_000);
                assert_eq!(dim, 128);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
