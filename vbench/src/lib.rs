// VecBench — lib.rs
// Public API, error types, benchmark configuration, re-exports.
// Author: d65v <https://github.com/d65v>

pub mod http;
pub mod memory;
pub mod npy;
pub mod pipeline;
pub mod service;
pub mod vectors;

use std::path::PathBuf;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

pub use crate::http::HttpService;
pub use crate::memory::MemoryService;
pub use crate::pipeline::{run, ErrorPolicy, RunSummary, Stage, StageError, Workload};
pub use crate::service::{IndexType, MetricType, ServiceError, VectorService};
pub use crate::vectors::{RandomVectors, VecSource, VectorSource};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Vector source error: {0}")]
    Npy(#[from] npy::NpyError),

    /// Every batch went in but the flush did not; `report` is what was inserted.
    #[error("flush failed after {} vectors: {source}", .report.inserted)]
    FlushFailed {
        report: Box<pipeline::LoadReport>,
        #[source]
        source: ServiceError,
    },
}

pub type Result<T> = std::result::Result<T, BenchError>;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Service host name or address, optionally with a scheme
    pub host: String,
    pub port: u16,
    /// Target collection
    pub collection: String,
    /// Dimensionality of every inserted and queried vector
    pub dim: usize,
    /// Total vectors to load (rounded down to a multiple of `insert_batch`)
    pub num_vectors: usize,
    /// Segment size hint passed on collection creation, in MB
    pub index_file_size: usize,
    pub metric: MetricType,
    /// Index the collection should end up with
    pub index_type: IndexType,
    /// JSON object of index build parameters
    pub index_params: String,
    pub insert_batch: usize,
    pub top_k: usize,
    pub num_searches: usize,
    /// JSON object of search parameters
    pub search_params: String,
    /// Seed for reproducible random vectors
    pub seed: Option<u64>,
    /// Load vectors from a `.npy` file instead of generating them
    pub vectors_file: Option<PathBuf>,
    /// Per-request timeout; none waits indefinitely
    pub timeout_secs: Option<u64>,
    /// Stop at the first failed stage
    pub fail_fast: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 19121,
            collection: "images".to_string(),
            dim: 1256,
            num_vectors: 1_500_000,
            index_file_size: 1024,
            metric: MetricType::IP,
            index_type: IndexType::IvfSq8,
            index_params: r#"{"nlist": 16384}"#.to_string(),
            insert_batch: 5000,
            top_k: 5000,
            num_searches: 10,
            search_params: r#"{"nprobe": 32}"#.to_string(),
            seed: None,
            vectors_file: None,
            timeout_secs: None,
            fail_fast: false,
        }
    }
}

impl BenchConfig {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();

        Self {
            host: std::env::var("VECBENCH_HOST").unwrap_or(d.host),
            port: env_parse("VECBENCH_PORT", d.port),
            collection: std::env::var("VECBENCH_COLLECTION").unwrap_or(d.collection),
            dim: env_parse("VECBENCH_DIM", d.dim),
            num_vectors: env_parse("VECBENCH_NUM_VECTORS", d.num_vectors),
            index_file_size: env_parse("VECBENCH_INDEX_FILE_SIZE", d.index_file_size),
            metric: env_parse("VECBENCH_METRIC", d.metric),
            index_type: env_parse("VECBENCH_INDEX_TYPE", d.index_type),
            index_params: std::env::var("VECBENCH_INDEX_PARAMS").unwrap_or(d.index_params),
            insert_batch: env_parse("VECBENCH_INSERT_BATCH", d.insert_batch),
            top_k: env_parse("VECBENCH_TOP_K", d.top_k),
            num_searches: env_parse("VECBENCH_NUM_SEARCHES", d.num_searches),
            search_params: std::env::var("VECBENCH_SEARCH_PARAMS").unwrap_or(d.search_params),
            seed: env_opt("VECBENCH_SEED"),
            vectors_file: std::env::var("VECBENCH_VECTORS_FILE").ok().map(PathBuf::from),
            timeout_secs: env_opt("VECBENCH_TIMEOUT_SECS"),
            fail_fast: env_parse("VECBENCH_FAIL_FAST", d.fail_fast),
        }
    }

    /// Reject settings no run could succeed with.
    ///
    /// # Errors
    /// Returns `BenchError::ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(BenchError::ConfigError("dim must be > 0".into()));
        }
        if self.insert_batch == 0 {
            return Err(BenchError::ConfigError("insert_batch must be > 0".into()));
        }
        if self.top_k == 0 {
            return Err(BenchError::ConfigError("top_k must be > 0".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(BenchError::ConfigError("collection name is empty".into()));
        }
        self.index_extra_params()?;
        self.search_extra_params()?;
        Ok(())
    }

    pub fn index_extra_params(&self) -> Result<Value> {
        parse_params("index_params", &self.index_params)
    }

    pub fn search_extra_params(&self) -> Result<Value> {
        parse_params("search_params", &self.search_params)
    }

    /// Number of full batches the loader will send.
    pub fn batch_count(&self) -> usize {
        self.num_vectors / self.insert_batch.max(1)
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        if self.fail_fast {
            ErrorPolicy::Abort
        } else {
            ErrorPolicy::Continue
        }
    }
}

fn parse_params(field: &str, raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BenchError::ConfigError(format!("{}: invalid JSON: {}", field, e)))?;
    if !value.is_object() {
        return Err(BenchError::ConfigError(format!(
            "{}: expected a JSON object, got {}",
            field, raw
        )));
    }
    Ok(value)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{}: cannot parse '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("{}: cannot parse '{}', ignoring", key, raw);
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.collection, "images");
        assert_eq!(cfg.dim, 1256);
        assert_eq!(cfg.insert_batch, 5000);
        assert_eq!(cfg.metric, MetricType::IP);
        assert_eq!(cfg.index_type, IndexType::IvfSq8);
        assert_eq!(cfg.batch_count(), 300);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_batch_count_truncates() {
        let cfg = BenchConfig {
            num_vectors: 12_345,
            insert_batch: 5000,
            ..Default::default()
        };
        assert_eq!(cfg.batch_count(), 2);
    }

    #[test]
    fn test_default_params_parse() {
        let cfg = BenchConfig::default();
        assert_eq!(cfg.index_extra_params().unwrap()["nlist"], 16384);
        assert_eq!(cfg.search_extra_params().unwrap()["nprobe"], 32);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_dim = BenchConfig { dim: 0, ..Default::default() };
        assert!(matches!(zero_dim.validate(), Err(BenchError::ConfigError(_))));

        let zero_batch = BenchConfig { insert_batch: 0, ..Default::default() };
        assert!(matches!(zero_batch.validate(), Err(BenchError::ConfigError(_))));

        let bad_json = BenchConfig {
            search_params: "{nprobe: 32".into(),
            ..Default::default()
        };
        assert!(matches!(bad_json.validate(), Err(BenchError::ConfigError(_))));

        let not_object = BenchConfig {
            index_params: "[1, 2]".into(),
            ..Default::default()
        };
        assert!(matches!(not_object.validate(), Err(BenchError::ConfigError(_))));
    }

    #[test]
    fn test_error_policy_from_flag() {
        assert_eq!(BenchConfig::default().error_policy(), ErrorPolicy::Continue);
        let strict = BenchConfig { fail_fast: true, ..Default::default() };
        assert_eq!(strict.error_policy(), ErrorPolicy::Abort);
    }

    #[test]
    fn test_env_parse_falls_back() {
        std::env::set_var("VECBENCH_TEST_PARSE_BAD", "not-a-number");
        assert_eq!(env_parse("VECBENCH_TEST_PARSE_BAD", 7usize), 7);
        std::env::set_var("VECBENCH_TEST_PARSE_OK", " 12 ");
        assert_eq!(env_parse("VECBENCH_TEST_PARSE_OK", 7usize), 12);
        assert_eq!(env_opt::<u64>("VECBENCH_TEST_PARSE_MISSING"), None);
    }
}
