// VecBench — pipeline.rs
// Benchmark stages (connect, provision, load, index, stats, query) and the
// runner that sequences them under an error policy.
// Author: d65v <https://github.com/d65v>

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::service::{
    CollectionInfo, CollectionParam, IndexParam, IndexType, SearchParam, ServiceError,
    VectorService,
};
use crate::vectors::{self, VectorSource};
use crate::{BenchConfig, BenchError, Result};

// ── Stages & Policy ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    CreateCollection,
    InsertVectors,
    CreateIndex,
    CollectionStats,
    Search,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Connect => "Connect",
            Stage::CreateCollection => "CreateCollection",
            Stage::InsertVectors => "InsertVectors",
            Stage::CreateIndex => "CreateIndex",
            Stage::CollectionStats => "CollectionStats",
            Stage::Search => "Search",
        };
        f.write_str(s)
    }
}

/// What the runner does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log, record, and move on to the next stage.
    Continue,
    /// Stop at the first failure and hand it back.
    Abort,
}

#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: BenchError,
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    Existing(CollectionInfo),
    Created(CollectionInfo),
}

impl Provisioned {
    pub fn info(&self) -> &CollectionInfo {
        match self {
            Provisioned::Existing(info) | Provisioned::Created(info) => info,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Batches accepted by the service
    pub batches: usize,
    pub inserted: usize,
    /// Vectors left over by the integer division into batches
    pub dropped_remainder: usize,
    /// Batches whose returned ID count differed from the batch size
    pub id_mismatches: usize,
    pub elapsed: Duration,
}

impl LoadReport {
    pub fn vectors_per_sec(&self) -> f64 {
        self.inserted as f64 / self.elapsed.as_secs_f64().max(1e-9)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Unchanged(IndexParam),
    Built {
        previous: IndexType,
        params: IndexParam,
        elapsed: Duration,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryReport {
    /// Wall-clock latency per query, in issue order
    pub latencies: Vec<Duration>,
    /// Total hits returned across all queries
    pub hits: usize,
    /// Queries the service rejected; they have no latency entry
    pub failures: usize,
}

impl QueryReport {
    pub fn min(&self) -> Option<Duration> {
        self.latencies.iter().min().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.latencies.iter().max().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    /// Nearest-rank percentile, `p` in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }
}

/// Everything one run produced. A stage that failed or never ran is `None`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub collections: Option<Vec<String>>,
    pub provisioned: Option<Provisioned>,
    pub load: Option<LoadReport>,
    pub index: Option<IndexOutcome>,
    pub stats: Option<Value>,
    pub queries: Option<QueryReport>,
    pub failures: Vec<StageError>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read-only view of a collection, see [`inspect`].
#[derive(Debug, Default)]
pub struct Inspection {
    pub collections: Vec<String>,
    pub info: Option<CollectionInfo>,
    pub index: Option<IndexParam>,
    pub stats: Option<Value>,
}

// ── Workload ──────────────────────────────────────────────────────────────────

/// The vectors a run inserts and queries with.
pub struct Workload {
    pub data: Box<dyn VectorSource>,
    pub queries: Box<dyn VectorSource>,
}

impl Workload {
    pub fn new(data: Box<dyn VectorSource>, queries: Box<dyn VectorSource>) -> Self {
        Self { data, queries }
    }

    /// Sources as configured: `.npy` file or random data, random queries.
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        Ok(Self {
            data: vectors::data_source(config)?,
            queries: vectors::query_source(config),
        })
    }
}

// ── Stage: Connect ────────────────────────────────────────────────────────────

/// Check the service is up and list its collections.
pub fn connect<S: VectorService + ?Sized>(service: &mut S) -> Result<Vec<String>> {
    service.server_state()?;
    let collections = service.list_collections()?;
    log::info!("ListCollections: {}", collections.join(", "));
    Ok(collections)
}

// ── Stage: Provision ──────────────────────────────────────────────────────────

/// Create the configured collection unless it already exists.
///
/// An existing collection is never modified; a differing dimension or metric
/// is only reported.
pub fn ensure_collection<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
) -> Result<Provisioned> {
    match service.collection_info(&config.collection) {
        Ok(info) => {
            log::info!("Collection exists: {}", to_json(&info));
            if info.param.dimension != config.dim || info.param.metric_type != config.metric {
                log::warn!(
                    "Collection '{}' has dim={} metric={}, configured dim={} metric={}",
                    config.collection,
                    info.param.dimension,
                    info.param.metric_type,
                    config.dim,
                    config.metric
                );
            }
            Ok(Provisioned::Existing(info))
        }
        Err(e @ ServiceError::Status { .. }) => {
            log::info!("CollectionInfo: {}; creating '{}'", e, config.collection);
            service.create_collection(&CollectionParam {
                collection_name: config.collection.clone(),
                dimension: config.dim,
                index_file_size: config.index_file_size,
                metric_type: config.metric,
            })?;
            let info = service.collection_info(&config.collection)?;
            log::info!("Collection created: {}", to_json(&info));
            Ok(Provisioned::Created(info))
        }
        Err(e) => Err(e.into()),
    }
}

// ── Stage: Load ───────────────────────────────────────────────────────────────

/// Insert `num_vectors / insert_batch` full batches, then flush.
///
/// The first failing batch ends the load; neither later batches nor the
/// flush are sent. A failed flush returns [`BenchError::FlushFailed`] carrying
/// the report of what was inserted.
pub fn load_vectors<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
    source: &mut dyn VectorSource,
) -> Result<LoadReport> {
    if config.insert_batch == 0 {
        return Err(BenchError::ConfigError("insert_batch must be > 0".into()));
    }
    if source.dim() != config.dim {
        return Err(BenchError::DimensionMismatch {
            expected: config.dim,
            got: source.dim(),
        });
    }

    let batches = config.batch_count();
    let mut report = LoadReport {
        dropped_remainder: config.num_vectors - batches * config.insert_batch,
        ..Default::default()
    };
    if report.dropped_remainder > 0 {
        log::warn!(
            "{} trailing vectors do not fill a batch of {} and will not be inserted",
            report.dropped_remainder,
            config.insert_batch
        );
    }

    log::info!(
        "Inserting {} vectors in {} batches of {}...",
        batches * config.insert_batch,
        batches,
        config.insert_batch
    );

    let start = Instant::now();
    for i in 0..batches {
        let batch = source.next_batch(config.insert_batch);
        if batch.len() < config.insert_batch {
            log::warn!(
                "Vector source ran dry after {} of {} batches",
                report.batches,
                batches
            );
            break;
        }
        if let Some(bad) = batch.iter().find(|v| v.len() != config.dim) {
            return Err(BenchError::DimensionMismatch {
                expected: config.dim,
                got: bad.len(),
            });
        }

        let ids = service.insert(&config.collection, &batch)?;
        if ids.len() != batch.len() {
            log::error!(
                "Batch {}: service returned {} ids for {} vectors",
                i + 1,
                ids.len(),
                batch.len()
            );
            report.id_mismatches += 1;
        }
        report.batches += 1;
        report.inserted += batch.len();
        log::info!("[{}/{}]", i + 1, batches);
    }

    let flushed = service.flush(std::slice::from_ref(&config.collection));
    report.elapsed = start.elapsed();
    if let Err(source) = flushed {
        return Err(BenchError::FlushFailed {
            report: Box::new(report),
            source,
        });
    }

    log::info!(
        "Inserted {} vectors in {:.2?} ({:.0} vec/s)",
        report.inserted,
        report.elapsed,
        report.vectors_per_sec()
    );
    Ok(report)
}

// ── Stage: Index ──────────────────────────────────────────────────────────────

/// Build the configured index unless the collection already has that type.
pub fn ensure_index<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
) -> Result<IndexOutcome> {
    let current = service.index_info(&config.collection)?;
    log::info!("Current index: {}", to_json(&current));

    if current.index_type == config.index_type {
        return Ok(IndexOutcome::Unchanged(current));
    }

    let params = IndexParam {
        collection_name: config.collection.clone(),
        index_type: config.index_type,
        extra_params: config.index_extra_params()?,
    };

    log::info!("Create index started: {}", to_json(&params));
    let start = Instant::now();
    service.create_index(&params)?;
    let elapsed = start.elapsed();
    log::info!("Create index finished: {:.2?}", elapsed);

    Ok(IndexOutcome::Built {
        previous: current.index_type,
        params,
        elapsed,
    })
}

// ── Stage: Stats ──────────────────────────────────────────────────────────────

pub fn collection_stats<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
) -> Result<Value> {
    let stats = service.collection_stats(&config.collection)?;
    log::info!("Stats: {}", stats);
    Ok(stats)
}

// ── Stage: Query ──────────────────────────────────────────────────────────────

/// Time `num_searches` single-vector top-k searches, one after another.
///
/// A rejected search is logged and counted, and the remaining queries are
/// still sent. The stage fails only when every query failed.
pub fn query_bench<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
    source: &mut dyn VectorSource,
) -> Result<QueryReport> {
    let extra_params = config.search_extra_params()?;

    let queries = source.next_batch(config.num_searches);
    if queries.len() < config.num_searches {
        log::warn!(
            "Query source yielded {} of {} vectors",
            queries.len(),
            config.num_searches
        );
    }

    let mut report = QueryReport::default();
    let mut last_error = None;
    for (i, query) in queries.into_iter().enumerate() {
        if query.len() != config.dim {
            return Err(BenchError::DimensionMismatch {
                expected: config.dim,
                got: query.len(),
            });
        }
        let param = SearchParam {
            collection_name: config.collection.clone(),
            query_vectors: vec![query],
            topk: config.top_k,
            extra_params: extra_params.clone(),
        };

        let start = Instant::now();
        let response = match service.search(&param) {
            Ok(response) => response,
            Err(e) => {
                log::error!("Search {}: {}", i + 1, e);
                report.failures += 1;
                last_error = Some(e);
                continue;
            }
        };
        let elapsed = start.elapsed();

        log::info!("Search {}: {:.2?} ({} hits)", i + 1, elapsed, response.hit_count());
        report.latencies.push(elapsed);
        report.hits += response.hit_count();
    }

    match last_error {
        Some(e) if report.latencies.is_empty() => Err(e.into()),
        _ => {
            if report.failures > 0 {
                log::warn!(
                    "{} of {} searches failed",
                    report.failures,
                    report.failures + report.latencies.len()
                );
            }
            Ok(report)
        }
    }
}

// ── Inspect ───────────────────────────────────────────────────────────────────

/// Describe the configured collection without changing anything.
///
/// Only a connection failure is an error; missing pieces are left `None`.
pub fn inspect<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
) -> Result<Inspection> {
    let mut inspection = Inspection {
        collections: connect(service)?,
        ..Default::default()
    };

    match service.collection_info(&config.collection) {
        Ok(info) => inspection.info = Some(info),
        Err(e) => {
            log::warn!("CollectionInfo: {}", e);
            return Ok(inspection);
        }
    }
    match service.index_info(&config.collection) {
        Ok(index) => inspection.index = Some(index),
        Err(e) => log::warn!("GetIndexInfo: {}", e),
    }
    match service.collection_stats(&config.collection) {
        Ok(stats) => inspection.stats = Some(stats),
        Err(e) => log::warn!("GetCollectionStats: {}", e),
    }
    Ok(inspection)
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// Run every stage in order.
///
/// Under [`ErrorPolicy::Continue`] failures are collected in the summary and
/// later stages still run, even against a missing or half-loaded collection.
/// Under [`ErrorPolicy::Abort`] the first failure is returned.
pub fn run<S: VectorService + ?Sized>(
    service: &mut S,
    config: &BenchConfig,
    workload: &mut Workload,
    policy: ErrorPolicy,
) -> std::result::Result<RunSummary, StageError> {
    let mut summary = RunSummary::default();

    summary.collections = step(Stage::Connect, policy, &mut summary.failures, connect(service))?;
    summary.provisioned = step(
        Stage::CreateCollection,
        policy,
        &mut summary.failures,
        ensure_collection(service, config),
    )?;
    let load = load_vectors(service, config, &mut *workload.data);
    let unflushed = match &load {
        Err(BenchError::FlushFailed { report, .. }) => Some(report.as_ref().clone()),
        _ => None,
    };
    summary.load =
        step(Stage::InsertVectors, policy, &mut summary.failures, load)?.or(unflushed);
    summary.index = step(
        Stage::CreateIndex,
        policy,
        &mut summary.failures,
        ensure_index(service, config),
    )?;
    summary.stats = step(
        Stage::CollectionStats,
        policy,
        &mut summary.failures,
        collection_stats(service, config),
    )?;
    summary.queries = step(
        Stage::Search,
        policy,
        &mut summary.failures,
        query_bench(service, config, &mut *workload.queries),
    )?;

    Ok(summary)
}

fn step<T>(
    stage: Stage,
    policy: ErrorPolicy,
    failures: &mut Vec<StageError>,
    result: Result<T>,
) -> std::result::Result<Option<T>, StageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            let err = StageError { stage, source };
            log::error!("{}", err);
            match policy {
                ErrorPolicy::Continue => {
                    failures.push(err);
                    Ok(None)
                }
                ErrorPolicy::Abort => Err(err),
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
