// VecBench — service.rs
// Remote vector-service contract, wire descriptors and status errors.
// Author: d65v <https://github.com/d65v>

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Status Codes ──────────────────────────────────────────────────────────────

/// Status codes reported by the service in the `code` field of a response.
pub mod code {
    pub const SUCCESS: i64 = 0;
    pub const UNEXPECTED_ERROR: i64 = 1;
    pub const COLLECTION_NOT_EXISTS: i64 = 4;
    pub const ILLEGAL_ARGUMENT: i64 = 5;
    pub const ILLEGAL_DIMENSION: i64 = 7;
    pub const ILLEGAL_INDEX_TYPE: i64 = 8;
    pub const ILLEGAL_COLLECTION_NAME: i64 = 9;
    pub const ILLEGAL_TOPK: i64 = 10;
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The call itself could not complete.
    #[error("rpc failed: {0}")]
    Transport(String),

    /// The call completed but the service reported a failure.
    #[error("failed: {message} (code {code})")]
    Status { code: i64, message: String },

    /// The service answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn status(code: i64, message: impl Into<String>) -> Self {
        ServiceError::Status {
            code,
            message: message.into(),
        }
    }

    /// True for application-level failures, false for transport ones.
    pub fn is_status(&self) -> bool {
        matches!(self, ServiceError::Status { .. })
    }
}

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// Euclidean distance (lower = closer)
    L2,
    /// Inner product (higher = closer)
    IP,
    Hamming,
    Jaccard,
    Tanimoto,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricType::L2 => "L2",
            MetricType::IP => "IP",
            MetricType::Hamming => "HAMMING",
            MetricType::Jaccard => "JACCARD",
            MetricType::Tanimoto => "TANIMOTO",
        };
        f.write_str(s)
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Ok(MetricType::L2),
            "IP" | "DOT" | "INNER-PRODUCT" => Ok(MetricType::IP),
            "HAMMING" => Ok(MetricType::Hamming),
            "JACCARD" => Ok(MetricType::Jaccard),
            "TANIMOTO" => Ok(MetricType::Tanimoto),
            other => Err(format!("unknown metric type '{}'", other)),
        }
    }
}

/// Index algorithm of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "FLAT")]
    Flat,
    #[serde(rename = "IVFFLAT")]
    IvfFlat,
    #[serde(rename = "IVFSQ8")]
    IvfSq8,
    #[serde(rename = "IVFSQ8H")]
    IvfSq8H,
    #[serde(rename = "IVFPQ")]
    IvfPq,
    #[serde(rename = "HNSW")]
    Hnsw,
    #[serde(rename = "RNSG")]
    Rnsg,
    #[serde(rename = "ANNOY")]
    Annoy,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVFFLAT",
            IndexType::IvfSq8 => "IVFSQ8",
            IndexType::IvfSq8H => "IVFSQ8H",
            IndexType::IvfPq => "IVFPQ",
            IndexType::Hnsw => "HNSW",
            IndexType::Rnsg => "RNSG",
            IndexType::Annoy => "ANNOY",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexType::Flat),
            "IVFFLAT" | "IVF_FLAT" => Ok(IndexType::IvfFlat),
            "IVFSQ8" | "IVF_SQ8" => Ok(IndexType::IvfSq8),
            "IVFSQ8H" | "IVF_SQ8H" => Ok(IndexType::IvfSq8H),
            "IVFPQ" | "IVF_PQ" => Ok(IndexType::IvfPq),
            "HNSW" => Ok(IndexType::Hnsw),
            "RNSG" => Ok(IndexType::Rnsg),
            "ANNOY" => Ok(IndexType::Annoy),
            other => Err(format!("unknown index type '{}'", other)),
        }
    }
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// Parameters of a collection, as sent on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionParam {
    pub collection_name: String,
    pub dimension: usize,
    pub index_file_size: usize,
    pub metric_type: MetricType,
}

/// Collection descriptor as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(flatten)]
    pub param: CollectionParam,
    /// Number of flushed rows.
    #[serde(default)]
    pub count: u64,
}

/// Index descriptor. `collection_name` is carried on requests only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexParam {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collection_name: String,
    pub index_type: IndexType,
    #[serde(default, rename = "params")]
    pub extra_params: Value,
}

/// A top-k search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParam {
    pub collection_name: String,
    pub query_vectors: Vec<Vec<f32>>,
    pub topk: usize,
    pub extra_params: Value,
}

/// One ranked match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub distance: f32,
}

/// Ranked hits, one list per query vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Vec<SearchHit>>,
}

impl SearchResponse {
    /// Total number of hits across all queries.
    pub fn hit_count(&self) -> usize {
        self.results.iter().map(Vec::len).sum()
    }
}

// ── Service Contract ──────────────────────────────────────────────────────────

/// The remote calls the benchmark is built from.
///
/// Every method is a single blocking round trip. Implementations never retry.
#[cfg_attr(test, mockall::automock)]
pub trait VectorService {
    /// Check that the service is reachable and healthy.
    fn server_state(&mut self) -> Result<(), ServiceError>;

    fn list_collections(&mut self) -> Result<Vec<String>, ServiceError>;

    fn collection_info(&mut self, name: &str) -> Result<CollectionInfo, ServiceError>;

    fn create_collection(&mut self, param: &CollectionParam) -> Result<(), ServiceError>;

    /// Insert one batch; returns the IDs assigned by the service.
    fn insert(&mut self, collection: &str, records: &[Vec<f32>]) -> Result<Vec<i64>, ServiceError>;

    /// Make previously inserted rows durable and searchable.
    fn flush(&mut self, collections: &[String]) -> Result<(), ServiceError>;

    fn index_info(&mut self, collection: &str) -> Result<IndexParam, ServiceError>;

    fn create_index(&mut self, param: &IndexParam) -> Result<(), ServiceError>;

    fn collection_stats(&mut self, collection: &str) -> Result<Value, ServiceError>;

    fn search(&mut self, param: &SearchParam) -> Result<SearchResponse, ServiceError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_wire_names() {
        assert_eq!(serde_json::to_value(MetricType::IP).unwrap(), json!("IP"));
        assert_eq!(serde_json::to_value(MetricType::Hamming).unwrap(), json!("HAMMING"));
        let m: MetricType = serde_json::from_value(json!("L2")).unwrap();
        assert_eq!(m, MetricType::L2);
    }

    #[test]
    fn test_metric_from_str_aliases() {
        assert_eq!("ip".parse::<MetricType>().unwrap(), MetricType::IP);
        assert_eq!("inner-product".parse::<MetricType>().unwrap(), MetricType::IP);
        assert_eq!("euclidean".parse::<MetricType>().unwrap(), MetricType::L2);
        assert!("cosine".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_index_type_names_match_serde() {
        for t in [
            IndexType::Flat,
            IndexType::IvfFlat,
            IndexType::IvfSq8,
            IndexType::IvfSq8H,
            IndexType::IvfPq,
            IndexType::Hnsw,
            IndexType::Rnsg,
            IndexType::Annoy,
        ] {
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
            assert_eq!(t.as_str().parse::<IndexType>().unwrap(), t);
        }
        assert_eq!("ivf_sq8".parse::<IndexType>().unwrap(), IndexType::IvfSq8);
    }

    #[test]
    fn test_collection_info_flattens_param() {
        let info: CollectionInfo = serde_json::from_value(json!({
            "collection_name": "images",
            "dimension": 1256,
            "index_file_size": 1024,
            "metric_type": "IP",
            "count": 42
        }))
        .unwrap();
        assert_eq!(info.param.collection_name, "images");
        assert_eq!(info.param.dimension, 1256);
        assert_eq!(info.param.metric_type, MetricType::IP);
        assert_eq!(info.count, 42);
    }

    #[test]
    fn test_index_param_omits_empty_collection() {
        let p = IndexParam {
            collection_name: String::new(),
            index_type: IndexType::IvfSq8,
            extra_params: json!({"nlist": 16384}),
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"index_type": "IVFSQ8", "params": {"nlist": 16384}})
        );
    }

    #[test]
    fn test_error_kinds() {
        assert!(ServiceError::status(code::COLLECTION_NOT_EXISTS, "missing").is_status());
        assert!(!ServiceError::Transport("refused".into()).is_status());
        assert_eq!(
            ServiceError::status(4, "missing").to_string(),
            "failed: missing (code 4)"
        );
    }
}
