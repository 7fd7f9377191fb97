// VecBench — memory.rs
// In-process VectorService: collections, flush visibility, brute-force search.
// Used for dry runs, examples and tests.
// Author: d65v <https://github.com/d65v>

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde_json::{json, Value};

use crate::service::{
    code, CollectionInfo, CollectionParam, IndexParam, IndexType, MetricType, SearchHit,
    SearchParam, SearchResponse, ServiceError, VectorService,
};

// ── Collection State ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct MemCollection {
    param: CollectionParam,
    index: IndexParam,
    /// Flushed rows, visible to search and counts
    rows: Vec<(i64, Vec<f32>)>,
    /// Inserted but not yet flushed
    pending: Vec<(i64, Vec<f32>)>,
}

impl MemCollection {
    fn new(param: CollectionParam) -> Self {
        let index = IndexParam {
            collection_name: param.collection_name.clone(),
            index_type: IndexType::Flat,
            extra_params: json!({}),
        };
        Self { param, index, rows: Vec::new(), pending: Vec::new() }
    }

    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            param: self.param.clone(),
            count: self.rows.len() as u64,
        }
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// A vector service held entirely in memory.
///
/// Index builds only record the requested descriptor; search is always exact.
#[derive(Debug)]
pub struct MemoryService {
    collections: BTreeMap<String, MemCollection>,
    next_id: i64,
    online: bool,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    pub fn new() -> Self {
        Self {
            collections: BTreeMap::new(),
            next_id: 1,
            online: true,
        }
    }

    /// A service whose every call fails at the transport level.
    pub fn offline() -> Self {
        Self { online: false, ..Self::new() }
    }

    /// Rows inserted but not yet flushed.
    pub fn pending_rows(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.pending.len())
    }

    fn check_online(&self) -> Result<(), ServiceError> {
        if self.online {
            Ok(())
        } else {
            Err(ServiceError::Transport("connection refused".into()))
        }
    }

    fn collection(&self, name: &str) -> Result<&MemCollection, ServiceError> {
        self.check_online()?;
        self.collections.get(name).ok_or_else(|| not_found(name))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut MemCollection, ServiceError> {
        self.check_online()?;
        self.collections.get_mut(name).ok_or_else(|| not_found(name))
    }
}

fn not_found(name: &str) -> ServiceError {
    ServiceError::status(
        code::COLLECTION_NOT_EXISTS,
        format!("Collection {} not found", name),
    )
}

impl VectorService for MemoryService {
    fn server_state(&mut self) -> Result<(), ServiceError> {
        self.check_online()
    }

    fn list_collections(&mut self) -> Result<Vec<String>, ServiceError> {
        self.check_online()?;
        Ok(self.collections.keys().cloned().collect())
    }

    fn collection_info(&mut self, name: &str) -> Result<CollectionInfo, ServiceError> {
        Ok(self.collection(name)?.info())
    }

    fn create_collection(&mut self, param: &CollectionParam) -> Result<(), ServiceError> {
        self.check_online()?;
        if param.collection_name.trim().is_empty() {
            return Err(ServiceError::status(
                code::ILLEGAL_COLLECTION_NAME,
                "Collection name is empty",
            ));
        }
        if param.dimension == 0 {
            return Err(ServiceError::status(code::ILLEGAL_DIMENSION, "Dimension must be > 0"));
        }
        if self.collections.contains_key(&param.collection_name) {
            return Err(ServiceError::status(
                code::ILLEGAL_COLLECTION_NAME,
                format!("Collection {} already exists", param.collection_name),
            ));
        }
        self.collections.insert(
            param.collection_name.clone(),
            MemCollection::new(param.clone()),
        );
        Ok(())
    }

    fn insert(&mut self, collection: &str, records: &[Vec<f32>]) -> Result<Vec<i64>, ServiceError> {
        let first_id = self.next_id;
        let coll = self.collection_mut(collection)?;
        let dim = coll.param.dimension;
        if let Some(bad) = records.iter().find(|r| r.len() != dim) {
            return Err(ServiceError::status(
                code::ILLEGAL_DIMENSION,
                format!("Expected dimension {}, got {}", dim, bad.len()),
            ));
        }

        let ids: Vec<i64> = (first_id..first_id + records.len() as i64).collect();
        coll.pending
            .extend(ids.iter().copied().zip(records.iter().cloned()));
        self.next_id += records.len() as i64;
        Ok(ids)
    }

    fn flush(&mut self, collections: &[String]) -> Result<(), ServiceError> {
        for name in collections {
            let coll = self.collection_mut(name)?;
            let pending = std::mem::take(&mut coll.pending);
            coll.rows.extend(pending);
        }
        Ok(())
    }

    fn index_info(&mut self, collection: &str) -> Result<IndexParam, ServiceError> {
        Ok(self.collection(collection)?.index.clone())
    }

    fn create_index(&mut self, param: &IndexParam) -> Result<(), ServiceError> {
        let coll = self.collection_mut(&param.collection_name)?;
        if !param.extra_params.is_object() && !param.extra_params.is_null() {
            return Err(ServiceError::status(
                code::ILLEGAL_ARGUMENT,
                "Index params must be a JSON object",
            ));
        }
        coll.index = param.clone();
        Ok(())
    }

    fn collection_stats(&mut self, collection: &str) -> Result<Value, ServiceError> {
        let coll = self.collection(collection)?;
        Ok(json!({
            "row_count": coll.rows.len(),
            "pending_count": coll.pending.len(),
            "index_type": coll.index.index_type,
            "partitions": [{ "tag": "_default", "row_count": coll.rows.len() }],
        }))
    }

    fn search(&mut self, param: &SearchParam) -> Result<SearchResponse, ServiceError> {
        let coll = self.collection(&param.collection_name)?;
        if param.topk == 0 {
            return Err(ServiceError::status(code::ILLEGAL_TOPK, "Topk must be > 0"));
        }

        let metric = coll.param.metric_type;
        let mut results = Vec::with_capacity(param.query_vectors.len());
        for query in &param.query_vectors {
            if query.len() != coll.param.dimension {
                return Err(ServiceError::status(
                    code::ILLEGAL_DIMENSION,
                    format!(
                        "Expected dimension {}, got {}",
                        coll.param.dimension,
                        query.len()
                    ),
                ));
            }
            results.push(brute_search(&coll.rows, query, param.topk, metric)?);
        }
        Ok(SearchResponse { results })
    }
}

// ── Private: Brute-Force Search ───────────────────────────────────────────────

fn brute_search(
    rows: &[(i64, Vec<f32>)],
    query: &[f32],
    top_k: usize,
    metric: MetricType,
) -> Result<Vec<SearchHit>, ServiceError> {
    let mut hits: Vec<SearchHit> = match metric {
        MetricType::L2 => rows
            .iter()
            .map(|(id, v)| SearchHit { id: *id, distance: l2_sq(query, v) })
            .collect(),
        MetricType::IP => rows
            .iter()
            .map(|(id, v)| SearchHit { id: *id, distance: dot(query, v) })
            .collect(),
        other => {
            return Err(ServiceError::status(
                code::ILLEGAL_ARGUMENT,
                format!("Metric {} is not supported for float vectors", other),
            ))
        }
    };

    // L2: smaller is closer. IP: larger is closer.
    match metric {
        MetricType::IP => hits.sort_by_key(|h| Reverse(OrderedFloat(h.distance))),
        _ => hits.sort_by_key(|h| OrderedFloat(h.distance)),
    }
    hits.truncate(top_k);
    Ok(hits)
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance (avoids sqrt; ranking is unchanged).
#[inline]
fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_service(metric: MetricType) -> MemoryService {
        let mut svc = MemoryService::new();
        svc.create_collection(&CollectionParam {
            collection_name: "c".into(),
            dimension: 3,
            index_file_size: 16,
            metric_type: metric,
        })
        .unwrap();
        svc
    }

    fn search(svc: &mut MemoryService, query: Vec<f32>, topk: usize) -> Vec<SearchHit> {
        let resp = svc
            .search(&SearchParam {
                collection_name: "c".into(),
                query_vectors: vec![query],
                topk,
                extra_params: json!({}),
            })
            .unwrap();
        resp.results.into_iter().next().unwrap()
    }

    #[test]
    fn test_missing_collection_is_status_error() {
        let mut svc = MemoryService::new();
        let err = svc.collection_info("ghost").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Status { code: code::COLLECTION_NOT_EXISTS, .. }
        ));
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let mut svc = make_service(MetricType::L2);
        let err = svc
            .create_collection(&CollectionParam {
                collection_name: "c".into(),
                dimension: 3,
                index_file_size: 16,
                metric_type: MetricType::L2,
            })
            .unwrap_err();
        assert!(err.is_status());
    }

    #[test]
    fn test_rows_visible_only_after_flush() {
        let mut svc = make_service(MetricType::L2);
        let ids = svc
            .insert("c", &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(svc.collection_info("c").unwrap().count, 0);
        assert_eq!(svc.pending_rows("c"), 2);
        assert!(search(&mut svc, vec![1.0, 0.0, 0.0], 5).is_empty());

        svc.flush(&["c".to_string()]).unwrap();
        assert_eq!(svc.collection_info("c").unwrap().count, 2);
        assert_eq!(svc.pending_rows("c"), 0);
        assert_eq!(search(&mut svc, vec![1.0, 0.0, 0.0], 5).len(), 2);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut svc = make_service(MetricType::L2);
        let err = svc.insert("c", &[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Status { code: code::ILLEGAL_DIMENSION, .. }
        ));
        assert_eq!(svc.pending_rows("c"), 0);
    }

    #[test]
    fn test_l2_ranks_nearest_first() {
        let mut svc = make_service(MetricType::L2);
        svc.insert(
            "c",
            &[vec![0.0, 0.0, 1.0], vec![0.9, 0.1, 0.0], vec![0.5, 0.5, 0.0]],
        )
        .unwrap();
        svc.flush(&["c".to_string()]).unwrap();

        let hits = search(&mut svc, vec![1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 2);
        assert_eq!(hits[1].id, 3);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_ip_ranks_largest_first() {
        let mut svc = make_service(MetricType::IP);
        svc.insert("c", &[vec![0.1, 0.1, 0.1], vec![1.0, 1.0, 1.0]]).unwrap();
        svc.flush(&["c".to_string()]).unwrap();

        let hits = search(&mut svc, vec![1.0, 1.0, 1.0], 2);
        assert_eq!(hits[0].id, 2);
        assert!((hits[0].distance - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_topk_rejected() {
        let mut svc = make_service(MetricType::L2);
        let err = svc
            .search(&SearchParam {
                collection_name: "c".into(),
                query_vectors: vec![vec![0.0; 3]],
                topk: 0,
                extra_params: json!({}),
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Status { code: code::ILLEGAL_TOPK, .. }));
    }

    #[test]
    fn test_create_index_replaces_descriptor() {
        let mut svc = make_service(MetricType::L2);
        assert_eq!(svc.index_info("c").unwrap().index_type, IndexType::Flat);
        svc.create_index(&IndexParam {
            collection_name: "c".into(),
            index_type: IndexType::IvfSq8,
            extra_params: json!({"nlist": 16}),
        })
        .unwrap();
        let idx = svc.index_info("c").unwrap();
        assert_eq!(idx.index_type, IndexType::IvfSq8);
        assert_eq!(idx.extra_params["nlist"], 16);
        assert_eq!(svc.collection_stats("c").unwrap()["index_type"], "IVFSQ8");
    }

    #[test]
    fn test_offline_fails_at_transport() {
        let mut svc = MemoryService::offline();
        assert!(matches!(svc.server_state(), Err(ServiceError::Transport(_))));
        assert!(matches!(svc.list_collections(), Err(ServiceError::Transport(_))));
    }
}
