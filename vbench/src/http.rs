// VecBench — http.rs
// VectorService over the service's HTTP/JSON interface (blocking reqwest).
// Author: d65v <https://github.com/d65v>

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde_json::{json, Value};

use crate::service::{
    code, CollectionInfo, CollectionParam, IndexParam, SearchHit, SearchParam, SearchResponse,
    ServiceError, VectorService,
};

const PAGE_SIZE: usize = 100;

// ── Client ────────────────────────────────────────────────────────────────────

pub struct HttpService {
    client: Client,
    base_url: String,
    base: Url,
}

impl HttpService {
    /// Build a client for `host:port`. No request is sent until the first call.
    ///
    /// `timeout` of `None` lets a call block for as long as the server takes,
    /// which index builds on large collections need.
    pub fn new(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let base_url = base_url(host, port);
        let base = Url::parse(&base_url)
            .map_err(|e| ServiceError::Transport(format!("bad address {}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport(format!("{} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Value, ServiceError> {
        let response = request
            .send()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        parse_body(status, &text)
    }
}

/// `http://host:port`, unless `host` already carries a scheme.
pub fn base_url(host: &str, port: u16) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

// ── Response Decoding ─────────────────────────────────────────────────────────

/// Turn an HTTP status and body into the JSON document or a service error.
///
/// A non-2xx status or a non-zero `code` field is an application-level failure.
pub fn parse_body(http_status: u16, text: &str) -> Result<Value, ServiceError> {
    let ok_http = (200..300).contains(&http_status);

    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) if !ok_http => {
                return Err(ServiceError::status(
                    code::UNEXPECTED_ERROR,
                    format!("HTTP {}: {}", http_status, text.trim()),
                ))
            }
            Err(e) => return Err(ServiceError::Decode(e.to_string())),
        }
    };

    let body_code = body.get("code").and_then(Value::as_i64).unwrap_or(code::SUCCESS);
    if !ok_http || body_code != code::SUCCESS {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", http_status));
        let code = if body_code != code::SUCCESS {
            body_code
        } else {
            code::UNEXPECTED_ERROR
        };
        return Err(ServiceError::Status { code, message });
    }

    Ok(body)
}

/// IDs arrive as JSON numbers or as numeric strings.
fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn as_f32(v: &Value) -> Option<f32> {
    v.as_f64()
        .map(|f| f as f32)
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn decode_ids(body: &Value) -> Result<Vec<i64>, ServiceError> {
    let ids = body
        .get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::Decode("insert response has no 'ids' array".into()))?;
    ids.iter()
        .map(|v| as_i64(v).ok_or_else(|| ServiceError::Decode(format!("bad id {}", v))))
        .collect()
}

fn decode_search(body: &Value) -> Result<SearchResponse, ServiceError> {
    let rows = match body.get("result") {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => return Ok(SearchResponse::default()),
        Some(other) => {
            return Err(ServiceError::Decode(format!("bad search result {}", other)))
        }
    };

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        let hits = row
            .as_array()
            .ok_or_else(|| ServiceError::Decode(format!("bad hit list {}", row)))?;
        let decoded = hits
            .iter()
            .map(|h| {
                let id = h.get("id").and_then(as_i64);
                let distance = h.get("distance").and_then(as_f32);
                match (id, distance) {
                    (Some(id), Some(distance)) => Ok(SearchHit { id, distance }),
                    _ => Err(ServiceError::Decode(format!("bad hit {}", h))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        results.push(decoded);
    }
    Ok(SearchResponse { results })
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ServiceError> {
    serde_json::from_value(body).map_err(|e| ServiceError::Decode(e.to_string()))
}

// ── VectorService ─────────────────────────────────────────────────────────────

impl VectorService for HttpService {
    fn server_state(&mut self) -> Result<(), ServiceError> {
        self.send(self.client.get(self.endpoint(&["state"])?)).map(|_| ())
    }

    fn list_collections(&mut self) -> Result<Vec<String>, ServiceError> {
        let mut names = Vec::new();
        loop {
            let body = self.send(self.client.get(self.endpoint(&["collections"])?).query(&[
                ("offset", names.len().to_string()),
                ("page_size", PAGE_SIZE.to_string()),
            ]))?;

            let page = body
                .get("collections")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let total = body.get("count").and_then(Value::as_u64).unwrap_or(0) as usize;

            let before = names.len();
            names.extend(
                page.iter()
                    .filter_map(|c| c.get("collection_name").and_then(Value::as_str))
                    .map(str::to_string),
            );

            if names.len() >= total || names.len() == before {
                return Ok(names);
            }
        }
    }

    fn collection_info(&mut self, name: &str) -> Result<CollectionInfo, ServiceError> {
        let body = self.send(self.client.get(self.endpoint(&["collections", name])?))?;
        decode(body)
    }

    fn create_collection(&mut self, param: &CollectionParam) -> Result<(), ServiceError> {
        self.send(self.client.post(self.endpoint(&["collections"])?).json(param))
            .map(|_| ())
    }

    fn insert(&mut self, collection: &str, records: &[Vec<f32>]) -> Result<Vec<i64>, ServiceError> {
        let body = self.send(
            self.client
                .post(self.endpoint(&["collections", collection, "vectors"])?)
                .json(&json!({ "vectors": records })),
        )?;
        decode_ids(&body)
    }

    fn flush(&mut self, collections: &[String]) -> Result<(), ServiceError> {
        self.send(
            self.client
                .put(self.endpoint(&["system", "task"])?)
                .json(&json!({ "flush": { "collection_names": collections } })),
        )
        .map(|_| ())
    }

    fn index_info(&mut self, collection: &str) -> Result<IndexParam, ServiceError> {
        let body = self.send(
            self.client
                .get(self.endpoint(&["collections", collection, "indexes"])?),
        )?;
        let mut index: IndexParam = decode(body)?;
        index.collection_name = collection.to_string();
        Ok(index)
    }

    fn create_index(&mut self, param: &IndexParam) -> Result<(), ServiceError> {
        self.send(
            self.client
                .post(self.endpoint(&["collections", &param.collection_name, "indexes"])?)
                .json(&json!({
                    "index_type": param.index_type,
                    "params": param.extra_params,
                })),
        )
        .map(|_| ())
    }

    fn collection_stats(&mut self, collection: &str) -> Result<Value, ServiceError> {
        self.send(
            self.client
                .get(self.endpoint(&["collections", collection])?)
                .query(&[("info", "stat")]),
        )
    }

    fn search(&mut self, param: &SearchParam) -> Result<SearchResponse, ServiceError> {
        let body = self.send(
            self.client
                .put(self.endpoint(&["collections", &param.collection_name, "vectors"])?)
                .json(&json!({
                    "search": {
                        "topk": param.topk,
                        "vectors": param.query_vectors,
                        "params": param.extra_params,
                    }
                })),
        )?;
        decode_search(&body)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
