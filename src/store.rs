use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::error::IngestError;

/// Id-keyed document map, the only view of the search engine the import
/// needs.
pub trait DocumentStore: Send + Sync {
    fn exists(&self, kind: &str, id: &str) -> Result<bool, IngestError>;
    /// Replaces any existing document under the same id.
    fn upsert(&self, kind: &str, id: &str, document: &Value) -> Result<(), IngestError>;
    /// Returns up to `size` `(id, source)` pairs from one index.
    fn search_source(&self, kind: &str, size: usize) -> Result<Vec<(String, Value)>, IngestError>;
}

#[derive(Clone)]
pub struct EsHttpStore {
    client: Client,
    base_url: String,
    index_prefix: String,
}

impl EsHttpStore {
    pub fn new(host: &str, index_prefix: &str) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::StoreHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_host(host),
            index_prefix: trim_index_prefix(index_prefix).to_string(),
        })
    }

    /// `{prefix}_{kind}`, or the bare alias when no prefix is configured.
    fn index_name(&self, kind: &str) -> String {
        if self.index_prefix.is_empty() {
            kind.to_string()
        } else {
            format!("{}_{}", self.index_prefix, kind)
        }
    }
}

impl DocumentStore for EsHttpStore {
    fn exists(&self, kind: &str, id: &str) -> Result<bool, IngestError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, self.index_name(kind), id);
        let response = self
            .client
            .head(&url)
            .send()
            .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(IngestError::StoreStatus {
                status,
                message: format!("unexpected status checking {url}"),
            }),
        }
    }

    fn upsert(&self, kind: &str, id: &str, document: &Value) -> Result<(), IngestError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, self.index_name(kind), id);
        // Delete-then-create keeps stale fields from surviving a reimport.
        if self.exists(kind, id)? {
            let response = self
                .client
                .delete(&url)
                .send()
                .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "delete failed".to_string());
                return Err(IngestError::StoreStatus { status, message });
            }
        }
        let response = self
            .client
            .put(&url)
            .json(document)
            .send()
            .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "index failed".to_string());
            return Err(IngestError::StoreStatus { status, message });
        }
        Ok(())
    }

    fn search_source(&self, kind: &str, size: usize) -> Result<Vec<(String, Value)>, IngestError> {
        let url = format!("{}/{}/_search", self.base_url, self.index_name(kind));
        let response = self
            .client
            .get(&url)
            .query(&[("size", size.to_string())])
            .send()
            .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "search failed".to_string());
            return Err(IngestError::StoreStatus { status, message });
        }
        let parsed: SearchResponse = response
            .json()
            .map_err(|err| IngestError::StoreHttp(err.to_string()))?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| (hit.id, hit.source))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: SearchHits,
}

#[derive(Debug, Default, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let has_port = host
        .rsplit(':')
        .next()
        .map(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or(false);
    let with_port = if has_port {
        host.to_string()
    } else {
        format!("{host}:9200")
    };
    if with_port.starts_with("http://") || with_port.starts_with("https://") {
        with_port
    } else {
        format!("http://{with_port}")
    }
}

/// Index prefixes are configured as e.g. `faang_build_1_`; the separator is
/// added back when composing index names.
pub fn trim_index_prefix(prefix: &str) -> &str {
    prefix.trim().trim_end_matches('_')
}
