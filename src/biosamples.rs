use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer};

use crate::domain::BiosampleId;
use crate::error::IngestError;

/// One attribute value inside a BioSamples `characteristics` bag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeValue {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "ontologyTerms")]
    pub ontology_terms: Vec<String>,
}

/// Edge kinds the resolver interprets; everything else the registry models
/// (`has member`, `same as`, ...) is carried but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    ChildOf,
    DerivedFrom,
    Other,
}

impl<'de> Deserialize<'de> for RelationshipKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "child of" => RelationshipKind::ChildOf,
            "derived from" => RelationshipKind::DerivedFrom,
            _ => RelationshipKind::Other,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
}

/// A raw sample record as served by the registry. Immutable once fetched;
/// classification lives in the resolver cache, not here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleRecord {
    pub accession: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub characteristics: BTreeMap<String, Vec<AttributeValue>>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
}

impl SampleRecord {
    /// Returns the first attribute name from `candidates` present in the
    /// characteristics bag. Registries are inconsistent about which name a
    /// submitting center used for the same concept.
    pub fn attribute_key<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|candidate| self.characteristics.contains_key(*candidate))
    }

    pub fn first_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.characteristics
            .get(name)
            .and_then(|values| values.first())
    }
}

pub trait BiosamplesClient: Send + Sync {
    fn fetch(&self, accession: &BiosampleId) -> Result<SampleRecord, IngestError>;
}

#[derive(Clone)]
pub struct BiosamplesHttpClient {
    client: Client,
    base_url: String,
}

impl BiosamplesHttpClient {
    pub fn new() -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::BiosamplesHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::BiosamplesHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://www.ebi.ac.uk/biosamples/samples".to_string(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, IngestError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(IngestError::BiosamplesHttp(err.to_string()));
                }
            }
        }
    }
}

impl BiosamplesClient for BiosamplesHttpClient {
    fn fetch(&self, accession: &BiosampleId) -> Result<SampleRecord, IngestError> {
        let url = format!("{}/{}", self.base_url, accession.as_str());
        let response = self.send_with_retries(|| self.client.get(&url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "BioSamples request failed".to_string());
            return Err(IngestError::BiosamplesStatus { status, message });
        }
        response
            .json::<SampleRecord>()
            .map_err(|err| IngestError::BiosamplesHttp(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
