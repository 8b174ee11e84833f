use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::domain::Archive;
use crate::error::IngestError;

/// The general ENA portal rejects `fields=all`, so every wanted field has to
/// be listed explicitly.
pub const RUN_FIELDS: &[&str] = &[
    "study_accession",
    "secondary_study_accession",
    "sample_accession",
    "experiment_accession",
    "run_accession",
    "submission_accession",
    "tax_id",
    "instrument_platform",
    "instrument_model",
    "library_strategy",
    "library_selection",
    "read_count",
    "base_count",
    "first_public",
    "last_updated",
    "study_title",
    "study_alias",
    "run_alias",
    "fastq_bytes",
    "fastq_md5",
    "fastq_ftp",
    "fastq_aspera",
    "fastq_galaxy",
    "submitted_format",
    "sra_bytes",
    "sra_md5",
    "sra_ftp",
    "sra_aspera",
    "sra_galaxy",
    "cram_index_ftp",
    "cram_index_aspera",
    "cram_index_galaxy",
    "cram_index_bytes",
    "cram_index_md5",
    "project_name",
];

/// One flat `read_run` row from the ENA search API. All values arrive as
/// strings; multi-valued fields are `;`-delimited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRecord {
    #[serde(default)]
    pub study_accession: String,
    #[serde(default)]
    pub secondary_study_accession: String,
    #[serde(default)]
    pub sample_accession: String,
    #[serde(default)]
    pub experiment_accession: String,
    #[serde(default)]
    pub run_accession: String,
    #[serde(default)]
    pub submission_accession: String,
    #[serde(default)]
    pub tax_id: String,
    #[serde(default)]
    pub instrument_platform: String,
    #[serde(default)]
    pub instrument_model: String,
    #[serde(default)]
    pub library_strategy: String,
    #[serde(default)]
    pub library_selection: String,
    #[serde(default)]
    pub read_count: String,
    #[serde(default)]
    pub base_count: String,
    #[serde(default)]
    pub first_public: String,
    #[serde(default)]
    pub last_updated: String,
    #[serde(default)]
    pub study_title: String,
    #[serde(default)]
    pub study_alias: String,
    #[serde(default)]
    pub run_alias: String,
    #[serde(default)]
    pub fastq_bytes: String,
    #[serde(default)]
    pub fastq_md5: String,
    #[serde(default)]
    pub fastq_ftp: String,
    #[serde(default)]
    pub fastq_aspera: String,
    #[serde(default)]
    pub fastq_galaxy: String,
    #[serde(default)]
    pub submitted_format: String,
    #[serde(default)]
    pub sra_bytes: String,
    #[serde(default)]
    pub sra_md5: String,
    #[serde(default)]
    pub sra_ftp: String,
    #[serde(default)]
    pub sra_aspera: String,
    #[serde(default)]
    pub sra_galaxy: String,
    #[serde(default)]
    pub cram_index_ftp: String,
    #[serde(default)]
    pub cram_index_aspera: String,
    #[serde(default)]
    pub cram_index_galaxy: String,
    #[serde(default)]
    pub cram_index_bytes: String,
    #[serde(default)]
    pub cram_index_md5: String,
    #[serde(default)]
    pub project_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Fastq,
    Sra,
    CramIndex,
}

impl SourceKind {
    pub fn archive(&self) -> Archive {
        match self {
            SourceKind::Fastq => Archive::Ena,
            SourceKind::Sra => Archive::Sra,
            SourceKind::CramIndex => Archive::Cram,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ftp,
    Galaxy,
    Aspera,
}

/// The file source×transport combination a run record will be downloaded
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSource {
    pub kind: SourceKind,
    pub transport: Transport,
}

const SOURCE_KINDS: [SourceKind; 3] = [SourceKind::Fastq, SourceKind::Sra, SourceKind::CramIndex];
const TRANSPORTS: [Transport; 3] = [Transport::Ftp, Transport::Galaxy, Transport::Aspera];

impl RunRecord {
    /// Picks the first populated source×transport slot, in fixed priority
    /// order. A record with no populated slot has nothing downloadable.
    pub fn file_source(&self) -> Option<FileSource> {
        for kind in SOURCE_KINDS {
            for transport in TRANSPORTS {
                if !self.url_field(kind, transport).is_empty() {
                    return Some(FileSource { kind, transport });
                }
            }
        }
        None
    }

    pub fn url_field(&self, kind: SourceKind, transport: Transport) -> &str {
        match (kind, transport) {
            (SourceKind::Fastq, Transport::Ftp) => &self.fastq_ftp,
            (SourceKind::Fastq, Transport::Galaxy) => &self.fastq_galaxy,
            (SourceKind::Fastq, Transport::Aspera) => &self.fastq_aspera,
            (SourceKind::Sra, Transport::Ftp) => &self.sra_ftp,
            (SourceKind::Sra, Transport::Galaxy) => &self.sra_galaxy,
            (SourceKind::Sra, Transport::Aspera) => &self.sra_aspera,
            (SourceKind::CramIndex, Transport::Ftp) => &self.cram_index_ftp,
            (SourceKind::CramIndex, Transport::Galaxy) => &self.cram_index_galaxy,
            (SourceKind::CramIndex, Transport::Aspera) => &self.cram_index_aspera,
        }
    }

    pub fn bytes_field(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Fastq => &self.fastq_bytes,
            SourceKind::Sra => &self.sra_bytes,
            SourceKind::CramIndex => &self.cram_index_bytes,
        }
    }

    pub fn md5_field(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Fastq => &self.fastq_md5,
            SourceKind::Sra => &self.sra_md5,
            SourceKind::CramIndex => &self.cram_index_md5,
        }
    }
}

pub trait EnaClient: Send + Sync {
    /// Searches `read_run` results for one library-strategy term restricted
    /// to the given taxa. An empty result is not an error.
    fn search_runs(
        &self,
        library_strategy: &str,
        tax_ids: &[&str],
    ) -> Result<Vec<RunRecord>, IngestError>;
}

#[derive(Clone)]
pub struct EnaHttpClient {
    client: Client,
    base_url: String,
}

impl EnaHttpClient {
    pub fn new() -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::EnaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| IngestError::EnaHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: "https://www.ebi.ac.uk/ena/portal/api".to_string(),
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
                    return Err(IngestError::EnaHttp(err.to_string()));
                }
            }
        }
    }
}

impl EnaClient for EnaHttpClient {
    fn search_runs(
        &self,
        library_strategy: &str,
        tax_ids: &[&str],
    ) -> Result<Vec<RunRecord>, IngestError> {
        let url = format!("{}/search/", self.base_url);
        let query = format!(
            "library_strategy=\"{}\" AND tax_eq({})",
            library_strategy,
            tax_ids.join(",")
        );
        let fields = RUN_FIELDS.join(",");
        let response = self.send_with_retries(|| {
            self.client.get(&url).query(&[
                ("result", "read_run"),
                ("format", "JSON"),
                ("limit", "0"),
                ("query", query.as_str()),
                ("fields", fields.as_str()),
            ])
        })?;
        // 204 means the term has no matches at all.
        if response.status().as_u16() == 204 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(IngestError::EnaStatus { status, message });
        }
        response
            .json::<Vec<RunRecord>>()
            .map_err(|err| IngestError::EnaHttp(err.to_string()))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
