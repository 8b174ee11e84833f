use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid BioSamples accession: {0}")]
    InvalidBiosampleId(String),

    #[error("unknown validation ruleset: {0}")]
    InvalidRuleset(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("BioSamples request failed: {0}")]
    BiosamplesHttp(String),

    #[error("BioSamples returned status {status}: {message}")]
    BiosamplesStatus { status: u16, message: String },

    #[error("ENA request failed: {0}")]
    EnaHttp(String),

    #[error("ENA returned status {status}: {message}")]
    EnaStatus { status: u16, message: String },

    #[error("document store request failed: {0}")]
    StoreHttp(String),

    #[error("document store returned status {status}: {message}")]
    StoreStatus { status: u16, message: String },

    #[error("validator request failed: {0}")]
    ValidatorHttp(String),

    #[error("validator returned status {status}: {message}")]
    ValidatorStatus { status: u16, message: String },

    #[error("no curated sample records found in the document store; run the sample import first")]
    NoSampleRecords,

    #[error("no datasets survived the import")]
    NoDatasets,

    #[error("failed to serialize document: {0}")]
    Serialization(String),
}
