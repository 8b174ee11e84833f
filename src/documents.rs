//! Persisted document shapes for the experiment, file, and dataset indexes.

use serde::Serialize;
use serde_json::Value;

use crate::domain::{Archive, OntologyLabel, Standard};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDocument {
    pub accession: String,
    pub assay_type: String,
    pub experiment_target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_met: Option<Standard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExperiment {
    pub accession: String,
    pub assay_type: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_met: Option<Standard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRun {
    pub accession: String,
    pub alias: String,
    pub platform: String,
    pub instrument: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStudy {
    pub accession: String,
    pub alias: String,
    pub title: String,
    #[serde(rename = "type")]
    pub study_type: String,
    pub secondary_accession: String,
}

/// One physical file, denormalized with its run, experiment, and study
/// context for the file index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub specimen: String,
    pub species: OntologyLabel,
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: String,
    pub readable_size: String,
    pub checksum_method: String,
    pub checksum: String,
    pub archive: Archive,
    pub base_count: String,
    pub read_count: String,
    pub release_date: String,
    pub update_date: String,
    pub submission: String,
    pub experiment: FileExperiment,
    pub run: FileRun,
    pub study: FileStudy,
}

/// The abbreviated file entry embedded in a dataset document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetFile {
    pub url: String,
    pub name: String,
    pub file_id: String,
    pub experiment: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: String,
    pub readable_size: String,
    pub archive: Archive,
    pub base_count: String,
    pub read_count: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetExperiment {
    pub accession: String,
    pub assay_type: String,
    pub target: String,
}

/// Specimen summary embedded in a dataset document, pulled from the stored
/// sample record. Fields the sample record lacks stay null.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpecimen {
    pub biosample_id: String,
    pub material: Option<Value>,
    pub cell_type: Option<Value>,
    pub organism: Option<Value>,
    pub sex: Option<Value>,
    pub breed: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDocument {
    pub accession: String,
    pub alias: String,
    pub title: String,
    pub secondary_accession: String,
    pub standard_met: Standard,
    pub specimen: Vec<DatasetSpecimen>,
    pub species: Vec<Value>,
    pub file: Vec<DatasetFile>,
    pub experiment: Vec<DatasetExperiment>,
    pub assay_type: Vec<String>,
    pub tech: Vec<String>,
    pub instrument: Vec<String>,
    pub archive: Vec<Archive>,
}

/// Renders a byte count the way the portal displays file sizes. Unparsable
/// input is passed through untouched.
pub fn readable_size(size: &str) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    let Ok(bytes) = size.trim().parse::<f64>() else {
        return size.to_string();
    };
    let mut value = bytes;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{}", value as u64, UNITS[unit])
    } else {
        format!("{:.2}{}", value, UNITS[unit])
    }
}

/// Treats null, empty strings, and empty containers as absent, mirroring how
/// sparsely populated stored sample records are read back.
pub fn non_empty(value: &Value) -> Option<Value> {
    let present = match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    present.then(|| value.clone())
}
