use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use serde_json::Value;

use faang_ingest::biosamples::{AttributeValue, BiosamplesClient, SampleRecord};
use faang_ingest::documents::ExperimentDocument;
use faang_ingest::domain::{Archive, BiosampleId, Ruleset, Standard};
use faang_ingest::ena::RunRecord;
use faang_ingest::error::IngestError;
use faang_ingest::pipeline::Aggregation;
use faang_ingest::resolver::MaterialResolver;
use faang_ingest::store::DocumentStore;
use faang_ingest::validator::{ValidationOutcome, ValidationReport, ValidatorClient};

#[derive(Default)]
struct MockBiosamples {
    records: HashMap<String, SampleRecord>,
}

impl MockBiosamples {
    fn with_specimens(accessions: &[&str]) -> Self {
        let records = accessions
            .iter()
            .map(|accession| {
                let mut record = SampleRecord {
                    accession: accession.to_string(),
                    name: format!("{accession} sample"),
                    ..SampleRecord::default()
                };
                record.characteristics.insert(
                    "Material".to_string(),
                    vec![AttributeValue {
                        text: "specimen from organism".to_string(),
                        ..AttributeValue::default()
                    }],
                );
                record.characteristics.insert(
                    "organism".to_string(),
                    vec![AttributeValue {
                        text: "Ovis aries".to_string(),
                        ontology_terms: vec![
                            "http://purl.obolibrary.org/obo/NCBITaxon_9940".to_string(),
                        ],
                        ..AttributeValue::default()
                    }],
                );
                (accession.to_string(), record)
            })
            .collect();
        Self { records }
    }
}

impl BiosamplesClient for &MockBiosamples {
    fn fetch(&self, accession: &BiosampleId) -> Result<SampleRecord, IngestError> {
        self.records
            .get(accession.as_str())
            .cloned()
            .ok_or_else(|| IngestError::BiosamplesStatus {
                status: 404,
                message: "not found".to_string(),
            })
    }
}

#[derive(Default, Clone)]
struct MockStore {
    upserts: Arc<Mutex<Vec<(String, String)>>>,
}

impl DocumentStore for MockStore {
    fn exists(&self, _kind: &str, _id: &str) -> Result<bool, IngestError> {
        Ok(false)
    }

    fn upsert(&self, kind: &str, id: &str, _document: &Value) -> Result<(), IngestError> {
        self.upserts
            .lock()
            .unwrap()
            .push((kind.to_string(), id.to_string()));
        Ok(())
    }

    fn search_source(&self, _kind: &str, _size: usize) -> Result<Vec<(String, Value)>, IngestError> {
        Ok(Vec::new())
    }
}

/// Pass/fail verdicts per (ruleset, experiment) pair.
struct MockValidator {
    report: ValidationReport,
}

impl MockValidator {
    fn passing(entries: &[(Ruleset, &str, bool)]) -> Self {
        let mut report = ValidationReport::default();
        for (ruleset, accession, passes) in entries {
            let outcome = if *passes {
                ValidationOutcome::ok()
            } else {
                ValidationOutcome::error("validation failed")
            };
            report.record(*ruleset, accession.to_string(), outcome);
        }
        Self { report }
    }
}

impl ValidatorClient for &MockValidator {
    fn validate(
        &self,
        _experiments: &BTreeMap<String, ExperimentDocument>,
        _rulesets: &[Ruleset],
    ) -> Result<ValidationReport, IngestError> {
        Ok(self.report.clone())
    }
}

fn run_record(study: &str, sample: &str, experiment: &str, run: &str) -> RunRecord {
    RunRecord {
        study_accession: study.to_string(),
        secondary_study_accession: format!("E{study}"),
        sample_accession: sample.to_string(),
        experiment_accession: experiment.to_string(),
        run_accession: run.to_string(),
        submission_accession: "ERA000001".to_string(),
        tax_id: "9940".to_string(),
        instrument_platform: "ILLUMINA".to_string(),
        instrument_model: "Illumina HiSeq 2500".to_string(),
        library_strategy: "WGS".to_string(),
        read_count: "1000".to_string(),
        base_count: "100000".to_string(),
        first_public: "2019-01-01".to_string(),
        last_updated: "2019-06-01".to_string(),
        study_title: "Sheep whole genomes".to_string(),
        study_alias: "sheep_wgs".to_string(),
        run_alias: format!("{run}_alias"),
        ..RunRecord::default()
    }
}

fn with_fastq(mut record: RunRecord, files: &str, bytes: &str, md5: &str, formats: &str) -> RunRecord {
    record.fastq_ftp = files.to_string();
    record.fastq_bytes = bytes.to_string();
    record.fastq_md5 = md5.to_string();
    record.submitted_format = formats.to_string();
    record
}

const LEGACY_ONLY: &[Ruleset] = &[Ruleset::FaangLegacyExperiments];
const BOTH_RULESETS: &[Ruleset] = &[Ruleset::FaangExperiments, Ruleset::FaangLegacyExperiments];

#[test]
fn multi_valued_fastq_fields_become_one_file_each() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[(Ruleset::FaangLegacyExperiments, "ERX1", true)]);

    let record = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz;ftp.sra.ebi.ac.uk/vol1/b.fastq.gz",
        "100;200",
        "aaa;bbb",
        "FASTQ;FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);
    let output = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap();

    assert_eq!(output.files.len(), 2);
    let first = &output.files["a"];
    assert_eq!(first.name, "a.fastq.gz");
    assert_eq!(first.size, "100");
    assert_eq!(first.file_type, "FASTQ");
    assert_eq!(first.checksum, "aaa");
    assert_eq!(first.archive, Archive::Ena);
    let second = &output.files["b"];
    assert_eq!(second.size, "200");
    assert_eq!(second.species.text, "Ovis aries");

    let dataset = &output.datasets["PRJEB30000"];
    assert_eq!(dataset.standard_met, Standard::Legacy);
    let names: Vec<&str> = dataset.file.iter().map(|file| file.name.as_str()).collect();
    assert_eq!(names, vec!["a.fastq.gz", "b.fastq.gz"]);
    assert_eq!(dataset.specimen[0].biosample_id, "SAMEA2000001");
    assert_eq!(dataset.assay_type, vec!["whole genome sequencing assay"]);
    assert_eq!(dataset.tech, vec!["WGS"]);
    assert_eq!(dataset.archive, vec![Archive::Ena]);
}

#[test]
fn missing_format_falls_back_to_file_extension() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[(Ruleset::FaangLegacyExperiments, "ERX1", true)]);

    let record = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz;ftp.sra.ebi.ac.uk/vol1/b.fastq.gz",
        "100;200",
        "aaa;bbb",
        "",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);
    let output = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap();

    assert_eq!(output.files["a"].file_type, "fastq.gz");
    assert_eq!(output.files["b"].file_type, "fastq.gz");
}

#[test]
fn mismatched_size_list_skips_the_record() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[]);

    let record = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz;ftp.sra.ebi.ac.uk/vol1/b.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);

    let err = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap_err();
    assert_matches!(err, IngestError::NoDatasets);
}

#[test]
fn record_without_downloadable_file_is_skipped() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[]);

    let record = run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1");
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);

    let err = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap_err();
    assert_matches!(err, IngestError::NoDatasets);
}

#[test]
fn unresolvable_sample_skips_the_record() {
    // No sample records at all: every fetch comes back 404.
    let client = MockBiosamples::default();
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[]);

    let record = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);

    let err = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap_err();
    assert_matches!(err, IngestError::NoDatasets);
}

#[test]
fn files_of_invalid_experiments_are_dropped_transitively() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001", "SAMEA2000002"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[
        (Ruleset::FaangLegacyExperiments, "ERX1", true),
        (Ruleset::FaangLegacyExperiments, "ERX2", false),
    ]);

    let valid = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let invalid = with_fastq(
        run_record("PRJEB30000", "SAMEA2000002", "ERX2", "ERR2"),
        "ftp.sra.ebi.ac.uk/vol1/c.fastq.gz",
        "300",
        "ccc",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[valid, invalid]);
    let output = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap();

    assert!(output.experiments.contains_key("ERX1"));
    assert!(!output.experiments.contains_key("ERX2"));
    assert!(output.files.contains_key("a"));
    assert!(!output.files.contains_key("c"));

    let dataset = &output.datasets["PRJEB30000"];
    assert_eq!(dataset.experiment.len(), 1);
    assert_eq!(dataset.experiment[0].accession, "ERX1");
    assert!(dataset.file.iter().all(|file| file.file_id != "c"));
    assert_eq!(
        output.files["a"].experiment.standard_met,
        Some(Standard::Legacy)
    );
}

#[test]
fn dataset_standard_downgrades_when_any_experiment_is_legacy() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001", "SAMEA2000002"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[
        (Ruleset::FaangExperiments, "ERX1", true),
        (Ruleset::FaangExperiments, "ERX2", false),
        (Ruleset::FaangLegacyExperiments, "ERX1", true),
        (Ruleset::FaangLegacyExperiments, "ERX2", true),
    ]);

    let faang = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let legacy = with_fastq(
        run_record("PRJEB30000", "SAMEA2000002", "ERX2", "ERR2"),
        "ftp.sra.ebi.ac.uk/vol1/c.fastq.gz",
        "300",
        "ccc",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[faang, legacy]);
    let output = aggregation
        .finalize(&resolver, &&validator, BOTH_RULESETS)
        .unwrap();

    assert_eq!(
        output.experiments["ERX1"].standard_met,
        Some(Standard::Faang)
    );
    assert_eq!(
        output.experiments["ERX2"].standard_met,
        Some(Standard::Legacy)
    );
    assert_eq!(output.datasets["PRJEB30000"].standard_met, Standard::Legacy);
}

#[test]
fn study_with_only_invalid_experiments_yields_no_dataset() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[(Ruleset::FaangLegacyExperiments, "ERX1", false)]);

    let record = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[record]);

    let err = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap_err();
    assert_matches!(err, IngestError::NoDatasets);
}

#[test]
fn surviving_dataset_keeps_other_studies_alive() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001", "SAMEA2000002"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[
        (Ruleset::FaangLegacyExperiments, "ERX1", true),
        (Ruleset::FaangLegacyExperiments, "ERX2", false),
    ]);

    let valid = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let invalid = with_fastq(
        run_record("PRJEB30001", "SAMEA2000002", "ERX2", "ERR2"),
        "ftp.sra.ebi.ac.uk/vol1/c.fastq.gz",
        "300",
        "ccc",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[valid, invalid]);
    let output = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap();

    assert_eq!(output.datasets.len(), 1);
    assert!(output.datasets.contains_key("PRJEB30000"));
}

#[test]
fn repeated_runs_do_not_duplicate_experiments() {
    let client = MockBiosamples::with_specimens(&["SAMEA2000001"]);
    let mut resolver = MaterialResolver::new(&client, MockStore::default());
    let validator = MockValidator::passing(&[(Ruleset::FaangLegacyExperiments, "ERX1", true)]);

    let first = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR1"),
        "ftp.sra.ebi.ac.uk/vol1/a.fastq.gz",
        "100",
        "aaa",
        "FASTQ",
    );
    let second = with_fastq(
        run_record("PRJEB30000", "SAMEA2000001", "ERX1", "ERR2"),
        "ftp.sra.ebi.ac.uk/vol1/b.fastq.gz",
        "200",
        "bbb",
        "FASTQ",
    );
    let mut aggregation = Aggregation::new();
    aggregation.ingest(&mut resolver, "WGS", &[first, second]);
    let output = aggregation
        .finalize(&resolver, &&validator, LEGACY_ONLY)
        .unwrap();

    assert_eq!(output.experiments.len(), 1);
    assert_eq!(output.files.len(), 2);
    assert_eq!(output.datasets["PRJEB30000"].experiment.len(), 1);
    // One specimen shared by both runs, resolved exactly once.
    assert_eq!(output.datasets["PRJEB30000"].specimen.len(), 1);
}
