use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::biosamples::BiosamplesClient;
use crate::catalog;
use crate::documents::{
    DatasetDocument, DatasetExperiment, DatasetFile, DatasetSpecimen, ExperimentDocument,
    FileDocument, FileExperiment, FileRun, FileStudy, non_empty, readable_size,
};
use crate::domain::{Archive, BiosampleId, OntologyLabel, Ruleset, Standard};
use crate::ena::RunRecord;
use crate::error::IngestError;
use crate::resolver::MaterialResolver;
use crate::store::DocumentStore;
use crate::validator::ValidatorClient;

/// Why a run record was excluded from aggregation. The pipeline drops, it
/// never fails, so reasons have to stay countable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoFile,
    InvalidSampleAccession,
    UnresolvedSample,
    UnknownTaxon,
    LengthMismatch,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SkipCounts {
    pub no_file: usize,
    pub invalid_sample_accession: usize,
    pub unresolved_sample: usize,
    pub unknown_taxon: usize,
    pub length_mismatch: usize,
}

impl SkipCounts {
    fn note(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NoFile => self.no_file += 1,
            SkipReason::InvalidSampleAccession => self.invalid_sample_accession += 1,
            SkipReason::UnresolvedSample => self.unresolved_sample += 1,
            SkipReason::UnknownTaxon => self.unknown_taxon += 1,
            SkipReason::LengthMismatch => self.length_mismatch += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.no_file
            + self.invalid_sample_accession
            + self.unresolved_sample
            + self.unknown_taxon
            + self.length_mismatch
    }
}

/// Per-study side tables accumulated during the first pass.
struct DatasetAccumulator {
    alias: String,
    title: String,
    secondary_accession: String,
    specimens: BTreeSet<String>,
    instruments: BTreeSet<String>,
    archives: BTreeSet<Archive>,
    files: BTreeMap<String, DatasetFile>,
    experiments: BTreeMap<String, DatasetExperiment>,
}

impl DatasetAccumulator {
    fn new(record: &RunRecord) -> Self {
        Self {
            alias: record.study_alias.clone(),
            title: record.study_title.clone(),
            secondary_accession: record.secondary_study_accession.clone(),
            specimens: BTreeSet::new(),
            instruments: BTreeSet::new(),
            archives: BTreeSet::new(),
            files: BTreeMap::new(),
            experiments: BTreeMap::new(),
        }
    }
}

/// Everything the pipeline emits after validation and propagation.
#[derive(Debug)]
pub struct AggregationOutput {
    pub datasets: BTreeMap<String, DatasetDocument>,
    pub experiments: BTreeMap<String, ExperimentDocument>,
    pub files: BTreeMap<String, FileDocument>,
    pub skips: SkipCounts,
}

/// Folds flat run records into experiment, file, and dataset entities.
/// `ingest` is the first pass; `finalize` runs validation and the
/// propagation pass.
#[derive(Default)]
pub struct Aggregation {
    experiments: BTreeMap<String, ExperimentDocument>,
    files: BTreeMap<String, FileDocument>,
    datasets: BTreeMap<String, DatasetAccumulator>,
    skips: SkipCounts,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    /// First pass over one library-strategy batch. Records that cannot be
    /// fully attributed are counted and dropped, never fatal.
    pub fn ingest<B: BiosamplesClient, S: DocumentStore>(
        &mut self,
        resolver: &mut MaterialResolver<B, S>,
        term: &str,
        records: &[RunRecord],
    ) {
        let Some(category) = catalog::normalize_library_strategy(term) else {
            warn!(term, "unknown library strategy term, batch skipped");
            return;
        };
        let (Some(assay_type), Some(experiment_target)) = (
            catalog::assay_type(category),
            catalog::experiment_target(category),
        ) else {
            debug!(term, category, "category not imported, batch skipped");
            return;
        };
        info!(term, category, count = records.len(), "aggregating run records");
        for record in records {
            if let Err(reason) =
                self.ingest_record(resolver, record, term, assay_type, experiment_target)
            {
                self.skips.note(reason);
            }
        }
    }

    fn ingest_record<B: BiosamplesClient, S: DocumentStore>(
        &mut self,
        resolver: &mut MaterialResolver<B, S>,
        record: &RunRecord,
        term: &str,
        assay_type: &str,
        experiment_target: &str,
    ) -> Result<(), SkipReason> {
        let Some(source) = record.file_source() else {
            debug!(run = %record.run_accession, "no downloadable file, record skipped");
            return Err(SkipReason::NoFile);
        };

        let sample_id: BiosampleId = record.sample_accession.parse().map_err(|_| {
            warn!(
                run = %record.run_accession,
                sample = %record.sample_accession,
                "sample accession not parseable, record skipped"
            );
            SkipReason::InvalidSampleAccession
        })?;
        let classification = resolver.resolve(&sample_id);
        if !classification.usable() {
            warn!(
                run = %record.run_accession,
                sample = %record.sample_accession,
                "sample could not be resolved, record skipped"
            );
            return Err(SkipReason::UnresolvedSample);
        }

        let Some(species_name) = catalog::species_name(&record.tax_id) else {
            warn!(
                run = %record.run_accession,
                tax_id = %record.tax_id,
                "taxon not imported, record skipped"
            );
            return Err(SkipReason::UnknownTaxon);
        };
        let species = OntologyLabel::new(
            species_name,
            Some(format!(
                "http://purl.obolibrary.org/obo/NCBITaxon_{}",
                record.tax_id
            )),
        );

        let archive = source.kind.archive();
        let urls: Vec<&str> = record.url_field(source.kind, source.transport).split(';').collect();
        let sizes: Vec<&str> = record.bytes_field(source.kind).split(';').collect();
        if urls.len() != sizes.len() {
            warn!(
                study = %record.study_accession,
                run = %record.run_accession,
                files = urls.len(),
                sizes = sizes.len(),
                "file and size lists disagree, record skipped"
            );
            return Err(SkipReason::LengthMismatch);
        }
        let types: Vec<&str> = record.submitted_format.split(';').collect();
        let checksums: Vec<&str> = record.md5_field(source.kind).split(';').collect();

        let dataset = self
            .datasets
            .entry(record.study_accession.clone())
            .or_insert_with(|| DatasetAccumulator::new(record));
        dataset.specimens.insert(record.sample_accession.clone());
        dataset.instruments.insert(record.instrument_model.clone());
        dataset.archives.insert(archive);

        for (index, url) in urls.iter().enumerate() {
            let full_name = url.rsplit('/').next().unwrap_or(url).to_string();
            let file_id = full_name.split('.').next().unwrap_or(&full_name).to_string();
            let size = sizes.get(index).copied().unwrap_or_default().to_string();
            let checksum = checksums.get(index).copied().unwrap_or_default().to_string();
            // ENA submissions often leave the format slot empty; the file
            // name extension is the fallback.
            let file_type = match types.get(index) {
                Some(value) if !value.is_empty() => (*value).to_string(),
                _ => full_name.get(file_id.len() + 1..).unwrap_or("").to_string(),
            };

            self.files.insert(
                file_id.clone(),
                FileDocument {
                    specimen: record.sample_accession.clone(),
                    species: species.clone(),
                    url: (*url).to_string(),
                    name: full_name.clone(),
                    file_type: file_type.clone(),
                    size: size.clone(),
                    readable_size: readable_size(&size),
                    checksum_method: "md5".to_string(),
                    checksum,
                    archive,
                    base_count: record.base_count.clone(),
                    read_count: record.read_count.clone(),
                    release_date: record.first_public.clone(),
                    update_date: record.last_updated.clone(),
                    submission: record.submission_accession.clone(),
                    experiment: FileExperiment {
                        accession: record.experiment_accession.clone(),
                        assay_type: assay_type.to_string(),
                        target: experiment_target.to_string(),
                        standard_met: None,
                    },
                    run: FileRun {
                        accession: record.run_accession.clone(),
                        alias: record.run_alias.clone(),
                        platform: record.instrument_platform.clone(),
                        instrument: record.instrument_model.clone(),
                    },
                    study: FileStudy {
                        accession: record.study_accession.clone(),
                        alias: record.study_alias.clone(),
                        title: record.study_title.clone(),
                        study_type: term.to_string(),
                        secondary_accession: record.secondary_study_accession.clone(),
                    },
                },
            );

            // One experiment spans multiple runs and files; the first
            // occurrence fixes its identity fields.
            self.experiments
                .entry(record.experiment_accession.clone())
                .or_insert_with(|| ExperimentDocument {
                    accession: record.experiment_accession.clone(),
                    assay_type: assay_type.to_string(),
                    experiment_target: experiment_target.to_string(),
                    standard_met: None,
                });

            dataset.files.insert(
                full_name.clone(),
                DatasetFile {
                    url: (*url).to_string(),
                    name: full_name,
                    file_id,
                    experiment: record.experiment_accession.clone(),
                    file_type,
                    size: size.clone(),
                    readable_size: readable_size(&size),
                    archive,
                    base_count: record.base_count.clone(),
                    read_count: record.read_count.clone(),
                },
            );
            dataset
                .experiments
                .entry(record.experiment_accession.clone())
                .or_insert_with(|| DatasetExperiment {
                    accession: record.experiment_accession.clone(),
                    assay_type: assay_type.to_string(),
                    target: experiment_target.to_string(),
                });
        }
        Ok(())
    }

    /// Validation and propagation: experiments keep the first ruleset they
    /// pass, files survive through their experiment, datasets through their
    /// experiments and specimens. Yields an error only when nothing at all
    /// survives.
    pub fn finalize<B, S, V>(
        mut self,
        resolver: &MaterialResolver<B, S>,
        validator: &V,
        rulesets: &[Ruleset],
    ) -> Result<AggregationOutput, IngestError>
    where
        B: BiosamplesClient,
        S: DocumentStore,
        V: ValidatorClient,
    {
        if self.datasets.is_empty() {
            return Err(IngestError::NoDatasets);
        }
        for (index, (accession, dataset)) in self.datasets.iter().enumerate() {
            info!(
                "{} {} has {} experiments to be processed",
                index + 1,
                accession,
                dataset.experiments.len()
            );
        }

        let report = validator.validate(&self.experiments, rulesets)?;
        let mut accepted: BTreeMap<String, Standard> = BTreeMap::new();
        for (accession, experiment) in self.experiments.iter_mut() {
            let passing = rulesets
                .iter()
                .copied()
                .find(|ruleset| report.passes(*ruleset, accession));
            let Some(ruleset) = passing else {
                for ruleset in rulesets {
                    if let Some(outcome) = report.outcome(*ruleset, accession) {
                        debug!(
                            experiment = %accession,
                            ruleset = ruleset.label(),
                            message = %outcome.message,
                            "experiment failed validation"
                        );
                    }
                }
                continue;
            };
            let standard = ruleset.standard();
            experiment.standard_met = Some(standard);
            accepted.insert(accession.clone(), standard);
        }
        info!(
            "{} of {} experiments met a standard",
            accepted.len(),
            self.experiments.len()
        );

        // Transitive validity: a file reaches the portal only through a
        // validated experiment.
        let mut files: BTreeMap<String, FileDocument> = BTreeMap::new();
        for (file_id, mut document) in self.files {
            let Some(standard) = accepted.get(&document.experiment.accession) else {
                continue;
            };
            document.experiment.standard_met = Some(*standard);
            files.insert(file_id, document);
        }

        let experiments: BTreeMap<String, ExperimentDocument> = self
            .experiments
            .into_iter()
            .filter(|(_, experiment)| experiment.standard_met.is_some())
            .collect();

        let mut datasets: BTreeMap<String, DatasetDocument> = BTreeMap::new();
        for (accession, dataset) in self.datasets {
            let DatasetAccumulator {
                alias,
                title,
                secondary_accession,
                specimens: specimen_ids,
                instruments,
                archives,
                files: dataset_files,
                experiments: dataset_experiments,
            } = dataset;

            let valid_experiments: Vec<DatasetExperiment> = dataset_experiments
                .into_values()
                .filter(|experiment| accepted.contains_key(&experiment.accession))
                .collect();
            if valid_experiments.is_empty() {
                warn!(dataset = %accession, "no valid experiments, dataset dropped");
                continue;
            }
            let standard = if valid_experiments
                .iter()
                .any(|experiment| accepted.get(&experiment.accession) == Some(&Standard::Legacy))
            {
                Standard::Legacy
            } else {
                Standard::Faang
            };

            let mut assay_types = BTreeSet::new();
            let mut technologies = BTreeSet::new();
            for experiment in &valid_experiments {
                assay_types.insert(experiment.assay_type.clone());
                if let Some(tech) = catalog::technology(&experiment.assay_type) {
                    technologies.insert(tech.to_string());
                }
            }

            let mut specimens = Vec::new();
            let mut species: BTreeMap<String, Value> = BTreeMap::new();
            for specimen_id in &specimen_ids {
                let Some(detail) = resolver.record(specimen_id) else {
                    warn!(
                        dataset = %accession,
                        specimen = %specimen_id,
                        "sample record required by dataset could not be found"
                    );
                    continue;
                };
                let organism_section = detail.get("organism").cloned().unwrap_or(Value::Null);
                specimens.push(DatasetSpecimen {
                    biosample_id: specimen_id.clone(),
                    material: detail.get("material").and_then(non_empty),
                    cell_type: detail.get("cellType").and_then(non_empty),
                    organism: organism_section.get("organism").and_then(non_empty),
                    sex: organism_section.get("sex").and_then(non_empty),
                    breed: organism_section.get("breed").and_then(non_empty),
                });
                if let Some(organism) = organism_section.get("organism") {
                    if let Some(text) = organism.get("text").and_then(Value::as_str) {
                        species.insert(text.to_string(), organism.clone());
                    }
                }
            }
            if specimens.is_empty() {
                warn!(dataset = %accession, "no resolvable specimens, dataset dropped");
                continue;
            }

            let file_entries: Vec<DatasetFile> = dataset_files
                .into_values()
                .filter(|file| files.contains_key(&file.file_id))
                .collect();

            datasets.insert(
                accession.clone(),
                DatasetDocument {
                    accession,
                    alias,
                    title,
                    secondary_accession,
                    standard_met: standard,
                    specimen: specimens,
                    species: species.into_values().collect(),
                    file: file_entries,
                    experiment: valid_experiments,
                    assay_type: assay_types.into_iter().collect(),
                    tech: technologies.into_iter().collect(),
                    instrument: instruments.into_iter().collect(),
                    archive: archives.into_iter().collect(),
                },
            );
        }

        if datasets.is_empty() {
            return Err(IngestError::NoDatasets);
        }
        Ok(AggregationOutput {
            datasets,
            experiments,
            files,
            skips: self.skips,
        })
    }
}
