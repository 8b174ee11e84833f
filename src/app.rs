use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::biosamples::BiosamplesClient;
use crate::catalog;
use crate::domain::Ruleset;
use crate::ena::{EnaClient, RunRecord};
use crate::error::IngestError;
use crate::pipeline::{Aggregation, SkipCounts};
use crate::resolver::MaterialResolver;
use crate::store::DocumentStore;
use crate::validator::ValidatorClient;

/// Upper bound for the pre-load queries against the store.
const PRELOAD_SIZE: usize = 100_000;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub datasets: usize,
    pub experiments: usize,
    pub files: usize,
    pub skipped: SkipCounts,
}

/// Wires the collaborators together for one import run.
pub struct ImportApp<B, E, S, V> {
    ena: E,
    store: S,
    validator: V,
    resolver: MaterialResolver<B, S>,
    rulesets: Vec<Ruleset>,
}

impl<B, E, S, V> ImportApp<B, E, S, V>
where
    B: BiosamplesClient,
    E: EnaClient,
    S: DocumentStore + Clone,
    V: ValidatorClient,
{
    pub fn new(biosamples: B, ena: E, store: S, validator: V, rulesets: Vec<Ruleset>) -> Self {
        let resolver = MaterialResolver::new(biosamples, store.clone());
        Self {
            ena,
            store,
            validator,
            resolver,
            rulesets,
        }
    }

    pub fn run(&mut self) -> Result<RunReport, IngestError> {
        let started_at = chrono::Utc::now().to_rfc3339();

        let mut known: BTreeMap<String, Value> = BTreeMap::new();
        for kind in ["organism", "specimen"] {
            for (id, source) in self.store.search_source(kind, PRELOAD_SIZE)? {
                known.insert(id, source);
            }
        }
        info!("there are {} sample records in the store", known.len());
        if known.is_empty() {
            return Err(IngestError::NoSampleRecords);
        }
        self.resolver.seed_known(known);

        let curated = self.curated_datasets()?;
        info!("there are {} curated FAANG datasets in the store", curated.len());

        let tax_ids = catalog::taxonomy_ids();
        let mut aggregation = Aggregation::new();
        for term in catalog::import_terms() {
            let records = match self.ena.search_runs(term, &tax_ids) {
                Ok(records) => records,
                Err(err) => {
                    warn!(term, error = %err, "run registry search failed, term skipped");
                    continue;
                }
            };
            let records: Vec<RunRecord> = records
                .into_iter()
                .filter(|record| !curated.contains(&record.study_accession))
                .filter(|record| record.project_name != "FAANG")
                .collect();
            if records.is_empty() {
                continue;
            }
            aggregation.ingest(&mut self.resolver, term, &records);
        }

        let output = aggregation.finalize(&self.resolver, &self.validator, &self.rulesets)?;

        let mut experiments = 0usize;
        for (id, experiment) in &output.experiments {
            if self.persist("experiment", id, experiment) {
                experiments += 1;
            }
        }
        info!("finished indexing experiments");

        let mut files = 0usize;
        for (id, file) in &output.files {
            if self.persist("file", id, file) {
                files += 1;
            }
        }
        info!("finished indexing files");

        let mut datasets = 0usize;
        for (id, dataset) in &output.datasets {
            if self.persist("dataset", id, dataset) {
                datasets += 1;
            }
        }
        info!("finished indexing datasets");

        Ok(RunReport {
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            datasets,
            experiments,
            files,
            skipped: output.skips,
        })
    }

    /// Ids of datasets already curated to the full standard; their studies
    /// are not reimported.
    fn curated_datasets(&self) -> Result<BTreeSet<String>, IngestError> {
        let hits = self.store.search_source("dataset", PRELOAD_SIZE)?;
        Ok(hits
            .into_iter()
            .filter(|(_, source)| {
                source.get("standardMet").and_then(Value::as_str) == Some("FAANG")
            })
            .map(|(id, _)| id)
            .collect())
    }

    /// Store failures are logged per document, never fatal for the run.
    fn persist<T: Serialize>(&self, kind: &str, id: &str, document: &T) -> bool {
        let value = match serde_json::to_value(document) {
            Ok(value) => value,
            Err(err) => {
                warn!(kind, id, error = %err, "failed to serialize document");
                return false;
            }
        };
        match self.store.upsert(kind, id, &value) {
            Ok(()) => true,
            Err(err) => {
                warn!(kind, id, error = %err, "failed to index document");
                false
            }
        }
    }
}
