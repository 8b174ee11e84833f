use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::biosamples::{BiosamplesClient, RelationshipKind, SampleRecord};
use crate::domain::{
    BiosampleId, ClassificationSource, MaterialClassification, MaterialType, OntologyLabel,
};
use crate::error::IngestError;
use crate::extract::SampleDocBuilder;
use crate::store::DocumentStore;

/// Samples resolved on the fly never went through the curation pipeline.
pub const LEGACY_BASIC_STANDARD: &str = "Legacy (basic)";

/// Relationship graphs are submitter-controlled; the memoization cache
/// bounds re-entry, the depth cap bounds pathological chains.
const MAX_DEPTH: usize = 32;

/// Classifies samples by their material type, walking `derived from` /
/// `child of` edges with a memoized cache. One resolver instance is scoped
/// to one import run; there is no cross-run state beyond what is seeded
/// from the document store.
pub struct MaterialResolver<B, S> {
    biosamples: B,
    store: S,
    /// Full sample documents: seeded from the store, extended with every
    /// sample resolved during the run.
    known: BTreeMap<String, Value>,
    /// One terminal entry per accession touched during the run.
    cache: BTreeMap<String, MaterialClassification>,
}

impl<B: BiosamplesClient, S: DocumentStore> MaterialResolver<B, S> {
    pub fn new(biosamples: B, store: S) -> Self {
        Self {
            biosamples,
            store,
            known: BTreeMap::new(),
            cache: BTreeMap::new(),
        }
    }

    /// Seeds the already-curated sample documents loaded from the store.
    pub fn seed_known(&mut self, records: BTreeMap<String, Value>) {
        self.known.extend(records);
    }

    /// Classifies one sample. Never raises: fetch and persistence failures
    /// are folded into the returned classification. Calling this twice for
    /// the same accession issues at most one registry fetch.
    pub fn resolve(&mut self, accession: &BiosampleId) -> MaterialClassification {
        self.resolve_inner(accession.as_str(), 0)
    }

    pub fn classification(&self, accession: &str) -> Option<&MaterialClassification> {
        self.cache.get(accession)
    }

    /// The stored or freshly built sample document for an accession.
    pub fn record(&self, accession: &str) -> Option<&Value> {
        self.known.get(accession)
    }

    fn resolve_inner(&mut self, accession: &str, depth: usize) -> MaterialClassification {
        // Cache entries are terminal for the run, including fetch failures
        // and in-flight placeholders seen while resolving a cycle.
        if let Some(existing) = self.cache.get(accession) {
            return existing.clone();
        }

        if let Some(stored) = self.known.get(accession) {
            let label = stored_material_label(stored);
            let classification = MaterialClassification {
                accession: accession.to_string(),
                material: MaterialType::from_label(&label.text),
                label,
                confirmed: true,
                source: ClassificationSource::PriorStore,
            };
            self.cache
                .insert(accession.to_string(), classification.clone());
            return classification;
        }

        if depth >= MAX_DEPTH {
            warn!(
                accession,
                depth, "relationship chain too deep, assigning default classification"
            );
            return self.insert_default(accession);
        }

        let id = match accession.parse::<BiosampleId>() {
            Ok(id) => id,
            Err(_) => {
                warn!(accession, "not a valid BioSamples accession");
                return self.insert_fetch_error(accession, 0);
            }
        };

        debug!(accession, "fetching sample record");
        let record = match self.biosamples.fetch(&id) {
            Ok(record) => record,
            Err(err) => {
                let status = match &err {
                    IngestError::BiosamplesStatus { status, .. } => *status,
                    _ => 0,
                };
                warn!(accession, status, error = %err, "failed to fetch sample record");
                return self.insert_fetch_error(accession, status);
            }
        };

        // An explicit material attribute classifies directly. Otherwise an
        // unconfirmed placeholder goes in before the edge walk so a cycle
        // re-entering this accession sees it instead of recursing.
        let explicit_key = record.attribute_key(&["Material", "material"]);
        let entry = match explicit_key.and_then(|key| record.first_attribute(key)) {
            Some(attribute) => MaterialClassification {
                accession: accession.to_string(),
                material: MaterialType::from_label(&attribute.text),
                label: OntologyLabel::new(
                    attribute.text.clone(),
                    attribute.ontology_terms.first().cloned(),
                ),
                confirmed: true,
                source: ClassificationSource::ExplicitAttribute,
            },
            None => MaterialClassification {
                accession: accession.to_string(),
                material: MaterialType::SpecimenFromOrganism,
                label: MaterialType::SpecimenFromOrganism.label(),
                confirmed: false,
                source: ClassificationSource::InFlight,
            },
        };
        self.cache.insert(accession.to_string(), entry);

        let mut child_of: Vec<String> = Vec::new();
        let mut derived_from: Option<String> = None;
        for relationship in &record.relationships {
            match relationship.kind {
                RelationshipKind::ChildOf => {
                    // Only animals carry a child-of edge.
                    self.confirm(
                        accession,
                        MaterialType::Organism,
                        ClassificationSource::ChildOfRelationship,
                    );
                    if relationship.target != accession {
                        child_of.push(relationship.target.clone());
                    }
                }
                RelationshipKind::DerivedFrom if relationship.target != accession => {
                    let related = self.resolve_inner(&relationship.target, depth + 1);
                    if related.confirmed {
                        match related.material {
                            MaterialType::Organism => self.confirm(
                                accession,
                                MaterialType::SpecimenFromOrganism,
                                ClassificationSource::DerivedFromOrganism,
                            ),
                            MaterialType::SpecimenFromOrganism
                            | MaterialType::SpecimenDerived => self.confirm(
                                accession,
                                MaterialType::SpecimenDerived,
                                ClassificationSource::DerivedFromSpecimen,
                            ),
                            MaterialType::Unknown => {}
                        }
                    }
                    if related.usable() {
                        derived_from = Some(relationship.target.clone());
                    }
                }
                _ => {}
            }
        }

        // A placeholder that survived the edge walk means no rule applied.
        let classification = match self.cache.get(accession) {
            Some(current) if current.source != ClassificationSource::InFlight => current.clone(),
            _ => {
                let fallback = MaterialClassification {
                    accession: accession.to_string(),
                    material: MaterialType::SpecimenFromOrganism,
                    label: MaterialType::SpecimenFromOrganism.label(),
                    confirmed: false,
                    source: ClassificationSource::Default,
                };
                self.cache.insert(accession.to_string(), fallback.clone());
                fallback
            }
        };

        let (kind, document) = build_sample_document(
            &record,
            &classification,
            derived_from.as_deref(),
            &child_of,
        );
        if let Err(err) = self.store.upsert(kind, accession, &document) {
            warn!(accession, error = %err, "failed to persist resolved sample record");
        }
        self.known.insert(accession.to_string(), document);

        classification
    }

    /// Upgrades an unconfirmed entry to a confirmed one. A confirmed entry
    /// is never changed; disagreeing evidence is flagged, not applied.
    fn confirm(&mut self, accession: &str, material: MaterialType, source: ClassificationSource) {
        match self.cache.get(accession) {
            Some(existing) if existing.confirmed => {
                if existing.material != material {
                    warn!(
                        accession,
                        existing = %existing.material,
                        existing_source = %existing.source,
                        proposed = %material,
                        proposed_source = %source,
                        "conflicting material evidence for confirmed classification"
                    );
                }
            }
            _ => {
                self.cache.insert(
                    accession.to_string(),
                    MaterialClassification {
                        accession: accession.to_string(),
                        material,
                        label: material.label(),
                        confirmed: true,
                        source,
                    },
                );
            }
        }
    }

    fn insert_fetch_error(&mut self, accession: &str, status: u16) -> MaterialClassification {
        let classification = MaterialClassification {
            accession: accession.to_string(),
            material: MaterialType::Unknown,
            label: MaterialType::Unknown.label(),
            confirmed: false,
            source: ClassificationSource::FetchError { status },
        };
        self.cache
            .insert(accession.to_string(), classification.clone());
        classification
    }

    fn insert_default(&mut self, accession: &str) -> MaterialClassification {
        let classification = MaterialClassification {
            accession: accession.to_string(),
            material: MaterialType::SpecimenFromOrganism,
            label: MaterialType::SpecimenFromOrganism.label(),
            confirmed: false,
            source: ClassificationSource::Default,
        };
        self.cache
            .insert(accession.to_string(), classification.clone());
        classification
    }
}

fn stored_material_label(stored: &Value) -> OntologyLabel {
    let material = stored.get("material");
    let text = material
        .and_then(|value| value.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let term = material
        .and_then(|value| value.get("ontologyTerms"))
        .and_then(Value::as_str)
        .map(str::to_string);
    OntologyLabel::new(text, term)
}

/// Builds the organism or specimen document persisted for a freshly
/// resolved sample. Returns the document kind together with the document.
fn build_sample_document(
    record: &SampleRecord,
    classification: &MaterialClassification,
    derived_from: Option<&str>,
    child_of: &[String],
) -> (&'static str, Value) {
    let mut builder = SampleDocBuilder::new();
    builder.set("biosampleId", Value::String(record.accession.clone()));
    builder.set("name", Value::String(record.name.clone()));
    builder.set(
        "material",
        serde_json::to_value(&classification.label).unwrap_or(Value::Null),
    );
    if let Some(key) = record.attribute_key(&["Material", "material"]) {
        builder.mark_consumed(key);
    }
    if let Some(number) = id_number(&record.accession) {
        builder.set("id_number", json!(number));
    }
    builder.extract(
        record,
        "description",
        &["description", "description title"],
        None,
    );

    let kind = if classification.material == MaterialType::Organism {
        builder.extract(record, "sex", &["sex"], None);
        builder.extract(record, "breed", &["breed"], None);
        builder.extract(record, "organism", &["organism", "Organism"], None);
        "organism"
    } else {
        // EBI records call the tissue `organism part`, NCBI/DDBJ conversions
        // call it `tissue`.
        if let Some(tissue_key) = record.attribute_key(&["organism part", "tissue"]) {
            builder.extract(
                record,
                "organismPart",
                &[tissue_key],
                Some("specimenFromOrganism"),
            );
            builder.extract(record, "cellType", &[tissue_key], None);
        } else {
            builder.extract(record, "cellType", &["cell type"], None);
        }
        builder.extract(
            record,
            "developmentalStage",
            &["developmental stage", "development stage"],
            Some("specimenFromOrganism"),
        );
        builder.extract(record, "organism", &["organism", "Organism"], Some("organism"));
        builder.extract(record, "sex", &["sex"], Some("organism"));
        builder.extract(record, "breed", &["breed", "strain"], Some("organism"));
        "specimen"
    };

    builder.set("releaseDate", date_value(record.release.as_deref()));
    builder.set("updateDate", date_value(record.update.as_deref()));
    builder.set(
        "standardMet",
        Value::String(LEGACY_BASIC_STANDARD.to_string()),
    );
    if let Some(parent) = derived_from {
        builder.set("derivedFrom", Value::String(parent.to_string()));
    }
    if !child_of.is_empty() {
        builder.set("childOf", json!(child_of));
    }
    builder.push_custom_fields(record);
    (kind, builder.finish())
}

/// Numeric sort key for sample accessions: EBI accessions use their numeric
/// suffix, converted NCBI/DDBJ ones sort below them with a negated number.
fn id_number(accession: &str) -> Option<i64> {
    if let Some(rest) = accession.strip_prefix("SAMEA") {
        return rest.parse::<i64>().ok();
    }
    Regex::new(r"\d+")
        .ok()?
        .find(accession)
        .and_then(|found| found.as_str().parse::<i64>().ok())
        .map(|number| -number)
}

/// Extracts `YYYY-MM-DD` from the ISO timestamps BioSamples serves; dates
/// already in another shape pass through unchanged.
fn parse_date(value: Option<&str>) -> Option<String> {
    let value = value?;
    if value.is_empty() {
        return None;
    }
    let re = Regex::new(r"(\d+-\d+-\d+)T").ok()?;
    match re.captures(value).and_then(|captures| captures.get(1)) {
        Some(found) => Some(found.as_str().to_string()),
        None => Some(value.to_string()),
    }
}

fn date_value(value: Option<&str>) -> Value {
    match parse_date(value) {
        Some(date) => Value::String(date),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_iso_dates() {
        assert_eq!(
            parse_date(Some("2018-03-07T11:31:47Z")).as_deref(),
            Some("2018-03-07")
        );
        assert_eq!(parse_date(Some("2018-03-07")).as_deref(), Some("2018-03-07"));
        assert_eq!(parse_date(Some("")), None);
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn id_numbers() {
        assert_eq!(id_number("SAMEA104728877"), Some(104728877));
        assert_eq!(id_number("SAMN02436846"), Some(-2436846));
        assert_eq!(id_number("SAMEA"), None);
    }
}
