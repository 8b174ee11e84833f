use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const ORGANISM_ONTOLOGY_TERM: &str = "http://purl.obolibrary.org/obo/OBI_0100026";
pub const SPECIMEN_ONTOLOGY_TERM: &str = "http://purl.obolibrary.org/obo/OBI_0001479";

/// BioSamples accession, e.g. `SAMEA104728877` or `SAMN02436846`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BiosampleId(String);

impl BiosampleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_ebi(&self) -> bool {
        self.0.starts_with("SAMEA")
    }
}

impl fmt::Display for BiosampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BiosampleId {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.len() > 3
            && normalized.starts_with("SAM")
            && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(IngestError::InvalidBiosampleId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// A text value with an optional ontology term reference, the unit in which
/// BioSamples expresses most attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyLabel {
    pub text: String,
    #[serde(rename = "ontologyTerms", skip_serializing_if = "Option::is_none")]
    pub ontology_terms: Option<String>,
}

impl OntologyLabel {
    pub fn new(text: impl Into<String>, ontology_terms: Option<String>) -> Self {
        Self {
            text: text.into(),
            ontology_terms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialType {
    Organism,
    SpecimenFromOrganism,
    SpecimenDerived,
    Unknown,
}

impl MaterialType {
    /// Canonical label used when a material type is inferred rather than
    /// taken verbatim from a registry attribute.
    pub fn label(&self) -> OntologyLabel {
        match self {
            MaterialType::Organism => {
                OntologyLabel::new("organism", Some(ORGANISM_ONTOLOGY_TERM.to_string()))
            }
            MaterialType::SpecimenFromOrganism => OntologyLabel::new(
                "specimen from organism",
                Some(SPECIMEN_ONTOLOGY_TERM.to_string()),
            ),
            MaterialType::SpecimenDerived => OntologyLabel::new("derived specimen", None),
            MaterialType::Unknown => OntologyLabel::new("unknown", None),
        }
    }

    /// Maps a registry material label onto a material type. Submitters use a
    /// handful of terms for derived specimens; anything unrecognized stays
    /// `Unknown` while the literal label is preserved on the classification.
    pub fn from_label(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "organism" => MaterialType::Organism,
            "specimen from organism" => MaterialType::SpecimenFromOrganism,
            "cell specimen" | "cell culture" | "cell line" | "specimen from specimen"
            | "derived specimen" => MaterialType::SpecimenDerived,
            _ => MaterialType::Unknown,
        }
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label().text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    PriorStore,
    ExplicitAttribute,
    ChildOfRelationship,
    DerivedFromOrganism,
    DerivedFromSpecimen,
    FetchError { status: u16 },
    Default,
    InFlight,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::PriorStore => "prior store",
            ClassificationSource::ExplicitAttribute => "explicit attribute",
            ClassificationSource::ChildOfRelationship => "child of relationship",
            ClassificationSource::DerivedFromOrganism => "derived-from-organism",
            ClassificationSource::DerivedFromSpecimen => "derived-from-specimen",
            ClassificationSource::FetchError { .. } => "fetch error",
            ClassificationSource::Default => "default",
            ClassificationSource::InFlight => "in flight",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The resolver's verdict for one accession. Owned by the resolver cache;
/// a confirmed entry is never revised, an unconfirmed one may be replaced
/// by a later confirmed one.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialClassification {
    pub accession: String,
    pub material: MaterialType,
    pub label: OntologyLabel,
    pub confirmed: bool,
    pub source: ClassificationSource,
}

impl MaterialClassification {
    /// A sample whose registry fetch failed cannot be attributed to any
    /// downstream entity.
    pub fn usable(&self) -> bool {
        !matches!(self.source, ClassificationSource::FetchError { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Standard {
    #[serde(rename = "FAANG")]
    Faang,
    #[serde(rename = "Legacy")]
    Legacy,
}

impl Standard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Standard::Faang => "FAANG",
            Standard::Legacy => "Legacy",
        }
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named bundle of validation rules understood by the validator service.
/// Order in a ruleset list is the acceptance priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ruleset {
    FaangExperiments,
    FaangLegacyExperiments,
}

impl Ruleset {
    pub fn label(&self) -> &'static str {
        match self {
            Ruleset::FaangExperiments => "FAANG Experiments",
            Ruleset::FaangLegacyExperiments => "FAANG Legacy Experiments",
        }
    }

    pub fn standard(&self) -> Standard {
        match self {
            Ruleset::FaangExperiments => Standard::Faang,
            Ruleset::FaangLegacyExperiments => Standard::Legacy,
        }
    }

    pub fn from_label(value: &str) -> Result<Self, IngestError> {
        match value.trim() {
            "FAANG Experiments" => Ok(Ruleset::FaangExperiments),
            "FAANG Legacy Experiments" => Ok(Ruleset::FaangLegacyExperiments),
            other => Err(IngestError::InvalidRuleset(other.to_string())),
        }
    }
}

/// Archive hosting a downloadable file. Variant order matches the
/// lexicographic order of the archive names so sorted sets serialize the
/// same way the portal sorts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Archive {
    #[serde(rename = "CRAM")]
    Cram,
    #[serde(rename = "ENA")]
    Ena,
    #[serde(rename = "SRA")]
    Sra,
}

impl Archive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Archive::Cram => "CRAM",
            Archive::Ena => "ENA",
            Archive::Sra => "SRA",
        }
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_biosample_id_valid() {
        let id: BiosampleId = " SAMEA104728877 ".parse().unwrap();
        assert_eq!(id.as_str(), "SAMEA104728877");
        assert!(id.is_ebi());

        let ncbi: BiosampleId = "SAMN02436846".parse().unwrap();
        assert!(!ncbi.is_ebi());
    }

    #[test]
    fn parse_biosample_id_invalid() {
        let err = "ERS123456".parse::<BiosampleId>().unwrap_err();
        assert_matches!(err, IngestError::InvalidBiosampleId(_));

        let err = "SAMEA 123".parse::<BiosampleId>().unwrap_err();
        assert_matches!(err, IngestError::InvalidBiosampleId(_));
    }

    #[test]
    fn material_from_label() {
        assert_eq!(MaterialType::from_label("organism"), MaterialType::Organism);
        assert_eq!(
            MaterialType::from_label("Specimen from Organism"),
            MaterialType::SpecimenFromOrganism
        );
        assert_eq!(
            MaterialType::from_label("cell culture"),
            MaterialType::SpecimenDerived
        );
        assert_eq!(
            MaterialType::from_label("pool of specimens"),
            MaterialType::Unknown
        );
    }

    #[test]
    fn ruleset_standard_mapping() {
        assert_eq!(Ruleset::FaangExperiments.standard(), Standard::Faang);
        assert_eq!(Ruleset::FaangLegacyExperiments.standard(), Standard::Legacy);
        assert_matches!(
            Ruleset::from_label("FAANG Samples"),
            Err(IngestError::InvalidRuleset(_))
        );
    }

    #[test]
    fn archive_sort_order() {
        let mut archives = vec![Archive::Sra, Archive::Cram, Archive::Ena];
        archives.sort();
        assert_eq!(archives, vec![Archive::Cram, Archive::Ena, Archive::Sra]);
    }
}
