//! Lookup tables for the assay vocabulary observed in ENA submissions and
//! the species imported into the portal.

/// The species the portal covers, keyed by NCBI taxonomy id.
pub const SPECIES: &[(&str, &str)] = &[
    ("9031", "Gallus gallus"),
    ("9913", "Bos taurus"),
    ("9823", "Sus scrofa"),
    ("9940", "Ovis aries"),
    ("9796", "Equus caballus"),
    ("9925", "Capra hircus"),
];

/// Submitter terms for library strategies, normalized onto one category per
/// technology. Different submitting centers use different spellings for the
/// same assay.
const LIBRARY_STRATEGIES: &[(&str, &str)] = &[
    ("Whole genome sequence", "WGS"),
    ("whole genome sequencing", "WGS"),
    ("WGS", "WGS"),
    ("Whole Genome Shotgun Sequence", "WGS"),
    ("ChIP-Seq", "ChIP-Seq"),
    ("ChIP-seq", "ChIP-Seq"),
    ("ChIP-seq Histones", "ChIP-Seq"),
    ("Hi-C", "Hi-C"),
    ("ATAC-seq", "ATAC-seq"),
    ("RNA-Seq", "RNA-Seq"),
    ("RNA seq", "RNA-Seq"),
    ("miRNA-Seq", "RNA-Seq"),
    ("ssRNA-seq", "RNA-Seq"),
    ("strand-specific RNA sequencing", "RNA-Seq"),
    ("Transcriptome profiling", "RNA-Seq"),
    ("RNA sequencing", "RNA-Seq"),
    ("Bisulfite-Seq", "BS-Seq"),
    ("Bisulfite Sequencing", "BS-Seq"),
    ("BS-Seq", "BS-Seq"),
    ("Whole Genome Bisulfite Sequencing", "BS-Seq"),
    ("WGBS", "BS-Seq"),
    ("Reduced Representation Bisulfite Sequencing", "BS-Seq"),
    ("RRBS", "BS-Seq"),
    ("DNase", "DNase"),
    ("MiSeq", "Other"),
    ("GeneChip", "Other"),
    ("MeDIP-Seq", "Other"),
    ("MeDIP", "Other"),
    ("methylated DNA immunoprecipitation-sequencing", "Other"),
    ("RIP-Seq", "Other"),
];

/// Categories imported into the portal and their assay type ontology labels.
const ASSAY_TYPES: &[(&str, &str)] = &[
    ("ATAC-seq", "ATAC-seq"),
    ("BS-Seq", "methylation profiling by high throughput sequencing"),
    ("Hi-C", "Hi-C"),
    ("DNase", "DNase-Hypersensitivity seq"),
    ("WGS", "whole genome sequencing assay"),
    ("ChIP-Seq", "ChIP-seq"),
];

const EXPERIMENT_TARGETS: &[(&str, &str)] = &[
    ("ATAC-seq", "open_chromatin_region"),
    ("BS-Seq", "DNA methylation"),
    ("Hi-C", "chromatin"),
    ("DNase", "open_chromatin_region"),
    ("RNA-Seq", "Unknown "),
    ("WGS", "input DNA"),
    ("ChIP-Seq", "Unknown"),
];

/// Technology names shown in the portal, keyed by assay type.
const TECHNOLOGIES: &[(&str, &str)] = &[
    ("ATAC-seq", "ATAC-Seq"),
    ("methylation profiling by high throughput sequencing", "BS-Seq"),
    ("Hi-C", "Hi-C"),
    ("DNase-Hypersensitivity seq", "DNase-Seq"),
    ("whole genome sequencing assay", "WGS"),
    ("ChIP-seq", "ChIP-Seq"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, value)| *value)
}

pub fn species_name(tax_id: &str) -> Option<&'static str> {
    lookup(SPECIES, tax_id)
}

pub fn taxonomy_ids() -> Vec<&'static str> {
    SPECIES.iter().map(|(tax_id, _)| *tax_id).collect()
}

/// Normalizes a submitter library-strategy term onto its category.
pub fn normalize_library_strategy(term: &str) -> Option<&'static str> {
    lookup(LIBRARY_STRATEGIES, term)
}

pub fn assay_type(category: &str) -> Option<&'static str> {
    lookup(ASSAY_TYPES, category)
}

pub fn experiment_target(category: &str) -> Option<&'static str> {
    lookup(EXPERIMENT_TARGETS, category)
}

pub fn technology(assay_type: &str) -> Option<&'static str> {
    lookup(TECHNOLOGIES, assay_type)
}

/// Submitter terms whose category is imported into the portal, in table
/// order. One ENA query is issued per term.
pub fn import_terms() -> Vec<&'static str> {
    LIBRARY_STRATEGIES
        .iter()
        .filter(|(_, category)| assay_type(category).is_some())
        .map(|(term, _)| *term)
        .collect()
}
