use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::json;

use crate::documents::ExperimentDocument;
use crate::domain::Ruleset;
use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationOutcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub message: String,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            status: OutcomeStatus::Ok,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: message.into(),
        }
    }
}

/// Per-ruleset, per-experiment verdicts for one validation round.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    details: BTreeMap<Ruleset, BTreeMap<String, ValidationOutcome>>,
}

impl ValidationReport {
    pub fn record(&mut self, ruleset: Ruleset, accession: impl Into<String>, outcome: ValidationOutcome) {
        self.details
            .entry(ruleset)
            .or_default()
            .insert(accession.into(), outcome);
    }

    pub fn outcome(&self, ruleset: Ruleset, accession: &str) -> Option<&ValidationOutcome> {
        self.details
            .get(&ruleset)
            .and_then(|detail| detail.get(accession))
    }

    pub fn passes(&self, ruleset: Ruleset, accession: &str) -> bool {
        matches!(
            self.outcome(ruleset, accession),
            Some(outcome) if outcome.status == OutcomeStatus::Ok
        )
    }
}

/// The rule semantics live entirely in the validation service; the import
/// only consumes its verdicts.
pub trait ValidatorClient: Send + Sync {
    fn validate(
        &self,
        experiments: &BTreeMap<String, ExperimentDocument>,
        rulesets: &[Ruleset],
    ) -> Result<ValidationReport, IngestError>;
}

#[derive(Clone)]
pub struct ValidatorHttpClient {
    client: Client,
    base_url: String,
}

impl ValidatorHttpClient {
    pub fn new(base_url: &str) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("faang-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    detail: BTreeMap<String, ValidationOutcome>,
}

impl ValidatorClient for ValidatorHttpClient {
    fn validate(
        &self,
        experiments: &BTreeMap<String, ExperimentDocument>,
        rulesets: &[Ruleset],
    ) -> Result<ValidationReport, IngestError> {
        let mut report = ValidationReport::default();
        for ruleset in rulesets {
            let body = json!({
                "ruleset": ruleset.label(),
                "experiments": experiments,
            });
            let response = self
                .client
                .post(&self.base_url)
                .json(&body)
                .send()
                .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .unwrap_or_else(|_| "validation request failed".to_string());
                return Err(IngestError::ValidatorStatus { status, message });
            }
            let parsed: ValidateResponse = response
                .json()
                .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?;
            for (accession, outcome) in parsed.detail {
                report.record(*ruleset, accession, outcome);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lookup() {
        let mut report = ValidationReport::default();
        report.record(
            Ruleset::FaangLegacyExperiments,
            "ERX1",
            ValidationOutcome::ok(),
        );
        report.record(
            Ruleset::FaangExperiments,
            "ERX1",
            ValidationOutcome::error("missing assay section"),
        );
        assert!(report.passes(Ruleset::FaangLegacyExperiments, "ERX1"));
        assert!(!report.passes(Ruleset::FaangExperiments, "ERX1"));
        assert!(!report.passes(Ruleset::FaangLegacyExperiments, "ERX2"));
    }

    #[test]
    fn parse_outcome_status() {
        let outcome: ValidationOutcome =
            serde_json::from_str(r#"{"status": "error", "message": "bad"}"#).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Error);
        let outcome: ValidationOutcome = serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Ok);
        assert!(outcome.message.is_empty());
    }
}
