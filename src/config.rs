use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Ruleset;
use crate::error::IngestError;

pub const DEFAULT_CONFIG_FILE: &str = "faang-ingest.json";
pub const DEFAULT_ES_HOST: &str = "localhost:9200";
pub const DEFAULT_VALIDATOR_URL: &str = "http://localhost:8000/validate";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub es_host: Option<String>,
    #[serde(default)]
    pub index_prefix: Option<String>,
    #[serde(default)]
    pub validator_url: Option<String>,
    #[serde(default)]
    pub rulesets: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub es_host: String,
    pub index_prefix: String,
    pub validator_url: String,
    pub rulesets: Vec<Ruleset>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file when one is given or the default file exists;
    /// everything is optional and falls back to defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let rulesets = match config.rulesets {
            Some(labels) => labels
                .iter()
                .map(|label| Ruleset::from_label(label))
                .collect::<Result<Vec<_>, IngestError>>()?,
            None => default_rulesets(),
        };
        Ok(ResolvedConfig {
            es_host: config.es_host.unwrap_or_else(|| DEFAULT_ES_HOST.to_string()),
            index_prefix: config.index_prefix.unwrap_or_default(),
            validator_url: config
                .validator_url
                .unwrap_or_else(|| DEFAULT_VALIDATOR_URL.to_string()),
            rulesets,
        })
    }
}

/// Acceptance priority: the full standard is tried before the legacy one.
pub fn default_rulesets() -> Vec<Ruleset> {
    vec![Ruleset::FaangExperiments, Ruleset::FaangLegacyExperiments]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resolve_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.es_host, DEFAULT_ES_HOST);
        assert_eq!(resolved.index_prefix, "");
        assert_eq!(resolved.rulesets, default_rulesets());
    }

    #[test]
    fn resolve_explicit_rulesets() {
        let config = Config {
            rulesets: Some(vec!["FAANG Legacy Experiments".to_string()]),
            index_prefix: Some("faang_build_1_".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.rulesets, vec![Ruleset::FaangLegacyExperiments]);
        assert_eq!(resolved.index_prefix, "faang_build_1_");
    }

    #[test]
    fn reject_unknown_ruleset() {
        let config = Config {
            rulesets: Some(vec!["FAANG Samples".to_string()]),
            ..Config::default()
        };
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, IngestError::InvalidRuleset(_));
    }
}
