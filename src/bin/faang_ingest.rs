use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use faang_ingest::app::ImportApp;
use faang_ingest::biosamples::BiosamplesHttpClient;
use faang_ingest::config::ConfigLoader;
use faang_ingest::ena::EnaHttpClient;
use faang_ingest::error::IngestError;
use faang_ingest::store::EsHttpStore;
use faang_ingest::validator::ValidatorHttpClient;

#[derive(Parser)]
#[command(name = "faang-ingest")]
#[command(about = "Import non-curated ENA runs and their BioSamples records into the data portal")]
#[command(version, author)]
struct Cli {
    /// JSON config file; faang-ingest.json is picked up when present.
    #[arg(long)]
    config: Option<String>,

    /// Document store host, e.g. wp-np3-e2:9200.
    #[arg(long)]
    es_host: Option<String>,

    /// Index prefix, e.g. faang_build_1_; bare aliases when omitted.
    #[arg(long)]
    index_prefix: Option<String>,

    /// Metadata validation service endpoint.
    #[arg(long)]
    validator_url: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(ingest) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(ingest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::InvalidRuleset(_) => 2,
        IngestError::BiosamplesHttp(_)
        | IngestError::BiosamplesStatus { .. }
        | IngestError::EnaHttp(_)
        | IngestError::EnaStatus { .. }
        | IngestError::StoreHttp(_)
        | IngestError::StoreStatus { .. }
        | IngestError::ValidatorHttp(_)
        | IngestError::ValidatorStatus { .. } => 3,
        IngestError::NoSampleRecords | IngestError::NoDatasets => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    if let Some(es_host) = cli.es_host {
        config.es_host = es_host;
    }
    if let Some(index_prefix) = cli.index_prefix {
        config.index_prefix = index_prefix;
    }
    if let Some(validator_url) = cli.validator_url {
        config.validator_url = validator_url;
    }

    let biosamples = BiosamplesHttpClient::new().into_diagnostic()?;
    let ena = EnaHttpClient::new().into_diagnostic()?;
    let store = EsHttpStore::new(&config.es_host, &config.index_prefix).into_diagnostic()?;
    let validator = ValidatorHttpClient::new(&config.validator_url).into_diagnostic()?;

    let mut app = ImportApp::new(biosamples, ena, store, validator, config.rulesets.clone());
    let report = app.run().into_diagnostic()?;

    let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
