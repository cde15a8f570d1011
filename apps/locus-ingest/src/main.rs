mod cli;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use locus_backend::BackendClient;
use locus_config::{load_api_key, AppConfig};
use locus_ingest_core::report::IngestionStats;
use locus_ingest_core::source::read_samples;
use locus_ingest_core::{ingest_batched, ingest_single, Ingestor};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, RunMode};

fn load_app_config(args: &CliArgs) -> Result<AppConfig> {
    let path = locus_config::resolve_config_path(args.config.clone());
    let mut config = if args.config.is_some() || path.exists() {
        locus_config::load_config(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?
    } else {
        info!("no config file at {}; using defaults", path.display());
        AppConfig::default()
    };
    args.apply_overrides(&mut config).map_err(|err| anyhow!(err))?;
    config.backend.credentials_file = locus_config::expand_path(&config.backend.credentials_file);
    Ok(config)
}

fn print_stats(stats: &IngestionStats, as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(stats).context("failed to encode stats")?
        );
    } else {
        println!("\n{stats}");
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_app_config(&args)?;

    let api_key = load_api_key(&config.backend.credentials_file)?;
    let ingestor = Ingestor::from_config(&config)?;
    let client = BackendClient::new(config.backend.clone(), api_key)?;

    let samples = read_samples(&args.input)?;
    info!(
        "loaded {} samples from {}; sending to {} as source={}",
        samples.len(),
        args.input.display(),
        config.backend.url,
        ingestor.builder().source()
    );

    let stats = match args.mode {
        RunMode::Batch => match ingest_batched(samples, &ingestor, &client).await {
            Ok(stats) => stats,
            Err(err) => {
                if let Some(stats) = err.partial_stats() {
                    print_stats(stats, args.json)?;
                }
                return Err(err.into());
            }
        },
        RunMode::Single => ingest_single(samples, &ingestor, &client).await,
    };

    print_stats(&stats, args.json)
}
