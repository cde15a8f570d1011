use clap::{Parser, ValueEnum};
use locus_config::{AppConfig, ChunkFailurePolicy};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Chunked requests to the batch endpoint.
    Batch,
    /// One request per entity; failures are counted and skipped.
    Single,
}

fn parse_policy(raw: &str) -> Result<ChunkFailurePolicy, String> {
    ChunkFailurePolicy::parse(raw).map_err(|err| err.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "locus-ingest",
    about = "Upload location samples to the spatiotemporal entity store"
)]
pub struct CliArgs {
    /// Sample file: `.jsonl`/`.ndjson` (one sample per line) or a JSON array.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = RunMode::Batch)]
    pub mode: RunMode,
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,
    #[arg(long, value_name = "NAME")]
    pub source: Option<String>,
    /// `abort` or `isolate`.
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub policy: Option<ChunkFailurePolicy>,
    #[arg(long, value_name = "URL")]
    pub backend_url: Option<String>,
    #[arg(long, value_name = "PATH")]
    pub credentials: Option<PathBuf>,
    /// Print the final stats as JSON instead of the text block.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl CliArgs {
    /// Command-line values win over the config file.
    pub fn apply_overrides(&self, cfg: &mut AppConfig) -> Result<(), String> {
        if let Some(batch_size) = self.batch_size {
            if batch_size == 0 || batch_size > cfg.ingest.max_batch_size {
                return Err(format!(
                    "--batch-size must be between 1 and {}",
                    cfg.ingest.max_batch_size
                ));
            }
            cfg.ingest.batch_size = batch_size;
        }
        if let Some(source) = &self.source {
            if source.trim().is_empty() {
                return Err("--source must not be empty".to_string());
            }
            cfg.ingest.source = source.clone();
        }
        if let Some(policy) = self.policy {
            cfg.ingest.chunk_failure_policy = policy;
        }
        if let Some(url) = &self.backend_url {
            cfg.backend.url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = &self.credentials {
            cfg.backend.credentials_file = path.to_string_lossy().to_string();
        }
        Ok(())
    }
}
