mod credentials;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use credentials::{load_api_key, parse_env_file, ApiKey, CredentialError, API_KEY_VAR};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: f64,
}

/// What the batched driver does when a whole chunk request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkFailurePolicy {
    /// Stop the run at the first failed chunk.
    #[default]
    Abort,
    /// Resubmit the failed chunk one entity at a time and keep going.
    Isolate,
}

impl ChunkFailurePolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "isolate" => Ok(Self::Isolate),
            _ => bail!(
                "unsupported chunk failure policy `{}`; expected one of: abort, isolate",
                raw.trim()
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Isolate => "isolate",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_progress_every_chunks")]
    pub progress_every_chunks: usize,
    #[serde(default)]
    pub chunk_failure_policy: ChunkFailurePolicy,
    #[serde(default)]
    pub assumed_utc_offset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            credentials_file: default_credentials_file(),
            timeout_seconds: default_timeout_seconds(),
            dispatch_timeout_seconds: default_dispatch_timeout_seconds(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            source: default_source(),
            color: default_color(),
            name: None,
            progress_every_chunks: default_progress_every_chunks(),
            chunk_failure_policy: ChunkFailurePolicy::default(),
            assumed_utc_offset: None,
        }
    }
}

impl IngestConfig {
    /// Chunk capacity actually used by the dispatcher, clamped to `1..=max_batch_size`.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, self.max_batch_size.max(1))
    }
}

/// Upper bound for both backend timeouts: one day.
pub const MAX_TIMEOUT_SECONDS: f64 = 86_400.0;

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_credentials_file() -> String {
    "~/.locus/.env".to_string()
}

fn default_timeout_seconds() -> f64 {
    30.0
}

fn default_dispatch_timeout_seconds() -> f64 {
    60.0
}

fn default_batch_size() -> usize {
    500
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_source() -> String {
    "location_parser".to_string()
}

fn default_color() -> String {
    "#FF0000".to_string()
}

fn default_progress_every_chunks() -> usize {
    1
}

pub fn expand_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{}", home.to_string_lossy(), stripped);
        }
    }
    path.to_string()
}

fn home_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".locus").join("config.toml"))
}

fn repo_default_config_path() -> PathBuf {
    PathBuf::from("config/locus.toml")
}

fn resolve_config_path_with_overrides(
    raw_path: Option<PathBuf>,
    env_keys: &[&str],
    home_path: Option<PathBuf>,
    repo_default: PathBuf,
) -> PathBuf {
    if let Some(path) = raw_path {
        return path;
    }

    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
    }

    if let Some(path) = home_path {
        if path.exists() {
            return path;
        }
    }

    if repo_default.exists() {
        return repo_default;
    }

    home_config_path().unwrap_or(repo_default)
}

pub fn resolve_config_path(raw_path: Option<PathBuf>) -> PathBuf {
    resolve_config_path_with_overrides(
        raw_path,
        &["LOCUS_CONFIG"],
        home_config_path(),
        repo_default_config_path(),
    )
}

fn normalize_config(mut cfg: AppConfig) -> AppConfig {
    cfg.backend.credentials_file = expand_path(&cfg.backend.credentials_file);
    cfg.backend.url = cfg.backend.url.trim_end_matches('/').to_string();
    cfg.backend.timeout_seconds = cfg.backend.timeout_seconds.max(1.0);
    cfg.ingest.progress_every_chunks = cfg.ingest.progress_every_chunks.max(1);
    cfg.ingest.assumed_utc_offset = cfg
        .ingest
        .assumed_utc_offset
        .take()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    cfg
}

fn validate_config(cfg: &AppConfig) -> Result<()> {
    if cfg.backend.url.is_empty() {
        bail!("backend.url must not be empty");
    }
    if cfg.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be at least 1");
    }
    if cfg.ingest.batch_size > cfg.ingest.max_batch_size {
        bail!(
            "ingest.batch_size {} exceeds ingest.max_batch_size {}",
            cfg.ingest.batch_size,
            cfg.ingest.max_batch_size
        );
    }
    let dispatch_timeout = cfg.backend.dispatch_timeout_seconds;
    if !dispatch_timeout.is_finite() || dispatch_timeout <= 0.0 {
        bail!("backend.dispatch_timeout_seconds must be a positive number of seconds");
    }
    if dispatch_timeout > MAX_TIMEOUT_SECONDS {
        bail!(
            "backend.dispatch_timeout_seconds {dispatch_timeout} exceeds {MAX_TIMEOUT_SECONDS}"
        );
    }
    let timeout = cfg.backend.timeout_seconds;
    if !timeout.is_finite() || timeout > MAX_TIMEOUT_SECONDS {
        bail!(
            "backend.timeout_seconds must be a finite number of seconds up to {MAX_TIMEOUT_SECONDS}"
        );
    }
    if cfg.ingest.source.trim().is_empty() {
        bail!("ingest.source must not be empty");
    }
    Ok(())
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let cfg: AppConfig = toml::from_str(&content).context("failed to parse TOML config")?;
    let cfg = normalize_config(cfg);
    validate_config(&cfg)?;
    Ok(cfg)
}
