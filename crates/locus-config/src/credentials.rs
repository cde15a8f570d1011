use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const API_KEY_VAR: &str = "API_KEY";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file not found: {}", path.display())]
    FileNotFound { path: PathBuf },
    #[error("failed to read credential file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("API_KEY not found in credential file {}", path.display())]
    KeyMissing { path: PathBuf },
}

/// Backend credential, loaded once at startup and shared read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

fn trim_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=` are skipped;
/// later duplicates win.
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        env.insert(key.to_string(), trim_quotes(value.trim()).to_string());
    }
    env
}

pub fn load_api_key(path: impl AsRef<Path>) -> Result<ApiKey, CredentialError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CredentialError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_env_file(&content)
        .remove(API_KEY_VAR)
        .filter(|value| !value.is_empty())
        .map(ApiKey::new)
        .ok_or_else(|| CredentialError::KeyMissing {
            path: path.to_path_buf(),
        })
}
