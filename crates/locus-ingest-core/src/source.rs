use crate::entity::{BuildError, BuildErrorKind};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// One input sample, or the reason it could not be decoded.
pub type SampleRecord = Result<Value, BuildError>;

fn is_line_delimited(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("jsonl" | "ndjson")
    )
}

/// Decodes one sample per non-blank line. Bad lines become per-sample errors.
///
/// Sample indices skip blank lines; undecodable samples name their 1-based file line.
pub fn parse_jsonl_samples(content: &str) -> Vec<SampleRecord> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .enumerate()
        .map(|(index, (line_index, line))| {
            serde_json::from_str::<Value>(line).map_err(|exc| {
                BuildError::new(
                    index,
                    BuildErrorKind::Undecodable(format!("line {}: {exc}", line_index + 1)),
                )
            })
        })
        .collect()
}

/// Accepts a top-level array of samples or an object with a `samples` array.
pub fn parse_json_samples(content: &str) -> Result<Vec<SampleRecord>> {
    let document: Value = serde_json::from_str(content).context("invalid JSON sample document")?;
    let samples = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("samples") {
            Some(Value::Array(items)) => items,
            _ => bail!("JSON sample document must be an array or have a `samples` array"),
        },
        _ => bail!("JSON sample document must be an array or have a `samples` array"),
    };
    Ok(samples.into_iter().map(Ok).collect())
}

pub fn read_samples(path: impl AsRef<Path>) -> Result<Vec<SampleRecord>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read samples {}", path.display()))?;

    if is_line_delimited(path) {
        Ok(parse_jsonl_samples(&content))
    } else {
        parse_json_samples(&content)
            .with_context(|| format!("failed to parse samples {}", path.display()))
    }
}
