use crate::timestamp::{TimestampNormalizer, TimestampParseError};
use locus_backend::{EntityPayload, NormalizedEntity, LOCATION_ENTITY_TYPE};
use locus_config::IngestConfig;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildErrorKind {
    #[error("sample is not valid JSON: {0}")]
    Undecodable(String),
    #[error("location must be an object, got {0}")]
    LocationNotObject(&'static str),
    #[error("location.{0} is missing")]
    MissingField(&'static str),
    #[error("location.timestamp must be a string, got {0}")]
    TimestampNotString(&'static str),
    #[error("location.{field} must be a number, got {found}")]
    NonNumericCoordinate {
        field: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Timestamp(#[from] TimestampParseError),
}

/// Per-sample failure. Counted and skipped; never aborts a run.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("sample {index}: {kind}")]
pub struct BuildError {
    pub index: usize,
    pub kind: BuildErrorKind,
}

impl BuildError {
    pub fn new(index: usize, kind: impl Into<BuildErrorKind>) -> Self {
        Self {
            index,
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Entity(NormalizedEntity),
    /// The sample has no `location`; it is left out of the run entirely.
    Skip,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coordinate(location: &Map<String, Value>, field: &'static str) -> Result<f64, BuildErrorKind> {
    match location.get(field) {
        None | Some(Value::Null) => Err(BuildErrorKind::MissingField(field)),
        Some(value) => value.as_f64().ok_or(BuildErrorKind::NonNumericCoordinate {
            field,
            found: json_kind(value),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct EntityBuilder {
    normalizer: TimestampNormalizer,
    source: String,
    color: String,
    name: Option<String>,
}

impl EntityBuilder {
    pub fn new(normalizer: TimestampNormalizer, source: impl Into<String>) -> Self {
        Self {
            normalizer,
            source: source.into(),
            color: "#FF0000".to_string(),
            name: None,
        }
    }

    pub fn from_config(cfg: &IngestConfig, normalizer: TimestampNormalizer) -> Self {
        Self::new(normalizer, cfg.source.clone())
            .with_color(cfg.color.clone())
            .with_name(cfg.name.clone())
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn build(&self, index: usize, sample: &Value) -> Result<BuildOutcome, BuildError> {
        self.build_inner(sample)
            .map_err(|kind| BuildError::new(index, kind))
    }

    fn build_inner(&self, sample: &Value) -> Result<BuildOutcome, BuildErrorKind> {
        let location = match sample.get("location") {
            None | Some(Value::Null) => return Ok(BuildOutcome::Skip),
            Some(Value::Object(location)) => location,
            Some(other) => return Err(BuildErrorKind::LocationNotObject(json_kind(other))),
        };

        let raw_timestamp = match location.get("timestamp") {
            None | Some(Value::Null) => return Err(BuildErrorKind::MissingField("timestamp")),
            Some(Value::String(raw)) => raw,
            Some(other) => return Err(BuildErrorKind::TimestampNotString(json_kind(other))),
        };
        let lat = coordinate(location, "latitude")?;
        let lon = coordinate(location, "longitude")?;
        let t_start = self.normalizer.normalize(raw_timestamp)?;

        Ok(BuildOutcome::Entity(NormalizedEntity {
            entity_type: LOCATION_ENTITY_TYPE.to_string(),
            t_start,
            t_end: None,
            lat,
            lon,
            name: self.name.clone(),
            color: self.color.clone(),
            render_offset: None,
            source: self.source.clone(),
            // The raw string, not t_start: re-ingesting the same sample must hit the same key.
            external_id: raw_timestamp.clone(),
            payload: EntityPayload {
                original_data: sample.clone(),
            },
        }))
    }
}
