use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LOCATION_ENTITY_TYPE: &str = "location.gps";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub original_data: Value,
}

/// Entity record accepted by `/v1/entity` and `/v1/entities/batch`.
///
/// `(source, external_id)` is the upsert key on the backend side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub t_start: String,
    pub t_end: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
    pub color: String,
    pub render_offset: Option<f64>,
    pub source: String,
    pub external_id: String,
    pub payload: EntityPayload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub inserted: u64,
    pub updated: u64,
    pub errors: u64,
}

impl ChunkResult {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.errors
    }

    pub fn add(&mut self, other: ChunkResult) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.errors += other.errors;
    }

    pub fn one_error() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub id: Value,
    pub status: UpsertStatus,
}

impl From<&UpsertResponse> for ChunkResult {
    fn from(response: &UpsertResponse) -> Self {
        match response.status {
            UpsertStatus::Inserted => ChunkResult {
                inserted: 1,
                ..ChunkResult::default()
            },
            UpsertStatus::Updated => ChunkResult {
                updated: 1,
                ..ChunkResult::default()
            },
        }
    }
}
