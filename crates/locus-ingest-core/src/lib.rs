pub mod dispatch;
pub mod entity;
pub mod report;
pub mod source;
pub mod timestamp;

use crate::dispatch::{BatchDispatcher, ChunkFailure, ChunkReport, DispatchSettings};
use crate::entity::{BuildOutcome, EntityBuilder};
use crate::report::{IngestionReporter, IngestionStats};
use crate::source::SampleRecord;
use crate::timestamp::{TimestampNormalizer, TimezoneMode};
use locus_backend::{ChunkResult, EntityTransport, NormalizedEntity};
use locus_config::AppConfig;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingest settings: {0}")]
    InvalidSettings(String),
    /// A chunk failed under the abort policy. `stats` covers only chunks sent before it.
    #[error("ingest run aborted: {failure}")]
    Aborted {
        stats: IngestionStats,
        #[source]
        failure: ChunkFailure,
    },
}

impl IngestError {
    pub fn partial_stats(&self) -> Option<&IngestionStats> {
        match self {
            Self::Aborted { stats, .. } => Some(stats),
            Self::InvalidSettings(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    builder: EntityBuilder,
    settings: DispatchSettings,
}

impl Ingestor {
    pub fn new(builder: EntityBuilder, settings: DispatchSettings) -> Self {
        Self { builder, settings }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, IngestError> {
        let mode = TimezoneMode::from_offset(cfg.ingest.assumed_utc_offset.as_deref())
            .map_err(|exc| IngestError::InvalidSettings(exc.to_string()))?;
        let settings = DispatchSettings::from_config(cfg).map_err(|exc| {
            IngestError::InvalidSettings(format!("backend.dispatch_timeout_seconds: {exc}"))
        })?;
        let builder = EntityBuilder::from_config(&cfg.ingest, TimestampNormalizer::new(mode));
        Ok(Self::new(builder, settings))
    }

    pub fn builder(&self) -> &EntityBuilder {
        &self.builder
    }

    /// Builds one record, counting skips and build errors. Returns the entity if one was built.
    fn admit(
        &self,
        index: usize,
        record: SampleRecord,
        reporter: &mut IngestionReporter,
    ) -> Option<NormalizedEntity> {
        let outcome = record.and_then(|sample| self.builder.build(index, &sample));
        match outcome {
            Ok(BuildOutcome::Entity(entity)) => {
                reporter.record_built();
                Some(entity)
            }
            Ok(BuildOutcome::Skip) => {
                reporter.record_skipped();
                None
            }
            Err(exc) => {
                warn!("error building entity: {exc}");
                reporter.record_build_error();
                None
            }
        }
    }
}

fn fold_report(reporter: &mut IngestionReporter, report: Option<ChunkReport>) {
    if let Some(report) = report {
        reporter.fold(report.entities, report.result);
    }
}

/// Batched run: entities are sent in chunks of `chunk_capacity`.
///
/// Under [`ChunkFailurePolicy::Abort`](locus_config::ChunkFailurePolicy::Abort) the first
/// failed chunk ends the run and the error carries the totals gathered so far.
pub async fn ingest_batched<T, I>(
    samples: I,
    ingestor: &Ingestor,
    transport: &T,
) -> Result<IngestionStats, IngestError>
where
    T: EntityTransport + ?Sized,
    I: IntoIterator<Item = SampleRecord>,
{
    let settings = ingestor.settings.clone();
    info!(
        "batched ingest: chunk capacity {}, failure policy {}",
        settings.chunk_capacity,
        settings.policy.as_str()
    );
    let mut reporter = IngestionReporter::new(settings.progress_every_chunks);
    let mut dispatcher = BatchDispatcher::new(transport, settings);

    for (index, record) in samples.into_iter().enumerate() {
        let Some(entity) = ingestor.admit(index, record, &mut reporter) else {
            continue;
        };
        match dispatcher.push(entity).await {
            Ok(report) => fold_report(&mut reporter, report),
            Err(failure) => return Err(abort(reporter, failure)),
        }
    }

    match dispatcher.finish().await {
        Ok(report) => fold_report(&mut reporter, report),
        Err(failure) => return Err(abort(reporter, failure)),
    }

    Ok(reporter.finish(true))
}

fn abort(reporter: IngestionReporter, failure: ChunkFailure) -> IngestError {
    let stats = reporter.finish(false);
    IngestError::Aborted { stats, failure }
}

/// Single-item run: every entity is its own request and a failed request is counted, not fatal.
pub async fn ingest_single<T, I>(samples: I, ingestor: &Ingestor, transport: &T) -> IngestionStats
where
    T: EntityTransport + ?Sized,
    I: IntoIterator<Item = SampleRecord>,
{
    let mut reporter = IngestionReporter::new(ingestor.settings.progress_every_chunks);
    let dispatcher = BatchDispatcher::new(transport, ingestor.settings.clone());

    for (index, record) in samples.into_iter().enumerate() {
        let Some(entity) = ingestor.admit(index, record, &mut reporter) else {
            continue;
        };
        let result = match dispatcher.submit_one(&entity).await {
            Ok(result) => result,
            Err(exc) => {
                warn!(
                    "failed to upsert entity {}/{}: {exc}",
                    entity.source, entity.external_id
                );
                ChunkResult::one_error()
            }
        };
        reporter.fold(1, result);
    }

    reporter.finish(true)
}
