use locus_backend::{
    ChunkResult, EntityTransport, NormalizedEntity, TransportError, TransportResult,
};
use locus_config::{AppConfig, ChunkFailurePolicy};
use std::future::Future;
use std::time::{Duration, Instant, TryFromFloatSecsError};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub chunk_capacity: usize,
    pub call_timeout: Duration,
    pub policy: ChunkFailurePolicy,
    pub progress_every_chunks: usize,
}

impl DispatchSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, TryFromFloatSecsError> {
        let call_timeout =
            Duration::try_from_secs_f64(cfg.backend.dispatch_timeout_seconds.max(0.001))?;
        Ok(Self {
            chunk_capacity: cfg.ingest.effective_batch_size(),
            call_timeout,
            policy: cfg.ingest.chunk_failure_policy,
            progress_every_chunks: cfg.ingest.progress_every_chunks,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReport {
    pub index: usize,
    pub entities: usize,
    pub result: ChunkResult,
    /// The chunk request failed and its entities were resubmitted one by one.
    pub isolated: bool,
}

#[derive(Debug, Clone, Error)]
#[error("chunk {chunk} ({entities} entities) failed: {source}")]
pub struct ChunkFailure {
    pub chunk: usize,
    pub entities: usize,
    pub source: TransportError,
}

async fn with_deadline<F, T>(limit: Duration, call: F) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            seconds: limit.as_secs_f64(),
        }),
    }
}

/// Buffers built entities and sends them as bounded, atomic chunks.
///
/// Calls are strictly sequential: one request in flight at most.
pub struct BatchDispatcher<'a, T: EntityTransport + ?Sized> {
    transport: &'a T,
    settings: DispatchSettings,
    buffer: Vec<NormalizedEntity>,
    chunks_sent: usize,
}

impl<'a, T: EntityTransport + ?Sized> BatchDispatcher<'a, T> {
    pub fn new(transport: &'a T, mut settings: DispatchSettings) -> Self {
        settings.chunk_capacity = settings.chunk_capacity.max(1);
        Self {
            transport,
            buffer: Vec::with_capacity(settings.chunk_capacity),
            settings,
            chunks_sent: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends one entity, flushing when the buffer reaches capacity.
    pub async fn push(
        &mut self,
        entity: NormalizedEntity,
    ) -> Result<Option<ChunkReport>, ChunkFailure> {
        self.buffer.push(entity);
        if self.buffer.len() >= self.settings.chunk_capacity {
            return self.flush().await;
        }
        Ok(None)
    }

    /// Sends whatever is left, even a short chunk.
    pub async fn finish(&mut self) -> Result<Option<ChunkReport>, ChunkFailure> {
        self.flush().await
    }

    /// Pushes every entity then flushes the remainder; stops at the first failed chunk.
    pub async fn submit<I>(&mut self, entities: I) -> Result<Vec<ChunkReport>, ChunkFailure>
    where
        I: IntoIterator<Item = NormalizedEntity>,
    {
        let mut reports = Vec::new();
        for entity in entities {
            if let Some(report) = self.push(entity).await? {
                reports.push(report);
            }
        }
        if let Some(report) = self.finish().await? {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Single-item path: one entity, one request.
    pub async fn submit_one(&self, entity: &NormalizedEntity) -> TransportResult<ChunkResult> {
        let response =
            with_deadline(self.settings.call_timeout, self.transport.upsert_entity(entity)).await?;
        Ok(ChunkResult::from(&response))
    }

    async fn flush(&mut self) -> Result<Option<ChunkReport>, ChunkFailure> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let chunk = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.settings.chunk_capacity),
        );
        let index = self.chunks_sent;
        self.chunks_sent += 1;

        let started = Instant::now();
        let outcome =
            with_deadline(self.settings.call_timeout, self.transport.upsert_batch(&chunk)).await;

        match outcome {
            Ok(result) => {
                debug!(
                    "chunk {} sent: {} entities in {} ms",
                    index,
                    chunk.len(),
                    started.elapsed().as_millis()
                );
                if result.total() != chunk.len() as u64 {
                    warn!(
                        "chunk {} result does not match its size: {} entities, {} inserted, {} updated, {} errors",
                        index,
                        chunk.len(),
                        result.inserted,
                        result.updated,
                        result.errors
                    );
                }
                Ok(Some(ChunkReport {
                    index,
                    entities: chunk.len(),
                    result,
                    isolated: false,
                }))
            }
            Err(source) => match self.settings.policy {
                ChunkFailurePolicy::Abort => Err(ChunkFailure {
                    chunk: index,
                    entities: chunk.len(),
                    source,
                }),
                ChunkFailurePolicy::Isolate => {
                    warn!(
                        "chunk {} ({} entities) failed: {}; resubmitting one by one",
                        index,
                        chunk.len(),
                        source
                    );
                    let result = self.isolate(&chunk).await;
                    Ok(Some(ChunkReport {
                        index,
                        entities: chunk.len(),
                        result,
                        isolated: true,
                    }))
                }
            },
        }
    }

    async fn isolate(&self, chunk: &[NormalizedEntity]) -> ChunkResult {
        let mut total = ChunkResult::default();
        for entity in chunk {
            match self.submit_one(entity).await {
                Ok(result) => total.add(result),
                Err(exc) => {
                    warn!(
                        "entity {}/{} failed: {exc}",
                        entity.source, entity.external_id
                    );
                    total.add(ChunkResult::one_error());
                }
            }
        }
        total
    }
}
