use locus_backend::ChunkResult;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Running totals for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    pub built: u64,
    pub skipped: u64,
    pub build_errors: u64,
    pub inserted: u64,
    pub updated: u64,
    pub dispatch_errors: u64,
    /// Entities belonging to chunks that have already been sent.
    pub flushed: u64,
    pub chunks: u64,
}

impl IngestionStats {
    pub fn processed(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn reconciles(&self) -> bool {
        self.built == self.flushed
            && self.flushed == self.inserted + self.updated + self.dispatch_errors
    }
}

impl fmt::Display for IngestionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final stats:")?;
        writeln!(f, "  Inserted: {}", self.inserted)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Build errors: {}", self.build_errors)?;
        writeln!(f, "  Dispatch errors: {}", self.dispatch_errors)?;
        writeln!(f, "  Skipped (no location): {}", self.skipped)?;
        write!(f, "  Total processed: {}", self.processed())
    }
}

#[derive(Debug)]
pub struct IngestionReporter {
    stats: IngestionStats,
    progress_every_chunks: u64,
}

impl Default for IngestionReporter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IngestionReporter {
    pub fn new(progress_every_chunks: usize) -> Self {
        Self {
            stats: IngestionStats::default(),
            progress_every_chunks: progress_every_chunks.max(1) as u64,
        }
    }

    pub fn record_built(&mut self) {
        self.stats.built += 1;
    }

    pub fn record_skipped(&mut self) {
        self.stats.skipped += 1;
    }

    pub fn record_build_error(&mut self) {
        self.stats.build_errors += 1;
    }

    /// Adds one flushed chunk. Must be called in flush order.
    pub fn fold(&mut self, entities: usize, result: ChunkResult) -> &IngestionStats {
        self.stats.inserted += result.inserted;
        self.stats.updated += result.updated;
        self.stats.dispatch_errors += result.errors;
        self.stats.flushed += entities as u64;
        self.stats.chunks += 1;

        if self.stats.chunks % self.progress_every_chunks == 0 {
            self.log_progress();
        }
        &self.stats
    }

    /// `(processed, flushed)`; entities still buffered are not counted in either.
    pub fn progress(&self) -> (u64, u64) {
        (
            self.stats.processed() + self.stats.dispatch_errors,
            self.stats.flushed,
        )
    }

    fn log_progress(&self) {
        let (processed, flushed) = self.progress();
        info!(
            "processed {}/{}: {} inserted, {} updated, {} errors",
            processed, flushed, self.stats.inserted, self.stats.updated, self.stats.dispatch_errors
        );
    }

    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    pub fn summary(&self) -> String {
        self.stats.to_string()
    }

    /// Logs the final block and hands back the totals.
    pub fn finish(self, completed: bool) -> IngestionStats {
        let stats = self.stats;
        info!(
            inserted = stats.inserted,
            updated = stats.updated,
            build_errors = stats.build_errors,
            dispatch_errors = stats.dispatch_errors,
            skipped = stats.skipped,
            processed = stats.processed(),
            "ingest {}",
            if completed { "finished" } else { "aborted" }
        );
        if completed && !stats.reconciles() {
            warn!(
                "ingest counters do not reconcile: built={} flushed={} inserted={} updated={} dispatch_errors={}",
                stats.built, stats.flushed, stats.inserted, stats.updated, stats.dispatch_errors
            );
        }
        stats
    }
}
