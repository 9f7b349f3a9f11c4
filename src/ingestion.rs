//! Ingestion pipeline (C3): External source -> validator -> market-data
//! store, chunked, sub-batched, rate-limited, tolerant of partial failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Instrument, Ohlcv, QualityLevel, TimeRange};
use crate::error::ExternalFetchError;
use crate::source::DataSourceFactory;
use crate::store::MarketDataStore;
use crate::validation::{validate_batch, DEFAULT_JUMP_SANITY_THRESHOLD};

pub const CHUNK_DAYS: i64 = 90;
pub const BATCH_SIZE: usize = 100;
pub const INTERMEDIATE_SAVE: usize = 500;
pub const CHUNK_DELAY_MS: u64 = 250;

/// Tunable knobs for a single ingestion run (§5's application-level
/// backpressure: chunk size, sub-batch size, save cadence, inter-chunk
/// pacing). Defaults to the module constants above; [`Config`](crate::config::Config)
/// overrides them from the process environment.
#[derive(Debug, Clone, Copy)]
pub struct IngestionTuning {
    pub chunk_days: i64,
    pub batch_size: usize,
    pub intermediate_save: usize,
    pub chunk_delay_ms: u64,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            chunk_days: CHUNK_DAYS,
            batch_size: BATCH_SIZE,
            intermediate_save: INTERMEDIATE_SAVE,
            chunk_delay_ms: CHUNK_DELAY_MS,
        }
    }
}

/// A cooperative cancellation signal, checked between chunks and batches.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<std::sync::atomic::AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(std::sync::atomic::Ordering::SeqCst)
    }
}

pub struct IngestionRequest {
    pub instruments: Vec<Instrument>,
    pub range: TimeRange,
    pub source_id: Option<String>,
    pub tuning: IngestionTuning,
}

#[derive(Debug, Clone)]
pub enum InstrumentOutcome {
    Success {
        name: &'static str,
        processed: usize,
        earliest: Option<chrono::DateTime<chrono::Utc>>,
        latest: Option<chrono::DateTime<chrono::Utc>>,
        quality_level: QualityLevel,
    },
    Failure {
        symbol: &'static str,
        name: &'static str,
        reason: String,
    },
    Cancelled {
        symbol: &'static str,
    },
}

pub struct IngestionReport {
    pub execution_id: Uuid,
    pub per_instrument: HashMap<Instrument, InstrumentOutcome>,
}

/// Runs the ingestion pipeline for every requested instrument, bounded to
/// `instruments.len()` concurrent fan-out tasks (§5: one task per
/// instrument; within an instrument, chunks run sequentially).
#[instrument(skip(factory, store, request, cancel))]
pub async fn ingest(
    factory: Arc<DataSourceFactory>,
    store: Arc<dyn MarketDataStore>,
    request: IngestionRequest,
    cancel: CancellationToken,
) -> IngestionReport {
    let execution_id = Uuid::new_v4();
    let source = factory.get(request.source_id.as_deref());
    let semaphore = Arc::new(Semaphore::new(request.instruments.len().max(1)));

    let mut tasks = Vec::new();
    for instrument in request.instruments {
        let source = source.clone();
        let store = store.clone();
        let range = request.range;
        let tuning = request.tuning;
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let source = match source {
                Ok(s) => s,
                Err(e) => {
                    return (
                        instrument,
                        InstrumentOutcome::Failure {
                            symbol: instrument.code(),
                            name: instrument.name(),
                            reason: e.to_string(),
                        },
                    );
                }
            };
            let outcome =
                ingest_one_instrument(source.as_ref(), store.as_ref(), instrument, range, tuning, &cancel).await;
            (instrument, outcome)
        }));
    }

    let mut per_instrument = HashMap::new();
    for t in tasks {
        if let Ok((instrument, outcome)) = t.await {
            per_instrument.insert(instrument, outcome);
        }
    }

    IngestionReport {
        execution_id,
        per_instrument,
    }
}

async fn ingest_one_instrument(
    source: &dyn crate::source::ExternalDataSource,
    store: &dyn MarketDataStore,
    instrument: Instrument,
    range: TimeRange,
    tuning: IngestionTuning,
    cancel: &CancellationToken,
) -> InstrumentOutcome {
    let chunks = range.split_into_days(tuning.chunk_days);
    let mut total_processed = 0usize;
    let mut pending: Vec<Ohlcv> = Vec::new();
    let mut min_ts = None;
    let mut max_ts = None;
    let mut tail: Option<Ohlcv> = None;
    let mut chunk_warnings = 0usize;

    for chunk in chunks {
        if cancel.is_cancelled() {
            return InstrumentOutcome::Cancelled {
                symbol: instrument.code(),
            };
        }

        let bars = match source.fetch_historical_data(instrument, chunk).await {
            Ok(bars) => bars,
            Err(ExternalFetchError::Failed { message, .. }) => {
                warn!(symbol = instrument.code(), %message, "chunk fetch failed, skipping");
                sleep(Duration::from_millis(tuning.chunk_delay_ms)).await;
                continue;
            }
            Err(e) => {
                warn!(symbol = instrument.code(), error = %e, "chunk fetch failed, skipping");
                sleep(Duration::from_millis(tuning.chunk_delay_ms)).await;
                continue;
            }
        };

        for batch in bars.chunks(tuning.batch_size) {
            if cancel.is_cancelled() {
                return InstrumentOutcome::Cancelled {
                    symbol: instrument.code(),
                };
            }
            match validate_batch(batch, instrument.quote_currency(), tail.as_ref(), DEFAULT_JUMP_SANITY_THRESHOLD) {
                Ok(outcome) => {
                    chunk_warnings += outcome.warnings.len();
                    for w in &outcome.warnings {
                        warn!(symbol = instrument.code(), ?w, "validation warning");
                    }
                    for bar in batch {
                        min_ts = Some(min_ts.map_or(bar.timestamp, |m: chrono::DateTime<chrono::Utc>| m.min(bar.timestamp)));
                        max_ts = Some(max_ts.map_or(bar.timestamp, |m: chrono::DateTime<chrono::Utc>| m.max(bar.timestamp)));
                    }
                    pending.extend_from_slice(batch);
                    total_processed += batch.len();
                    tail = batch.last().cloned();
                }
                Err(e) => {
                    warn!(symbol = instrument.code(), error = %e, "batch failed validation, skipping");
                }
            }

            if pending.len() >= tuning.intermediate_save {
                if let Err(e) = store.upsert_all(instrument, std::mem::take(&mut pending)).await {
                    return InstrumentOutcome::Failure {
                        symbol: instrument.code(),
                        name: instrument.name(),
                        reason: e.to_string(),
                    };
                }
            }
        }

        sleep(Duration::from_millis(tuning.chunk_delay_ms)).await;
    }

    if !pending.is_empty() {
        if let Err(e) = store.upsert_all(instrument, pending).await {
            return InstrumentOutcome::Failure {
                symbol: instrument.code(),
                name: instrument.name(),
                reason: e.to_string(),
            };
        }
    }

    if total_processed == 0 {
        return InstrumentOutcome::Failure {
            symbol: instrument.code(),
            name: instrument.name(),
            reason: "no bars obtained for requested range".into(),
        };
    }

    info!(symbol = instrument.code(), total_processed, chunk_warnings, "instrument ingested");

    let quality_level = if chunk_warnings == 0 {
        QualityLevel::Excellent
    } else if chunk_warnings < 3 {
        QualityLevel::Good
    } else {
        QualityLevel::Acceptable
    };

    InstrumentOutcome::Success {
        name: instrument.name(),
        processed: total_processed,
        earliest: min_ts,
        latest: max_ts,
        quality_level,
    }
}

/// Narrow wrapper used by C5's back-fill stage: fetches and persists a
/// single missing range for one instrument, reusing the same pipeline.
pub async fn fetch_missing(
    factory: Arc<DataSourceFactory>,
    store: Arc<dyn MarketDataStore>,
    instrument: Instrument,
    range: TimeRange,
    source_id: Option<&str>,
) -> Result<(), ExternalFetchError> {
    let source = factory.get(source_id)?;
    let bars = source.fetch_historical_data(instrument, range).await?;
    if !bars.is_empty() {
        store
            .upsert_all(instrument, bars)
            .await
            .map_err(|e| ExternalFetchError::Failed {
                source_id: source.data_source_id().to_string(),
                symbol: instrument.code().to_string(),
                message: e.to_string(),
            })?;
    }
    Ok(())
}
