pub mod forecast_store;
pub mod market_data;
pub mod master_data;
pub mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{ForecastResult, Instrument, MasterDataRecord, Ohlcv, TimeRange};
use crate::error::StoreError;

/// Per-instrument, asset-specific storage (C1). Each instrument gets a
/// logically separate partition (modeled here as a separate in-memory table
/// keyed by instrument) to isolate scans and hot paths, per §4.2.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Atomic per batch; last-write-wins at the field level on duplicate
    /// timestamps.
    async fn upsert_all(&self, instrument: Instrument, bars: Vec<Ohlcv>) -> Result<(), StoreError>;

    async fn find_by_range(&self, instrument: Instrument, range: TimeRange) -> Result<Vec<Ohlcv>, StoreError>;

    async fn find_timestamps_by_range(
        &self,
        instrument: Instrument,
        range: TimeRange,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;

    async fn latest(&self, instrument: Instrument) -> Result<Option<Ohlcv>, StoreError>;

    async fn earliest(&self, instrument: Instrument) -> Result<Option<Ohlcv>, StoreError>;

    async fn count_by_range(&self, instrument: Instrument, range: TimeRange) -> Result<usize, StoreError>;

    async fn has_range(&self, instrument: Instrument, range: TimeRange) -> Result<bool, StoreError>;

    async fn delete_all(&self, instrument: Instrument) -> Result<(), StoreError>;
}

/// Per-instrument derived-record storage (C4).
#[async_trait]
pub trait MasterDataStore: Send + Sync {
    async fn find_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MasterDataRecord>, StoreError>;

    async fn find_with_differences_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MasterDataRecord>, StoreError>;

    async fn find_timestamps_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;

    async fn latest_timestamp(&self, instrument: Instrument) -> Result<Option<NaiveDate>, StoreError>;

    async fn save(&self, record: MasterDataRecord) -> Result<(), StoreError>;

    async fn save_all(&self, records: Vec<MasterDataRecord>) -> Result<(), StoreError>;

    /// Upsert by timestamp: preserves `createdAt`, overwrites derived
    /// fields. Used by both back-fill (C5) and per-lag self-heal (C7) —
    /// both must land on the same unique key.
    async fn upsert(&self, record: MasterDataRecord) -> Result<(), StoreError>;

    async fn count_by_range(&self, instrument: Instrument, from: NaiveDate, to: NaiveDate) -> Result<usize, StoreError>;

    async fn delete_all(&self, instrument: Instrument) -> Result<(), StoreError>;
}

/// Per-instrument forecast outcome storage (C8).
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Upsert by `(forecastDate, modelVersion)`; preserves original
    /// `createdAt`.
    async fn upsert(&self, result: ForecastResult) -> Result<(), StoreError>;

    async fn find_by_date_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ForecastResult>, StoreError>;

    async fn find_by_model_version(
        &self,
        instrument: Instrument,
        model_version: &str,
    ) -> Result<Vec<ForecastResult>, StoreError>;

    async fn find_by_execution_id(&self, execution_id: uuid::Uuid) -> Result<Vec<ForecastResult>, StoreError>;

    async fn latest_per_model_version(
        &self,
        instrument: Instrument,
    ) -> Result<Vec<ForecastResult>, StoreError>;

    async fn exists(
        &self,
        instrument: Instrument,
        forecast_date: NaiveDate,
        model_version: &str,
    ) -> Result<bool, StoreError>;

    async fn delete_older_than(&self, instrument: Instrument, cutoff: NaiveDate) -> Result<usize, StoreError>;
}
