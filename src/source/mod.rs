pub mod coingecko;
pub mod rate_limit;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Instrument, Ohlcv, TimeRange};
use crate::error::ExternalFetchError;

/// Abstract fetcher of OHLCV for `(symbol, time-range)` (C2). One concrete
/// implementation per exchange; a [`DataSourceFactory`] dispatches by
/// `data_source_id` (case-insensitive).
#[async_trait]
pub trait ExternalDataSource: Send + Sync {
    /// Closed on `[from, to]`, sorted ascending by timestamp, daily
    /// granularity; gaps only where the exchange itself lacks the day.
    async fn fetch_historical_data(
        &self,
        instrument: Instrument,
        range: TimeRange,
    ) -> Result<Vec<Ohlcv>, ExternalFetchError>;

    async fn fetch_latest_data(&self, instrument: Instrument) -> Result<Ohlcv, ExternalFetchError>;

    fn supports_symbol(&self, instrument: Instrument) -> bool;

    fn data_source_id(&self) -> &str;

    async fn healthy(&self) -> bool;
}

/// Dispatches by `dataSourceId` string (case-insensitive). Multiple impls
/// coexist; selection is per-request.
#[derive(Clone, Default)]
pub struct DataSourceFactory {
    sources: HashMap<String, Arc<dyn ExternalDataSource>>,
    default_id: Option<String>,
}

impl DataSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn ExternalDataSource>, is_default: bool) {
        let key = source.data_source_id().to_ascii_lowercase();
        if is_default {
            self.default_id = Some(key.clone());
        }
        self.sources.insert(key, source);
    }

    pub fn get(&self, id: Option<&str>) -> Result<Arc<dyn ExternalDataSource>, ExternalFetchError> {
        let key = id
            .map(str::to_ascii_lowercase)
            .or_else(|| self.default_id.clone())
            .ok_or_else(|| ExternalFetchError::UnknownSource("<none>".to_string()))?;
        self.sources
            .get(&key)
            .cloned()
            .ok_or(ExternalFetchError::UnknownSource(key))
    }
}
