use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Instrument, MarketInstrument, Ohlcv, TimeRange};
use crate::error::StoreError;
use crate::store::MarketDataStore;

/// In-memory C1 implementation, one [`MarketInstrument`] partition per
/// instrument behind its own lock so that a write to BTC never contends
/// with a read of ETH (§5's per-instrument shared-mutable-state boundary).
pub struct InMemoryMarketDataStore {
    partitions: RwLock<HashMap<Instrument, RwLock<MarketInstrument>>>,
}

impl Default for InMemoryMarketDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMarketDataStore {
    pub fn new() -> Self {
        let mut partitions = HashMap::new();
        for instrument in Instrument::ALL {
            partitions.insert(instrument, RwLock::new(MarketInstrument::new(instrument)));
        }
        Self {
            partitions: RwLock::new(partitions),
        }
    }
}

#[async_trait]
impl MarketDataStore for InMemoryMarketDataStore {
    async fn upsert_all(&self, instrument: Instrument, bars: Vec<Ohlcv>) -> Result<(), StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?;
        let mut guard = slot.write().await;
        guard
            .add_bars(bars, "upsert", Utc::now())
            .map_err(|e| StoreError::PersistenceFailure {
                instrument,
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn find_by_range(&self, instrument: Instrument, range: TimeRange) -> Result<Vec<Ohlcv>, StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?;
        let guard = slot.read().await;
        Ok(guard.find_by_range(range.from(), range.to()))
    }

    async fn find_timestamps_by_range(
        &self,
        instrument: Instrument,
        range: TimeRange,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        Ok(self
            .find_by_range(instrument, range)
            .await?
            .into_iter()
            .map(|b| b.timestamp)
            .collect())
    }

    async fn latest(&self, instrument: Instrument) -> Result<Option<Ohlcv>, StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions.get(&instrument).ok_or_else(|| StoreError::PersistenceFailure {
            instrument,
            message: "no partition registered".into(),
        })?;
        Ok(slot.read().await.latest().cloned())
    }

    async fn earliest(&self, instrument: Instrument) -> Result<Option<Ohlcv>, StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions.get(&instrument).ok_or_else(|| StoreError::PersistenceFailure {
            instrument,
            message: "no partition registered".into(),
        })?;
        Ok(slot.read().await.earliest().cloned())
    }

    async fn count_by_range(&self, instrument: Instrument, range: TimeRange) -> Result<usize, StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions.get(&instrument).ok_or_else(|| StoreError::PersistenceFailure {
            instrument,
            message: "no partition registered".into(),
        })?;
        Ok(slot.read().await.count_by_range(range.from(), range.to()))
    }

    async fn has_range(&self, instrument: Instrument, range: TimeRange) -> Result<bool, StoreError> {
        let expected_days = range.duration_days();
        let have = self.count_by_range(instrument, range).await?;
        Ok(have as i64 >= expected_days)
    }

    async fn delete_all(&self, instrument: Instrument) -> Result<(), StoreError> {
        let partitions = self.partitions.read().await;
        let slot = partitions.get(&instrument).ok_or_else(|| StoreError::PersistenceFailure {
            instrument,
            message: "no partition registered".into(),
        })?;
        *slot.write().await = MarketInstrument::new(instrument);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Price;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(day: u32) -> Ohlcv {
        Ohlcv {
            open: Price::new(dec!(100), "USD"),
            high: Price::new(dec!(105), "USD"),
            low: Price::new(dec!(95), "USD"),
            close: Price::new(dec!(101), "USD"),
            volume: dec!(10),
            timestamp: Utc.from_utc_datetime(
                &chrono::NaiveDate::from_ymd_opt(2024, 1, day)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_range_returns_sorted_unique() {
        let store = InMemoryMarketDataStore::new();
        store
            .upsert_all(Instrument::Btc, vec![bar(1), bar(2), bar(3)])
            .await
            .unwrap();
        store.upsert_all(Instrument::Btc, vec![bar(2)]).await.unwrap();

        let range = TimeRange::from_dates(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        );
        let found = store.find_by_range(Instrument::Btc, range).await.unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn instruments_are_independently_partitioned() {
        let store = InMemoryMarketDataStore::new();
        store.upsert_all(Instrument::Btc, vec![bar(1)]).await.unwrap();
        assert_eq!(store.latest(Instrument::Eth).await.unwrap(), None);
    }
}
