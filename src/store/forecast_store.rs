use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{ForecastResult, Instrument};
use crate::error::StoreError;
use crate::store::ForecastStore;

type Key = (NaiveDate, String);

/// In-memory C8 implementation. Upsert key is `(forecastDate,
/// modelVersion)`; `createdAt` is preserved across re-runs of the same key.
#[derive(Default)]
pub struct InMemoryForecastStore {
    partitions: RwLock<HashMap<Instrument, RwLock<HashMap<Key, ForecastResult>>>>,
}

impl InMemoryForecastStore {
    pub fn new() -> Self {
        let mut partitions = HashMap::new();
        for instrument in Instrument::ALL {
            partitions.insert(instrument, RwLock::new(HashMap::new()));
        }
        Self {
            partitions: RwLock::new(partitions),
        }
    }
}

#[async_trait]
impl ForecastStore for InMemoryForecastStore {
    async fn upsert(&self, result: ForecastResult) -> Result<(), StoreError> {
        let partitions = self.partitions.read().await;
        let mut map = partitions
            .get(&result.instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument: result.instrument,
                message: "no partition registered".into(),
            })?
            .write()
            .await;
        let key = (result.forecast_date, result.model_version.clone());
        match map.get(&key) {
            Some(existing) => {
                let mut merged = result;
                merged.created_at = existing.created_at;
                map.insert(key, merged);
            }
            None => {
                map.insert(key, result);
            }
        }
        Ok(())
    }

    async fn find_by_date_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ForecastResult>, StoreError> {
        let partitions = self.partitions.read().await;
        let map = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?
            .read()
            .await;
        let mut out: Vec<ForecastResult> = map
            .values()
            .filter(|r| r.forecast_date >= from && r.forecast_date <= to)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.forecast_date);
        Ok(out)
    }

    async fn find_by_model_version(
        &self,
        instrument: Instrument,
        model_version: &str,
    ) -> Result<Vec<ForecastResult>, StoreError> {
        let partitions = self.partitions.read().await;
        let map = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?
            .read()
            .await;
        Ok(map
            .values()
            .filter(|r| r.model_version == model_version)
            .cloned()
            .collect())
    }

    async fn find_by_execution_id(&self, execution_id: Uuid) -> Result<Vec<ForecastResult>, StoreError> {
        let partitions = self.partitions.read().await;
        let mut out = Vec::new();
        for slot in partitions.values() {
            let map = slot.read().await;
            out.extend(map.values().filter(|r| r.execution_id == execution_id).cloned());
        }
        Ok(out)
    }

    async fn latest_per_model_version(&self, instrument: Instrument) -> Result<Vec<ForecastResult>, StoreError> {
        let partitions = self.partitions.read().await;
        let map = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?
            .read()
            .await;
        let mut by_version: HashMap<String, ForecastResult> = HashMap::new();
        for r in map.values() {
            by_version
                .entry(r.model_version.clone())
                .and_modify(|cur| {
                    if r.forecast_date > cur.forecast_date {
                        *cur = r.clone();
                    }
                })
                .or_insert_with(|| r.clone());
        }
        Ok(by_version.into_values().collect())
    }

    async fn exists(&self, instrument: Instrument, forecast_date: NaiveDate, model_version: &str) -> Result<bool, StoreError> {
        let partitions = self.partitions.read().await;
        let map = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?
            .read()
            .await;
        Ok(map.contains_key(&(forecast_date, model_version.to_string())))
    }

    async fn delete_older_than(&self, instrument: Instrument, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let partitions = self.partitions.read().await;
        let mut map = partitions
            .get(&instrument)
            .ok_or_else(|| StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })?
            .write()
            .await;
        let before = map.len();
        map.retain(|(date, _), _| *date >= cutoff);
        Ok(before - map.len())
    }
}
