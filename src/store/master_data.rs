use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::domain::{Instrument, MasterDataRecord};
use crate::error::StoreError;
use crate::store::MasterDataStore;

/// In-memory C4 implementation, partitioned per instrument and keyed by
/// calendar day within a partition (spec.md models the identity as
/// `(instrument, timestamp, calculationVersion)`; this store keeps the
/// latest version per day, which is all the prep/forecast pipelines ever
/// query for — multiple live versions per day are not a modeled use case).
#[derive(Default)]
pub struct InMemoryMasterDataStore {
    partitions: RwLock<HashMap<Instrument, RwLock<BTreeMap<NaiveDate, MasterDataRecord>>>>,
}

impl InMemoryMasterDataStore {
    pub fn new() -> Self {
        let mut partitions = HashMap::new();
        for instrument in Instrument::ALL {
            partitions.insert(instrument, RwLock::new(BTreeMap::new()));
        }
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    async fn partition(&self, instrument: Instrument) -> Result<(), StoreError> {
        let partitions = self.partitions.read().await;
        if partitions.contains_key(&instrument) {
            Ok(())
        } else {
            Err(StoreError::PersistenceFailure {
                instrument,
                message: "no partition registered".into(),
            })
        }
    }
}

#[async_trait]
impl MasterDataStore for InMemoryMasterDataStore {
    async fn find_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MasterDataRecord>, StoreError> {
        self.partition(instrument).await?;
        let partitions = self.partitions.read().await;
        let map = partitions.get(&instrument).unwrap().read().await;
        Ok(map.range(from..to).map(|(_, r)| r.clone()).collect())
    }

    async fn find_with_differences_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<MasterDataRecord>, StoreError> {
        Ok(self
            .find_by_range(instrument, from, to)
            .await?
            .into_iter()
            .filter(|r| r.has_differences())
            .collect())
    }

    async fn find_timestamps_by_range(
        &self,
        instrument: Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        self.partition(instrument).await?;
        let partitions = self.partitions.read().await;
        let map = partitions.get(&instrument).unwrap().read().await;
        Ok(map.range(from..to).map(|(d, _)| *d).collect())
    }

    async fn latest_timestamp(&self, instrument: Instrument) -> Result<Option<NaiveDate>, StoreError> {
        self.partition(instrument).await?;
        let partitions = self.partitions.read().await;
        let map = partitions.get(&instrument).unwrap().read().await;
        Ok(map.keys().next_back().copied())
    }

    async fn save(&self, record: MasterDataRecord) -> Result<(), StoreError> {
        self.save_all(vec![record]).await
    }

    async fn save_all(&self, records: Vec<MasterDataRecord>) -> Result<(), StoreError> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    async fn upsert(&self, record: MasterDataRecord) -> Result<(), StoreError> {
        self.partition(record.instrument).await?;
        let partitions = self.partitions.read().await;
        let mut map = partitions.get(&record.instrument).unwrap().write().await;
        let day = record.timestamp.date_naive();
        match map.get(&day) {
            Some(existing) => {
                let mut merged = record;
                merged.calculated_at = existing.calculated_at;
                map.insert(day, merged);
            }
            None => {
                map.insert(day, record);
            }
        }
        Ok(())
    }

    async fn count_by_range(&self, instrument: Instrument, from: NaiveDate, to: NaiveDate) -> Result<usize, StoreError> {
        Ok(self.find_by_range(instrument, from, to).await?.len())
    }

    async fn delete_all(&self, instrument: Instrument) -> Result<(), StoreError> {
        self.partition(instrument).await?;
        let partitions = self.partitions.read().await;
        partitions.get(&instrument).unwrap().write().await.clear();
        Ok(())
    }
}
