use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RunStoreError;
use crate::record::RunRecord;

/// Persistence for run records.
///
/// Implementations must be safe to share between concurrently executing runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace the record for `record.correlation_id()`.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if the record could not be written.
    async fn put(&self, record: RunRecord) -> Result<(), RunStoreError>;

    /// Fetch the record for `correlation_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if the store could not be read.
    async fn get(&self, correlation_id: &str) -> Result<Option<RunRecord>, RunStoreError>;

    /// All records, least recently written first.
    ///
    /// # Errors
    ///
    /// Returns [`RunStoreError`] if the store could not be read.
    async fn list(&self) -> Result<Vec<RunRecord>, RunStoreError>;
}

/// Process-local [`RunStore`] keeping records in write order.
///
/// Writing a record moves it to the end. When bounded, the least recently
/// written finished records are evicted once the bound is exceeded. Running
/// records are never evicted.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    records: RwLock<IndexMap<String, RunRecord>>,
    max_tracked: Option<usize>,
}

impl InMemoryRunStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_tracked_runs(mut self, max: usize) -> Self {
        self.max_tracked = Some(max);
        self
    }

    #[must_use]
    pub fn max_tracked_runs(&self) -> Option<usize> {
        self.max_tracked
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn evict_finished(records: &mut IndexMap<String, RunRecord>, max: usize, keep: &str) {
    while records.len() > max {
        let oldest = records
            .iter()
            .position(|(id, record)| id != keep && record.status().is_terminal());
        let Some(index) = oldest else {
            break;
        };
        if let Some((id, _)) = records.shift_remove_index(index) {
            debug!(correlation_id = %id, "evicted run record");
        }
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn put(&self, record: RunRecord) -> Result<(), RunStoreError> {
        let mut records = self.records.write().await;
        let id = record.correlation_id().to_string();
        records.shift_remove(&id);
        records.insert(id.clone(), record);
        if let Some(max) = self.max_tracked {
            evict_finished(&mut records, max, &id);
        }
        Ok(())
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self.records.read().await.get(correlation_id).cloned())
    }

    async fn list(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
