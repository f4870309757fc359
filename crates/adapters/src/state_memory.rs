//! In-memory record store, a test double for code written against `RecordStore`

use archive_poster_domain::{
    Clock, CommitOutcome, PostedRecord, RecordId, RecordStore, ScheduledRecord, StoreError,
    SystemClock, planning::pair_date_labels,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use time::Date;

#[derive(Default)]
struct Tables {
    queue: BTreeMap<i64, ScheduledRecord>,
    last_position: i64,
    posted: HashMap<RecordId, PostedRecord>,
}

/// In-memory record store implementation
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose `posted_at` timestamps come from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn is_posted(&self, id: &RecordId) -> Result<bool, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(tables.posted.contains_key(id))
    }

    async fn commit_posted(
        &self,
        id: &RecordId,
        description: Option<&str>,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if tables.posted.contains_key(id) {
            return Ok(CommitOutcome::AlreadyPresent);
        }

        tables.posted.insert(
            id.clone(),
            PostedRecord {
                id: id.clone(),
                description: description.map(String::from),
                posted_at: self.clock.now(),
            },
        );
        Ok(CommitOutcome::Inserted)
    }

    async fn next_scheduled(&self) -> Result<Option<ScheduledRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(tables.queue.values().next().cloned())
    }

    async fn remove_scheduled(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tables.queue.retain(|_, record| &record.id != id);
        Ok(())
    }

    async fn schedule(&self, id: &RecordId, description: &str) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let duplicate = tables
            .queue
            .values()
            .any(|record| &record.id == id || record.description == description);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "record {id} or description {description:?} is already queued"
            )));
        }

        tables.last_position += 1;
        let position = tables.last_position;
        tables.queue.insert(
            position,
            ScheduledRecord {
                position,
                id: id.clone(),
                description: description.to_string(),
                post_date: None,
            },
        );
        Ok(())
    }

    async fn list_scheduled(&self, limit: usize) -> Result<Vec<ScheduledRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(tables.queue.values().take(limit).cloned().collect())
    }

    async fn scheduled_count(&self) -> Result<u64, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(tables.queue.len() as u64)
    }

    async fn get_posted(&self, id: &RecordId) -> Result<Option<PostedRecord>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(tables.posted.get(id).cloned())
    }

    async fn clear_scheduled_dates(&self) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let count = tables.queue.len() as u64;
        for record in tables.queue.values_mut() {
            record.post_date = None;
        }
        Ok(count)
    }

    async fn backfill_scheduled_dates(&self, start: Date) -> Result<u64, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let unlabelled: Vec<&mut ScheduledRecord> = tables
            .queue
            .values_mut()
            .filter(|record| record.post_date.is_none())
            .collect();
        let labels = pair_date_labels(start, unlabelled.len());

        let mut updated = 0;
        for (record, label) in unlabelled.into_iter().zip(labels) {
            record.post_date = Some(label);
            updated += 1;
        }
        Ok(updated)
    }

    async fn swap_scheduled(&self, first: i64, second: i64) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for position in [first, second] {
            if !tables.queue.contains_key(&position) {
                return Err(StoreError::NotFound(format!(
                    "no scheduled record at position {position}"
                )));
            }
        }
        if first == second {
            return Ok(());
        }

        let (Some(a), Some(b)) = (tables.queue.remove(&first), tables.queue.remove(&second))
        else {
            return Err(StoreError::NotFound("scheduled record vanished".to_string()));
        };

        tables.queue.insert(
            first,
            ScheduledRecord {
                id: b.id.clone(),
                description: b.description.clone(),
                ..a.clone()
            },
        );
        tables.queue.insert(
            second,
            ScheduledRecord {
                id: a.id,
                description: a.description,
                ..b
            },
        );
        Ok(())
    }
}
