//! Scheduled-record lifecycle - picks the next record and commits it once posted
//!
//! The manager is the single owner of the invariant "posted implies not queued".
//! Selection heals the queue by purging heads that were already posted, and
//! commit always finishes by removing the record from the queue.

use std::sync::Arc;

use crate::{
    model::{CommitOutcome, RecordId, ScheduledRecord},
    ports::{RecordStore, StoreError},
};

/// Errors from the lifecycle manager
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Queue head {0} is still queued after being purged")]
    PurgeStalled(RecordId),
    #[error("Refusing to commit an empty record id")]
    EmptyId,
}

/// Lifecycle manager over a record store
pub struct LifecycleManager<St: RecordStore + ?Sized> {
    store: Arc<St>,
}

impl<St: RecordStore + ?Sized> Clone for LifecycleManager<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<St: RecordStore + ?Sized> LifecycleManager<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self { store }
    }

    /// Return the first queued record that has not been posted yet
    ///
    /// Heads that are already posted are deleted from the queue along the way.
    pub async fn next_eligible(&self) -> Result<Option<ScheduledRecord>, LifecycleError> {
        let mut purged: Option<RecordId> = None;

        loop {
            let Some(head) = self.store.next_scheduled().await? else {
                if let Some(last) = purged {
                    tracing::info!(last_purged = %last, "Queue drained of already-posted records");
                }
                return Ok(None);
            };

            if purged.as_ref() == Some(&head.id) {
                return Err(LifecycleError::PurgeStalled(head.id));
            }

            if !self.store.is_posted(&head.id).await? {
                tracing::info!(
                    record_id = %head.id,
                    position = head.position,
                    description = %head.description,
                    "Selected next record"
                );
                return Ok(Some(head));
            }

            tracing::warn!(
                record_id = %head.id,
                position = head.position,
                "Queued record was already posted, purging from queue"
            );
            self.store.remove_scheduled(&head.id).await?;
            purged = Some(head.id);
        }
    }

    /// Record a confirmed publish and take the record out of the queue
    ///
    /// Must only be called after the publish succeeded. An id that is already
    /// posted (another run got there first) still gets removed from the queue
    /// and is reported as [`CommitOutcome::AlreadyPresent`], not as an error.
    pub async fn commit(
        &self,
        id: &RecordId,
        description: Option<&str>,
    ) -> Result<CommitOutcome, LifecycleError> {
        if id.is_empty() {
            return Err(LifecycleError::EmptyId);
        }

        let outcome = self.store.commit_posted(id, description).await?;
        match outcome {
            CommitOutcome::Inserted => {
                tracing::info!(record_id = %id, "Saved posted record");
            }
            CommitOutcome::AlreadyPresent => {
                tracing::warn!(record_id = %id, "Record was already saved as posted");
            }
        }

        self.store.remove_scheduled(id).await?;
        tracing::debug!(record_id = %id, "Removed record from queue");

        Ok(outcome)
    }
}
