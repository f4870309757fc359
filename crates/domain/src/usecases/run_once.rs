//! Run-once use case - posts at most one queued record end to end

use std::sync::Arc;

use crate::{
    model::{ImagePost, RunOutcome, RunStage, ScheduledRecord},
    ports::{CaptionComposer, FetchError, ImagePipeline, PageSource, Publisher, RecordStore},
    usecases::lifecycle::{LifecycleError, LifecycleManager},
};

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Dry run mode (prepare everything, publish nothing)
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

/// Errors that stop a run before any record was selected
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Orchestrates one run: select, fetch, caption, image, publish, commit
pub struct RunOnce<St, S, I, C, P>
where
    St: RecordStore + ?Sized,
    S: PageSource + ?Sized,
    I: ImagePipeline + ?Sized,
    C: CaptionComposer + ?Sized,
    P: Publisher + ?Sized,
{
    lifecycle: LifecycleManager<St>,
    page_source: Arc<S>,
    image_pipeline: Arc<I>,
    composer: Arc<C>,
    publisher: Arc<P>,
    config: RunConfig,
}

impl<St, S, I, C, P> RunOnce<St, S, I, C, P>
where
    St: RecordStore + ?Sized,
    S: PageSource + ?Sized,
    I: ImagePipeline + ?Sized,
    C: CaptionComposer + ?Sized,
    P: Publisher + ?Sized,
{
    pub fn new(
        store: Arc<St>,
        page_source: Arc<S>,
        image_pipeline: Arc<I>,
        composer: Arc<C>,
        publisher: Arc<P>,
        config: RunConfig,
    ) -> Self {
        Self {
            lifecycle: LifecycleManager::new(store),
            page_source,
            image_pipeline,
            composer,
            publisher,
            config,
        }
    }

    /// Process the next eligible record, if any
    ///
    /// Collaborator failures are reported through [`RunOutcome`]; the record
    /// stays queued for the next run unless it was committed.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let Some(record) = self.lifecycle.next_eligible().await? else {
            tracing::info!("Queue is empty, nothing to post");
            return Ok(RunOutcome::QueueEmpty);
        };

        Ok(self.process(record).await)
    }

    async fn process(&self, record: ScheduledRecord) -> RunOutcome {
        let id = record.id.clone();

        let data = match self.page_source.fetch(&id).await {
            Ok(data) => data,
            Err(FetchError::Forbidden) => {
                tracing::error!(
                    record_id = %id,
                    "Archive returned 403 Forbidden; requests are likely being blocked"
                );
                return failed(&record, RunStage::Fetch, FetchError::Forbidden);
            }
            Err(error) => {
                tracing::error!(record_id = %id, error = %error, "Failed to fetch record page");
                return failed(&record, RunStage::Fetch, error);
            }
        };

        tracing::info!(
            record_id = %id,
            title = %data.title,
            image_url = %data.image_url,
            "Fetched record page"
        );

        if data.image_url.trim().is_empty() {
            tracing::warn!(record_id = %id, "Record page has no image");
            return failed(&record, RunStage::Image, "record page has no image URL");
        }

        let Some(caption) = self.composer.compose(&data).await else {
            return RunOutcome::Skipped {
                id,
                reason: format!("{} caption unavailable", self.composer.strategy()),
            };
        };

        tracing::info!(record_id = %id, caption = %caption.text, "Composed caption");

        if !self.config.dry_run && !self.publisher.is_enabled() {
            tracing::warn!(
                record_id = %id,
                platform = self.publisher.platform(),
                "Publisher not configured, skipping post"
            );
            return RunOutcome::Skipped {
                id,
                reason: format!("{} publisher not configured", self.publisher.platform()),
            };
        }

        let image = match self.image_pipeline.prepare(&data.image_url).await {
            Ok(image) => image,
            Err(error) => {
                tracing::error!(record_id = %id, error = %error, "Failed to prepare image");
                return failed(&record, RunStage::Image, error);
            }
        };

        let post = ImagePost {
            record_id: id.clone(),
            image_path: image.path.clone(),
            caption,
            source_url: Some(data.node_url.trim().to_string()).filter(|url| !url.is_empty()),
        };

        let outcome = if self.config.dry_run {
            tracing::info!(
                record_id = %id,
                image = %post.image_path.display(),
                caption = %post.caption.text,
                source_url = ?post.source_url,
                "[DRY RUN] Would publish"
            );
            RunOutcome::DryRun {
                id,
                caption: post.caption,
            }
        } else {
            self.publish_and_commit(&record, &post).await
        };

        self.image_pipeline.discard(&image).await;
        outcome
    }

    async fn publish_and_commit(&self, record: &ScheduledRecord, post: &ImagePost) -> RunOutcome {
        let receipt = match self.publisher.publish(post).await {
            Ok(receipt) => receipt,
            Err(error) => {
                tracing::error!(
                    record_id = %record.id,
                    platform = self.publisher.platform(),
                    error = %error,
                    "Failed to publish, record stays queued"
                );
                return failed(record, RunStage::Publish, error);
            }
        };

        tracing::info!(
            record_id = %record.id,
            post_uri = %receipt.uri,
            reply_uri = ?receipt.reply_uri,
            "Published post"
        );

        match self
            .lifecycle
            .commit(&record.id, Some(record.description.as_str()))
            .await
        {
            Ok(commit) => RunOutcome::Published {
                id: record.id.clone(),
                post_uri: receipt.uri,
                reply_uri: receipt.reply_uri,
                commit,
            },
            Err(error) => {
                // The post is already visible; a retry of this record would duplicate it
                tracing::error!(
                    record_id = %record.id,
                    post_uri = %receipt.uri,
                    error = %error,
                    "Published but failed to commit"
                );
                failed(record, RunStage::Commit, error)
            }
        }
    }
}

fn failed(record: &ScheduledRecord, stage: RunStage, error: impl ToString) -> RunOutcome {
    RunOutcome::Failed {
        id: record.id.clone(),
        stage,
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CaptionResult, CommitOutcome, PostedRecord, PreparedImage, RecordId, ScrapedData,
    };
    use crate::ports::{ImageError, PublishError, PublishReceipt, StoreError};
    use crate::usecases::caption::DeterministicComposer;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::Date;

    #[derive(Default)]
    struct FakeStore {
        queue: Mutex<BTreeMap<i64, ScheduledRecord>>,
        posted: Mutex<HashSet<RecordId>>,
    }

    impl FakeStore {
        fn with_queue(ids: &[&str]) -> Self {
            let store = Self::default();
            {
                let mut queue = store.queue.lock().unwrap();
                for (index, id) in ids.iter().enumerate() {
                    queue.insert(
                        index as i64 + 1,
                        ScheduledRecord {
                            position: index as i64 + 1,
                            id: RecordId::from(*id),
                            description: format!("record {id}"),
                            post_date: None,
                        },
                    );
                }
            }
            store
        }

        fn queued(&self) -> Vec<String> {
            self.queue
                .lock()
                .unwrap()
                .values()
                .map(|r| r.id.to_string())
                .collect()
        }

        fn posted(&self, id: &str) -> bool {
            self.posted.lock().unwrap().contains(&RecordId::from(id))
        }
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn is_posted(&self, id: &RecordId) -> Result<bool, StoreError> {
            Ok(self.posted.lock().unwrap().contains(id))
        }

        async fn commit_posted(
            &self,
            id: &RecordId,
            _description: Option<&str>,
        ) -> Result<CommitOutcome, StoreError> {
            if self.posted.lock().unwrap().insert(id.clone()) {
                Ok(CommitOutcome::Inserted)
            } else {
                Ok(CommitOutcome::AlreadyPresent)
            }
        }

        async fn next_scheduled(&self) -> Result<Option<ScheduledRecord>, StoreError> {
            Ok(self.queue.lock().unwrap().values().next().cloned())
        }

        async fn remove_scheduled(&self, id: &RecordId) -> Result<(), StoreError> {
            self.queue.lock().unwrap().retain(|_, r| &r.id != id);
            Ok(())
        }

        async fn schedule(&self, _id: &RecordId, _description: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_scheduled(&self, _limit: usize) -> Result<Vec<ScheduledRecord>, StoreError> {
            Ok(vec![])
        }

        async fn scheduled_count(&self) -> Result<u64, StoreError> {
            Ok(self.queue.lock().unwrap().len() as u64)
        }

        async fn get_posted(&self, _id: &RecordId) -> Result<Option<PostedRecord>, StoreError> {
            Ok(None)
        }

        async fn clear_scheduled_dates(&self) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn backfill_scheduled_dates(&self, _start: Date) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn swap_scheduled(&self, _first: i64, _second: i64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    enum PageBehavior {
        Ok,
        Forbidden,
        NoImage,
    }

    struct FakePageSource {
        behavior: PageBehavior,
    }

    #[async_trait]
    impl PageSource for FakePageSource {
        async fn fetch(&self, id: &RecordId) -> Result<ScrapedData, FetchError> {
            let image_url = match self.behavior {
                PageBehavior::Forbidden => return Err(FetchError::Forbidden),
                PageBehavior::NoImage => String::new(),
                PageBehavior::Ok => format!("https://archive.example/images/{id}.jpg"),
            };
            Ok(ScrapedData {
                title: format!("Photo {id}"),
                image_url,
                image_date: "1935".to_string(),
                summary: "Workers on the viaduct.".to_string(),
                node_url: format!("https://archive.example/nodes/view/{id}"),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct FakeImagePipeline {
        fail: bool,
        discarded: AtomicUsize,
    }

    #[async_trait]
    impl ImagePipeline for FakeImagePipeline {
        async fn prepare(&self, _url: &str) -> Result<PreparedImage, ImageError> {
            if self.fail {
                return Err(ImageError::Download("connection reset".to_string()));
            }
            let path = PathBuf::from("/tmp/fake.jpg");
            Ok(PreparedImage {
                path: path.clone(),
                created_files: vec![path],
            })
        }

        async fn discard(&self, _image: &PreparedImage) {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakePublisher {
        enabled: bool,
        fail: bool,
        published: Mutex<Vec<ImagePost>>,
    }

    impl FakePublisher {
        fn new(enabled: bool, fail: bool) -> Self {
            Self {
                enabled,
                fail,
                published: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, post: &ImagePost) -> Result<PublishReceipt, PublishError> {
            if self.fail {
                return Err(PublishError::RateLimited);
            }
            self.published.lock().unwrap().push(post.clone());
            Ok(PublishReceipt {
                uri: format!("at://did:plc:fake/app.bsky.feed.post/{}", post.record_id),
                cid: "bafyfake".to_string(),
                reply_uri: post.source_url.as_ref().map(|_| "at://reply".to_string()),
            })
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn platform(&self) -> &'static str {
            "fake"
        }
    }

    struct NoCaption;

    #[async_trait]
    impl CaptionComposer for NoCaption {
        async fn compose(&self, _data: &ScrapedData) -> Option<CaptionResult> {
            None
        }

        fn strategy(&self) -> &'static str {
            "assisted"
        }
    }

    struct Harness {
        store: Arc<FakeStore>,
        images: Arc<FakeImagePipeline>,
        publisher: Arc<FakePublisher>,
    }

    impl Harness {
        fn new(queue: &[&str], publisher: FakePublisher) -> Self {
            Self {
                store: Arc::new(FakeStore::with_queue(queue)),
                images: Arc::new(FakeImagePipeline::default()),
                publisher: Arc::new(publisher),
            }
        }

        fn run_once(
            &self,
            page: PageBehavior,
            dry_run: bool,
        ) -> RunOnce<
            FakeStore,
            FakePageSource,
            FakeImagePipeline,
            DeterministicComposer,
            FakePublisher,
        > {
            RunOnce::new(
                Arc::clone(&self.store),
                Arc::new(FakePageSource { behavior: page }),
                Arc::clone(&self.images),
                Arc::new(DeterministicComposer::default()),
                Arc::clone(&self.publisher),
                RunConfig { dry_run },
            )
        }
    }

    #[tokio::test]
    async fn test_run_publishes_and_commits() {
        let harness = Harness::new(&["100", "200"], FakePublisher::new(true, false));

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        match outcome {
            RunOutcome::Published {
                id,
                reply_uri,
                commit,
                ..
            } => {
                assert_eq!(id.as_str(), "100");
                assert_eq!(commit, CommitOutcome::Inserted);
                assert!(reply_uri.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(harness.store.posted("100"));
        assert_eq!(harness.store.queued(), vec!["200"]);
        assert_eq!(harness.images.discarded.load(Ordering::SeqCst), 1);

        let published = harness.publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].caption.text,
            "Photo 100 | 1935 | Workers on the viaduct."
        );
        assert_eq!(
            published[0].source_url.as_deref(),
            Some("https://archive.example/nodes/view/100")
        );
    }

    #[tokio::test]
    async fn test_run_on_empty_queue() {
        let harness = Harness::new(&[], FakePublisher::new(true, false));

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        assert!(matches!(outcome, RunOutcome::QueueEmpty));
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_record_queued() {
        let harness = Harness::new(&["100"], FakePublisher::new(true, true));

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                stage: RunStage::Publish,
                ..
            }
        ));
        assert!(!harness.store.posted("100"));
        assert_eq!(harness.store.queued(), vec!["100"]);
        assert_eq!(harness.images.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_forbidden_fetch_is_reported_as_fetch_failure() {
        let harness = Harness::new(&["100"], FakePublisher::new(true, false));

        let outcome = harness
            .run_once(PageBehavior::Forbidden, false)
            .run()
            .await
            .unwrap();

        match outcome {
            RunOutcome::Failed { stage, error, .. } => {
                assert_eq!(stage, RunStage::Fetch);
                assert!(error.contains("403"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(harness.store.queued(), vec!["100"]);
    }

    #[tokio::test]
    async fn test_missing_image_url_fails_without_download() {
        let harness = Harness::new(&["100"], FakePublisher::new(true, false));

        let outcome = harness
            .run_once(PageBehavior::NoImage, false)
            .run()
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                stage: RunStage::Image,
                ..
            }
        ));
        assert_eq!(harness.images.discarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_publisher_skips_without_commit() {
        let harness = Harness::new(&["100"], FakePublisher::new(false, false));

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        assert!(matches!(outcome, RunOutcome::Skipped { .. }));
        assert_eq!(harness.store.queued(), vec!["100"]);
        assert!(harness.publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_prepares_but_does_not_publish() {
        let harness = Harness::new(&["100"], FakePublisher::new(false, false));

        let outcome = harness.run_once(PageBehavior::Ok, true).run().await.unwrap();

        assert!(matches!(outcome, RunOutcome::DryRun { .. }));
        assert!(harness.publisher.published.lock().unwrap().is_empty());
        assert_eq!(harness.store.queued(), vec!["100"]);
        assert_eq!(harness.images.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_failure_leaves_record_queued() {
        let harness = Harness {
            images: Arc::new(FakeImagePipeline {
                fail: true,
                ..Default::default()
            }),
            ..Harness::new(&["100"], FakePublisher::new(true, false))
        };

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                stage: RunStage::Image,
                ..
            }
        ));
        assert_eq!(harness.store.queued(), vec!["100"]);
    }

    #[tokio::test]
    async fn test_missing_caption_skips_record() {
        let store = Arc::new(FakeStore::with_queue(&["100"]));
        let publisher = Arc::new(FakePublisher::new(true, false));
        let run_once = RunOnce::new(
            Arc::clone(&store),
            Arc::new(FakePageSource {
                behavior: PageBehavior::Ok,
            }),
            Arc::new(FakeImagePipeline::default()),
            Arc::new(NoCaption),
            Arc::clone(&publisher),
            RunConfig { dry_run: false },
        );

        let outcome = run_once.run().await.unwrap();

        match outcome {
            RunOutcome::Skipped { reason, .. } => assert!(reason.contains("assisted")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(store.queued(), vec!["100"]);
    }

    #[tokio::test]
    async fn test_already_posted_head_is_purged_before_publishing() {
        let harness = Harness::new(&["100", "200"], FakePublisher::new(true, false));
        harness.store.posted.lock().unwrap().insert(RecordId::from("100"));

        let outcome = harness.run_once(PageBehavior::Ok, false).run().await.unwrap();

        assert!(matches!(outcome, RunOutcome::Published { ref id, .. } if id.as_str() == "200"));
        assert!(harness.store.queued().is_empty());
    }
}
