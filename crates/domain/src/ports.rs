//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use thiserror::Error;
use time::{Date, OffsetDateTime};

use crate::model::{
    CaptionRequest, CaptionResult, CommitOutcome, ImagePost, PostedRecord, PreparedImage,
    RecordId, ScheduledRecord, ScrapedData,
};

/// Error type for record store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for the persistent posted/scheduled tables
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// True iff a posted record with this id exists
    async fn is_posted(&self, id: &RecordId) -> Result<bool, StoreError>;

    /// Record a successful publish; an existing id is left untouched
    async fn commit_posted(
        &self,
        id: &RecordId,
        description: Option<&str>,
    ) -> Result<CommitOutcome, StoreError>;

    /// Earliest-inserted queue entry, without removing it
    async fn next_scheduled(&self) -> Result<Option<ScheduledRecord>, StoreError>;

    /// Remove an id from the queue; absent ids are not an error
    async fn remove_scheduled(&self, id: &RecordId) -> Result<(), StoreError>;

    /// Append a record to the queue
    async fn schedule(&self, id: &RecordId, description: &str) -> Result<(), StoreError>;

    /// Queue entries in queue order
    async fn list_scheduled(&self, limit: usize) -> Result<Vec<ScheduledRecord>, StoreError>;

    /// Number of queued entries
    async fn scheduled_count(&self) -> Result<u64, StoreError>;

    /// Look up a posted record
    async fn get_posted(&self, id: &RecordId) -> Result<Option<PostedRecord>, StoreError>;

    /// Reset every planning label; returns the number of rows touched
    async fn clear_scheduled_dates(&self) -> Result<u64, StoreError>;

    /// Label unlabelled queue entries two per day starting at `start`
    async fn backfill_scheduled_dates(&self, start: Date) -> Result<u64, StoreError>;

    /// Swap the records occupying two queue positions
    async fn swap_scheduled(&self, first: i64, second: i64) -> Result<(), StoreError>;
}

/// Error type for archive page fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Access forbidden (HTTP 403), the archive may be blocking automated requests")]
    Forbidden,
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Port for fetching and extracting an archive record page
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, id: &RecordId) -> Result<ScrapedData, FetchError>;
}

/// Error type for image preparation
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("No image URL")]
    MissingUrl,
    #[error("Download failed: {0}")]
    Download(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Processing(String),
}

/// Port for downloading and resizing the record image
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Download the image and shrink it if it is over the size threshold
    async fn prepare(&self, url: &str) -> Result<PreparedImage, ImageError>;

    /// Remove every file created by `prepare`
    async fn discard(&self, image: &PreparedImage);
}

/// Error type for publisher operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Publisher is disabled")]
    Disabled,
}

/// Result of a successful publish operation
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// URI of the image post
    pub uri: String,
    /// Content id of the image post
    pub cid: String,
    /// URI of the follow-up reply, when one was created
    pub reply_uri: Option<String>,
}

/// Port for publishing an image post
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &ImagePost) -> Result<PublishReceipt, PublishError>;

    /// False when credentials are missing or publishing is turned off
    fn is_enabled(&self) -> bool;

    /// Platform name (e.g., "bluesky")
    fn platform(&self) -> &'static str;
}

/// Error type for text generation
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("LLM API error: {0}")]
    Api(String),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Port for a language-model caption writer
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Return free-form caption text for the record
    async fn generate(&self, request: &CaptionRequest) -> Result<String, GenerateError>;
}

/// Port for turning scraped metadata into post text
#[async_trait]
pub trait CaptionComposer: Send + Sync {
    /// `None` means "do not post this run"
    async fn compose(&self, data: &ScrapedData) -> Option<CaptionResult>;

    /// Strategy name for logging
    fn strategy(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
