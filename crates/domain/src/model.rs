//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Opaque identifier of an archive record
///
/// The archive hands out numeric node ids, but nothing here depends on that:
/// ids are compared and stored as their text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// A record waiting in the posting queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledRecord {
    /// Queue position (insertion order, ascending)
    pub position: i64,
    /// Archive record id
    pub id: RecordId,
    /// Human-readable label, unique within the queue
    pub description: String,
    /// Planning label assigned by the date backfill, display only
    pub post_date: Option<String>,
}

/// A record that has been published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedRecord {
    pub id: RecordId,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub posted_at: OffsetDateTime,
}

/// Result of inserting a posted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// A new posted record was written
    Inserted,
    /// The id was already recorded as posted; nothing was written
    AlreadyPresent,
}

/// Metadata extracted from an archive page
///
/// Every field uses the empty string as its "missing" value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedData {
    pub title: String,
    pub image_url: String,
    pub image_date: String,
    pub summary: String,
    pub alt_summary: String,
    pub node_url: String,
    pub description: String,
}

/// Post text produced by a caption composer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResult {
    /// Caption text, also used as image alt text
    pub text: String,
    /// Hashtags including the leading `#`
    pub tags: Vec<String>,
    /// Attribution extracted from the caption, if any
    pub creator_name: Option<String>,
}

impl CaptionResult {
    /// A plain caption with no tags or attribution
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: vec![],
            creator_name: None,
        }
    }
}

/// Input for a text-generation collaborator
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// Raw fields of the record
    pub data: ScrapedData,
    /// Character budget for the caption body
    pub max_chars: usize,
}

/// An image on local disk ready to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// Final image to upload
    pub path: PathBuf,
    /// Every file created while preparing the image, including `path`
    pub created_files: Vec<PathBuf>,
}

/// Content handed to a publisher
#[derive(Debug, Clone)]
pub struct ImagePost {
    pub record_id: RecordId,
    pub image_path: PathBuf,
    pub caption: CaptionResult,
    /// Link back to the archive page, when the page advertised one
    pub source_url: Option<String>,
}

/// Pipeline stage at which a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Fetch,
    Image,
    Publish,
    Commit,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Fetch => "fetch",
            RunStage::Image => "image",
            RunStage::Publish => "publish",
            RunStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Outcome of a single run
#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing left to post
    QueueEmpty,
    /// Record was published and the transition committed
    Published {
        id: RecordId,
        post_uri: String,
        reply_uri: Option<String>,
        commit: CommitOutcome,
    },
    /// Dry run: everything except publishing and committing happened
    DryRun { id: RecordId, caption: CaptionResult },
    /// A step was skipped on purpose; the record stays queued
    Skipped { id: RecordId, reason: String },
    /// A step failed; the record stays queued unless the stage is `Commit`
    Failed {
        id: RecordId,
        stage: RunStage,
        error: String,
    },
}
