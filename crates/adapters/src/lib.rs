//! archive-poster adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `state`: SQLite and in-memory record stores
//! - `archive`: archive page scraper
//! - `image_pipeline`: image download and resize
//! - `bluesky`: Bluesky publishing adapter
//! - `llm`: LLM text generators (OpenAI, Anthropic, stub)

mod state_memory;
mod state_sqlite;

pub mod archive;
pub mod bluesky;
pub mod image_pipeline;
pub mod llm;

/// Re-exports for state adapters
pub mod state {
    pub use crate::state_memory::InMemoryRecordStore;
    pub use crate::state_sqlite::SqliteRecordStore;
}
