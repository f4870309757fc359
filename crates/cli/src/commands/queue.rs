//! Queue command - inspect and edit the scheduled queue

use anyhow::{Context, Result, bail};
use archive_poster_adapters::state::SqliteRecordStore;
use archive_poster_domain::{RecordId, RecordStore};
use std::path::PathBuf;
use time::Date;

use crate::args::{QueueArgs, QueueCommands};
use crate::config::AppConfig;

pub async fn execute(args: QueueArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let store = SqliteRecordStore::new(&config.general.database_path)
        .await
        .context("Failed to open record store")?;

    let result = dispatch(&store, args.command).await;
    store.close().await;
    result
}

async fn dispatch(store: &SqliteRecordStore, command: QueueCommands) -> Result<()> {
    match command {
        QueueCommands::List { limit, json } => list(store, limit, json).await,
        QueueCommands::Add { id, description } => add(store, id, description).await,
        QueueCommands::Status { id } => status(store, id).await,
        QueueCommands::ClearDates => {
            let cleared = store
                .clear_scheduled_dates()
                .await
                .context("Failed to clear post dates")?;
            println!("Cleared post dates on {} queued records", cleared);
            Ok(())
        }
        QueueCommands::BackfillDates { start } => {
            let start = parse_date(&start)?;
            let labelled = store
                .backfill_scheduled_dates(start)
                .await
                .context("Failed to backfill post dates")?;
            println!("Assigned post dates to {} queued records", labelled);
            Ok(())
        }
        QueueCommands::Swap { first, second } => {
            store
                .swap_scheduled(first, second)
                .await
                .with_context(|| format!("Failed to swap positions {} and {}", first, second))?;
            println!("Swapped queue positions {} and {}", first, second);
            Ok(())
        }
    }
}

async fn list(store: &SqliteRecordStore, limit: usize, json: bool) -> Result<()> {
    let records = store
        .list_scheduled(limit)
        .await
        .context("Failed to list queue")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let total = store.scheduled_count().await?;
    println!("Queued records ({} of {})", records.len(), total);
    println!("========================");

    if records.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{:>5}  {:<10}  {:<14}  {}",
            record.position,
            record.id.as_str(),
            record.post_date.as_deref().unwrap_or("-"),
            record.description
        );
    }

    Ok(())
}

async fn add(store: &SqliteRecordStore, id: String, description: String) -> Result<()> {
    let id = RecordId::new(id.trim());
    if id.is_empty() {
        bail!("Record id must not be empty");
    }

    let description = description.trim();
    if description.is_empty() {
        bail!("Description must not be empty");
    }

    if store.is_posted(&id).await? {
        bail!("Record {} has already been posted", id);
    }

    store
        .schedule(&id, description)
        .await
        .with_context(|| format!("Failed to queue record {}", id))?;

    tracing::info!(id = %id, "Record queued");
    println!("Queued record {}", id);
    Ok(())
}

async fn status(store: &SqliteRecordStore, id: String) -> Result<()> {
    let id = RecordId::new(id.trim());

    if let Some(posted) = store.get_posted(&id).await? {
        println!("Record {}: posted at {}", id, posted.posted_at);
        if let Some(description) = posted.description {
            println!("  {}", description);
        }
        return Ok(());
    }

    let total = store.scheduled_count().await?;
    let queued = store
        .list_scheduled(usize::try_from(total).unwrap_or(usize::MAX))
        .await?;

    match queued.iter().position(|record| record.id == id) {
        Some(index) => {
            let record = &queued[index];
            println!(
                "Record {}: queued at position {} ({} ahead)",
                id, record.position, index
            );
            println!("  {}", record.description);
        }
        None => println!("Record {}: unknown", id),
    }

    Ok(())
}

fn parse_date(value: &str) -> Result<Date> {
    let format = time::format_description::parse("[year]-[month]-[day]")
        .context("Invalid date format description")?;

    Date::parse(value.trim(), &format)
        .with_context(|| format!("Invalid start date {:?}, expected YYYY-MM-DD", value))
}
