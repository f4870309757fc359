//! Preview command - fetch a record and show the caption that would be posted

use anyhow::{Context, Result};
use archive_poster_domain::{CaptionResult, PageSource, RecordId, ScrapedData};
use serde::Serialize;
use std::path::PathBuf;

use crate::args::PreviewArgs;
use crate::commands::run::{build_composer, build_page_source};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct PreviewOutput {
    id: RecordId,
    page_url: String,
    strategy: &'static str,
    data: ScrapedData,
    caption: Option<CaptionResult>,
}

pub async fn execute(args: PreviewArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();

    let id = RecordId::new(args.id.trim());
    if id.is_empty() {
        anyhow::bail!("Record id must not be empty");
    }

    let page_source = build_page_source(&config);
    let composer = build_composer(&config)?;

    let data = page_source
        .fetch(&id)
        .await
        .with_context(|| format!("Failed to fetch record {}", id))?;
    let caption = composer.compose(&data).await;

    let output = PreviewOutput {
        page_url: page_source.page_url(&id),
        id,
        strategy: composer.strategy(),
        data,
        caption,
    };

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
        println!("{}", json);
        return Ok(());
    }

    println!("Record {}", output.id);
    println!("==========");
    println!();
    println!("Page:    {}", output.page_url);
    println!("Title:   {}", output.data.title);
    println!("Date:    {}", output.data.image_date);
    println!("Image:   {}", output.data.image_url);
    println!("Summary: {}", output.data.summary);
    if !output.data.alt_summary.is_empty() {
        println!("Alt:     {}", output.data.alt_summary);
    }
    println!();

    match &output.caption {
        Some(caption) => {
            println!(
                "Caption ({}, {} chars):",
                output.strategy,
                caption.text.chars().count()
            );
            println!("  {}", caption.text);
            if !caption.tags.is_empty() {
                println!("Tags: {}", caption.tags.join(" "));
            }
            if let Some(creator) = &caption.creator_name {
                println!("Creator: {}", creator);
            }
        }
        None => println!(
            "No caption available ({} strategy), a run would skip this record",
            output.strategy
        ),
    }

    Ok(())
}
