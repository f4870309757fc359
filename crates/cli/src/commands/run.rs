//! Run command - post the next queued record, once or on an interval

use anyhow::{Context, Result, bail};
use archive_poster_adapters::{
    archive::{ArchivePageSource, browser_client},
    bluesky::BlueskyPublisher,
    image_pipeline::{HttpImagePipeline, ImagePipelineConfig},
    llm::{AnthropicGenerator, LlmConfig as AdapterLlmConfig, OpenAiGenerator, StubTextGenerator},
    state::SqliteRecordStore,
};
use archive_poster_domain::{
    CaptionComposer, Publisher, RunOutcome, TextGenerator,
    usecases::{AssistedComposer, CaptionLimits, DeterministicComposer, RunConfig, RunOnce},
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::args::RunArgs;
use crate::config::AppConfig;

/// Collaborators shared by every tick; the store is opened per run
struct RunDeps {
    page_source: Arc<ArchivePageSource>,
    image_pipeline: Arc<HttpImagePipeline>,
    composer: Arc<dyn CaptionComposer>,
    publisher: Arc<dyn Publisher>,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let dry_run = args.dry_run || config.general.dry_run;

    tracing::info!(
        dry_run = dry_run,
        once = args.once,
        database = %config.general.database_path.display(),
        strategy = %config.caption.strategy,
        "Starting archive-poster run"
    );

    let deps = RunDeps {
        page_source: Arc::new(build_page_source(&config)),
        image_pipeline: Arc::new(build_image_pipeline(&config)),
        composer: build_composer(&config)?,
        publisher: build_publisher(&config, dry_run),
    };

    if args.once {
        let outcome = run_tick(&deps, &config, dry_run).await?;
        log_outcome(&outcome);
    } else {
        let mut ticker = interval(Duration::from_secs(config.general.run_interval_secs.max(1)));

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        };

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match run_tick(&deps, &config, dry_run).await {
                        Ok(outcome) => log_outcome(&outcome),
                        Err(e) => tracing::error!(error = %e, "Run failed"),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down gracefully");
                    break;
                }
            }
        }
    }

    tracing::info!("archive-poster run completed");
    Ok(())
}

/// One run against a freshly opened store; the store is closed on every path
async fn run_tick(deps: &RunDeps, config: &AppConfig, dry_run: bool) -> Result<RunOutcome> {
    let store = Arc::new(
        SqliteRecordStore::new(&config.general.database_path)
            .await
            .context("Failed to open record store")?,
    );

    let run_once = RunOnce::new(
        store.clone(),
        deps.page_source.clone(),
        deps.image_pipeline.clone(),
        deps.composer.clone(),
        deps.publisher.clone(),
        RunConfig { dry_run },
    );

    let result = run_once.run().await;
    store.close().await;

    result.context("Failed to select the next record")
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::QueueEmpty => tracing::info!("Queue is empty"),
        RunOutcome::Published {
            id,
            post_uri,
            reply_uri,
            commit,
        } => tracing::info!(
            id = %id,
            post_uri = %post_uri,
            reply_uri = ?reply_uri,
            commit = ?commit,
            "Published"
        ),
        RunOutcome::DryRun { id, caption } => tracing::info!(
            id = %id,
            caption = %caption.text,
            tags = ?caption.tags,
            creator = ?caption.creator_name,
            "Dry run, nothing published"
        ),
        RunOutcome::Skipped { id, reason } => {
            tracing::warn!(id = %id, reason = %reason, "Skipped")
        }
        RunOutcome::Failed { id, stage, error } => {
            tracing::error!(id = %id, stage = %stage, error = %error, "Failed")
        }
    }
}

pub(crate) fn build_page_source(config: &AppConfig) -> ArchivePageSource {
    ArchivePageSource::with_base_url(
        config.archive.base_url.clone(),
        Duration::from_secs(config.archive.timeout_secs),
    )
}

fn build_image_pipeline(config: &AppConfig) -> HttpImagePipeline {
    // Image hosts sit behind the same browser check as the pages
    let client = browser_client(
        &config.archive.base_url,
        Duration::from_secs(config.image.timeout_secs),
    );

    HttpImagePipeline::with_client(
        client,
        ImagePipelineConfig {
            work_dir: config.general.work_dir.clone(),
            max_file_size_bytes: config.image.max_file_size_bytes,
            target_width: config.image.target_width,
            target_height: config.image.target_height,
            timeout_secs: config.image.timeout_secs,
        },
    )
}

pub(crate) fn caption_limits(config: &AppConfig) -> CaptionLimits {
    CaptionLimits {
        title_max_chars: config.caption.title_max_chars,
        total_max_chars: config.caption.total_max_chars,
    }
}

pub(crate) fn build_composer(config: &AppConfig) -> Result<Arc<dyn CaptionComposer>> {
    let limits = caption_limits(config);

    match config.caption.strategy.as_str() {
        "deterministic" => Ok(Arc::new(DeterministicComposer::new(limits))),
        "assisted" => match build_text_generator(config) {
            Ok(generator) => Ok(Arc::new(AssistedComposer::new(generator, limits))),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Text generator unavailable, assisted captions will be skipped"
                );
                Ok(Arc::new(AssistedComposer::<dyn TextGenerator>::unavailable(
                    limits,
                )))
            }
        },
        other => bail!("Unknown caption strategy: {}", other),
    }
}

pub(crate) fn build_text_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    let llm_config = adapter_llm_config(&config.llm);

    match config.llm.provider.as_str() {
        "openai" => {
            let api_key = load_api_key(&config.llm.openai.api_key_env, "openai")?;
            Ok(Arc::new(OpenAiGenerator::with_base_url(
                api_key,
                config.llm.openai.base_url.clone(),
                llm_config,
            )))
        }
        "anthropic" => {
            let api_key = load_api_key(&config.llm.anthropic.api_key_env, "anthropic")?;
            Ok(Arc::new(AnthropicGenerator::with_base_url(
                api_key,
                config.llm.anthropic.base_url.clone(),
                llm_config,
            )))
        }
        "stub" => Ok(Arc::new(match &config.llm.stub.response {
            Some(text) => StubTextGenerator::with_response(text.clone()),
            None => StubTextGenerator::echo(),
        })),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

fn adapter_llm_config(config: &crate::config::LlmConfig) -> AdapterLlmConfig {
    AdapterLlmConfig {
        model: config.model.clone(),
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
        timeout_secs: config.timeout_secs,
        retries: config.retries,
    }
}

fn build_publisher(config: &AppConfig, dry_run: bool) -> Arc<dyn Publisher> {
    if dry_run {
        return Arc::new(BlueskyPublisher::disabled());
    }

    let identifier = load_env_value(&config.bluesky.identifier_env, "bluesky identifier");
    let password = load_api_key(&config.bluesky.password_env, "bluesky password");

    match (identifier, password) {
        (Ok(identifier), Ok(password)) => Arc::new(BlueskyPublisher::with_service_url(
            config.bluesky.service_url.clone(),
            identifier,
            password,
            config.bluesky.reply_prefix.clone(),
        )),
        (identifier, password) => {
            for e in [identifier.err(), password.err()].into_iter().flatten() {
                tracing::warn!(error = %e, "Bluesky credentials missing, publishing disabled");
            }
            Arc::new(BlueskyPublisher::disabled())
        }
    }
}

pub(crate) fn load_env_value(env_var: &str, purpose: &str) -> Result<String> {
    if env_var.trim().is_empty() {
        bail!("No env var configured for {}", purpose);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing env var {} for {}", env_var, purpose))?;

    if value.trim().is_empty() {
        bail!("Env var {} is empty for {}", env_var, purpose);
    }

    Ok(value)
}

pub(crate) fn load_api_key(env_var: &str, purpose: &str) -> Result<SecretString> {
    load_env_value(env_var, purpose).map(|key| SecretString::new(key.into()))
}
