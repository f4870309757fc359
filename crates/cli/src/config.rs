//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub caption: CaptionConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub bluesky: BlueskyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default = "default_run_interval")]
    pub run_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_base_url")]
    pub base_url: String,

    #[serde(default = "default_archive_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    #[serde(default = "default_target_dimension")]
    pub target_width: u32,

    #[serde(default = "default_target_dimension")]
    pub target_height: u32,

    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// deterministic or assisted
    #[serde(default = "default_caption_strategy")]
    pub strategy: String,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    #[serde(default = "default_total_max_chars")]
    pub total_max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub stub: StubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

/// Offline provider; echoes title and summary unless `response` is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubConfig {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_bluesky_service_url")]
    pub service_url: String,

    #[serde(default = "default_bluesky_identifier_env")]
    pub identifier_env: String,

    #[serde(default = "default_bluesky_password_env")]
    pub password_env: String,

    #[serde(default = "default_reply_prefix")]
    pub reply_prefix: String,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("./nodes.db")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_run_interval() -> u64 {
    3600
}

fn default_archive_base_url() -> String {
    archive_poster_adapters::archive::DEFAULT_BASE_URL.to_string()
}

fn default_archive_timeout() -> u64 {
    30
}

fn default_max_file_size_bytes() -> u64 {
    500 * 1024
}

fn default_target_dimension() -> u32 {
    600
}

fn default_image_timeout() -> u64 {
    60
}

fn default_caption_strategy() -> String {
    "deterministic".to_string()
}

fn default_title_max_chars() -> usize {
    50
}

fn default_total_max_chars() -> usize {
    290
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.4
}

fn default_timeout() -> u64 {
    45
}

fn default_llm_retries() -> u32 {
    2
}

fn default_max_output_tokens() -> u32 {
    300
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base_url() -> String {
    archive_poster_adapters::llm::openai::DEFAULT_BASE_URL.to_string()
}

fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_base_url() -> String {
    archive_poster_adapters::llm::anthropic::DEFAULT_BASE_URL.to_string()
}

fn default_bluesky_service_url() -> String {
    archive_poster_adapters::bluesky::DEFAULT_SERVICE_URL.to_string()
}

fn default_bluesky_identifier_env() -> String {
    "BLUESKY_USERNAME".to_string()
}

fn default_bluesky_password_env() -> String {
    "BLUESKY_PASSWORD".to_string()
}

fn default_reply_prefix() -> String {
    archive_poster_adapters::bluesky::DEFAULT_REPLY_PREFIX.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            dry_run: default_true(),
            run_interval_secs: default_run_interval(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_archive_base_url(),
            timeout_secs: default_archive_timeout(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            target_width: default_target_dimension(),
            target_height: default_target_dimension(),
            timeout_secs: default_image_timeout(),
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            strategy: default_caption_strategy(),
            title_max_chars: default_title_max_chars(),
            total_max_chars: default_total_max_chars(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
            retries: default_llm_retries(),
            max_output_tokens: default_max_output_tokens(),
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            stub: StubConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_api_key_env(),
            base_url: default_openai_base_url(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_anthropic_api_key_env(),
            base_url: default_anthropic_base_url(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service_url: default_bluesky_service_url(),
            identifier_env: default_bluesky_identifier_env(),
            password_env: default_bluesky_password_env(),
            reply_prefix: default_reply_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // ARCHIVE_POSTER__GENERAL__DATABASE_PATH=... overrides [general] database_path
        builder = builder.add_source(
            config::Environment::with_prefix("ARCHIVE_POSTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# archive-poster configuration

[general]
database_path = "./nodes.db"
work_dir = "./work"
log_level = "info"
dry_run = true
run_interval_secs = 3600

[archive]
base_url = "https://digital.denverlibrary.org"
timeout_secs = 30

[image]
# Larger downloads are resized to fit target_width x target_height
max_file_size_bytes = 512000
target_width = 600
target_height = 600
timeout_secs = 60

[caption]
strategy = "deterministic"  # deterministic, assisted
title_max_chars = 50
total_max_chars = 290

[llm]
provider = "openai"  # openai, anthropic, stub
model = "gpt-4o-mini"
temperature = 0.4
timeout_secs = 45
retries = 2
max_output_tokens = 300

[llm.openai]
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com/v1"

[llm.anthropic]
api_key_env = "ANTHROPIC_API_KEY"
base_url = "https://api.anthropic.com/v1"

[llm.stub]
# response = "Fixed caption #denver\nCreator Name: Unknown"

[bluesky]
service_url = "https://bsky.social"
identifier_env = "BLUESKY_USERNAME"
password_env = "BLUESKY_PASSWORD"
reply_prefix = "DPL Archive post: "
"#
        .to_string()
    }
}
