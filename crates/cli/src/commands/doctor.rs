//! Doctor command - validate configuration and show status

use anyhow::Result;
use archive_poster_adapters::state::SqliteRecordStore;
use archive_poster_domain::RecordStore;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    database: CheckResult,
    caption: CheckResult,
    bluesky: CheckResult,
    work_dir: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        database: CheckResult::error("Not checked"),
        caption: CheckResult::error("Not checked"),
        bluesky: CheckResult::error("Not checked"),
        work_dir: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.database = check_database(&config.general.database_path).await;
        report.caption = check_caption(config);
        report.bluesky = check_bluesky(config);
        report.work_dir = check_work_dir(&config.general.work_dir);
    }

    let checks = [
        &report.config,
        &report.database,
        &report.caption,
        &report.bluesky,
        &report.work_dir,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_database(path: &Path) -> CheckResult {
    let store = match SqliteRecordStore::new(path).await {
        Ok(store) => store,
        Err(e) => {
            return CheckResult::error(format!(
                "Failed to open database {}: {}",
                path.display(),
                e
            ));
        }
    };

    let counts = match store.scheduled_count().await {
        Ok(queued) => {
            let next = store.next_scheduled().await.ok().flatten();
            Ok((queued, next))
        }
        Err(e) => Err(e),
    };
    store.close().await;

    match counts {
        Ok((0, _)) => CheckResult::warn(format!("{}: queue is empty", path.display())),
        Ok((queued, next)) => CheckResult::ok(format!(
            "{}: {} records queued",
            path.display(),
            queued
        ))
        .with_details(serde_json::json!({
            "queued": queued,
            "next_id": next.map(|record| record.id),
        })),
        Err(e) => CheckResult::error(format!("Failed to read queue: {}", e)),
    }
}

fn check_caption(config: &AppConfig) -> CheckResult {
    let strategy = config.caption.strategy.as_str();
    let limits = format!(
        "title {} / total {} chars",
        config.caption.title_max_chars, config.caption.total_max_chars
    );

    if config.caption.title_max_chars >= config.caption.total_max_chars {
        return CheckResult::error(format!(
            "title_max_chars must be below total_max_chars ({})",
            limits
        ));
    }

    match strategy {
        "deterministic" => CheckResult::ok(format!("Strategy: deterministic, {}", limits)),
        "assisted" => check_llm(config, &limits),
        other => CheckResult::error(format!("Unknown caption strategy: {}", other)),
    }
}

fn check_llm(config: &AppConfig, limits: &str) -> CheckResult {
    let provider = &config.llm.provider;
    let model = &config.llm.model;

    let api_key_env = match provider.as_str() {
        "openai" => &config.llm.openai.api_key_env,
        "anthropic" => &config.llm.anthropic.api_key_env,
        "stub" => {
            return CheckResult::ok(format!(
                "Strategy: assisted, Provider: stub (offline), {}",
                limits
            ));
        }
        other => return CheckResult::error(format!("Unknown LLM provider: {}", other)),
    };

    if api_key_env.is_empty() {
        return CheckResult::error(format!("No API key env var configured for {}", provider));
    }

    // Only report whether the key is set, never its value
    match std::env::var(api_key_env) {
        Ok(val) if !val.is_empty() => CheckResult::ok(format!(
            "Strategy: assisted, Provider: {}, Model: {}, API key: {} (set)",
            provider, model, api_key_env
        )),
        _ => CheckResult::warn(format!(
            "Strategy: assisted, Provider: {}, Model: {}, API key: {} (not set, runs will skip)",
            provider, model, api_key_env
        )),
    }
}

fn check_bluesky(config: &AppConfig) -> CheckResult {
    let identifier_env = &config.bluesky.identifier_env;
    let password_env = &config.bluesky.password_env;

    if identifier_env.is_empty() || password_env.is_empty() {
        return CheckResult::error("Bluesky credential env vars are not configured");
    }

    let is_set = |name: &str| std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
    let dry_run = if config.general.dry_run {
        ", dry_run enabled"
    } else {
        ""
    };

    if is_set(identifier_env) && is_set(password_env) {
        CheckResult::ok(format!(
            "Service: {}, Credentials: {} / {} (set){}",
            config.bluesky.service_url, identifier_env, password_env, dry_run
        ))
    } else {
        CheckResult::warn(format!(
            "Service: {}, Credentials: {} / {} (not set, runs will skip){}",
            config.bluesky.service_url, identifier_env, password_env, dry_run
        ))
    }
}

fn check_work_dir(dir: &Path) -> CheckResult {
    match std::fs::create_dir_all(dir) {
        Ok(()) => CheckResult::ok(format!("{} is writable", dir.display())),
        Err(e) => CheckResult::error(format!("Cannot create {}: {}", dir.display(), e)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("archive-poster Doctor Report");
    println!("============================");
    println!();

    print_check("Config", &report.config);
    print_check("Database", &report.database);
    print_check("Caption", &report.caption);
    print_check("Bluesky", &report.bluesky);
    print_check("Work dir", &report.work_dir);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: archive-poster run --dry-run --once");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
