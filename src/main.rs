use anyhow::{Context, Result};
use clap::Parser;
use fedreg_feeder::backend::{OpenstackBackend, ProviderBackend};
use fedreg_feeder::catalog::{self, CatalogClient};
use fedreg_feeder::config::{Args, LogLevel, Settings};
use fedreg_feeder::loader::{self, SiteConfig};
use fedreg_feeder::orchestrator;
use fedreg_feeder::VERSION;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn setup_logging(level: LogLevel, to_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let file_level = match (to_file, level.to_tracing_level()) {
        (true, Some(file_level)) => file_level,
        _ => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            return None;
        }
    };

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => file,
        Err(e) => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            tracing::warn!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_writer(non_blocking.with_max_level(file_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!("Log file: {:?}", log_path);
    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("fedreg-feeder").join("fedreg-feeder.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".fedreg-feeder").join("fedreg-feeder.log");
    }
    PathBuf::from("fedreg-feeder.log")
}

/// Token used against the Federation Registry: explicit one, else the first
/// loaded issuer token
fn catalog_token(settings: &Settings, sites: &[Arc<SiteConfig>]) -> Option<String> {
    settings.catalog_token.clone().or_else(|| {
        sites
            .iter()
            .flat_map(|s| s.issuers.iter())
            .map(|i| i.token.clone())
            .find(|t| !t.is_empty())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file);

    let settings = Settings::from_args(&args)?;
    tracing::info!("fedreg-feeder {} started with log level: {:?}", VERSION, args.log_level);
    tracing::debug!("{:?}", settings);

    let endpoints = settings.catalog_endpoints()?;
    tracing::debug!("{:?}", endpoints);

    let loaded = loader::load_all(&settings.providers_conf_dir, &settings.oidc_agent_container_name).await?;
    // Providers of a rejected document would look stale to the registry
    let remove_stale = loaded.is_complete();
    if !remove_stale {
        tracing::warn!(
            "{} site documents rejected, stored providers will not be removed",
            loaded.rejected.len()
        );
    }
    let sites = loaded.sites;

    let backend: Arc<dyn ProviderBackend> = Arc::new(OpenstackBackend::new(settings.provider_timeout)?);
    let report = orchestrator::harvest_all(backend, &sites, settings.max_workers).await;
    let skipped = report.skipped.len();

    let providers = catalog::assemble(&sites, report.records);

    if settings.dry_run {
        let payload = serde_json::to_string_pretty(&providers).context("Failed to serialize providers")?;
        println!("{}", payload);
        tracing::info!("Dry run: {} providers not published ({} skipped units)", providers.len(), skipped);
        return Ok(());
    }

    let token = catalog_token(&settings, &sites)
        .context("No Federation Registry token: set FEDREG_TOKEN or configure at least one issuer")?;
    let client = CatalogClient::new(&endpoints, &token, settings.catalog_timeout)?;
    let summary = catalog::publish(&client, &providers, remove_stale)
        .await
        .context("Failed to update the Federation Registry")?;

    tracing::info!(
        "Federation Registry updated: {} created, {} updated, {} unchanged, {} removed ({} skipped units)",
        summary.created,
        summary.updated,
        summary.unchanged,
        summary.removed,
        skipped
    );
    Ok(())
}
