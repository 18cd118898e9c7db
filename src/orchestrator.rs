//! Fan-out over every harvesting unit
//!
//! One unit is a (provider, region, project) triple of an active provider.
//! Units run as tokio tasks; a semaphore bounds how many run at once and a
//! single collector loop owns the results.

use crate::backend::ProviderBackend;
use crate::error::{HarvestError, ResolveError};
use crate::harvest::harvest_project;
use crate::identity::resolve_identity;
use crate::loader::SiteConfig;
use crate::model::ProjectRecord;
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_MAX_WORKERS: usize = 7;

/// Why a unit produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMatchingSla,
    AuthMethodMismatch,
    Connection,
    ServiceFetch,
    Unsupported,
    WorkerPanicked,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoMatchingSla => "no matching SLA",
            Self::AuthMethodMismatch => "auth method mismatch",
            Self::Connection => "connection failure",
            Self::ServiceFetch => "service fetch failure",
            Self::Unsupported => "unsupported provider",
            Self::WorkerPanicked => "worker panicked",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
    pub provider: String,
    pub region: String,
    pub project: String,
    pub reason: SkipReason,
    pub message: String,
}

/// Outcome of a whole run. Record order is unspecified.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub records: Vec<ProjectRecord>,
    pub skipped: Vec<SkippedUnit>,
}

/// Position of a unit inside its site configuration
#[derive(Debug, Clone, Copy)]
struct UnitRef {
    provider: usize,
    region: usize,
    project: usize,
}

struct Unit {
    site: Arc<SiteConfig>,
    at: UnitRef,
}

impl Unit {
    fn skipped(&self, reason: SkipReason, message: String) -> SkippedUnit {
        let provider = &self.site.providers[self.at.provider];
        SkippedUnit {
            provider: provider.name.clone(),
            region: provider.regions[self.at.region].name.clone(),
            project: provider.projects[self.at.project].id.clone(),
            reason,
            message,
        }
    }
}

/// Every unit of the active providers of `sites`. A provider name declared
/// by several sites is only harvested for its first declaration.
fn plan_units(sites: &[Arc<SiteConfig>]) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut seen = HashSet::new();
    for site in sites {
        for (p, provider) in site.providers.iter().enumerate() {
            if !seen.insert(provider.name.as_str()) {
                tracing::warn!(
                    "Provider {} declared again in {}, not harvesting this declaration",
                    provider.name,
                    site.source
                );
                continue;
            }
            if !provider.is_active() {
                tracing::info!(
                    "Skipping provider {}: status {}",
                    provider.name,
                    provider.status.as_str()
                );
                continue;
            }
            for region in 0..provider.regions.len() {
                for project in 0..provider.projects.len() {
                    units.push(Unit {
                        site: Arc::clone(site),
                        at: UnitRef {
                            provider: p,
                            region,
                            project,
                        },
                    });
                }
            }
        }
    }
    units
}

async fn run_unit(backend: &dyn ProviderBackend, unit: &Unit) -> Result<ProjectRecord, SkippedUnit> {
    let site = &unit.site;
    let provider = &site.providers[unit.at.provider];
    let region = &provider.regions[unit.at.region];
    let project = &provider.projects[unit.at.project];

    let identity = resolve_identity(project, &site.issuers, &provider.identity_providers).map_err(|e| {
        let reason = match e {
            ResolveError::NoMatchingSla { .. } => SkipReason::NoMatchingSla,
            ResolveError::AuthMethodMismatch { .. } => SkipReason::AuthMethodMismatch,
        };
        unit.skipped(reason, e.to_string())
    })?;

    harvest_project(backend, &site.source, provider, project, region, identity)
        .await
        .map_err(|e| {
            let reason = match e {
                HarvestError::Connection(_) => SkipReason::Connection,
                HarvestError::ServiceFetch { .. } => SkipReason::ServiceFetch,
                HarvestError::Unsupported(_) => SkipReason::Unsupported,
            };
            unit.skipped(reason, e.to_string())
        })
}

fn log_skip(skip: &SkippedUnit) {
    match skip.reason {
        SkipReason::NoMatchingSla => tracing::warn!(
            "Skipping project {} on {}/{}: {}",
            skip.project,
            skip.provider,
            skip.region,
            skip.message
        ),
        SkipReason::Unsupported => tracing::info!(
            "Skipping project {} on {}/{}: {}",
            skip.project,
            skip.provider,
            skip.region,
            skip.message
        ),
        _ => tracing::error!(
            "Skipping project {} on {}/{} ({}): {}",
            skip.project,
            skip.provider,
            skip.region,
            skip.reason,
            skip.message
        ),
    }
}

/// Harvest every unit of `sites` with at most `max_workers` units in flight.
///
/// A failing unit is reported in [`HarvestReport::skipped`] and never affects
/// the others.
pub async fn harvest_all(
    backend: Arc<dyn ProviderBackend>,
    sites: &[Arc<SiteConfig>],
    max_workers: usize,
) -> HarvestReport {
    let units = plan_units(sites);
    let workers = max_workers.max(1);
    tracing::info!("Harvesting {} units with {} workers", units.len(), workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for unit in units {
        let backend = Arc::clone(&backend);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(unit.skipped(SkipReason::WorkerPanicked, "worker pool closed".to_string())),
            };

            match AssertUnwindSafe(run_unit(backend.as_ref(), &unit)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(unit.skipped(SkipReason::WorkerPanicked, "harvesting task panicked".to_string())),
            }
        });
    }

    let mut report = HarvestReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(record)) => report.records.push(record),
            Ok(Err(skip)) => {
                log_skip(&skip);
                report.skipped.push(skip);
            }
            Err(e) => tracing::error!("Harvesting task failed: {}", e),
        }
    }

    tracing::info!(
        "Harvest finished: {} records, {} skipped units",
        report.records.len(),
        report.skipped.len()
    );
    report
}
