//! Hourly batch orchestration over the whole entity registry.
//!
//! Entities run one at a time in registry order with a fixed pause between
//! them. A failing entity is recorded and the run moves on. Only one run is
//! active at a time: scheduled ticks that would overlap are skipped, manual
//! requests are refused with [`SchedulerError::AlreadyRunning`].

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::registry::{EntityDescriptor, EntityKind, Registry};
use crate::sync::engine::elapsed_ms;
use crate::sync::FullMigrationReport;

pub mod transport;

pub use transport::{HttpTransport, InProcessTransport, MigrationTransport, TransportError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("A migration run is already in progress")]
    AlreadyRunning,

    #[error("Invalid scheduler UTC offset: {0} minutes")]
    InvalidOffset(i32),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub utc_offset: FixedOffset,
    pub entity_delay: Duration,
}

impl TryFrom<&SchedulerConfig> for SchedulerSettings {
    type Error = SchedulerError;

    fn try_from(config: &SchedulerConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            enabled: config.enabled,
            utc_offset: config
                .utc_offset()
                .ok_or(SchedulerError::InvalidOffset(config.utc_offset_minutes))?,
            entity_delay: Duration::from_millis(config.entity_delay_ms),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRunSummary {
    pub entity: EntityKind,
    pub display_name: String,
    pub success: bool,
    /// Rows created from the sheet
    pub imported: u32,
    /// Records overwritten from the sheet
    pub updated: u32,
    /// Records written to the sheet
    pub synced: u32,
    pub skipped: u32,
    pub errors: u32,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntityRunSummary {
    fn from_report(entity: &EntityDescriptor, report: &FullMigrationReport, duration_ms: u64) -> Self {
        let import = report.import.counts();
        let sync = report.sync.counts();
        let both = import.into_iter().chain(sync);

        let (skipped, errors) = both.fold((0, 0), |(s, e), r| (s + r.skipped, e + r.errors));
        Self {
            entity: entity.kind,
            display_name: entity.display_name.clone(),
            success: report.success(),
            imported: import.map(|r| r.imported).unwrap_or_default(),
            updated: import.map(|r| r.updated).unwrap_or_default(),
            synced: sync.map(|r| r.success_count()).unwrap_or_default(),
            skipped,
            errors,
            duration_ms,
            error: report.error(),
        }
    }

    fn failed(entity: &EntityDescriptor, error: String, duration_ms: u64) -> Self {
        Self {
            entity: entity.kind,
            display_name: entity.display_name.clone(),
            success: false,
            imported: 0,
            updated: 0,
            synced: 0,
            skipped: 0,
            errors: 0,
            duration_ms,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTotals {
    pub entities: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub imported: u32,
    pub updated: u32,
    pub synced: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl RunTotals {
    fn add(&mut self, summary: &EntityRunSummary) {
        self.entities += 1;
        if summary.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.imported += summary.imported;
        self.updated += summary.updated;
        self.synced += summary.synced;
        self.skipped += summary.skipped;
        self.errors += summary.errors;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub entities: Vec<EntityRunSummary>,
    pub totals: RunTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntity {
    pub entity: EntityKind,
    pub display_name: String,
    pub slug: String,
    pub sheet: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub timezone: String,
    pub transport: &'static str,
    pub entity_delay_ms: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run: Option<AggregateResult>,
    pub entities: Vec<ScheduledEntity>,
}

/// Clears the running flag when a run ends, including on panic
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MigrationScheduler {
    registry: Arc<Registry>,
    transport: Arc<dyn MigrationTransport>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    running: AtomicBool,
    last_run: RwLock<Option<AggregateResult>>,
}

impl MigrationScheduler {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn MigrationTransport>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            registry,
            transport,
            clock,
            settings,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Full migration of every registered entity, in registry order
    pub async fn run_all(&self, trigger: RunTrigger) -> Result<AggregateResult, SchedulerError> {
        let _guard = self.try_begin().ok_or(SchedulerError::AlreadyRunning)?;

        let started_at = self.clock.now();
        info!(
            "Starting {:?} migration run over {} entities via {}",
            trigger,
            self.registry.len(),
            self.transport.name()
        );

        let mut entities = Vec::with_capacity(self.registry.len());
        let mut totals = RunTotals::default();
        for (index, entity) in self.registry.iter().enumerate() {
            if index > 0 && !self.settings.entity_delay.is_zero() {
                self.clock.sleep(self.settings.entity_delay).await;
            }
            let summary = self.run_entity(entity).await;
            totals.add(&summary);
            entities.push(summary);
        }

        let finished_at = self.clock.now();
        let result = AggregateResult {
            trigger,
            started_at,
            finished_at,
            duration_ms: elapsed_ms(started_at, finished_at),
            entities,
            totals,
        };
        info!(
            "Migration run finished in {}ms: {} succeeded, {} failed",
            result.duration_ms, result.totals.succeeded, result.totals.failed
        );

        *self.last_run.write().await = Some(result.clone());
        Ok(result)
    }

    async fn run_entity(&self, entity: &EntityDescriptor) -> EntityRunSummary {
        let started = self.clock.now();
        let outcome = self.transport.full_migration(entity.kind).await;
        let duration_ms = elapsed_ms(started, self.clock.now());

        match outcome {
            Ok(report) => {
                let summary = EntityRunSummary::from_report(entity, &report, duration_ms);
                if let Some(error) = &summary.error {
                    warn!("{} migration finished with errors: {}", entity.display_name, error);
                }
                summary
            }
            Err(e) => {
                error!("{} migration failed: {}", entity.display_name, e);
                EntityRunSummary::failed(entity, e.to_string(), duration_ms)
            }
        }
    }

    /// Full migration of one entity looked up by display name, key or slug
    pub async fn run_one(&self, name: &str) -> Result<FullMigrationReport, SchedulerError> {
        let entity = self
            .registry
            .resolve(name)
            .map_err(|_| SchedulerError::EntityNotFound(name.to_string()))?;
        let _guard = self.try_begin().ok_or(SchedulerError::AlreadyRunning)?;

        info!("Running migration for {} on demand", entity.display_name);
        Ok(self.transport.full_migration(entity.kind).await?)
    }

    /// Scheduled run; skipped with a warning when a run is already active
    pub async fn tick(&self) -> Option<AggregateResult> {
        match self.run_all(RunTrigger::Scheduled).await {
            Ok(result) => Some(result),
            Err(SchedulerError::AlreadyRunning) => {
                warn!("Skipping scheduled migration run: previous run still in progress");
                None
            }
            Err(e) => {
                error!("Scheduled migration run failed: {}", e);
                None
            }
        }
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        next_run_after(self.clock.now(), self.settings.utc_offset)
    }

    /// Drive the hourly schedule until shutdown is signalled
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.settings.enabled {
                info!("Migration scheduler disabled");
                return;
            }

            loop {
                let next = self.next_run();
                info!("Next scheduled migration run at {}", next.with_timezone(&self.settings.utc_offset));

                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Migration scheduler stopping");
                        break;
                    }
                    _ = self.clock.sleep_until(next) => {
                        self.tick().await;
                    }
                }
            }
        })
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            enabled: self.settings.enabled,
            running: self.is_running(),
            timezone: format!("UTC{}", self.settings.utc_offset),
            transport: self.transport.name(),
            entity_delay_ms: self.settings.entity_delay.as_millis() as u64,
            next_run_at: self.settings.enabled.then(|| self.next_run()),
            last_run: self.last_run.read().await.clone(),
            entities: self
                .registry
                .iter()
                .map(|e| ScheduledEntity {
                    entity: e.kind,
                    display_name: e.display_name.clone(),
                    slug: e.kind.slug(),
                    sheet: e.sheet_name.clone(),
                })
                .collect(),
        }
    }
}

/// Next top of the hour strictly after `now`, on the wall clock of `offset`
pub fn next_run_after(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let top_of_hour = local
        .date_naive()
        .and_hms_opt(local.hour(), 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single());

    match top_of_hour {
        Some(hour) => (hour + ChronoDuration::hours(1)).with_timezone(&Utc),
        None => now + ChronoDuration::hours(1),
    }
}
