//! In-process fakes for exercising the sync engine, the scheduler and the
//! HTTP surface without a database, a spreadsheet or wall-clock waits.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::app::{blank_workbook, AppState};
use crate::clock::Clock;
use crate::database::{MemoryRecordStore, RecordStore};
use crate::registry::{EntityDefinition, EntityDescriptor, EntityKind, Registry};
use crate::scheduler::{InProcessTransport, MigrationScheduler, MigrationTransport, SchedulerSettings, TransportError};
use crate::sheets::{GatewayError, MemorySheetGateway, SheetSnapshot, SpreadsheetGateway};
use crate::sync::{FullMigrationReport, PassOutcome, SyncEngine, SyncOptions, SyncResult};
use crate::types::SheetRow;

/// Sheet row from `(column, value)` pairs
pub fn row(pairs: &[(&str, &str)]) -> SheetRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Clock whose sleeps return at once and move time forward
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    park_after: Mutex<Option<usize>>,
    parked: Notify,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            park_after: Mutex::new(None),
            parked: Notify::new(),
        }
    }

    /// Once `sleeps` sleeps have returned, further sleeps never complete
    pub fn park_after(&self, sleeps: usize) {
        *self.park_after.lock().unwrap() = Some(sleeps);
    }

    /// Resolves once a sleep has parked
    pub async fn wait_parked(&self) {
        self.parked.notified().await;
    }

    /// 2024-03-04 14:25:00 UTC
    pub fn fixed() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 3, 4, 14, 25, 0).unwrap())
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        let limit = *self.park_after.lock().unwrap();
        let taken = self.sleeps.lock().unwrap().len();
        if limit.is_some_and(|limit| taken >= limit) {
            self.parked.notify_one();
            std::future::pending::<()>().await;
        }

        self.sleeps.lock().unwrap().push(duration);
        self.advance(chrono::Duration::from_std(duration).unwrap_or_default());
        tokio::task::yield_now().await;
    }
}

/// Wraps a gateway, counts calls and fails chosen ones
pub struct FlakyGateway {
    inner: Arc<dyn SpreadsheetGateway>,
    failing_appends: Mutex<HashSet<usize>>,
    failing_reads: Mutex<HashSet<String>>,
    reads: AtomicUsize,
    appends: AtomicUsize,
    updates: AtomicUsize,
}

impl FlakyGateway {
    pub fn new(inner: Arc<dyn SpreadsheetGateway>) -> Self {
        Self {
            inner,
            failing_appends: Mutex::new(HashSet::new()),
            failing_reads: Mutex::new(HashSet::new()),
            reads: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    /// The `nth` append attempt (1-based) returns a 500
    pub fn fail_append(self, nth: usize) -> Self {
        self.failing_appends.lock().unwrap().insert(nth);
        self
    }

    /// Every read of `sheet` returns a 503
    pub fn fail_reads_of(self, sheet: &str) -> Self {
        self.failing_reads.lock().unwrap().insert(sheet.to_string());
        self
    }

    /// Sheet reads of any kind, failed ones included
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check_read(&self, sheet: &str) -> Result<(), GatewayError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().unwrap().contains(sheet) {
            return Err(GatewayError::Status {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SpreadsheetGateway for FlakyGateway {
    async fn get_rows(&self, sheet: &str) -> Result<Vec<SheetRow>, GatewayError> {
        self.check_read(sheet)?;
        self.inner.get_rows(sheet).await
    }

    async fn get_headers(&self, sheet: &str) -> Result<Vec<String>, GatewayError> {
        self.check_read(sheet)?;
        self.inner.get_headers(sheet).await
    }

    async fn append_row(&self, sheet: &str, row: &SheetRow) -> Result<SheetRow, GatewayError> {
        let attempt = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_appends.lock().unwrap().contains(&attempt) {
            return Err(GatewayError::Status {
                status: 500,
                body: "internal error".into(),
            });
        }
        self.inner.append_row(sheet, row).await
    }

    async fn update_row(
        &self,
        sheet: &str,
        column: &str,
        value: &str,
        row: &SheetRow,
    ) -> Result<SheetRow, GatewayError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_row(sheet, column, value, row).await
    }

    async fn snapshot(&self, sheet: &str) -> Result<SheetSnapshot, GatewayError> {
        self.check_read(sheet)?;
        self.inner.snapshot(sheet).await
    }
}

/// Transport that records which entities were run
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<EntityKind>>,
    failing: Mutex<HashSet<EntityKind>>,
    gate: Option<Semaphore>,
    entered: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls block inside `full_migration` until [`release`](Self::release)
    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn fail_for(self, kind: EntityKind) -> Self {
        self.failing.lock().unwrap().insert(kind);
        self
    }

    pub fn calls(&self) -> Vec<EntityKind> {
        self.calls.lock().unwrap().clone()
    }

    /// Resolves once a call has entered the transport
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }
}

#[async_trait]
impl MigrationTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn full_migration(&self, kind: EntityKind) -> Result<FullMigrationReport, TransportError> {
        self.calls.lock().unwrap().push(kind);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            // closed on release
            let _ = gate.acquire().await;
        }

        if self.failing.lock().unwrap().contains(&kind) {
            return Err(TransportError::Status {
                status: 500,
                message: format!("{} migration exploded", kind),
            });
        }
        Ok(FullMigrationReport {
            entity: kind,
            import: PassOutcome::completed(SyncResult {
                imported: 1,
                ..SyncResult::default()
            }),
            sync: PassOutcome::completed(SyncResult::default()),
        })
    }
}

/// Memory-backed registry, workbook and engine over the built-in definitions
pub struct Harness {
    pub definitions: Vec<EntityDefinition>,
    pub registry: Arc<Registry>,
    pub stores: HashMap<EntityKind, Arc<MemoryRecordStore>>,
    pub sheets: Arc<MemorySheetGateway>,
    pub clock: Arc<FakeClock>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let definitions = Registry::builtin_definitions().expect("built-in registry is valid");
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<EntityDefinition>) -> Self {
        let mut stores = HashMap::new();
        let registry = Registry::build(definitions.clone(), |definition| {
            let store = Arc::new(MemoryRecordStore::new(definition.table.clone()));
            stores.insert(definition.kind, store.clone());
            store as Arc<dyn RecordStore>
        })
        .expect("registry builds");

        let sheets = Arc::new(blank_workbook(&definitions));
        let clock = Arc::new(FakeClock::fixed());
        let engine = Arc::new(SyncEngine::new(sheets.clone(), clock.clone(), SyncOptions::default()));

        Self {
            definitions,
            registry: Arc::new(registry),
            stores,
            sheets,
            clock,
            engine,
        }
    }

    pub fn entity(&self, kind: EntityKind) -> Arc<EntityDescriptor> {
        self.registry.get(kind).expect("entity is registered")
    }

    pub fn store(&self, kind: EntityKind) -> Arc<MemoryRecordStore> {
        self.stores.get(&kind).cloned().expect("entity has a store")
    }

    /// Engine over another gateway, sharing this harness's clock
    pub fn engine_over(&self, gateway: Arc<dyn SpreadsheetGateway>) -> SyncEngine {
        SyncEngine::new(gateway, self.clock.clone(), SyncOptions::default())
    }

    pub fn settings() -> SchedulerSettings {
        SchedulerSettings {
            enabled: false,
            utc_offset: chrono::FixedOffset::west_opt(5 * 3600).expect("valid offset"),
            entity_delay: Duration::from_secs(1),
        }
    }

    pub fn scheduler(&self, transport: Arc<dyn MigrationTransport>) -> Arc<MigrationScheduler> {
        self.scheduler_with(transport, Self::settings())
    }

    pub fn scheduler_with(
        &self,
        transport: Arc<dyn MigrationTransport>,
        settings: SchedulerSettings,
    ) -> Arc<MigrationScheduler> {
        Arc::new(MigrationScheduler::new(
            self.registry.clone(),
            transport,
            self.clock.clone(),
            settings,
        ))
    }

    /// In-process transport driving `engine`
    pub fn transport_over(&self, engine: SyncEngine) -> Arc<InProcessTransport> {
        Arc::new(InProcessTransport::new(self.registry.clone(), Arc::new(engine)))
    }

    /// Application state running the in-process transport
    pub fn state(&self) -> AppState {
        let transport = Arc::new(InProcessTransport::new(self.registry.clone(), self.engine.clone()));
        self.state_with(transport)
    }

    pub fn state_with(&self, transport: Arc<dyn MigrationTransport>) -> AppState {
        AppState {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            scheduler: self.scheduler(transport),
            database: None,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
