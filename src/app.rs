//! Application wiring: state shared by handlers, the router and startup.

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, SecurityConfig, SheetsBackend, StoreBackend, TransportKind};
use crate::database::{DatabaseManager, MemoryRecordStore, RecordStore};
use crate::error::ApiError;
use crate::handlers::{data, migration, root, scheduler};
use crate::registry::{EntityDefinition, EntityDescriptor, EntityKind, Registry};
use crate::scheduler::{HttpTransport, InProcessTransport, MigrationScheduler, MigrationTransport, SchedulerSettings};
use crate::sheets::{GoogleSheetsGateway, MemorySheetGateway, SpreadsheetGateway};
use crate::sync::{SyncEngine, SyncOptions};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub engine: Arc<SyncEngine>,
    pub scheduler: Arc<MigrationScheduler>,
    /// None when running on the in-memory store
    pub database: Option<DatabaseManager>,
}

impl AppState {
    pub fn entity(&self, kind: EntityKind) -> Result<Arc<EntityDescriptor>, ApiError> {
        self.registry
            .get(kind)
            .ok_or_else(|| ApiError::not_found(format!("Entity not found: {}", kind)))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<EntityDescriptor>, ApiError> {
        Ok(self.registry.resolve(name)?)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root::root))
        .route("/health", get(root::health))
        .merge(migration_routes(&state.registry))
        .merge(scheduler_routes())
        .merge(data_routes())
        .with_state(state)
        // Global middleware
        .layer(cors_layer(&crate::config::config().security))
        .layer(TraceLayer::new_for_http())
}

/// `/<slug>-migration/*` for every registered entity
fn migration_routes(registry: &Registry) -> Router<AppState> {
    registry.iter().fold(Router::new(), |router, entity| {
        let routes = Router::new()
            .route("/import-from-sheets", post(migration::import_from_sheets))
            .route("/sync-to-sheets", post(migration::sync_to_sheets))
            .route("/full-migration", post(migration::full_migration))
            .route("/status", get(migration::status))
            .route("/sheet-headers", get(migration::sheet_headers))
            .route("/compare-record", get(migration::compare_record))
            .layer(Extension(entity.kind));
        router.nest(&format!("/{}-migration", entity.kind.slug()), routes)
    })
}

fn scheduler_routes() -> Router<AppState> {
    Router::new()
        .route("/migration-scheduler/run-all", post(scheduler::run_all))
        .route("/migration-scheduler/run", post(scheduler::run_one))
        .route("/migration-scheduler/status", get(scheduler::status))
}

fn data_routes() -> Router<AppState> {
    Router::new()
        // Entity-level operations (collection)
        .route("/api/data/:entity", get(data::entity_get).post(data::entity_post))
        // Record-level operations (individual)
        .route(
            "/api/data/:entity/:id",
            get(data::record_get)
                .patch(data::record_patch)
                .delete(data::record_delete),
        )
}

fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    if !config.enable_cors || crate::is_development!() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application from configuration: registry, stores, gateway,
/// engine and scheduler
pub async fn bootstrap(config: &AppConfig) -> anyhow::Result<AppState> {
    let definitions = match &config.registry_path {
        Some(path) => {
            info!("Loading entity registry from {}", path);
            Registry::load_definitions(path)?
        }
        None => Registry::builtin_definitions()?,
    };

    let (registry, database) = match config.database.backend {
        StoreBackend::Postgres => {
            let database = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            let parts = database.prepare_stores(&definitions).await?;
            (Registry::assemble(parts)?, Some(database))
        }
        StoreBackend::Memory => {
            info!("Using in-memory record stores");
            (Registry::build(definitions.clone(), memory_store)?, None)
        }
    };
    let registry = Arc::new(registry);

    let gateway: Arc<dyn SpreadsheetGateway> = match config.sheets.backend {
        SheetsBackend::Google => Arc::new(GoogleSheetsGateway::new(&config.sheets)?),
        SheetsBackend::Memory => {
            info!("Using in-memory spreadsheet");
            Arc::new(blank_workbook(&definitions))
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(SyncEngine::new(gateway, clock.clone(), SyncOptions::from(&config.sync)));

    let transport: Arc<dyn MigrationTransport> = match config.scheduler.transport {
        TransportKind::InProcess => Arc::new(InProcessTransport::new(registry.clone(), engine.clone())),
        TransportKind::Http => Arc::new(HttpTransport::new(
            &config.scheduler.trigger_base_url,
            Duration::from_secs(config.scheduler.trigger_timeout_secs),
        )?),
    };
    let settings = SchedulerSettings::try_from(&config.scheduler)?;
    let scheduler = Arc::new(MigrationScheduler::new(registry.clone(), transport, clock, settings));

    info!("Registered {} entities", registry.len());
    Ok(AppState {
        registry,
        engine,
        scheduler,
        database,
    })
}

fn memory_store(definition: &EntityDefinition) -> Arc<dyn RecordStore> {
    Arc::new(MemoryRecordStore::new(definition.table.clone()))
}

/// One empty sheet per entity with the identifier and mapped columns as headers
pub fn blank_workbook(definitions: &[EntityDefinition]) -> MemorySheetGateway {
    definitions.iter().fold(MemorySheetGateway::new(), |gateway, definition| {
        let headers: Vec<&str> = std::iter::once(definition.identifier_column.trim())
            .chain(definition.fields.iter().map(|b| b.column.trim()))
            .collect();
        gateway.with_sheet(definition.sheet.trim(), &headers, Vec::new())
    })
}
