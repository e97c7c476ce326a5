use chrono::FixedOffset;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sheets: SheetsConfig,
    pub scheduler: SchedulerConfig,
    pub sync: SyncConfig,
    pub security: SecurityConfig,
    /// Registry YAML replacing the built-in entity registry
    pub registry_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetsBackend {
    Google,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub backend: SheetsBackend,
    pub base_url: String,
    pub spreadsheet_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            backend: SheetsBackend::Google,
            base_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: None,
            access_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    InProcess,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Fixed offset the hourly schedule is computed in (default UTC-5)
    pub utc_offset_minutes: i32,
    pub entity_delay_ms: u64,
    pub transport: TransportKind,
    /// Base URL of the API the `http` transport triggers
    pub trigger_base_url: String,
    pub trigger_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: -5 * 60,
            entity_delay_ms: 1000,
            transport: TransportKind::InProcess,
            trigger_base_url: "http://127.0.0.1:3000".to_string(),
            trigger_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub in_flight_window_secs: u64,
    pub sample_rows: usize,
    pub sample_value_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            in_flight_window_secs: 600,
            sample_rows: 3,
            sample_value_len: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            self.database.backend = match v.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "postgres" => StoreBackend::Postgres,
                _ => self.database.backend,
            };
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Sheets overrides
        if let Ok(v) = env::var("SHEETS_BACKEND") {
            self.sheets.backend = match v.to_lowercase().as_str() {
                "memory" => SheetsBackend::Memory,
                "google" => SheetsBackend::Google,
                _ => self.sheets.backend,
            };
        }
        if let Ok(v) = env::var("SHEETS_BASE_URL") {
            self.sheets.base_url = v;
        }
        if let Ok(v) = env::var("SHEETS_SPREADSHEET_ID") {
            self.sheets.spreadsheet_id = Some(v);
        }
        if let Ok(v) = env::var("SHEETS_ACCESS_TOKEN") {
            self.sheets.access_token = Some(v);
        }
        if let Ok(v) = env::var("SHEETS_TIMEOUT_SECS") {
            self.sheets.timeout_secs = v.parse().unwrap_or(self.sheets.timeout_secs);
        }

        // Scheduler overrides
        if let Ok(v) = env::var("SCHEDULER_ENABLED") {
            self.scheduler.enabled = v.parse().unwrap_or(self.scheduler.enabled);
        }
        if let Ok(v) = env::var("SCHEDULER_UTC_OFFSET_MINUTES") {
            self.scheduler.utc_offset_minutes = v.parse().unwrap_or(self.scheduler.utc_offset_minutes);
        }
        if let Ok(v) = env::var("SCHEDULER_ENTITY_DELAY_MS") {
            self.scheduler.entity_delay_ms = v.parse().unwrap_or(self.scheduler.entity_delay_ms);
        }
        if let Ok(v) = env::var("SCHEDULER_TRANSPORT") {
            self.scheduler.transport = match v.to_lowercase().as_str() {
                "http" => TransportKind::Http,
                "in_process" | "in-process" => TransportKind::InProcess,
                _ => self.scheduler.transport,
            };
        }
        if let Ok(v) = env::var("SCHEDULER_TRIGGER_BASE_URL") {
            self.scheduler.trigger_base_url = v;
        }
        if let Ok(v) = env::var("SCHEDULER_TRIGGER_TIMEOUT_SECS") {
            self.scheduler.trigger_timeout_secs = v.parse().unwrap_or(self.scheduler.trigger_timeout_secs);
        }

        // Sync overrides
        if let Ok(v) = env::var("SYNC_IN_FLIGHT_WINDOW_SECS") {
            self.sync.in_flight_window_secs = v.parse().unwrap_or(self.sync.in_flight_window_secs);
        }
        if let Ok(v) = env::var("SYNC_SAMPLE_ROWS") {
            self.sync.sample_rows = v.parse().unwrap_or(self.sync.sample_rows);
        }
        if let Ok(v) = env::var("SYNC_SAMPLE_VALUE_LEN") {
            self.sync.sample_value_len = v.parse().unwrap_or(self.sync.sample_value_len);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(v) = env::var("REGISTRY_PATH") {
            self.registry_path = Some(v).filter(|p| !p.trim().is_empty());
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            sheets: SheetsConfig {
                backend: SheetsBackend::Memory,
                ..SheetsConfig::default()
            },
            scheduler: SchedulerConfig {
                enabled: false,
                ..SchedulerConfig::default()
            },
            sync: SyncConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            registry_path: None,
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            sheets: SheetsConfig::default(),
            scheduler: SchedulerConfig::default(),
            sync: SyncConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            registry_path: None,
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            sheets: SheetsConfig {
                timeout_secs: 60,
                ..SheetsConfig::default()
            },
            scheduler: SchedulerConfig::default(),
            sync: SyncConfig::default(),
            security: SecurityConfig {
                enable_cors: true,
                cors_origins: vec!["https://backoffice.example.com".to_string()],
            },
            registry_path: None,
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
