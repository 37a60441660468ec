use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_history_max")]
    pub history_max: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_url")]
    pub api_url: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_chunks: usize,
    #[serde(default = "default_push_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    #[serde(default)]
    pub pro4x_buy_video_url: Option<String>,
    #[serde(default = "default_upsell_title")]
    pub upsell_title: String,
    #[serde(default = "default_upsell_body")]
    pub upsell_body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_audit: bool,
    #[serde(default = "default_csv_audit_path")]
    pub csv_audit_path: String,
}

fn default_bind_addr() -> String { "0.0.0.0:8080".to_string() }
fn default_backend() -> StoreBackend { StoreBackend::Sqlite }
fn default_database_path() -> String { "signals.db".to_string() }
fn default_history_limit() -> usize { 50 }
fn default_history_max() -> usize { 500 }
fn default_push_url() -> String { "https://exp.host/--/api/v2/push/send".to_string() }
fn default_chunk_size() -> usize { 100 }
fn default_concurrency() -> usize { 1 }
fn default_push_timeout_ms() -> u64 { 10_000 }
fn default_store_timeout_ms() -> u64 { 5_000 }
fn default_upsell_title() -> String { "🔒 Pro Setup Detected".to_string() }
fn default_upsell_body() -> String {
    "A new setup just triggered. Upgrade to Pro to unlock entry, price and details.".to_string()
}
fn default_csv_audit_path() -> String { "dispatch_audit.csv".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
            history_limit: default_history_limit(),
            history_max: default_history_max(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            api_url: default_push_url(),
            chunk_size: default_chunk_size(),
            max_concurrent_chunks: default_concurrency(),
            request_timeout_ms: default_push_timeout_ms(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { store_timeout_ms: default_store_timeout_ms() }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            pro4x_buy_video_url: None,
            upsell_title: default_upsell_title(),
            upsell_body: default_upsell_body(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_audit: false,
            csv_audit_path: default_csv_audit_path(),
        }
    }
}

impl PushConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DispatchConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Push provider hard limit on messages per request.
pub const MAX_CHUNK_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub push_access_token: Option<String>,
    pub bind_addr: Option<String>,
    pub database_path: Option<String>,
    pub dry_run: Option<bool>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Environment values win over the file.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(addr) = &env.bind_addr {
            self.server.bind_addr = addr.clone();
        }
        if let Some(path) = &env.database_path {
            self.storage.database_path = path.clone();
        }
        if let Some(dry_run) = env.dry_run {
            self.system.dry_run = dry_run;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_CHUNK_SIZE).contains(&self.push.chunk_size),
            "push.chunk_size must be between 1 and {}, got {}",
            MAX_CHUNK_SIZE,
            self.push.chunk_size
        );
        ensure!(
            self.push.max_concurrent_chunks > 0,
            "push.max_concurrent_chunks must be at least 1"
        );
        ensure!(self.push.request_timeout_ms > 0, "push.request_timeout_ms must be positive");
        ensure!(self.dispatch.store_timeout_ms > 0, "dispatch.store_timeout_ms must be positive");
        ensure!(
            self.storage.backend != StoreBackend::Sqlite
                || !self.storage.database_path.trim().is_empty(),
            "storage.database_path is required for the sqlite backend"
        );
        ensure!(
            self.storage.history_limit > 0 && self.storage.history_limit <= self.storage.history_max,
            "storage.history_limit must be between 1 and storage.history_max ({})",
            self.storage.history_max
        );
        self.server
            .bind_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("server.bind_addr is not ip:port: {}", self.server.bind_addr))?;
        Ok(())
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let dry_run = match std::env::var("DRY_RUN") {
            Ok(v) => Some(
                v.parse()
                    .with_context(|| format!("DRY_RUN must be true or false, got {}", v))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            push_access_token: std::env::var("PUSH_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            bind_addr: std::env::var("BIND_ADDR").ok(),
            database_path: std::env::var("DATABASE_PATH").ok(),
            dry_run,
        })
    }
}
