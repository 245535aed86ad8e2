//! Configuration management for graphify services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (GRAPHIFY__ prefix, `__` section separator)
//! 2. Config file (graphify.toml)
//! 3. Defaults

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphifyConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub expose: ExposeConfig,
}

impl GraphifyConfig {
    /// Load from `{file_prefix}.toml` (optional) overlaid by `GRAPHIFY__*`
    /// environment variables, e.g. `GRAPHIFY__STORE__URI`.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("GRAPHIFY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("expose.nodes")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = cfg.try_deserialize()?;
        tracing::debug!(
            backend = ?loaded.store.backend,
            exposed = loaded.expose.nodes.len(),
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

/// Which store driver to connect.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; contents are lost on exit.
    #[default]
    Memory,
    Neo4j,
}

/// Connection settings for the backing store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Target database; the server default when unset.
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Startup migration behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Run auto-migration at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound for the whole migration run, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Which node types the exposure layer surfaces. Empty means all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExposeConfig {
    #[serde(default)]
    pub nodes: Vec<String>,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "graphify-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            database: None,
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            timeout_secs: default_timeout(),
        }
    }
}
