//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::Level;
use tutoring_core::routing::{Route, RoutingTable};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Failed to read routing table {0}: {1}")]
    RoutingTable(PathBuf, String),
}

/// Which store backs the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres(String),
    /// In-process store for local development (`DATABASE_URL=memory://`).
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store: StoreKind,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// `None` allows any origin.
    pub cors_allow_origin: Option<String>,
    pub routing_table: RoutingTable,
}

/// On-disk shape of a routing table file:
///
/// ```toml
/// [[route]]
/// grade = "senior2"
/// subject = "physics"
/// collection = "senior2_physics"
/// ```
#[derive(Debug, Deserialize)]
struct RoutingFile {
    #[serde(rename = "route", default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    grade: String,
    subject: String,
    collection: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let store = parse_store(&database_url)?;

        let db_max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(value) => value.parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string(), e.to_string())
            })?,
            Err(_) => 5,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_allow_origin = std::env::var("CORS_ALLOW_ORIGIN")
            .ok()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty() && origin != "*");
        if let Some(origin) = &cors_allow_origin {
            origin.parse::<axum::http::HeaderValue>().map_err(|e| {
                ConfigError::InvalidValue("CORS_ALLOW_ORIGIN".to_string(), e.to_string())
            })?;
        }

        // --- Load the Collection Routing Table ---
        let routing_table = match std::env::var("ROUTING_TABLE_PATH") {
            Ok(path) => load_routing_table(Path::new(&path))?,
            Err(_) => RoutingTable::standard(),
        };

        Ok(Self {
            bind_address,
            store,
            db_max_connections,
            log_level,
            cors_allow_origin,
            routing_table,
        })
    }
}

fn parse_store(database_url: &str) -> Result<StoreKind, ConfigError> {
    if database_url.starts_with("memory:") {
        Ok(StoreKind::Memory)
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok(StoreKind::Postgres(database_url.to_string()))
    } else {
        Err(ConfigError::InvalidValue(
            "DATABASE_URL".to_string(),
            "expected a postgres:// or memory:// URL".to_string(),
        ))
    }
}

/// Reads a TOML routing table from disk.
pub fn load_routing_table(path: &Path) -> Result<RoutingTable, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::RoutingTable(path.to_path_buf(), e.to_string()))?;
    parse_routing_table(&contents).map_err(|e| ConfigError::RoutingTable(path.to_path_buf(), e))
}

/// Parses a TOML routing table. An empty table is rejected.
pub fn parse_routing_table(contents: &str) -> Result<RoutingTable, String> {
    let file: RoutingFile = toml::from_str(contents).map_err(|e| e.to_string())?;
    let table = RoutingTable::from_routes(file.routes.into_iter().map(|entry| Route {
        grade: entry.grade,
        subject: entry.subject,
        collection: entry.collection,
    }));
    if table.is_empty() {
        return Err("routing table has no routes".to_string());
    }
    Ok(table)
}
