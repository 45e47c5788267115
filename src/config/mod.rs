//! Configuration module for the kitcheck backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory holding photo blobs
    pub photo_dir: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Local hour (0-23) at which the daily alert sweep fires
    pub alert_hour: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("KITCHECK_API_PSK").ok();

        let db_path = env::var("KITCHECK_DB_PATH")
            .unwrap_or_else(|_| "./data/kitcheck.sqlite".to_string())
            .into();

        let photo_dir = env::var("KITCHECK_PHOTO_DIR")
            .unwrap_or_else(|_| "./data/photos".to_string())
            .into();

        let bind_addr = env::var("KITCHECK_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid KITCHECK_BIND_ADDR format");

        let log_level = env::var("KITCHECK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let alert_hour = env::var("KITCHECK_ALERT_HOUR")
            .ok()
            .and_then(|h| h.parse().ok())
            .filter(|h| *h < 24)
            .unwrap_or(7);

        Self {
            api_psk,
            db_path,
            photo_dir,
            bind_addr,
            log_level,
            alert_hour,
        }
    }
}
